mod direct_io;
mod memory;
mod progress;
mod verify;
mod write;

use std::io;

use tracing::debug;

use crate::config::{AppConfig, SECTOR_SIZE};
use crate::core_logic;
use crate::error::{Result, ScanError};

pub use direct_io::{AlignedBuffer, OsDevice};
pub use memory::MemoryDevice;
pub use progress::{EventSink, ProgressUpdate, TerminalProgress};

/// Capability surface of a scannable target.
///
/// Transfers are single calls that may move fewer bytes than requested; the
/// verifiers decide what a short count means. Positioning is explicit.
pub trait BlockDevice {
    /// Native block size; scratch buffers are aligned to it.
    fn block_size(&self) -> usize;

    /// Length reported by `fstat`; zero for block devices.
    fn reported_len(&self) -> u64;

    /// Size in 512-byte sectors, as reported by the device driver.
    fn sector_count(&mut self) -> io::Result<u64>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Moves to an absolute offset and returns the resulting position.
    fn seek(&mut self, offset: u64) -> io::Result<u64>;

    fn discover_size(&mut self) -> Result<u64> {
        let reported = self.reported_len();
        let total = core_logic::total_size_from(reported, SECTOR_SIZE, || self.sector_count())
            .map_err(|source| ScanError::SizeDiscovery {
                op: "BLKGETSIZE",
                source,
            })?;
        total.ok_or_else(|| ScanError::SizeDiscovery {
            op: "BLKGETSIZE",
            source: io::Error::new(io::ErrorKind::InvalidData, "sector count overflows u64"),
        })
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn reported_len(&self) -> u64 {
        (**self).reported_len()
    }

    fn sector_count(&mut self) -> io::Result<u64> {
        (**self).sector_count()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        (**self).seek(offset)
    }
}

/// One verification run over an open device of known extent.
pub struct DeviceInspector<D: BlockDevice> {
    device: D,
    block_size: usize,
    chunk_len: usize,
    total_size: u64,
}

impl<D: BlockDevice> DeviceInspector<D> {
    pub fn new(device: D, total_size: u64) -> Result<Self> {
        Self::with_config(device, total_size, AppConfig::default())
    }

    pub fn with_config(device: D, total_size: u64, config: AppConfig) -> Result<Self> {
        let block_size = device.block_size();
        let chunk_len = config
            .chunk_len(block_size)
            .filter(|&len| len > 0)
            .ok_or_else(|| ScanError::Allocation {
                op: "aligned alloc",
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unusable block size {block_size}"),
                ),
            })?;
        debug!(block_size, chunk_len, total_size, "inspector ready");
        Ok(Self {
            device,
            block_size,
            chunk_len,
            total_size,
        })
    }

    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    pub fn into_device(self) -> D {
        self.device
    }

    fn allocate(&self) -> Result<AlignedBuffer> {
        AlignedBuffer::new(self.chunk_len, self.block_size).map_err(|source| {
            ScanError::Allocation {
                op: "aligned alloc",
                source,
            }
        })
    }

    fn seek_to(&mut self, offset: u64) -> Result<()> {
        let landed = self.device.seek(offset).map_err(ScanError::io("seek"))?;
        if landed != offset {
            return Err(ScanError::Io {
                op: "seek",
                source: io::Error::other(format!(
                    "landed at {landed} instead of {offset}"
                )),
            });
        }
        Ok(())
    }

    /// Reads exactly `buf.len()` bytes in one call at the current position.
    fn read_expecting(&mut self, buf: &mut [u8]) -> Result<()> {
        let count = self.device.read(buf).map_err(ScanError::io("read"))?;
        if count != buf.len() {
            return Err(ScanError::short_transfer("read", buf.len(), count));
        }
        Ok(())
    }

    /// Writes all of `buf` in one call at the current position.
    fn write_expecting(&mut self, buf: &[u8]) -> Result<()> {
        let count = self.device.write(buf).map_err(ScanError::io("write"))?;
        if count != buf.len() {
            return Err(ScanError::short_transfer("write", buf.len(), count));
        }
        Ok(())
    }
}
