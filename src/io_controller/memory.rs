use std::io;

use crate::config::SECTOR_SIZE;

use super::BlockDevice;

/// In-memory stand-in for a device, with fault injection for exercising the
/// verifiers without hardware.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    data: Vec<u8>,
    position: u64,
    block_size: usize,
    reported_len: u64,
    sector_query_fails: bool,
    corrupt_read: Option<usize>,
    discard_writes: bool,
    skewed_seek: Option<usize>,
    short_write: Option<usize>,
    reads: usize,
    writes: usize,
    seeks: usize,
}

impl MemoryDevice {
    /// Behaves like a regular file: `fstat` reports the content length.
    pub fn from_bytes(data: Vec<u8>, block_size: usize) -> Self {
        let reported_len = data.len() as u64;
        Self {
            data,
            position: 0,
            block_size,
            reported_len,
            sector_query_fails: false,
            corrupt_read: None,
            discard_writes: false,
            skewed_seek: None,
            short_write: None,
            reads: 0,
            writes: 0,
            seeks: 0,
        }
    }

    /// Behaves like a block device: zero reported length, `sectors` 512-byte sectors.
    pub fn block_device(sectors: u64, block_size: usize) -> Self {
        let len = (sectors * SECTOR_SIZE) as usize;
        let mut device = Self::from_bytes(vec![0; len], block_size);
        device.reported_len = 0;
        device
    }

    pub fn with_failing_sector_query(mut self) -> Self {
        self.sector_query_fails = true;
        self
    }

    /// Flips the first returned byte of the `nth` read call (zero-based).
    pub fn with_corrupt_read(mut self, nth: usize) -> Self {
        self.corrupt_read = Some(nth);
        self
    }

    /// Write calls report success without storing anything.
    pub fn with_discarded_writes(mut self) -> Self {
        self.discard_writes = true;
        self
    }

    /// The `nth` seek call (zero-based) lands one byte past the requested offset.
    pub fn with_seek_skew(mut self, nth: usize) -> Self {
        self.skewed_seek = Some(nth);
        self
    }

    /// The `nth` write call (zero-based) stores and reports one byte less.
    pub fn with_short_write(mut self, nth: usize) -> Self {
        self.short_write = Some(nth);
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn read_calls(&self) -> usize {
        self.reads
    }

    pub fn write_calls(&self) -> usize {
        self.writes
    }

    fn window(&self, len: usize) -> std::ops::Range<usize> {
        let start = (self.position as usize).min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        start..end
    }
}

impl BlockDevice for MemoryDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn reported_len(&self) -> u64 {
        self.reported_len
    }

    fn sector_count(&mut self) -> io::Result<u64> {
        if self.sector_query_fails {
            return Err(io::Error::from_raw_os_error(libc::ENOTTY));
        }
        Ok(self.data.len() as u64 / SECTOR_SIZE)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let range = self.window(buf.len());
        let count = range.len();
        buf[..count].copy_from_slice(&self.data[range]);
        if self.corrupt_read == Some(self.reads) && count > 0 {
            buf[0] ^= 0xFF;
        }
        self.reads += 1;
        self.position += count as u64;
        Ok(count)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut range = self.window(buf.len());
        if self.short_write == Some(self.writes) && !range.is_empty() {
            range.end -= 1;
        }
        let count = range.len();
        if !self.discard_writes {
            self.data[range].copy_from_slice(&buf[..count]);
        }
        self.writes += 1;
        self.position += count as u64;
        Ok(count)
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        let landed = if self.skewed_seek == Some(self.seeks) {
            offset + 1
        } else {
            offset
        };
        self.seeks += 1;
        self.position = landed;
        Ok(landed)
    }
}
