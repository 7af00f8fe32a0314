use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::ptr::NonNull;

use tracing::{debug, warn};

use crate::config::IoMode;
use crate::error::{Result, ScanError};

use super::BlockDevice;

#[cfg(target_os = "linux")]
const BLKGETSIZE: libc::c_ulong = 0x1260;

const FALLBACK_BLOCK_SIZE: usize = 512;

/// Zero-initialised heap region whose start address is a multiple of `alignment`.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuffer {
    pub fn new(len: usize, alignment: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "Buffer length must be greater than zero.",
            ));
        }
        let layout = Layout::from_size_align(len, alignment).map_err(|_| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("Invalid alignment {alignment} for buffer."),
            )
        })?;
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            io::Error::new(ErrorKind::OutOfMemory, "Failed to allocate aligned buffer.")
        })?;
        Ok(Self { ptr, layout })
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        unsafe {
            dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

/// A file or block device opened for synchronous, uncached I/O.
pub struct OsDevice {
    file: File,
    block_size: usize,
    reported_len: u64,
    direct: bool,
}

impl OsDevice {
    pub fn open(path: &Path, mode: IoMode) -> Result<Self> {
        let (file, direct) =
            open_unbuffered(path, mode).map_err(|source| ScanError::Open { op: "open", source })?;
        let metadata = file
            .metadata()
            .map_err(|source| ScanError::Stat { op: "fstat", source })?;
        let block_size = native_block_size(&metadata);
        debug!(
            path = %path.display(),
            block_size,
            reported_len = metadata.len(),
            direct,
            "device opened"
        );
        Ok(Self {
            file,
            block_size,
            reported_len: metadata.len(),
            direct,
        })
    }

    fn is_aligned(&self, ptr: *const u8, len: usize) -> bool {
        (ptr as usize) % self.block_size == 0 && len % self.block_size == 0
    }

    /// Runs `op` with `O_DIRECT` cleared when the transfer cannot satisfy its
    /// alignment rules, e.g. the unaligned tail of a regular file.
    ///
    /// Cached pages are dropped before and after the buffered call so the
    /// tail is still read from the medium. The kernel treats this as advice.
    fn transfer<T>(
        &mut self,
        aligned: bool,
        op: impl FnOnce(&mut File) -> io::Result<T>,
    ) -> io::Result<T> {
        if !self.direct || aligned {
            return op(&mut self.file);
        }
        set_direct(&self.file, false)?;
        self.evict_cached();
        let result = op(&mut self.file);
        self.evict_cached();
        let restored = set_direct(&self.file, true);
        let value = result?;
        restored?;
        Ok(value)
    }

    fn evict_cached(&self) {
        if let Err(e) = drop_cached(&self.file) {
            debug!(error = %e, "page cache eviction refused");
        }
    }
}

impl BlockDevice for OsDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn reported_len(&self) -> u64 {
        self.reported_len
    }

    #[cfg(target_os = "linux")]
    fn sector_count(&mut self) -> io::Result<u64> {
        use std::os::unix::io::AsRawFd;

        let mut sectors: libc::c_ulong = 0;
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), BLKGETSIZE as _, &mut sectors) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(u64::from(sectors))
    }

    #[cfg(not(target_os = "linux"))]
    fn sector_count(&mut self) -> io::Result<u64> {
        Err(io::Error::new(
            ErrorKind::Unsupported,
            "Sector count query is not supported on this platform.",
        ))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let aligned = self.is_aligned(buf.as_ptr(), buf.len());
        self.transfer(aligned, |file| file.read(buf))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let aligned = self.is_aligned(buf.as_ptr(), buf.len());
        self.transfer(aligned, |file| file.write(buf))
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        self.file.seek(SeekFrom::Start(offset))
    }
}

#[cfg(target_os = "linux")]
fn open_unbuffered(path: &Path, mode: IoMode) -> io::Result<(File, bool)> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut flags = libc::O_NOCTTY | libc::O_NOATIME | libc::O_DIRECT | libc::O_SYNC;
    loop {
        let mut options = OpenOptions::new();
        options
            .read(true)
            .write(mode == IoMode::ReadWrite)
            .custom_flags(flags);
        match options.open(path) {
            Ok(file) => return Ok((file, flags & libc::O_DIRECT != 0)),
            Err(e) if e.raw_os_error() == Some(libc::EINVAL) && flags & libc::O_DIRECT != 0 => {
                warn!(
                    path = %path.display(),
                    "direct I/O unavailable, falling back to synchronous buffered I/O"
                );
                flags &= !libc::O_DIRECT;
            }
            Err(e) if e.raw_os_error() == Some(libc::EPERM) && flags & libc::O_NOATIME != 0 => {
                warn!(path = %path.display(), "O_NOATIME refused, access times will be updated");
                flags &= !libc::O_NOATIME;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn open_unbuffered(path: &Path, mode: IoMode) -> io::Result<(File, bool)> {
    use std::os::unix::fs::OpenOptionsExt;

    let file = OpenOptions::new()
        .read(true)
        .write(mode == IoMode::ReadWrite)
        .custom_flags(libc::O_NOCTTY | libc::O_SYNC)
        .open(path)?;
    Ok((file, false))
}

#[cfg(not(unix))]
fn open_unbuffered(path: &Path, mode: IoMode) -> io::Result<(File, bool)> {
    let file = OpenOptions::new()
        .read(true)
        .write(mode == IoMode::ReadWrite)
        .open(path)?;
    Ok((file, false))
}

#[cfg(target_os = "linux")]
fn set_direct(file: &File, enabled: bool) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    let flags = if enabled {
        flags | libc::O_DIRECT
    } else {
        flags & !libc::O_DIRECT
    };
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_direct(_file: &File, _enabled: bool) -> io::Result<()> {
    Ok(())
}

/// Asks the kernel to drop clean cached pages of `file`. Writes made under
/// `O_SYNC` are already clean, so they are dropped too.
#[cfg(target_os = "linux")]
fn drop_cached(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_DONTNEED) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn drop_cached(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn native_block_size(metadata: &std::fs::Metadata) -> usize {
    use std::os::unix::fs::MetadataExt;

    match usize::try_from(metadata.blksize()) {
        Ok(0) | Err(_) => FALLBACK_BLOCK_SIZE,
        Ok(size) => size,
    }
}

#[cfg(not(unix))]
fn native_block_size(_metadata: &std::fs::Metadata) -> usize {
    FALLBACK_BLOCK_SIZE
}
