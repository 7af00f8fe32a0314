use serde::Serialize;

use crate::config::IoMode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub mode: IoMode,
    pub total_bytes: u64,
    pub bytes_verified: u64,
    pub chunks: u64,
    pub elapsed_ms: u64,
}

/// Whole percent of `done` over `total`, rounded down and capped at 100.
///
/// An empty target counts as complete.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let scaled = u128::from(done) * 100 / u128::from(total);
    scaled.min(100) as u8
}

/// Index of the first byte where the two slices differ, comparing the common prefix.
pub fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<usize> {
    if expected == actual {
        return None;
    }
    expected
        .iter()
        .zip(actual)
        .position(|(a, b)| a != b)
        .or_else(|| Some(expected.len().min(actual.len())))
}

/// Byte extent of a target: the reported length for regular files, otherwise
/// the sector count scaled by `sector_size`.
pub fn total_size_from<E>(
    reported_len: u64,
    sector_size: u64,
    sector_count: impl FnOnce() -> Result<u64, E>,
) -> Result<Option<u64>, E> {
    if reported_len != 0 {
        return Ok(Some(reported_len));
    }
    let sectors = sector_count()?;
    Ok(sectors.checked_mul(sector_size))
}

#[cfg(test)]
mod tests {
    use super::{first_mismatch, percent_of, total_size_from};

    #[test]
    fn test_percent_rounds_down() {
        assert_eq!(percent_of(0, 4096), 0);
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(2, 3), 66);
        assert_eq!(percent_of(4095, 4096), 99);
        assert_eq!(percent_of(4096, 4096), 100);
    }

    #[test]
    fn test_percent_handles_extremes() {
        assert_eq!(percent_of(0, 0), 100);
        assert_eq!(percent_of(u64::MAX, u64::MAX), 100);
        assert_eq!(percent_of(u64::MAX / 2, u64::MAX), 49);
        assert_eq!(percent_of(10, 5), 100);
    }

    #[test]
    fn test_percent_is_monotonic() {
        let total = 1_000_003u64;
        let mut last = 0;
        for done in (0..=total).step_by(65_536) {
            let p = percent_of(done, total);
            assert!(p >= last);
            last = p;
        }
    }

    #[test]
    fn test_first_mismatch() {
        assert_eq!(first_mismatch(b"abcdef", b"abcdef"), None);
        assert_eq!(first_mismatch(b"abcdef", b"abcXef"), Some(3));
        assert_eq!(first_mismatch(b"abc", b"abcd"), Some(3));
        assert_eq!(first_mismatch(b"", b""), None);
    }

    #[test]
    fn test_regular_file_uses_reported_length() {
        let size = total_size_from::<()>(4096, 512, || panic!("sector query must not run"));
        assert_eq!(size, Ok(Some(4096)));
    }

    #[test]
    fn test_block_device_uses_sector_count() {
        assert_eq!(total_size_from::<()>(0, 512, || Ok(2048)), Ok(Some(1024 * 1024)));
        assert_eq!(total_size_from::<()>(0, 512, || Ok(0)), Ok(Some(0)));
        assert_eq!(total_size_from::<()>(0, 512, || Ok(u64::MAX)), Ok(None));
        assert_eq!(total_size_from(0, 512, || Err("ioctl failed")), Err("ioctl failed"));
    }
}
