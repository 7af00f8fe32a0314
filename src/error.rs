use std::io;

use thiserror::Error;

/// Closed set of failure kinds a verification run can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Usage,
    Open,
    Stat,
    SizeDiscovery,
    Allocation,
    Io,
    Consistency,
    Restoration,
}

impl ErrorKind {
    /// Setup failures are the only ones subject to the fail/skip policy.
    pub fn is_setup(self) -> bool {
        matches!(self, ErrorKind::Open | ErrorKind::Stat)
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no targets given")]
    Usage,

    #[error("Failed to {op}: {source}")]
    Open {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Failed to stat ({op}): {source}")]
    Stat {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Failed to discover device size ({op}): {source}")]
    SizeDiscovery {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{op}: {source}")]
    Allocation {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{op}: data mismatch at offset {offset}")]
    Consistency { op: &'static str, offset: u64 },

    #[error("restore: original data not restored at offset {offset}")]
    Restoration { offset: u64 },
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::Usage => ErrorKind::Usage,
            ScanError::Open { .. } => ErrorKind::Open,
            ScanError::Stat { .. } => ErrorKind::Stat,
            ScanError::SizeDiscovery { .. } => ErrorKind::SizeDiscovery,
            ScanError::Allocation { .. } => ErrorKind::Allocation,
            ScanError::Io { .. } => ErrorKind::Io,
            ScanError::Consistency { .. } => ErrorKind::Consistency,
            ScanError::Restoration { .. } => ErrorKind::Restoration,
        }
    }

    /// Adapter for `map_err` that tags an I/O failure with the operation name.
    pub fn io(op: &'static str) -> impl FnOnce(io::Error) -> ScanError {
        move |source| ScanError::Io { op, source }
    }

    /// A transfer that moved a different number of bytes than expected.
    pub fn short_transfer(op: &'static str, expected: usize, actual: usize) -> ScanError {
        ScanError::Io {
            op,
            source: io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {expected} bytes, transferred {actual}"),
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::{ErrorKind, ScanError};
    use std::io;

    #[test]
    fn test_only_open_and_stat_are_setup_failures() {
        let open = ScanError::Open {
            op: "open",
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let stat = ScanError::Stat {
            op: "fstat",
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let sizing = ScanError::SizeDiscovery {
            op: "BLKGETSIZE",
            source: io::Error::from(io::ErrorKind::Unsupported),
        };
        assert!(open.kind().is_setup());
        assert!(stat.kind().is_setup());
        assert!(!sizing.kind().is_setup());
        assert!(!ScanError::Restoration { offset: 0 }.kind().is_setup());
    }

    #[test]
    fn test_messages_name_the_operation() {
        let err = ScanError::io("seek")(io::Error::other("device went away"));
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.to_string(), "seek: device went away");

        let err = ScanError::short_transfer("write", 512, 100);
        assert!(err.to_string().starts_with("write: expected 512 bytes"));

        let err = ScanError::Consistency {
            op: "consistency",
            offset: 4096,
        };
        assert_eq!(err.to_string(), "consistency: data mismatch at offset 4096");
    }
}
