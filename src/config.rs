use std::path::PathBuf;

use serde::Serialize;

/// Blocks transferred per I/O call.
pub const CHUNK_BLOCKS: usize = 128;
/// Sector size used by the size-in-sectors device query.
pub const SECTOR_SIZE: u64 = 512;

#[derive(Clone, Copy, Debug)]
pub struct AppConfig {
    pub chunk_blocks: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chunk_blocks: CHUNK_BLOCKS,
        }
    }
}

impl AppConfig {
    /// Bytes moved per chunk for a device with the given native block size.
    pub fn chunk_len(&self, block_size: usize) -> Option<usize> {
        block_size.checked_mul(self.chunk_blocks)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IoMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailPolicy {
    #[default]
    Skip,
    FailFast,
}

/// Settings in effect for one target, captured when its path is seen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TargetConfig {
    pub mode: IoMode,
    pub fail_policy: FailPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub path: PathBuf,
    pub config: TargetConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunPlan {
    pub targets: Vec<Target>,
}

impl RunPlan {
    /// Folds arguments left to right; flags affect only the paths after them.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut current = TargetConfig::default();
        let mut targets = Vec::new();

        for arg in args {
            match arg.as_ref() {
                "-ro" => current.mode = IoMode::ReadOnly,
                "-rw" => current.mode = IoMode::ReadWrite,
                "--fail" => current.fail_policy = FailPolicy::FailFast,
                "--no-fail" => current.fail_policy = FailPolicy::Skip,
                path => targets.push(Target {
                    path: PathBuf::from(path),
                    config: current,
                }),
            }
        }

        Self { targets }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, FailPolicy, IoMode, RunPlan, TargetConfig};

    #[test]
    fn test_defaults_are_read_only_and_skip() {
        let plan = RunPlan::from_args(["/dev/sdz"]);
        assert_eq!(plan.targets.len(), 1);
        assert_eq!(plan.targets[0].config, TargetConfig::default());
        assert_eq!(plan.targets[0].config.mode, IoMode::ReadOnly);
        assert_eq!(plan.targets[0].config.fail_policy, FailPolicy::Skip);
    }

    #[test]
    fn test_flags_apply_only_to_later_targets() {
        let plan = RunPlan::from_args(["a", "-rw", "b", "--fail", "c", "-ro", "--no-fail", "d"]);
        let configs: Vec<_> = plan
            .targets
            .iter()
            .map(|t| (t.path.to_str().unwrap_or_default(), t.config.mode, t.config.fail_policy))
            .collect();
        assert_eq!(
            configs,
            vec![
                ("a", IoMode::ReadOnly, FailPolicy::Skip),
                ("b", IoMode::ReadWrite, FailPolicy::Skip),
                ("c", IoMode::ReadWrite, FailPolicy::FailFast),
                ("d", IoMode::ReadOnly, FailPolicy::Skip),
            ]
        );
    }

    #[test]
    fn test_flags_only_yield_empty_plan() {
        assert!(RunPlan::from_args(["-rw", "--fail"]).is_empty());
        assert!(RunPlan::from_args(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_chunk_len() {
        let config = AppConfig::default();
        assert_eq!(config.chunk_len(512), Some(64 * 1024));
        assert_eq!(config.chunk_len(4096), Some(512 * 1024));
        assert_eq!(config.chunk_len(usize::MAX), None);
    }
}
