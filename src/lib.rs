mod app;
mod config;
mod core_logic;
mod error;
mod io_controller;

pub use crate::app::{
    EXIT_FATAL, EXIT_OK, EXIT_USAGE, RunOutcome, TargetOutcome, abort_status, run_cli, run_plan,
    run_with_opener, run_with_streams,
};
pub use crate::config::{AppConfig, FailPolicy, IoMode, RunPlan, Target, TargetConfig};
pub use crate::core_logic::{ScanSummary, percent_of};
pub use crate::error::{ErrorKind, Result, ScanError};
pub use crate::io_controller::{
    AlignedBuffer, BlockDevice, DeviceInspector, EventSink, MemoryDevice, OsDevice,
    ProgressUpdate, TerminalProgress,
};
