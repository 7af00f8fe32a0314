use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{FailPolicy, IoMode, RunPlan, Target};
use crate::core_logic::ScanSummary;
use crate::error::{ErrorKind, Result, ScanError};
use crate::io_controller::{BlockDevice, DeviceInspector, OsDevice, TerminalProgress};

pub const EXIT_OK: i32 = 0;
pub const EXIT_USAGE: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

const USAGE: &[&str] = &[
    "[HELP]",
    "usage: blockverity [-ro | -rw] [--fail | --no-fail] <target>...",
    "All targets after the -rw option are tested read-write (overwrite, confirm, restore)",
    "All targets after the -ro option are tested read-only (default)",
    "Targets that fail to open after the --fail option abort the whole run",
    "Targets that fail to open after the --no-fail option are skipped (default)",
    "--fail and --no-fail do not affect the exit status when a device failure is detected",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Verified(ScanSummary),
    Skipped,
}

#[derive(Debug, Default)]
pub struct RunOutcome {
    pub verified: Vec<(PathBuf, ScanSummary)>,
    pub skipped: Vec<PathBuf>,
}

pub fn run_cli(args: &[String]) -> i32 {
    let stdout = io::stdout();
    let stderr = io::stderr();
    run_with_streams(args, &mut stdout.lock(), &mut stderr.lock())
}

pub fn run_with_streams(args: &[String], out: &mut dyn Write, err: &mut dyn Write) -> i32 {
    run_with_opener(args, out, err, OsDevice::open)
}

/// Drives a full run with a caller-supplied way of opening targets.
///
/// `args` includes the program name, as `std::env::args` yields it.
pub fn run_with_opener<D, F>(
    args: &[String],
    out: &mut dyn Write,
    err: &mut dyn Write,
    open: F,
) -> i32
where
    D: BlockDevice,
    F: FnMut(&Path, IoMode) -> Result<D>,
{
    let plan = RunPlan::from_args(args.iter().skip(1));
    match run_plan(&plan, out, err, open) {
        Ok(outcome) => {
            info!(
                verified = outcome.verified.len(),
                skipped = outcome.skipped.len(),
                "run complete"
            );
            EXIT_OK
        }
        Err(e) => abort_status(err, &e),
    }
}

pub fn run_plan<D, F>(
    plan: &RunPlan,
    out: &mut dyn Write,
    err: &mut dyn Write,
    mut open: F,
) -> Result<RunOutcome>
where
    D: BlockDevice,
    F: FnMut(&Path, IoMode) -> Result<D>,
{
    if plan.is_empty() {
        return Err(ScanError::Usage);
    }

    let mut outcome = RunOutcome::default();
    for target in &plan.targets {
        match run_target(target, out, err, &mut open)? {
            TargetOutcome::Verified(summary) => {
                outcome.verified.push((target.path.clone(), summary))
            }
            TargetOutcome::Skipped => outcome.skipped.push(target.path.clone()),
        }
    }
    Ok(outcome)
}

fn run_target<D, F>(
    target: &Target,
    out: &mut dyn Write,
    err: &mut dyn Write,
    open: &mut F,
) -> Result<TargetOutcome>
where
    D: BlockDevice,
    F: FnMut(&Path, IoMode) -> Result<D>,
{
    write!(out, "{}: ", target.path.display()).map_err(ScanError::io("stdout"))?;

    let mut device = match open(&target.path, target.config.mode) {
        Ok(device) => device,
        Err(e) if e.kind().is_setup() && target.config.fail_policy == FailPolicy::Skip => {
            writeln!(out).map_err(ScanError::io("stdout"))?;
            // A broken stderr must not turn a skip into a fatal error.
            let _ = writeln!(err, "[ERROR] {e}");
            info!(path = %target.path.display(), error = %e, "target skipped");
            return Ok(TargetOutcome::Skipped);
        }
        Err(e) => {
            writeln!(out).map_err(ScanError::io("stdout"))?;
            return Err(e);
        }
    };

    let total = match device.discover_size() {
        Ok(total) => total,
        Err(e) => {
            writeln!(out).map_err(ScanError::io("stdout"))?;
            return Err(e);
        }
    };
    writeln!(out, "{total:>32}").map_err(ScanError::io("stdout"))?;
    info!(
        path = %target.path.display(),
        mode = ?target.config.mode,
        total_bytes = total,
        "target start"
    );

    let mut inspector = DeviceInspector::new(device, total)?;
    let result = {
        let mut progress = TerminalProgress::new(&mut *out);
        match target.config.mode {
            IoMode::ReadOnly => inspector.run_read_only_phase_with_events(Some(&mut progress)),
            IoMode::ReadWrite => inspector.run_write_restore_phase_with_events(Some(&mut progress)),
        }
    };

    match result {
        Ok(summary) => {
            writeln!(out, " OK").map_err(ScanError::io("stdout"))?;
            info!(
                path = %target.path.display(),
                bytes = summary.bytes_verified,
                chunks = summary.chunks,
                elapsed_ms = summary.elapsed_ms,
                "target verified"
            );
            Ok(TargetOutcome::Verified(summary))
        }
        Err(e) => {
            writeln!(out).map_err(ScanError::io("stdout"))?;
            Err(e)
        }
    }
}

/// The one place a failure becomes a process exit status.
pub fn abort_status(err: &mut dyn Write, error: &ScanError) -> i32 {
    // Nothing useful remains to be done if stderr itself is broken.
    if error.kind() == ErrorKind::Usage {
        let _ = print_usage(err);
        return EXIT_USAGE;
    }
    let _ = writeln!(err, "[FATAL] {error}");
    let _ = err.flush();
    EXIT_FATAL
}

fn print_usage(err: &mut dyn Write) -> io::Result<()> {
    for line in USAGE {
        writeln!(err, "{line}")?;
    }
    err.flush()
}
