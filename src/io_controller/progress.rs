use std::io::Write;

use serde::Serialize;

use crate::config::IoMode;
use crate::core_logic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub mode: IoMode,
    pub percent: u8,
    pub bytes_done: u64,
    pub total_bytes: u64,
}

impl ProgressUpdate {
    pub(super) fn at(mode: IoMode, bytes_done: u64, total_bytes: u64) -> Self {
        Self {
            mode,
            percent: core_logic::percent_of(bytes_done, total_bytes),
            bytes_done,
            total_bytes,
        }
    }

    /// The closing update of a successful run, pinned to exactly 100%.
    pub(super) fn complete(mode: IoMode, total_bytes: u64) -> Self {
        Self {
            mode,
            percent: 100,
            bytes_done: total_bytes,
            total_bytes,
        }
    }
}

pub trait EventSink {
    fn progress(&mut self, update: ProgressUpdate);
}

impl EventSink for Vec<ProgressUpdate> {
    fn progress(&mut self, update: ProgressUpdate) {
        self.push(update);
    }
}

/// Renders progress in place as `\rNNN%`.
pub struct TerminalProgress<W: Write> {
    out: W,
    last: Option<u8>,
}

impl<W: Write> TerminalProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out, last: None }
    }
}

impl<W: Write> EventSink for TerminalProgress<W> {
    fn progress(&mut self, update: ProgressUpdate) {
        if self.last == Some(update.percent) {
            return;
        }
        self.last = Some(update.percent);
        // Progress is cosmetic; a broken stdout surfaces on the next status line.
        let _ = write!(self.out, "\r{:03}%", update.percent);
        let _ = self.out.flush();
    }
}

pub(super) fn emit_progress(sink: &mut Option<&mut dyn EventSink>, update: ProgressUpdate) {
    if let Some(sink) = sink.as_mut() {
        sink.progress(update);
    }
}

#[cfg(test)]
mod tests {
    use super::{EventSink, ProgressUpdate, TerminalProgress};
    use crate::config::IoMode;

    #[test]
    fn test_terminal_progress_renders_three_digits() {
        let mut out = Vec::new();
        {
            let mut sink = TerminalProgress::new(&mut out);
            sink.progress(ProgressUpdate::at(IoMode::ReadOnly, 0, 200));
            sink.progress(ProgressUpdate::at(IoMode::ReadOnly, 1, 200));
            sink.progress(ProgressUpdate::at(IoMode::ReadOnly, 14, 200));
            sink.progress(ProgressUpdate::complete(IoMode::ReadOnly, 200));
        }
        assert_eq!(String::from_utf8(out).unwrap(), "\r000%\r007%\r100%");
    }

    #[test]
    fn test_update_serializes_with_snake_case_mode() {
        let update = ProgressUpdate::at(IoMode::ReadWrite, 50, 100);
        let json = serde_json::to_value(update).unwrap();
        assert_eq!(json["mode"], "read_write");
        assert_eq!(json["percent"], 50);
        assert_eq!(json["total_bytes"], 100);
    }
}
