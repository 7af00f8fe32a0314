use std::time::Instant;

use tracing::{info, trace};

use crate::config::IoMode;
use crate::core_logic::{self, ScanSummary};
use crate::error::{Result, ScanError};

use super::progress::{emit_progress, EventSink, ProgressUpdate};
use super::BlockDevice;

impl<D: BlockDevice> super::DeviceInspector<D> {
    pub fn run_read_only_phase(&mut self) -> Result<ScanSummary> {
        self.run_read_only_phase_with_events(None)
    }

    /// Reads every chunk twice in a row and requires both reads to agree.
    pub fn run_read_only_phase_with_events(
        &mut self,
        mut sink: Option<&mut dyn EventSink>,
    ) -> Result<ScanSummary> {
        let mut first = self.allocate()?;
        let mut second = self.allocate()?;
        let total = self.total_size;
        let start_time = Instant::now();
        let mut offset: u64 = 0;
        let mut chunks: u64 = 0;

        info!(total_bytes = total, chunk_len = self.chunk_len, "read-only scan start");
        self.seek_to(0)?;

        while offset < total {
            emit_progress(&mut sink, ProgressUpdate::at(IoMode::ReadOnly, offset, total));

            let count = self
                .device
                .read(first.as_mut_slice())
                .map_err(ScanError::io("read"))?;
            if count == 0 {
                return Err(ScanError::short_transfer("read", self.chunk_len, 0));
            }

            self.seek_to(offset)?;
            self.read_expecting(&mut second.as_mut_slice()[..count])?;

            if let Some(index) =
                core_logic::first_mismatch(&first.as_slice()[..count], &second.as_slice()[..count])
            {
                return Err(ScanError::Consistency {
                    op: "consistency",
                    offset: offset + index as u64,
                });
            }

            trace!(offset, count, "chunk stable");
            offset += count as u64;
            chunks += 1;
        }

        emit_progress(&mut sink, ProgressUpdate::complete(IoMode::ReadOnly, total));
        let summary = ScanSummary {
            mode: IoMode::ReadOnly,
            total_bytes: total,
            bytes_verified: offset,
            chunks,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        };
        info!(chunks, bytes = offset, "read-only scan complete");
        Ok(summary)
    }
}
