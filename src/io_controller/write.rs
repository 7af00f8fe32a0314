use std::io;
use std::time::Instant;

use tracing::{error, info, trace};

use crate::config::IoMode;
use crate::core_logic::{self, ScanSummary};
use crate::error::{Result, ScanError};

use super::direct_io::AlignedBuffer;
use super::progress::{emit_progress, EventSink, ProgressUpdate};
use super::BlockDevice;

impl<D: BlockDevice> super::DeviceInspector<D> {
    pub fn run_write_restore_phase(&mut self) -> Result<ScanSummary> {
        self.run_write_restore_phase_with_events(None)
    }

    /// Overwrites each chunk with random bytes, confirms the device returns
    /// them, then writes the original content back and confirms that too.
    ///
    /// A failure between the random write and the restore leaves that chunk
    /// holding random data unless the best-effort restore succeeds.
    pub fn run_write_restore_phase_with_events(
        &mut self,
        mut sink: Option<&mut dyn EventSink>,
    ) -> Result<ScanSummary> {
        let mut original = self.allocate()?;
        let mut random = self.allocate()?;
        let mut confirm = self.allocate()?;
        let total = self.total_size;
        let start_time = Instant::now();
        let mut offset: u64 = 0;
        let mut chunks: u64 = 0;

        info!(total_bytes = total, chunk_len = self.chunk_len, "write/restore scan start");

        while offset < total {
            emit_progress(&mut sink, ProgressUpdate::at(IoMode::ReadWrite, offset, total));

            self.seek_to(offset)?;
            let count = self
                .device
                .read(original.as_mut_slice())
                .map_err(ScanError::io("read"))?;
            if count == 0 {
                return Err(ScanError::short_transfer("read", self.chunk_len, 0));
            }

            getrandom::getrandom(&mut random.as_mut_slice()[..count])
                .map_err(|e| ScanError::io("getrandom")(io::Error::from(e)))?;

            self.seek_to(offset)?;
            self.write_expecting(&random.as_slice()[..count])
                .map_err(|e| self.restore_after_failure(offset, &original, count, e))?;

            self.confirm_payload(offset, &random, &mut confirm, count)
                .map_err(|e| self.restore_after_failure(offset, &original, count, e))?;

            self.seek_to(offset)?;
            self.write_expecting(&original.as_slice()[..count])?;

            self.seek_to(offset)?;
            self.read_expecting(&mut confirm.as_mut_slice()[..count])?;
            if let Some(index) =
                core_logic::first_mismatch(&original.as_slice()[..count], &confirm.as_slice()[..count])
            {
                return Err(ScanError::Restoration {
                    offset: offset + index as u64,
                });
            }

            trace!(offset, count, "chunk written and restored");
            offset += count as u64;
            chunks += 1;
        }

        emit_progress(&mut sink, ProgressUpdate::complete(IoMode::ReadWrite, total));
        let summary = ScanSummary {
            mode: IoMode::ReadWrite,
            total_bytes: total,
            bytes_verified: offset,
            chunks,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        };
        info!(chunks, bytes = offset, "write/restore scan complete");
        Ok(summary)
    }

    /// Reads the chunk back and checks the device kept the random payload.
    fn confirm_payload(
        &mut self,
        offset: u64,
        random: &AlignedBuffer,
        confirm: &mut AlignedBuffer,
        count: usize,
    ) -> Result<()> {
        self.seek_to(offset)?;
        self.read_expecting(&mut confirm.as_mut_slice()[..count])?;
        match core_logic::first_mismatch(&random.as_slice()[..count], &confirm.as_slice()[..count]) {
            Some(index) => Err(ScanError::Consistency {
                op: "write-verify",
                offset: offset + index as u64,
            }),
            None => Ok(()),
        }
    }

    /// Single attempt to put `original` back after the protocol broke off
    /// mid-chunk. The triggering error is always the one returned.
    fn restore_after_failure(
        &mut self,
        offset: u64,
        original: &AlignedBuffer,
        count: usize,
        cause: ScanError,
    ) -> ScanError {
        let restored = self
            .seek_to(offset)
            .and_then(|()| self.write_expecting(&original.as_slice()[..count]));
        if let Err(restore_err) = restored {
            error!(
                offset,
                count,
                error = %restore_err,
                "original data could not be restored; chunk may hold random bytes"
            );
        }
        cause
    }
}
