//! Slots-file capture.

use forkline_core::ReplayCollector;
use forkline_types::{Hash, Slot};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// Writes every finalized slot to a file, one per line, as
/// `<slot> <bank hash>`.
pub struct SlotsFileCollector {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SlotsFileCollector {
    /// Create (or truncate) the slots file.
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Path of the slots file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReplayCollector for SlotsFileCollector {
    fn on_block_prepare(&mut self, slot: Slot, parent: Slot) {
        trace!(slot = slot.0, parent = parent.0, "Block prepared");
    }

    fn on_block_finalize(&mut self, slot: Slot, bank_hash: Hash) {
        if let Err(e) = writeln!(self.writer, "{} {}", slot.0, bank_hash) {
            warn!(slot = slot.0, path = %self.path.display(), error = %e, "Failed to record slot");
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl Drop for SlotsFileCollector {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
