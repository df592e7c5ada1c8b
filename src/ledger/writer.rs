//! Single-writer ledger
//!
//! A dedicated thread owns the ledger file and receives serialized records
//! from every worker over a channel, so lines from different workers can
//! never interleave. Each write additionally holds an exclusive `flock` on
//! unix, which keeps independent processes that share the ledger serialized.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::config::LedgerMode;
use crate::error::{ConfigError, ExportError, Result};

use super::MetadataRecord;

/// Cloneable sending side of the ledger
#[derive(Clone)]
pub struct LedgerHandle {
    sender: UnboundedSender<String>,
}

impl LedgerHandle {
    /// Queue one record. Serialization happens on the caller's thread so a
    /// record that cannot be encoded fails the file that produced it.
    pub fn append(&self, record: &MetadataRecord) -> Result<()> {
        let line = record.to_json_line()?;
        self.sender.send(line).map_err(|_| ExportError::LedgerClosed)
    }
}

/// Owner of the ledger writer thread
pub struct LedgerWriter {
    path: PathBuf,
    thread: Option<JoinHandle<Result<u64>>>,
    handle: Option<LedgerHandle>,
}

impl LedgerWriter {
    /// Open the ledger according to `mode` and start the writer thread.
    ///
    /// In `CreateNew` mode the existence check and the creation are one
    /// atomic step; an existing file is a configuration error.
    pub fn open(path: &Path, mode: LedgerMode) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = open_ledger_file(path, mode)?;
        tracing::info!("Writing metadata to {:?} ({:?})", path, mode);

        let (sender, receiver) = unbounded_channel();
        let thread_path = path.to_path_buf();
        let thread = thread::Builder::new()
            .name("ledger-writer".into())
            .spawn(move || writer_thread(file, receiver, &thread_path))
            .map_err(|e| ExportError::Ledger(format!("Failed to spawn writer thread: {}", e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            thread: Some(thread),
            handle: Some(LedgerHandle { sender }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a handle for queueing records
    pub fn handle(&self) -> Result<LedgerHandle> {
        self.handle.clone().ok_or(ExportError::LedgerClosed)
    }

    /// Wait until every queued record is written and close the file.
    ///
    /// All handles must have been dropped, otherwise this blocks until they
    /// are. Returns the number of records written.
    pub fn finish(mut self) -> Result<u64> {
        self.handle.take();

        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| ExportError::Ledger("Writer thread panicked".into()))?,
            None => Ok(0),
        }
    }
}

fn open_ledger_file(path: &Path, mode: LedgerMode) -> Result<File> {
    let mut options = OpenOptions::new();
    match mode {
        LedgerMode::CreateNew => {
            options.append(true).create_new(true);
        }
        LedgerMode::Append => {
            options.append(true).create(true);
        }
        LedgerMode::Overwrite => {
            // O_APPEND cannot be combined with truncation
            File::create(path)?;
            options.append(true);
        }
    }

    options.open(path).map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => ConfigError::LedgerExists(path.to_path_buf()).into(),
        _ => ExportError::Io(e),
    })
}

fn writer_thread(file: File, mut receiver: UnboundedReceiver<String>, path: &Path) -> Result<u64> {
    let mut file = file;
    let mut written = 0u64;

    while let Some(line) = receiver.blocking_recv() {
        file = write_line(file, line.as_bytes())?;
        written += 1;
    }

    tracing::debug!("Ledger {:?} closed after {} records", path, written);
    Ok(written)
}

/// Write and flush one line while holding an exclusive advisory lock.
#[cfg(unix)]
fn write_line(file: File, line: &[u8]) -> Result<File> {
    use nix::fcntl::{Flock, FlockArg};

    let mut locked = Flock::lock(file, FlockArg::LockExclusive)
        .map_err(|(_, errno)| ExportError::Ledger(format!("Failed to lock ledger: {}", errno)))?;
    locked.write_all(line)?;
    locked.flush()?;

    locked
        .unlock()
        .map_err(|(_, errno)| ExportError::Ledger(format!("Failed to unlock ledger: {}", errno)))
}

#[cfg(not(unix))]
fn write_line(mut file: File, line: &[u8]) -> Result<File> {
    file.write_all(line)?;
    file.flush()?;
    Ok(file)
}
