//! Worker pool
//!
//! Files are converted on tokio's blocking pool, at most `num_workers` at a
//! time. Every task is awaited and its outcome collected, so a file that
//! fails (or panics) is reported instead of silently dropped.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};

use crate::transform::{FileOutcome, MediaTransformer};

/// Per-outcome counts of a run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub written: usize,
    pub skipped: usize,
    pub unreadable: usize,
    pub failed: usize,
    /// Failed files and the reason they failed
    pub failures: Vec<(PathBuf, String)>,
}

impl RunSummary {
    pub fn record(&mut self, path: PathBuf, outcome: FileOutcome) {
        tracing::debug!("{:?}: {}", path, outcome);
        match outcome {
            FileOutcome::Written { .. } => self.written += 1,
            FileOutcome::Skipped { .. } => self.skipped += 1,
            FileOutcome::Unreadable { .. } => self.unreadable += 1,
            FileOutcome::Failed { reason } => {
                self.failed += 1;
                self.failures.push((path, reason));
            }
        }
    }

    pub fn total(&self) -> usize {
        self.written + self.skipped + self.unreadable + self.failed
    }

    /// Records appended to the ledger during the run
    pub fn recorded(&self) -> usize {
        self.written + self.skipped
    }

    pub fn log(&self) {
        tracing::info!(
            "Processed {} files: {} written, {} skipped (existing media), {} not readable, {} failed",
            self.total(),
            self.written,
            self.skipped,
            self.unreadable,
            self.failed
        );
        for (path, reason) in &self.failures {
            tracing::error!("  {:?}: {}", path, reason);
        }
    }
}

/// Convert every file. `num_workers == 0` processes them one after another
/// on a single blocking thread.
pub async fn run(
    files: Vec<PathBuf>,
    transformer: Arc<MediaTransformer>,
    num_workers: usize,
) -> RunSummary {
    tracing::info!(
        "Converting {} files with {} workers",
        files.len(),
        num_workers
    );

    if num_workers == 0 {
        run_sequential(files, transformer).await
    } else {
        run_pool(files, transformer, num_workers).await
    }
}

async fn run_sequential(files: Vec<PathBuf>, transformer: Arc<MediaTransformer>) -> RunSummary {
    let task = tokio::task::spawn_blocking(move || {
        let mut summary = RunSummary::default();
        for path in files {
            let outcome = process_guarded(&transformer, &path);
            summary.record(path, outcome);
        }
        summary
    });

    match task.await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Sequential worker did not complete: {}", e);
            RunSummary::default()
        }
    }
}

async fn run_pool(
    files: Vec<PathBuf>,
    transformer: Arc<MediaTransformer>,
    num_workers: usize,
) -> RunSummary {
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let mut tasks = JoinSet::new();
    let mut paths = HashMap::new();

    for path in files {
        // The semaphore is never closed
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let transformer = Arc::clone(&transformer);
        let task_path = path.clone();
        let handle = tasks.spawn_blocking(move || {
            let _permit = permit;
            process_guarded(&transformer, &task_path)
        });
        paths.insert(handle.id(), path);
    }
    drop(transformer);

    collect(tasks, paths).await
}

/// Await every task, attributing each outcome (or join failure) to the file
/// the task was spawned for.
async fn collect(
    mut tasks: JoinSet<FileOutcome>,
    mut paths: HashMap<Id, PathBuf>,
) -> RunSummary {
    let mut summary = RunSummary::default();
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((id, outcome)) => {
                summary.record(paths.remove(&id).unwrap_or_default(), outcome);
            }
            Err(e) => {
                let path = paths.remove(&e.id()).unwrap_or_default();
                tracing::error!("Worker for {:?} did not complete: {}", path, e);
                summary.record(
                    path,
                    FileOutcome::Failed {
                        reason: format!("worker did not complete: {}", e),
                    },
                );
            }
        }
    }
    summary
}

/// Run the pipeline for one file, turning a panic into a failed outcome.
fn process_guarded(transformer: &MediaTransformer, path: &Path) -> FileOutcome {
    catch_unwind(AssertUnwindSafe(|| transformer.process(path))).unwrap_or_else(|payload| {
        let reason = format!("worker panicked: {}", panic_message(payload.as_ref()));
        tracing::error!("Failed to convert {:?}: {}", path, reason);
        FileOutcome::Failed { reason }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
