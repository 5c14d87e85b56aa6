//! Load pipeline
//!
//! [`scan`] discovers `.wav` files under a root and parses them on a bounded pool of
//! blocking workers, streaming results back over an mpsc channel as they complete.

use crate::config::LoadConfig;
use crate::error::LoadError;
use crate::record::MetadataRecord;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const CHANNEL_CAPACITY: usize = 64;

/// Cooperative cancellation, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub enum ScanMessage {
    Parsed(Box<MetadataRecord>),
    Failed { path: PathBuf, error: LoadError },
    /// Completed files so far. Starts at `(0, total)` and never decreases.
    Progress { done: usize, total: usize },
}

/// Receiving end of a running scan.
pub struct ScanHandle {
    rx: mpsc::Receiver<ScanMessage>,
    driver: JoinHandle<()>,
}

impl ScanHandle {
    /// Next message, or `None` once every started parse has reported.
    pub async fn next(&mut self) -> Option<ScanMessage> {
        self.rx.recv().await
    }

    /// Drop remaining messages and wait for in-flight parses to finish.
    pub async fn close(mut self) {
        self.rx.close();
        while self.rx.recv().await.is_some() {}
        if let Err(err) = self.driver.await {
            warn!(error = %err, "Scan driver ended abnormally");
        }
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

/// `.wav` files under `root`, sorted by file name per directory. Hidden entries,
/// including save backups and temp files, are skipped. A `.wav` root is a one-file set.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let meta = std::fs::metadata(root).map_err(|source| LoadError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    if meta.is_file() {
        return Ok(if is_wav(root) { vec![root.to_path_buf()] } else { Vec::new() });
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(&e.file_name().to_string_lossy()));
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() && is_wav(entry.path()) => {
                files.push(entry.into_path());
            }
            Ok(_) => {}
            Err(err) => warn!(root = %root.display(), error = %err, "Skipping unreadable entry"),
        }
    }
    Ok(files)
}

/// Start scanning `root`. Must be called inside a tokio runtime.
pub fn scan(root: &Path, config: &LoadConfig, cancel: CancelFlag) -> ScanHandle {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let workers = config.worker_count();
    let root = root.to_path_buf();
    let driver = tokio::spawn(drive(root, workers, cancel, tx));
    ScanHandle { rx, driver }
}

async fn drive(root: PathBuf, workers: usize, cancel: CancelFlag, tx: mpsc::Sender<ScanMessage>) {
    let discovered = {
        let root = root.clone();
        tokio::task::spawn_blocking(move || discover(&root)).await
    };
    let files = match discovered {
        Ok(Ok(files)) => files,
        Ok(Err(error)) => {
            let _ = tx.send(ScanMessage::Failed { path: root, error }).await;
            let _ = tx.send(ScanMessage::Progress { done: 0, total: 0 }).await;
            return;
        }
        Err(err) => {
            let error = LoadError::Worker {
                path: root.clone(),
                reason: err.to_string(),
            };
            let _ = tx.send(ScanMessage::Failed { path: root, error }).await;
            let _ = tx.send(ScanMessage::Progress { done: 0, total: 0 }).await;
            return;
        }
    };

    let total = files.len();
    info!(root = %root.display(), total, workers, "Scanning for WAV files");
    if tx.send(ScanMessage::Progress { done: 0, total }).await.is_err() {
        return;
    }

    let semaphore = Arc::new(Semaphore::new(workers));
    // Held while reporting so progress reaches the channel in increasing order.
    let done = Arc::new(Mutex::new(0usize));
    let mut parses = Vec::with_capacity(total);

    for path in files {
        if cancel.is_cancelled() {
            break;
        }
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        if cancel.is_cancelled() {
            break;
        }

        let tx = tx.clone();
        let done = done.clone();
        parses.push(tokio::spawn(async move {
            let parsed = {
                let path = path.clone();
                tokio::task::spawn_blocking(move || MetadataRecord::load(&path)).await
            };
            let message = match parsed {
                Ok(Ok(record)) => ScanMessage::Parsed(Box::new(record)),
                Ok(Err(error)) => ScanMessage::Failed { path, error },
                Err(err) => ScanMessage::Failed {
                    error: LoadError::Worker {
                        path: path.clone(),
                        reason: err.to_string(),
                    },
                    path,
                },
            };

            let mut done = done.lock().await;
            *done += 1;
            let _ = tx.send(message).await;
            let _ = tx
                .send(ScanMessage::Progress {
                    done: *done,
                    total,
                })
                .await;
            drop(permit);
        }));
    }

    for parse in parses {
        if let Err(err) = parse.await {
            warn!(error = %err, "Parse task ended abnormally");
        }
    }
    if cancel.is_cancelled() {
        debug!(root = %root.display(), "Scan cancelled");
    }
}
