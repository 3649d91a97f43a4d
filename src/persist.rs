//! Snapshot persistence for the backing file.
//!
//! Every mutation of the table store produces a full JSON snapshot of the
//! database. The [`Persister`] writes snapshots either inline or from a
//! dedicated writer thread, and tracks which generations reached disk so
//! callers can wait for completion and observe failures.

use crate::error::{Result, StoreError};
use crate::subscriptions::{StoreEvent, SubscriptionManager};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long `flush` sleeps between checks that the writer thread is alive.
const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// When snapshots are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PersistMode {
    /// Write before the mutating call returns.
    Immediate,
    /// Queue to a writer thread; the newest queued snapshot wins.
    #[default]
    Background,
}

/// Progress of the write path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersistStatus {
    /// Highest generation handed to the persister.
    pub requested: u64,
    /// Highest generation whose write finished (successfully or not).
    pub completed: u64,
    /// Number of failed writes since open.
    pub failures: u64,
    /// Error of the most recent write, if it failed.
    pub last_error: Option<String>,
}

impl PersistStatus {
    /// Whether every requested snapshot has been written.
    pub fn is_idle(&self) -> bool {
        self.completed >= self.requested
    }
}

/// A serialized database waiting to be written.
struct Snapshot {
    generation: u64,
    bytes: Vec<u8>,
}

/// Status shared with the writer thread.
struct Progress {
    status: Mutex<PersistStatus>,
    done: Condvar,
}

impl Progress {
    fn record(
        &self,
        path: &Path,
        generation: u64,
        outcome: std::io::Result<()>,
        events: &SubscriptionManager,
    ) {
        let event = {
            let mut status = self.status.lock();
            status.completed = status.completed.max(generation);

            match outcome {
                Ok(()) => {
                    status.last_error = None;
                    tracing::trace!(generation, path = %path.display(), "snapshot written");
                    StoreEvent::Persisted { generation }
                }
                Err(e) => {
                    status.failures += 1;
                    status.last_error = Some(e.to_string());
                    tracing::error!(
                        generation,
                        path = %path.display(),
                        error = %e,
                        "failed to persist snapshot"
                    );
                    StoreEvent::PersistFailed {
                        generation,
                        error: e.to_string(),
                    }
                }
            }
        };

        self.done.notify_all();
        events.publish(event);
    }
}

/// Writes database snapshots to the backing file.
pub struct Persister {
    path: PathBuf,
    progress: Arc<Progress>,
    events: Arc<SubscriptionManager>,
    sender: Option<Sender<Snapshot>>,
    worker: Option<JoinHandle<()>>,
}

impl Persister {
    /// Create a persister for `path`, starting the writer thread in
    /// [`PersistMode::Background`].
    pub fn new(
        path: impl AsRef<Path>,
        mode: PersistMode,
        events: Arc<SubscriptionManager>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let progress = Arc::new(Progress {
            status: Mutex::new(PersistStatus::default()),
            done: Condvar::new(),
        });

        let (sender, worker) = match mode {
            PersistMode::Immediate => (None, None),
            PersistMode::Background => {
                let (sender, receiver) = unbounded();
                let worker = {
                    let path = path.clone();
                    let progress = Arc::clone(&progress);
                    let events = Arc::clone(&events);
                    std::thread::Builder::new()
                        .name("taskdb-persist".to_string())
                        .spawn(move || run_writer(receiver, path, progress, events))?
                };
                (Some(sender), Some(worker))
            }
        };

        Ok(Self {
            path,
            progress,
            events,
            sender,
            worker,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand a snapshot over for writing and return its generation.
    ///
    /// Failures are not returned here; they are logged, recorded in
    /// [`PersistStatus`], published as [`StoreEvent::PersistFailed`] and
    /// reported by [`Persister::flush`].
    pub fn submit(&self, bytes: Vec<u8>) -> u64 {
        let generation = self.next_generation();

        if let Some(sender) = &self.sender {
            match sender.send(Snapshot { generation, bytes }) {
                Ok(()) => return generation,
                Err(crossbeam_channel::SendError(snapshot)) => {
                    tracing::warn!(generation, "writer thread gone, writing inline");
                    self.write_inline(snapshot);
                    return generation;
                }
            }
        }

        self.write_inline(Snapshot { generation, bytes });
        generation
    }

    /// Write a snapshot inline and return the write error, if any.
    pub fn write_sync(&self, bytes: Vec<u8>) -> Result<u64> {
        let generation = self.next_generation();
        let outcome = write_atomic(&self.path, &bytes);
        let failure = outcome.as_ref().err().map(ToString::to_string);

        self.progress
            .record(&self.path, generation, outcome, &self.events);

        match failure {
            None => Ok(generation),
            Some(message) => Err(StoreError::Persist {
                generation,
                message,
            }),
        }
    }

    /// Block until every snapshot submitted so far has been written.
    ///
    /// Returns an error when the most recent write failed.
    pub fn flush(&self) -> Result<()> {
        let mut status = self.progress.status.lock();
        let target = status.requested;

        while status.completed < target {
            if self.worker.as_ref().map_or(true, JoinHandle::is_finished) {
                break;
            }
            self.progress
                .done
                .wait_for(&mut status, FLUSH_POLL_INTERVAL);
        }

        match &status.last_error {
            Some(message) => Err(StoreError::Persist {
                generation: status.completed,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn status(&self) -> PersistStatus {
        self.progress.status.lock().clone()
    }

    fn next_generation(&self) -> u64 {
        let mut status = self.progress.status.lock();
        status.requested += 1;
        status.requested
    }

    fn write_inline(&self, snapshot: Snapshot) {
        let outcome = write_atomic(&self.path, &snapshot.bytes);
        self.progress
            .record(&self.path, snapshot.generation, outcome, &self.events);
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain and exit
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(path = %self.path.display(), "persist writer thread panicked");
            }
        }
    }
}

fn run_writer(
    receiver: Receiver<Snapshot>,
    path: PathBuf,
    progress: Arc<Progress>,
    events: Arc<SubscriptionManager>,
) {
    while let Ok(mut snapshot) = receiver.recv() {
        // Only the newest queued snapshot matters
        while let Ok(newer) = receiver.try_recv() {
            snapshot = newer;
        }

        let outcome = write_atomic(&path, &snapshot.bytes);
        progress.record(&path, snapshot.generation, outcome, &events);
    }
}

/// Write `bytes` to a sibling temp file, sync it, then rename it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp_path = sibling_path(path, ".tmp");

    let mut file = File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)
}

/// `path` with `suffix` appended to its file name.
pub(crate) fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
