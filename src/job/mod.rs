/// Preview-generation jobs
///
/// A `Job` converts every eligible RAW file under a source directory into a
/// preview under an output directory. It is started once, runs on a bounded
/// worker pool plus one monitor thread, and can be polled or cancelled from
/// any thread at any time.
///
/// State machine: `pending -> running -> done | cancelled`, or straight from
/// `pending` to `done` when nothing is eligible. Counters, status, finish
/// time and the outcome log live behind a single lock, so a snapshot never
/// shows a torn view.
pub mod config;
pub mod log;
mod pool;
pub mod registry;

use crate::error::{PreviewError, Result};
use crate::raw::loader::{Decode, RawDecoder};
use crate::raw::{preview, processor};
use crate::scan;
use chrono::{DateTime, Utc};
use config::PreviewConfig;
use log::{FileOutcome, Outcome, OutcomeLog, LOG_CAPACITY};
use parking_lot::{Condvar, Mutex};
use pool::WorkerPool;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the monitor checks for completion or cancellation
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a job, safe to take at any frequency
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub id: u64,
    pub source_dir: PathBuf,
    pub out_dir: PathBuf,
    pub status: JobStatus,
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub progress: f64,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    pub fn processed(&self) -> usize {
        self.completed + self.skipped + self.failed
    }
}

/// Everything mutated by workers and the monitor
#[derive(Debug)]
struct Progress {
    status: JobStatus,
    total: usize,
    completed: usize,
    skipped: usize,
    failed: usize,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    log: OutcomeLog,
}

impl Progress {
    fn processed(&self) -> usize {
        self.completed + self.skipped + self.failed
    }

    fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.processed() as f64 / self.total as f64).min(1.0)
    }
}

pub struct Job {
    id: u64,
    source_dir: PathBuf,
    out_dir: PathBuf,
    config: PreviewConfig,
    decoder: Arc<dyn Decode>,
    created_at: DateTime<Utc>,
    started: AtomicBool,
    cancel_requested: AtomicBool,
    state: Mutex<Progress>,
    finished: Condvar,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("source_dir", &self.source_dir)
            .field("out_dir", &self.out_dir)
            .field("status", &self.status())
            .finish()
    }
}

impl Job {
    /// Create a pending job that develops RAW files with rawloader.
    ///
    /// Ids are handed out by `JobRegistry`; jobs built by hand pick their own.
    pub fn new(
        id: u64,
        source_dir: impl Into<PathBuf>,
        out_dir: impl Into<PathBuf>,
        config: PreviewConfig,
    ) -> Arc<Self> {
        let decoder = Arc::new(RawDecoder::new(config.develop()));
        Self::with_decoder(id, source_dir, out_dir, config, decoder)
    }

    /// Create a pending job with a custom decoder
    pub fn with_decoder(
        id: u64,
        source_dir: impl Into<PathBuf>,
        out_dir: impl Into<PathBuf>,
        config: PreviewConfig,
        decoder: Arc<dyn Decode>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            source_dir: source_dir.into(),
            out_dir: out_dir.into(),
            config,
            decoder,
            created_at: Utc::now(),
            started: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            state: Mutex::new(Progress {
                status: JobStatus::Pending,
                total: 0,
                completed: 0,
                skipped: 0,
                failed: 0,
                started_at: None,
                finished_at: None,
                log: OutcomeLog::new(LOG_CAPACITY),
            }),
            finished: Condvar::new(),
            monitor: Mutex::new(None),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When `start()` was accepted; `None` until then
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().started_at
    }

    /// Set up and dispatch the job without waiting for any conversion.
    ///
    /// Creates the output directory, enumerates sources, submits one unit per
    /// file and spawns the monitor. Setup failures are returned here and leave
    /// the job `cancelled`; per-file failures only ever show up in the
    /// counters and the log.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PreviewError::AlreadyStarted);
        }
        self.state.lock().started_at = Some(Utc::now());

        let dispatched = self.dispatch();
        if let Err(err) = &dispatched {
            self.cancel_requested.store(true, Ordering::SeqCst);
            let mut state = self.state.lock();
            if !state.status.is_terminal() {
                tracing::warn!(job = self.id, "preview job setup failed: {}", err);
            }
            // Also wakes anyone already waiting on the job
            self.finish_locked(&mut state, JobStatus::Cancelled);
        }
        dispatched
    }

    fn dispatch(self: &Arc<Self>) -> Result<()> {
        std::fs::create_dir_all(&self.out_dir).map_err(|source| PreviewError::CreateOutputDir {
            path: self.out_dir.clone(),
            source,
        })?;

        let files = scan::collect_sources(
            &self.source_dir,
            self.config.recursive(),
            self.config.include_stems(),
            self.config.limit(),
        );

        tracing::info!(
            job = self.id,
            source = %self.source_dir.display(),
            out = %self.out_dir.display(),
            files = files.len(),
            workers = self.config.workers(),
            size_mode = %self.config.size_mode(),
            format = %self.config.format(),
            "starting preview job"
        );

        if files.is_empty() {
            let mut state = self.state.lock();
            self.finish_locked(&mut state, JobStatus::Done);
            return Ok(());
        }

        let pool = WorkerPool::new(self.config.workers())?;

        {
            let mut state = self.state.lock();
            state.total = files.len();
            state.status = JobStatus::Running;
        }

        for path in files {
            let job = Arc::clone(self);
            pool.submit(move || job.process_file(&path));
        }

        let job = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("preview-monitor-{}", self.id))
            .spawn(move || job.monitor(pool));

        match spawned {
            Ok(handle) => {
                *self.monitor.lock() = Some(handle);
                Ok(())
            }
            Err(err) => {
                // The pool moved into the failed closure and was dropped with it;
                // queued units must see the flag before they run
                self.cancel();
                Err(PreviewError::Spawn(err))
            }
        }
    }

    /// Request cancellation. Idempotent; in-flight conversions finish normally.
    pub fn cancel(&self) {
        if !self.cancel_requested.swap(true, Ordering::SeqCst) {
            tracing::info!(job = self.id, "cancellation requested");
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Fraction of files settled, in 0.0..=1.0 (0.0 while the total is zero)
    pub fn progress(&self) -> f64 {
        self.state.lock().fraction()
    }

    pub fn status(&self) -> JobStatus {
        self.state.lock().status
    }

    /// Not terminal and not cancelled
    pub fn is_active(&self) -> bool {
        !self.status().is_terminal() && !self.is_cancel_requested()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.state.lock();
        JobSnapshot {
            id: self.id,
            source_dir: self.source_dir.clone(),
            out_dir: self.out_dir.clone(),
            status: state.status,
            total: state.total,
            completed: state.completed,
            skipped: state.skipped,
            failed: state.failed,
            progress: state.fraction(),
            cancel_requested: self.is_cancel_requested(),
            created_at: self.created_at,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }

    /// The `n` most recent per-file outcomes, oldest first
    pub fn recent_outcomes(&self, n: usize) -> Vec<FileOutcome> {
        self.state.lock().log.recent(n)
    }

    /// Block until the job is terminal and its monitor has exited.
    ///
    /// Returns immediately for a job that was never started.
    pub fn wait(&self) -> JobSnapshot {
        {
            let mut state = self.state.lock();
            while self.started.load(Ordering::SeqCst) && !state.status.is_terminal() {
                self.finished.wait(&mut state);
            }
        }

        let handle = self.monitor.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!(job = self.id, "preview monitor panicked");
            }
        }
        self.snapshot()
    }

    /// Async flavour of `wait` for callers living on a tokio runtime
    pub async fn finished(self: Arc<Self>) -> JobSnapshot {
        let job = Arc::clone(&self);
        match tokio::task::spawn_blocking(move || job.wait()).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::error!(job = self.id, "wait task failed: {}", err);
                self.snapshot()
            }
        }
    }

    /// Preview path for a source file: output dir + source stem + format extension
    pub fn destination_for(&self, source: &Path) -> PathBuf {
        let stem = source.file_stem().unwrap_or_default();
        let mut name = stem.to_os_string();
        name.push(".");
        name.push(self.config.format().extension());
        self.out_dir.join(name)
    }

    /// One unit of work: convert a single RAW file
    fn process_file(&self, source: &Path) {
        if self.is_cancel_requested() {
            return;
        }

        let destination = self.destination_for(source);
        if !self.config.overwrite() && destination.exists() {
            self.record(source, destination, Outcome::Skipped, None);
            return;
        }

        let converted = panic::catch_unwind(AssertUnwindSafe(|| self.convert(source, &destination)));
        match converted {
            Ok(Ok(())) => self.record(source, destination, Outcome::Completed, None),
            Ok(Err(err)) => self.record(source, destination, Outcome::Failed, Some(err.to_string())),
            Err(payload) => {
                let message = format!("conversion panicked: {}", panic_message(payload.as_ref()));
                self.record(source, destination, Outcome::Failed, Some(message));
            }
        }
    }

    fn convert(&self, source: &Path, destination: &Path) -> Result<()> {
        let developed = self.decoder.decode(source)?;
        let sized = processor::apply_size_mode(developed, self.config.size_mode());
        preview::save_preview(&sized, destination, self.config.format(), self.config.quality())
    }

    fn record(&self, source: &Path, destination: PathBuf, outcome: Outcome, error: Option<String>) {
        match (&outcome, &error) {
            (Outcome::Failed, Some(message)) => {
                tracing::warn!(job = self.id, source = %source.display(), "preview failed: {}", message);
            }
            _ => {
                tracing::debug!(
                    job = self.id,
                    source = %source.display(),
                    outcome = outcome.as_str(),
                    "preview settled"
                );
            }
        }

        let mut state = self.state.lock();
        if state.status.is_terminal() {
            return;
        }
        match outcome {
            Outcome::Completed => state.completed += 1,
            Outcome::Skipped => state.skipped += 1,
            Outcome::Failed => state.failed += 1,
        }
        state.log.push(FileOutcome {
            source: source.to_path_buf(),
            destination,
            outcome,
            error,
            at: Utc::now(),
        });

        // The last outcome finalises the job in the same critical section as the count
        if state.processed() >= state.total {
            let status = if self.is_cancel_requested() {
                JobStatus::Cancelled
            } else {
                JobStatus::Done
            };
            self.finish_locked(&mut state, status);
        }
    }

    /// Background loop: wait for everything to settle or for cancellation,
    /// drain the pool, then make sure the job is terminal.
    fn monitor(self: Arc<Self>, pool: WorkerPool) {
        while !pool.wait_idle(POLL_INTERVAL) {
            if self.is_cancel_requested() {
                break;
            }
        }

        // Queued units observe the flag and settle without running
        pool.shutdown();

        let mut state = self.state.lock();
        let status = if self.is_cancel_requested() {
            JobStatus::Cancelled
        } else {
            JobStatus::Done
        };
        self.finish_locked(&mut state, status);
    }

    fn finish_locked(&self, state: &mut Progress, status: JobStatus) {
        if state.status.is_terminal() {
            return;
        }
        state.status = status;
        state.finished_at = Some(Utc::now());
        self.finished.notify_all();

        tracing::info!(
            job = self.id,
            status = %status,
            total = state.total,
            completed = state.completed,
            skipped = state.skipped,
            failed = state.failed,
            "preview job finished"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
