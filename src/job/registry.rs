/// Process-scoped collection of preview jobs
///
/// Lets a freshly rendered, stateless UI page reconnect to a job that is
/// still running instead of starting a duplicate. Append-only: jobs live as
/// long as the registry does. The registry also hands out job ids.
use super::config::PreviewConfig;
use super::Job;
use crate::error::Result;
use crate::raw::loader::Decode;
use parking_lot::RwLock;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<Vec<Arc<Job>>>,
    last_id: AtomicU64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job: Arc<Job>) {
        self.jobs.write().push(job);
    }

    fn next_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Create and register a pending job
    pub fn create_job(
        &self,
        source_dir: impl Into<PathBuf>,
        out_dir: impl Into<PathBuf>,
        config: PreviewConfig,
    ) -> Arc<Job> {
        let job = Job::new(self.next_id(), source_dir, out_dir, config);
        self.register(Arc::clone(&job));
        job
    }

    /// Create and register a pending job with a custom decoder
    pub fn create_job_with_decoder(
        &self,
        source_dir: impl Into<PathBuf>,
        out_dir: impl Into<PathBuf>,
        config: PreviewConfig,
        decoder: Arc<dyn Decode>,
    ) -> Arc<Job> {
        let job = Job::with_decoder(self.next_id(), source_dir, out_dir, config, decoder);
        self.register(Arc::clone(&job));
        job
    }

    /// Create, register and start a job.
    ///
    /// Registration comes first, so the job can be found while its setup
    /// (output directory, enumeration) is still running. A failed setup
    /// leaves it `cancelled`, never active.
    pub fn start_job(
        &self,
        source_dir: impl Into<PathBuf>,
        out_dir: impl Into<PathBuf>,
        config: PreviewConfig,
    ) -> Result<Arc<Job>> {
        let job = self.create_job(source_dir, out_dir, config);
        job.start()?;
        Ok(job)
    }

    /// Most recently started job that is neither terminal nor cancelled,
    /// optionally matching the given directories after path resolution.
    /// Started jobs win over ones still waiting for `start()`.
    pub fn find_active(&self, source_dir: Option<&Path>, out_dir: Option<&Path>) -> Option<Arc<Job>> {
        let source_dir = source_dir.map(resolve_path);
        let out_dir = out_dir.map(resolve_path);

        self.jobs
            .read()
            .iter()
            .filter(|job| job.is_active())
            .filter(|job| out_dir.as_ref().map_or(true, |dir| resolve_path(job.out_dir()) == *dir))
            .filter(|job| {
                source_dir
                    .as_ref()
                    .map_or(true, |dir| resolve_path(job.source_dir()) == *dir)
            })
            .max_by_key(|job| (job.started_at(), job.created_at(), job.id()))
            .cloned()
    }

    pub fn jobs(&self) -> Vec<Arc<Job>> {
        self.jobs.read().clone()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Cancel every job and join every monitor
    pub fn shutdown(&self) {
        let jobs = self.jobs();
        for job in &jobs {
            job.cancel();
        }
        for job in &jobs {
            job.wait();
        }
    }
}

/// Absolute, normalised form of a path.
///
/// Existing paths are canonicalised (symlinks resolved). Paths that do not
/// exist yet are made absolute and cleaned lexically.
pub fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}
