//! RAW preview generation
//!
//! Converts a directory of camera RAW files into a directory of normalised
//! previews as a cancellable, progress-reporting background job that a
//! stateless UI can rediscover through a `JobRegistry`.

pub mod color;
pub mod error;
pub mod job;
pub mod raw;
pub mod scan;
pub mod state;

pub use error::{PreviewError, Result};
pub use job::config::{OutputFormat, PreviewConfig, PreviewOptions, SizeMode};
pub use job::log::{FileOutcome, Outcome};
pub use job::registry::JobRegistry;
pub use job::{Job, JobSnapshot, JobStatus};
pub use raw::loader::{Decode, Demosaic, DevelopSettings, RawDecoder};
