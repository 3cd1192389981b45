/// State management module
///
/// This module handles everything that outlives a single job:
/// - Read-only catalog queries (catalog.rs)
/// - Allow-list files of image names (stems.rs)
/// - Persisted form settings (settings.rs)

pub mod catalog;
pub mod settings;
pub mod stems;
