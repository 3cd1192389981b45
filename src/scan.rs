/// RAW file enumeration
///
/// Lists candidate source files under a root in a deterministic order
/// (sorted by full path), then narrows them with an optional allow-list of
/// stems and an optional count limit, in that order.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Supported RAW file extensions (common formats), compared case-insensitively
pub const RAW_EXTENSIONS: &[&str] = &[
    "nef", "dng", "cr2", "cr3", "arw", "raf", "orf", "rw2", "pef", "srw", "erf", "kdc", "dcr",
    "mos", "raw", "rwl",
];

/// Check if a path looks like a RAW file by extension
pub fn is_raw_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            RAW_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Base name of a file without its extension
pub fn file_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

/// Every RAW file under `root`, sorted by path.
///
/// A missing root is not an error, it simply has no files.
pub fn enumerate_raw_files(root: &Path, recursive: bool) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(root = %root.display(), "skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_raw_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Apply the allow-list first, then truncate to `limit`.
pub fn select_files(
    files: Vec<PathBuf>,
    include_stems: Option<&BTreeSet<String>>,
    limit: Option<usize>,
) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match include_stems {
        Some(stems) => files
            .into_iter()
            .filter(|path| file_stem(path).is_some_and(|stem| stems.contains(&stem)))
            .collect(),
        None => files,
    };

    if let Some(limit) = limit {
        files.truncate(limit);
    }
    files
}

/// Enumerate and select in one go
pub fn collect_sources(
    root: &Path,
    recursive: bool,
    include_stems: Option<&BTreeSet<String>>,
    limit: Option<usize>,
) -> Vec<PathBuf> {
    select_files(enumerate_raw_files(root, recursive), include_stems, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"raw").unwrap();
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    fn stems(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_is_raw_file() {
        assert!(is_raw_file(Path::new("a.NEF")));
        assert!(is_raw_file(Path::new("dir/b.cr3")));
        assert!(is_raw_file(Path::new("c.raw")));
        assert!(!is_raw_file(Path::new("c.jpg")));
        assert!(!is_raw_file(Path::new("README")));
    }

    #[test]
    fn test_missing_root_is_empty() {
        assert!(enumerate_raw_files(Path::new("/definitely/not/here"), true).is_empty());
    }

    #[test]
    fn test_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("c.raw"));
        touch(&dir.path().join("a.raw"));
        touch(&dir.path().join("b.DNG"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("preview.jpg"));

        let files = enumerate_raw_files(dir.path(), false);
        assert_eq!(names(&files), vec!["a.raw", "b.DNG", "c.raw"]);

        // Same snapshot, same order
        assert_eq!(files, enumerate_raw_files(dir.path(), false));
    }

    #[test]
    fn test_recursion_flag() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("top.nef"));
        touch(&dir.path().join("2024/deep.nef"));
        touch(&dir.path().join("2024/05/deeper.nef"));

        assert_eq!(names(&enumerate_raw_files(dir.path(), false)), vec!["top.nef"]);

        let all = enumerate_raw_files(dir.path(), true);
        assert_eq!(all.len(), 3);
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);
    }

    #[test]
    fn test_directories_with_raw_extension_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("folder.raw")).unwrap();
        touch(&dir.path().join("a.raw"));
        assert_eq!(names(&enumerate_raw_files(dir.path(), true)), vec!["a.raw"]);
    }

    #[test]
    fn test_allow_list() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.raw", "b.raw", "c.raw"] {
            touch(&dir.path().join(name));
        }
        let allow = stems(&["a", "c"]);
        let files = collect_sources(dir.path(), true, Some(&allow), None);
        assert_eq!(names(&files), vec!["a.raw", "c.raw"]);
    }

    #[test]
    fn test_allow_list_applies_before_limit() {
        let files: Vec<PathBuf> = ["a.raw", "b.raw", "c.raw", "d.raw"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let allow = stems(&["b", "d"]);
        let selected = select_files(files, Some(&allow), Some(1));
        assert_eq!(names(&selected), vec!["b.raw"]);
    }

    #[test]
    fn test_limit_takes_sorted_prefix() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["d.raw", "b.raw", "a.raw", "c.raw"] {
            touch(&dir.path().join(name));
        }
        let files = collect_sources(dir.path(), true, None, Some(2));
        assert_eq!(names(&files), vec!["a.raw", "b.raw"]);

        let files = collect_sources(dir.path(), true, None, Some(10));
        assert_eq!(files.len(), 4);
    }
}
