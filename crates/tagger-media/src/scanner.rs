//! Input discovery: expands files and directories into supported media paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpeg", "jpg", "png"];
const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mkv", "mov"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Supported file extensions, lowercase, without the leading dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaKinds {
    images: Vec<String>,
    videos: Vec<String>,
}

impl Default for MediaKinds {
    fn default() -> Self {
        Self::new(IMAGE_EXTENSIONS, VIDEO_EXTENSIONS)
    }
}

impl MediaKinds {
    pub fn new<I, V>(images: I, videos: V) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        V: IntoIterator,
        V::Item: AsRef<str>,
    {
        let normalize = |ext: &str| ext.trim_start_matches('.').to_ascii_lowercase();
        Self {
            images: images.into_iter().map(|e| normalize(e.as_ref())).collect(),
            videos: videos.into_iter().map(|e| normalize(e.as_ref())).collect(),
        }
    }

    /// The same image extensions with videos removed. References must be stills.
    pub fn images_only(&self) -> Self {
        Self {
            images: self.images.clone(),
            videos: Vec::new(),
        }
    }

    /// Classify a path by its extension, case-insensitively.
    pub fn classify(&self, path: &Path) -> Option<MediaKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if self.images.contains(&ext) {
            Some(MediaKind::Image)
        } else if self.videos.contains(&ext) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// Expands input paths into a flat, ordered list of supported files.
///
/// Directories are walked recursively in file-name order without following
/// symlinked directories. Unreadable entries and unsupported files are logged
/// and skipped. Each file appears at most once.
#[derive(Debug, Clone)]
pub struct FileScanner {
    kinds: MediaKinds,
    excluded_dirs: Vec<PathBuf>,
}

impl FileScanner {
    pub fn new(kinds: MediaKinds) -> Self {
        Self {
            kinds,
            excluded_dirs: Vec::new(),
        }
    }

    /// Never yield files below `dir`.
    pub fn exclude_dir(mut self, dir: &Path) -> Self {
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        self.excluded_dirs.push(dir);
        self
    }

    pub fn kinds(&self) -> &MediaKinds {
        &self.kinds
    }

    pub fn scan(&self, inputs: &[PathBuf]) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for input in inputs {
            if input.is_dir() {
                tracing::info!(dir = %input.display(), "adding supported files below directory");
                self.walk_dir(input, &mut seen, &mut files);
            } else if input.is_file() {
                self.push_file(input, &mut seen, &mut files);
            } else {
                tracing::warn!(path = %input.display(), "cannot read input path, skipping");
            }
        }

        files
    }

    fn walk_dir(&self, dir: &Path, seen: &mut HashSet<PathBuf>, files: &mut Vec<PathBuf>) {
        let walker = WalkDir::new(dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !(entry.file_type().is_dir() && self.is_excluded(entry.path())));

        for entry in walker {
            match entry {
                Ok(entry) if entry.path().is_file() => self.push_file(entry.path(), seen, files),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "cannot read directory entry, skipping"),
            }
        }
    }

    fn push_file(&self, path: &Path, seen: &mut HashSet<PathBuf>, files: &mut Vec<PathBuf>) {
        if self.kinds.classify(path).is_none() {
            tracing::debug!(path = %path.display(), "unsupported extension, skipping");
            return;
        }
        if self.is_excluded(path) {
            tracing::debug!(path = %path.display(), "inside an excluded directory, skipping");
            return;
        }
        if seen.insert(path.to_path_buf()) {
            files.push(path.to_path_buf());
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if self.excluded_dirs.is_empty() {
            return false;
        }
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.excluded_dirs.iter().any(|dir| path.starts_with(dir))
    }
}
