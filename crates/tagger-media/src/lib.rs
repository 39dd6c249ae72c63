//! tagger-media: input discovery and representative frame extraction.
//!
//! Expands input paths into supported image/video files and decodes one RGB
//! frame per file (the still itself, or a video's first frame via ffmpeg).

pub mod frame;
pub mod scanner;

pub use frame::{Frame, FrameError, FrameExtractor, DEFAULT_MAX_DIMENSION};
pub use scanner::{FileScanner, MediaKind, MediaKinds};
