//! Representative frame extraction: still decode, first video frame, downscale.

use crate::scanner::{MediaKind, MediaKinds};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub const DEFAULT_MAX_DIMENSION: u32 = 1600;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("unsupported media type: {0}")]
    Unsupported(PathBuf),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot run {program}: {source}")]
    Ffmpeg {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// One decoded RGB frame ready for face encoding.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub kind: MediaKind,
    /// Dimensions before any downscaling.
    pub source_width: u32,
    pub source_height: u32,
}

impl Frame {
    fn was_downscaled(&self) -> bool {
        self.image.dimensions() != (self.source_width, self.source_height)
    }
}

/// Produces one analyzable frame per media file.
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    kinds: MediaKinds,
    max_dimension: u32,
    ffmpeg: PathBuf,
}

impl FrameExtractor {
    pub fn new(kinds: MediaKinds, max_dimension: u32, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            kinds,
            max_dimension,
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Decode a representative frame.
    ///
    /// `Ok(None)` means there is nothing to analyze: the file vanished since
    /// scanning, or a video has no readable first frame.
    pub fn extract(&self, path: &Path) -> Result<Option<Frame>, FrameError> {
        let kind = self
            .kinds
            .classify(path)
            .ok_or_else(|| FrameError::Unsupported(path.to_path_buf()))?;

        let decoded = match kind {
            MediaKind::Image => read_image(path)?,
            MediaKind::Video => read_first_video_frame(&self.ffmpeg, path)?,
        };

        Ok(decoded.map(|image| {
            let (source_width, source_height) = image.dimensions();
            let image = downscale(image, self.max_dimension).into_rgb8();
            let frame = Frame { image, kind, source_width, source_height };
            if frame.was_downscaled() {
                tracing::debug!(
                    path = %path.display(),
                    from = ?(source_width, source_height),
                    to = ?frame.image.dimensions(),
                    "downscaled frame"
                );
            }
            frame
        }))
    }
}

/// Shrink so neither side exceeds `max_dimension`, preserving aspect ratio.
pub fn downscale(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    if max_dimension == 0 || w.max(h) <= max_dimension {
        return image;
    }
    image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

fn read_image(path: &Path) -> Result<Option<DynamicImage>, FrameError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "file disappeared before decoding, skipping");
            return Ok(None);
        }
        Err(source) => return Err(FrameError::Io { path: path.to_path_buf(), source }),
    };

    image::load_from_memory(&bytes)
        .map(Some)
        .map_err(|source| FrameError::Decode { path: path.to_path_buf(), source })
}

/// Ask ffmpeg for the first video frame as a PNG on stdout.
fn read_first_video_frame(ffmpeg: &Path, path: &Path) -> Result<Option<DynamicImage>, FrameError> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "file disappeared before decoding, skipping");
        return Ok(None);
    }

    let output = Command::new(ffmpeg)
        .args(["-v", "error", "-nostdin", "-i"])
        .arg(path)
        .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
        .stdin(Stdio::null())
        .output()
        .map_err(|source| FrameError::Ffmpeg {
            program: ffmpeg.display().to_string(),
            source,
        })?;

    if !output.status.success() || output.stdout.is_empty() {
        tracing::warn!(
            path = %path.display(),
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "cannot read first video frame, skipping"
        );
        return Ok(None);
    }

    image::load_from_memory_with_format(&output.stdout, image::ImageFormat::Png)
        .map(Some)
        .map_err(|source| FrameError::Decode { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn extractor() -> FrameExtractor {
        FrameExtractor::new(MediaKinds::default(), DEFAULT_MAX_DIMENSION, "ffmpeg")
    }

    #[test]
    fn test_downscale_caps_longest_side() {
        let img = DynamicImage::new_rgb8(3200, 1000);
        let out = downscale(img, 1600);
        assert_eq!(out.dimensions(), (1600, 500));
    }

    #[test]
    fn test_downscale_portrait() {
        let img = DynamicImage::new_rgb8(900, 2400);
        let out = downscale(img, 1600);
        assert_eq!(out.dimensions(), (600, 1600));
    }

    #[test]
    fn test_downscale_leaves_small_frames() {
        let img = DynamicImage::new_rgb8(1600, 1200);
        assert_eq!(downscale(img, 1600).dimensions(), (1600, 1200));
    }

    #[test]
    fn test_extract_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        RgbImage::from_pixel(40, 30, Rgb([10, 200, 30])).save(&path).unwrap();

        let frame = extractor().extract(&path).unwrap().unwrap();
        assert_eq!(frame.kind, MediaKind::Image);
        assert_eq!(frame.image.dimensions(), (40, 30));
        assert!(!frame.was_downscaled());
        assert_eq!(frame.image.get_pixel(0, 0), &Rgb([10, 200, 30]));
    }

    #[test]
    fn test_extract_large_image_is_downscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        RgbImage::new(2000, 500).save(&path).unwrap();

        let frame = extractor().extract(&path).unwrap().unwrap();
        assert!(frame.was_downscaled());
        assert_eq!(frame.image.dimensions(), (1600, 400));
        assert_eq!((frame.source_width, frame.source_height), (2000, 500));
    }

    #[test]
    fn test_extract_vanished_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(extractor().extract(&dir.path().join("gone.jpg")).unwrap().is_none());
        assert!(extractor().extract(&dir.path().join("gone.mp4")).unwrap().is_none());
    }

    #[test]
    fn test_extract_corrupt_image_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();
        assert!(matches!(extractor().extract(&path), Err(FrameError::Decode { .. })));
    }

    #[test]
    fn test_extract_unsupported_extension() {
        assert!(matches!(
            extractor().extract(Path::new("notes.txt")),
            Err(FrameError::Unsupported(_))
        ));
    }

    #[test]
    fn test_extract_video_without_ffmpeg_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"not really a video").unwrap();

        let extractor = FrameExtractor::new(
            MediaKinds::default(),
            DEFAULT_MAX_DIMENSION,
            dir.path().join("no-such-ffmpeg"),
        );
        assert!(matches!(extractor.extract(&path), Err(FrameError::Ffmpeg { .. })));
    }
}
