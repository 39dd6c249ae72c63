//! The face-encoding seam: frame in, one encoding per detected face out.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError, ARCFACE_MODEL_VERSION};
use crate::types::Encoding;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Detects faces in a frame and encodes each one.
///
/// Implementations hold per-thread inference state, so `encode` takes
/// `&mut self`; each worker owns its own encoder.
pub trait FaceEncoder: Send {
    /// Zero or more encodings, ordered by detection confidence.
    fn encode(&mut self, frame: &RgbImage) -> Result<Vec<Encoding>, EncoderError>;

    /// Identifies the encoding space. Cached encodings from a different
    /// model are not comparable and must be discarded.
    fn model_version(&self) -> &str;
}

/// SCRFD detection followed by ArcFace encoding of every detected face.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path, intra_threads: usize) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE), intra_threads)?;
        let recognizer =
            FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE), intra_threads)?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode(&mut self, frame: &RgbImage) -> Result<Vec<Encoding>, EncoderError> {
        let faces = self.detector.detect(frame)?;
        tracing::trace!(faces = faces.len(), "detected faces");

        let mut encodings = Vec::with_capacity(faces.len());
        for face in &faces {
            encodings.push(self.recognizer.extract(frame, face)?);
        }
        Ok(encodings)
    }

    fn model_version(&self) -> &str {
        ARCFACE_MODEL_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reports_missing_detector_first() {
        let dir = std::env::temp_dir().join("face-tagger-no-models-here");
        let err = OnnxFaceEncoder::load(&dir, 1).err().map(|e| e.to_string());
        let message = err.unwrap_or_default();
        assert!(message.contains(DETECTOR_MODEL_FILE), "unexpected error: {message}");
    }
}
