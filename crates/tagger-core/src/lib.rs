//! tagger-core: face detection, encoding and known-face matching.
//!
//! Uses SCRFD for face detection and ArcFace for face encoding, both running
//! via ONNX Runtime, and matches encodings by cosine distance.

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use encoder::{EncoderError, FaceEncoder, OnnxFaceEncoder};
pub use matcher::{
    label_faces, DistanceMatcher, MatchPolicy, MatchResult, Matcher, DEFAULT_TOLERANCE,
};
pub use types::{BoundingBox, Encoding, Gallery, KnownFace, Label};
