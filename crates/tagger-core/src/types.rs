use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Fixed-length face encoding (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Encoding {
    pub values: Vec<f32>,
}

impl Encoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Encoding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Cosine distance in [0, 2]: `1 - similarity`.
    ///
    /// This is the distance the match tolerance is expressed in. Identical
    /// encodings are at 0.0; the default tolerance of 0.55 accepts pairs with
    /// a cosine similarity of at least 0.45.
    pub fn distance(&self, other: &Encoding) -> f32 {
        1.0 - self.similarity(other)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A reference person and the encoding of their single reference face.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownFace {
    pub name: String,
    pub encoding: Encoding,
}

/// Immutable, cheaply clonable snapshot of the known faces.
///
/// Workers only ever receive this handle, never the index that built it.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    faces: Arc<[KnownFace]>,
}

impl Gallery {
    pub fn new(faces: Vec<KnownFace>) -> Self {
        Self { faces: faces.into() }
    }

}

impl Deref for Gallery {
    type Target = [KnownFace];

    fn deref(&self) -> &[KnownFace] {
        &self.faces
    }
}

/// One recognition label for a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    /// A face matched this known person.
    Known(String),
    /// A face matched nobody. Appears once per unmatched face.
    Unknown,
    /// The frame contained no faces at all. Never co-occurs with other labels.
    NoFacesFound,
    /// Analysis of the file failed.
    ProcessingWarning(String),
}

impl Label {
    pub fn known_name(&self) -> Option<&str> {
        match self {
            Label::Known(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Known(name) => f.write_str(name),
            Label::Unknown => f.write_str("unknown_person"),
            Label::NoFacesFound => f.write_str("no_people_found"),
            Label::ProcessingWarning(message) => write!(f, "warning: {message}"),
        }
    }
}
