//! Matching unknown encodings against the known faces.

use crate::types::{Encoding, KnownFace, Label};
use std::fmt;
use std::str::FromStr;

/// Default maximum cosine distance for two encodings to count as the same person.
pub const DEFAULT_TOLERANCE: f32 = 0.55;

/// Which gallery entries within tolerance are reported for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Every known person within tolerance. One face may yield several names.
    #[default]
    All,
    /// Only the nearest known person within tolerance.
    Closest,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(MatchPolicy::All),
            "closest" => Ok(MatchPolicy::Closest),
            other => Err(format!("unknown match policy '{other}' (expected 'all' or 'closest')")),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPolicy::All => f.write_str("all"),
            MatchPolicy::Closest => f.write_str("closest"),
        }
    }
}

/// A gallery entry within tolerance of the query.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub name: String,
    pub distance: f32,
}

/// Result of matching one query encoding against the gallery.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// Matches in gallery order.
    pub matches: Vec<FaceMatch>,
}

impl MatchResult {
    pub fn matched(&self) -> bool {
        !self.matches.is_empty()
    }

    /// Matched names as labels, or a single [`Label::Unknown`].
    pub fn into_labels(self) -> Vec<Label> {
        if self.matches.is_empty() {
            vec![Label::Unknown]
        } else {
            self.matches.into_iter().map(|m| Label::Known(m.name)).collect()
        }
    }
}

/// Strategy for comparing a query encoding against the known faces.
pub trait Matcher {
    fn compare(&self, query: &Encoding, gallery: &[KnownFace]) -> MatchResult;
}

/// Cosine-distance matcher with an inclusive tolerance bound.
#[derive(Debug, Clone, Copy)]
pub struct DistanceMatcher {
    pub tolerance: f32,
    pub policy: MatchPolicy,
}

impl DistanceMatcher {
    pub fn new(tolerance: f32, policy: MatchPolicy) -> Self {
        Self { tolerance, policy }
    }
}

impl Default for DistanceMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE, MatchPolicy::All)
    }
}

impl Matcher for DistanceMatcher {
    fn compare(&self, query: &Encoding, gallery: &[KnownFace]) -> MatchResult {
        let within: Vec<FaceMatch> = gallery
            .iter()
            .filter_map(|known| {
                let distance = query.distance(&known.encoding);
                (distance <= self.tolerance).then(|| FaceMatch {
                    name: known.name.clone(),
                    distance,
                })
            })
            .collect();

        let matches = match self.policy {
            MatchPolicy::All => within,
            MatchPolicy::Closest => within
                .into_iter()
                .min_by(|a, b| a.distance.total_cmp(&b.distance))
                .into_iter()
                .collect(),
        };

        MatchResult { matches }
    }
}

/// Label every face found in one frame.
///
/// Zero faces yields exactly `[NoFacesFound]`; otherwise each face contributes
/// its matched names or one `Unknown`.
pub fn label_faces<M: Matcher + ?Sized>(
    matcher: &M,
    encodings: &[Encoding],
    gallery: &[KnownFace],
) -> Vec<Label> {
    if encodings.is_empty() {
        return vec![Label::NoFacesFound];
    }

    encodings
        .iter()
        .flat_map(|encoding| matcher.compare(encoding, gallery).into_labels())
        .collect()
}
