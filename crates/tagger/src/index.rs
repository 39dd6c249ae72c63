//! Known-people index built from a reference gallery directory.
//!
//! One image per person; the person's name is the file stem. Encodings are
//! cached and reused while a reference file's size and SHA-256 digest are
//! unchanged.

use crate::cache::CacheStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tagger_core::{Encoding, FaceEncoder, Gallery, KnownFace};
use tagger_media::{FileScanner, FrameExtractor, MediaKinds};

/// A reference person with the identity of the file it was encoded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownPerson {
    pub name: String,
    pub encoding: Encoding,
    /// Byte size of the reference file when it was encoded.
    pub file_size: u64,
    /// Hex SHA-256 of the reference file when it was encoded.
    pub sha256: String,
    pub encoded_at: DateTime<Utc>,
}

impl KnownPerson {
    fn is_current(&self, identity: &FileIdentity) -> bool {
        self.file_size == identity.size && self.sha256 == identity.sha256
    }
}

/// Ordered known people, read-only once built.
#[derive(Debug, Clone, Default)]
pub struct KnownPeopleIndex {
    people: Vec<KnownPerson>,
}

impl KnownPeopleIndex {
    pub fn people(&self) -> &[KnownPerson] {
        &self.people
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.people.iter().map(|p| p.name.as_str())
    }

    #[cfg(test)]
    fn get(&self, name: &str) -> Option<&KnownPerson> {
        self.people.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    /// Immutable snapshot handed to recognition workers.
    pub fn gallery(&self) -> Gallery {
        Gallery::new(
            self.people
                .iter()
                .map(|p| KnownFace {
                    name: p.name.clone(),
                    encoding: p.encoding.clone(),
                })
                .collect(),
        )
    }
}

/// Outcome of one index build.
#[derive(Debug)]
pub struct IndexBuild {
    pub index: KnownPeopleIndex,
    /// Entries taken from the cache without re-encoding.
    pub reused: usize,
    /// Reference files (re-)encoded in this build.
    pub encoded: usize,
    /// Reference files that produced no usable entry.
    pub discarded: usize,
    /// Whether the cache file was rewritten.
    pub cache_written: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileIdentity {
    size: u64,
    sha256: String,
}

impl FileIdentity {
    fn of(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self {
            size: bytes.len() as u64,
            sha256: format!("{:x}", Sha256::digest(&bytes)),
        })
    }
}

/// Builds a [`KnownPeopleIndex`] from a reference directory.
pub struct IndexBuilder {
    scanner: FileScanner,
    extractor: FrameExtractor,
}

impl IndexBuilder {
    /// `kinds` is narrowed to images: videos are never references.
    pub fn new(kinds: &MediaKinds, extractor: FrameExtractor) -> Self {
        Self {
            scanner: FileScanner::new(kinds.images_only()),
            extractor,
        }
    }

    /// Build the index for `reference_dir`.
    ///
    /// A missing directory yields an empty index, so every face is unknown.
    pub fn build<E>(&self, reference_dir: &Path, encoder: &mut E) -> IndexBuild
    where
        E: FaceEncoder + ?Sized,
    {
        if !reference_dir.is_dir() {
            tracing::warn!(
                dir = %reference_dir.display(),
                "reference directory not found, continuing without known people"
            );
            return IndexBuild {
                index: KnownPeopleIndex::default(),
                reused: 0,
                encoded: 0,
                discarded: 0,
                cache_written: false,
            };
        }

        let store = CacheStore::in_dir(reference_dir, encoder.model_version());
        let cached_people = store.load_or_empty();
        let cached_names: BTreeSet<String> =
            cached_people.iter().map(|p| p.name.clone()).collect();
        let cached: HashMap<String, KnownPerson> =
            cached_people.into_iter().map(|p| (p.name.clone(), p)).collect();

        let mut people: Vec<KnownPerson> = Vec::new();
        let (mut reused, mut encoded, mut discarded) = (0, 0, 0);

        for (name, path) in self.references(reference_dir, &mut discarded) {
            let identity = match FileIdentity::of(&path) {
                Ok(identity) => identity,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "cannot read reference file, skipping"
                    );
                    discarded += 1;
                    continue;
                }
            };

            match cached.get(&name) {
                Some(hit) if hit.is_current(&identity) => {
                    reused += 1;
                    people.push(hit.clone());
                }
                stale => {
                    if stale.is_some() {
                        tracing::info!(name = %name, "reference file changed, re-encoding");
                    }
                    match self.encode_reference(&path, encoder) {
                        Some(encoding) => {
                            encoded += 1;
                            people.push(KnownPerson {
                                name,
                                encoding,
                                file_size: identity.size,
                                sha256: identity.sha256,
                                encoded_at: Utc::now(),
                            });
                        }
                        None => discarded += 1,
                    }
                }
            }
        }

        let live_names: BTreeSet<String> = people.iter().map(|p| p.name.clone()).collect();
        let mut cache_written = false;
        if encoded > 0 || live_names != cached_names {
            match store.save(&people) {
                Ok(()) => cache_written = true,
                Err(e) => tracing::error!(
                    error = %e,
                    "failed to persist encoding cache; continuing with in-memory index"
                ),
            }
        }

        tracing::info!(
            people = people.len(),
            reused,
            encoded,
            discarded,
            cache_written,
            "known-people index ready"
        );

        IndexBuild {
            index: KnownPeopleIndex { people },
            reused,
            encoded,
            discarded,
            cache_written,
        }
    }

    /// Reference files keyed by name, in scan order.
    ///
    /// When several files share a stem, the last one scanned wins and takes
    /// the position of the first, so only the winner is ever encoded.
    fn references(&self, reference_dir: &Path, discarded: &mut usize) -> Vec<(String, PathBuf)> {
        let mut references: Vec<(String, PathBuf)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for path in self.scanner.scan(&[reference_dir.to_path_buf()]) {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
                tracing::warn!(
                    path = %path.display(),
                    "reference file name is not valid UTF-8, skipping"
                );
                *discarded += 1;
                continue;
            };

            match positions.get(&name) {
                Some(&at) => {
                    tracing::debug!(
                        name = %name,
                        replaced = %references[at].1.display(),
                        path = %path.display(),
                        "duplicate reference name, later file wins"
                    );
                    references[at].1 = path;
                }
                None => {
                    positions.insert(name.clone(), references.len());
                    references.push((name, path));
                }
            }
        }
        references
    }

    /// Encode the single face of a reference image, or `None` to discard it.
    fn encode_reference<E>(&self, path: &Path, encoder: &mut E) -> Option<Encoding>
    where
        E: FaceEncoder + ?Sized,
    {
        let frame = match self.extractor.extract(path) {
            Ok(Some(frame)) => frame,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "cannot decode reference image, skipping");
                return None;
            }
        };

        let mut encodings = match encoder.encode(&frame.image) {
            Ok(encodings) => encodings,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "cannot encode reference image, skipping"
                );
                return None;
            }
        };

        match encodings.len() {
            0 => {
                tracing::warn!(
                    path = %path.display(),
                    "no face found in reference image, skipping"
                );
                None
            }
            1 => encodings.pop(),
            n => {
                tracing::warn!(
                    path = %path.display(),
                    faces = n,
                    "multiple faces in reference image, using the first"
                );
                Some(encodings.swap_remove(0))
            }
        }
    }
}
