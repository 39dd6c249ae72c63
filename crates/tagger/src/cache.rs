//! Persistent cache of reference encodings, stored next to the references.
//!
//! The file is a versioned JSON document. A cache written by another schema
//! version or another encoding model is rejected and treated as absent.

use crate::index::KnownPerson;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CACHE_FILE_NAME: &str = ".face_tagger_cache.json";
pub const CACHE_SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cannot access cache {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt cache {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cache schema version {found} is not supported (expected {CACHE_SCHEMA_VERSION})")]
    SchemaMismatch { found: u32 },
    #[error("cache was written by model {found}, current model is {expected}")]
    ModelMismatch { found: String, expected: String },
    #[error("cannot serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct CacheHeader {
    schema_version: u32,
}

#[derive(Serialize, Deserialize)]
struct CacheDocument {
    schema_version: u32,
    model_version: String,
    written_at: DateTime<Utc>,
    people: Vec<KnownPerson>,
}

/// The on-disk cache for one reference directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
    model_version: String,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>, model_version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            model_version: model_version.into(),
        }
    }

    /// The cache co-located with a reference directory.
    pub fn in_dir(reference_dir: &Path, model_version: impl Into<String>) -> Self {
        Self::new(reference_dir.join(CACHE_FILE_NAME), model_version)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached people. A missing file is an empty cache.
    pub fn load(&self) -> Result<Vec<KnownPerson>, CacheError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(CacheError::Io { path: self.path.clone(), source }),
        };

        let corrupt = |source| CacheError::Corrupt { path: self.path.clone(), source };

        let header: CacheHeader = serde_json::from_slice(&bytes).map_err(corrupt)?;
        if header.schema_version != CACHE_SCHEMA_VERSION {
            return Err(CacheError::SchemaMismatch { found: header.schema_version });
        }

        let document: CacheDocument = serde_json::from_slice(&bytes).map_err(corrupt)?;
        if document.model_version != self.model_version {
            return Err(CacheError::ModelMismatch {
                found: document.model_version,
                expected: self.model_version.clone(),
            });
        }

        Ok(document.people)
    }

    /// Like [`load`](Self::load), but any failure is logged and yields an empty cache.
    pub fn load_or_empty(&self) -> Vec<KnownPerson> {
        match self.load() {
            Ok(people) => {
                tracing::debug!(
                    path = %self.path.display(),
                    entries = people.len(),
                    "loaded encoding cache"
                );
                people
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unusable encoding cache");
                Vec::new()
            }
        }
    }

    /// Replace the whole cache with `people`.
    ///
    /// Written to a sibling temporary file first and renamed over the old
    /// cache, so readers never observe a partial document.
    pub fn save(&self, people: &[KnownPerson]) -> Result<(), CacheError> {
        let document = CacheDocument {
            schema_version: CACHE_SCHEMA_VERSION,
            model_version: self.model_version.clone(),
            written_at: Utc::now(),
            people: people.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&document)?;

        let io_err = |source| CacheError::Io { path: self.path.clone(), source };
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        if let Err(source) = std::fs::rename(&tmp, &self.path) {
            if let Err(e) = std::fs::remove_file(&tmp) {
                tracing::debug!(
                    path = %tmp.display(),
                    error = %e,
                    "cannot remove temporary cache file"
                );
            }
            return Err(io_err(source));
        }

        tracing::debug!(
            path = %self.path.display(),
            entries = people.len(),
            "wrote encoding cache"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagger_core::Encoding;

    fn person(name: &str, size: u64) -> KnownPerson {
        KnownPerson {
            name: name.into(),
            encoding: Encoding::new(vec![0.25, -0.5, 1.0]),
            file_size: size,
            sha256: format!("{name}-digest"),
            encoded_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_cache_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::in_dir(dir.path(), "m1");
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::in_dir(dir.path(), "m1");
        let people = vec![person("alice", 10), person("bob", 20)];
        store.save(&people).unwrap();

        assert_eq!(store.load().unwrap(), people);
        assert!(!dir.path().join(".face_tagger_cache.json.tmp").exists());
    }

    #[test]
    fn test_save_replaces_previous_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::in_dir(dir.path(), "m1");
        store.save(&[person("alice", 10), person("bob", 20)]).unwrap();
        store.save(&[person("carol", 30)]).unwrap();

        let names: Vec<_> = store.load().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["carol"]);
    }

    #[test]
    fn test_failed_replace_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::in_dir(dir.path(), "m1");
        std::fs::create_dir(store.path()).unwrap();

        assert!(matches!(store.save(&[person("alice", 10)]), Err(CacheError::Io { .. })));
        assert!(!dir.path().join(".face_tagger_cache.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_cache_is_rejected_and_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::in_dir(dir.path(), "m1");
        std::fs::write(store.path(), b"\x80\x03pickle-bytes").unwrap();

        assert!(matches!(store.load(), Err(CacheError::Corrupt { .. })));
        assert!(store.load_or_empty().is_empty());
    }

    #[test]
    fn test_future_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::in_dir(dir.path(), "m1");
        std::fs::write(store.path(), br#"{"schema_version": 99, "anything": true}"#).unwrap();
        assert!(matches!(store.load(), Err(CacheError::SchemaMismatch { found: 99 })));
    }

    #[test]
    fn test_other_model_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        CacheStore::in_dir(dir.path(), "m1").save(&[person("alice", 10)]).unwrap();

        let store = CacheStore::in_dir(dir.path(), "m2");
        assert!(matches!(store.load(), Err(CacheError::ModelMismatch { .. })));
    }

    #[test]
    fn test_document_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::in_dir(dir.path(), "m1");
        store.save(&[person("alice", 10)]).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["model_version"], "m1");
        assert_eq!(value["people"][0]["name"], "alice");
        assert_eq!(value["people"][0]["file_size"], 10);
        assert_eq!(value["people"][0]["encoding"][1], -0.5);
    }
}
