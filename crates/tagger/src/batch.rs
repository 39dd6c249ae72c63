//! Parallel recognition over a list of files.
//!
//! Each worker thread owns one encoder (its own ONNX sessions) and pulls
//! files off a shared queue. A failure or panic while analyzing one file
//! becomes a [`Label::ProcessingWarning`] for that file only.

use crossbeam_channel::unbounded;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tagger_core::{label_faces, DistanceMatcher, FaceEncoder, Gallery, Label};
use tagger_media::FrameExtractor;

/// Labels for one input file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileResult {
    pub path: PathBuf,
    /// Empty when there was nothing to analyze.
    pub labels: Vec<Label>,
}

pub struct BatchOrchestrator {
    extractor: FrameExtractor,
    matcher: DistanceMatcher,
}

impl BatchOrchestrator {
    pub fn new(extractor: FrameExtractor, matcher: DistanceMatcher) -> Self {
        Self { extractor, matcher }
    }

    /// Extract, encode and label a single file.
    pub fn analyze_file<E>(&self, path: &Path, gallery: &Gallery, encoder: &mut E) -> Vec<Label>
    where
        E: FaceEncoder + ?Sized,
    {
        let frame = match self.extractor.extract(path) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!(path = %path.display(), "no frame to analyze");
                return Vec::new();
            }
            Err(e) => return vec![Label::ProcessingWarning(e.to_string())],
        };

        match encoder.encode(&frame.image) {
            Ok(encodings) => {
                tracing::debug!(path = %path.display(), faces = encodings.len(), "encoded faces");
                label_faces(&self.matcher, &encodings, gallery)
            }
            Err(e) => vec![Label::ProcessingWarning(format!("{}: {e}", path.display()))],
        }
    }

    /// Analyze `files` on one worker per encoder. Results keep input order.
    pub fn run<E>(
        &self,
        files: &[PathBuf],
        gallery: &Gallery,
        encoders: &mut [E],
    ) -> Vec<FileResult>
    where
        E: FaceEncoder,
    {
        if files.is_empty() {
            return Vec::new();
        }

        let workers = encoders.len().min(files.len());
        tracing::info!(files = files.len(), workers, "starting recognition");

        let (job_tx, job_rx) = unbounded::<(usize, &Path)>();
        let (result_tx, result_rx) = unbounded::<(usize, Vec<Label>)>();
        for job in files.iter().map(PathBuf::as_path).enumerate() {
            if let Err(e) = job_tx.send(job) {
                // Unqueued files become warnings below.
                let (_, path) = e.into_inner();
                tracing::debug!(path = %path.display(), "job queue closed");
                break;
            }
        }
        drop(job_tx);

        std::thread::scope(|s| {
            for (id, encoder) in encoders.iter_mut().take(workers).enumerate() {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("tagger-worker-{id}"))
                    .spawn_scoped(s, move || {
                        while let Ok((i, path)) = job_rx.recv() {
                            let labels = catch_unwind(AssertUnwindSafe(|| {
                                self.analyze_file(path, gallery, encoder)
                            }))
                            .unwrap_or_else(|payload| {
                                let message = panic_message(payload.as_ref());
                                tracing::error!(
                                    worker = id,
                                    path = %path.display(),
                                    panic = %message,
                                    "worker panicked"
                                );
                                let message = format!("panic while analyzing: {message}");
                                vec![Label::ProcessingWarning(message)]
                            });
                            if result_tx.send((i, labels)).is_err() {
                                break;
                            }
                        }
                    });
                if let Err(e) = spawned {
                    tracing::error!(worker = id, error = %e, "failed to spawn worker thread");
                }
            }
        });
        drop(result_tx);

        let mut slots: Vec<Option<Vec<Label>>> = vec![None; files.len()];
        for (i, labels) in result_rx.iter() {
            slots[i] = Some(labels);
        }

        files
            .iter()
            .zip(slots)
            .map(|(path, labels)| FileResult {
                path: path.clone(),
                labels: labels.unwrap_or_else(|| {
                    vec![Label::ProcessingWarning("file was never analyzed".to_string())]
                }),
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_faces, StubEncoder, BLUE, GREEN, POISON, RED};
    use tagger_core::{KnownFace, MatchPolicy, DEFAULT_TOLERANCE};
    use tagger_media::{MediaKinds, DEFAULT_MAX_DIMENSION};

    fn orchestrator() -> BatchOrchestrator {
        BatchOrchestrator::new(
            FrameExtractor::new(MediaKinds::default(), DEFAULT_MAX_DIMENSION, "ffmpeg"),
            DistanceMatcher::new(DEFAULT_TOLERANCE, MatchPolicy::All),
        )
    }

    fn gallery() -> Gallery {
        Gallery::new(vec![
            KnownFace { name: "alice".into(), encoding: StubEncoder::encoding_of(RED) },
            KnownFace { name: "bob".into(), encoding: StubEncoder::encoding_of(GREEN) },
        ])
    }

    fn known(name: &str) -> Label {
        Label::Known(name.into())
    }

    #[test]
    fn test_known_and_unknown_faces_are_labelled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("group.png");
        write_faces(&path, &[GREEN, BLUE]);

        let labels = orchestrator().analyze_file(&path, &gallery(), &mut StubEncoder::default());
        assert_eq!(labels, vec![known("bob"), Label::Unknown]);
    }

    #[test]
    fn test_no_faces_is_single_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("landscape.png");
        write_faces(&path, &[]);

        let labels = orchestrator().analyze_file(&path, &gallery(), &mut StubEncoder::default());
        assert_eq!(labels, vec![Label::NoFacesFound]);
    }

    #[test]
    fn test_unknown_count_matches_faces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strangers.png");
        write_faces(&path, &[BLUE, [10, 20, 200], [0, 40, 255]]);

        let labels = orchestrator().analyze_file(&path, &gallery(), &mut StubEncoder::default());
        assert_eq!(labels, vec![Label::Unknown; 3]);
    }

    #[test]
    fn test_undecodable_file_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not a jpeg").unwrap();

        let labels = orchestrator().analyze_file(&path, &gallery(), &mut StubEncoder::default());
        assert!(matches!(labels.as_slice(), [Label::ProcessingWarning(_)]));
    }

    #[test]
    fn test_vanished_file_yields_no_labels() {
        let dir = tempfile::tempdir().unwrap();
        let labels = orchestrator().analyze_file(
            &dir.path().join("gone.png"),
            &gallery(),
            &mut StubEncoder::default(),
        );
        assert!(labels.is_empty());
    }

    #[test]
    fn test_run_preserves_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let faces = [RED, GREEN, BLUE];
        let files: Vec<PathBuf> = (0..12)
            .map(|i| {
                let path = dir.path().join(format!("img{i:02}.png"));
                write_faces(&path, &[faces[i % 3]]);
                path
            })
            .collect();

        let mut encoders = vec![StubEncoder::default(); 3];
        let results = orchestrator().run(&files, &gallery(), &mut encoders);

        assert_eq!(results.len(), files.len());
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.path, files[i]);
            let expected = match i % 3 {
                0 => known("alice"),
                1 => known("bob"),
                _ => Label::Unknown,
            };
            assert_eq!(result.labels, vec![expected]);
        }
    }

    #[test]
    fn test_panic_is_isolated_to_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        let poisoned = dir.path().join("poisoned.png");
        let after = dir.path().join("after.png");
        write_faces(&good, &[RED]);
        write_faces(&poisoned, &[POISON]);
        write_faces(&after, &[GREEN]);
        let files = vec![good, poisoned, after];

        // One worker: the panic must not stop it from finishing the queue.
        let mut encoders = vec![StubEncoder::default()];
        let results = orchestrator().run(&files, &gallery(), &mut encoders);

        assert_eq!(results[0].labels, vec![known("alice")]);
        assert!(matches!(
            results[1].labels.as_slice(),
            [Label::ProcessingWarning(m)] if m.contains("poisoned frame")
        ));
        assert_eq!(results[2].labels, vec![known("bob")]);
    }

    #[test]
    fn test_run_with_no_files_spawns_nothing() {
        let encoder = StubEncoder::default();
        let mut encoders = vec![encoder.clone()];
        assert!(orchestrator().run(&[], &gallery(), &mut encoders).is_empty());
        assert_eq!(encoder.calls(), 0);
    }
}
