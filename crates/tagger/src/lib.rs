//! tagger: recognize known people in photos and videos and tag them.
//!
//! Pipeline: scan inputs, build the known-people index from the reference
//! directory, recognize faces on a worker pool, then reconcile each file's
//! keyword metadata one file at a time.

pub mod batch;
pub mod cache;
pub mod config;
pub mod index;
pub mod metadata;
pub mod reconcile;

#[cfg(test)]
mod testing;

pub use batch::{BatchOrchestrator, FileResult};
pub use config::Config;
pub use index::{IndexBuilder, KnownPeopleIndex, KnownPerson};
pub use metadata::{ExifTool, MetadataTool};
pub use reconcile::{Outcome, Reconciler, SkipReason};

use anyhow::{Context, Result};
use std::path::PathBuf;
use tagger_core::{DistanceMatcher, FaceEncoder, OnnxFaceEncoder};
use tagger_media::{FileScanner, FrameExtractor, MediaKinds};

/// What to process in one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub inputs: Vec<PathBuf>,
    pub references: PathBuf,
    pub tolerance: f32,
    pub dry_run: bool,
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files_scanned: usize,
    /// Files that gained (or in a dry run would gain) person tags.
    pub files_tagged: usize,
    /// Person names appended across all files.
    pub tags_written: usize,
    pub unknown_faces: usize,
    /// Files whose analysis or metadata update failed.
    pub warnings: usize,
    /// Files left untouched by policy, including ones already up to date.
    pub skipped: usize,
}

/// Run with the ONNX encoder and exiftool.
pub fn run(config: &Config, options: &RunOptions) -> Result<RunSummary> {
    let tool = ExifTool::new(&config.exiftool);
    run_with(config, options, &tool, || load_encoders(config))
}

fn load_encoders(config: &Config) -> Result<Vec<OnnxFaceEncoder>> {
    (0..config.workers)
        .map(|_| {
            OnnxFaceEncoder::load(&config.model_dir, config.intra_threads)
                .with_context(|| format!("loading face models from {}", config.model_dir.display()))
        })
        .collect()
}

/// Run with the given encoders and metadata tool.
///
/// `make_encoders` is only called once there is at least one file to
/// analyze; it must yield one encoder per worker.
pub fn run_with<E, T, F>(
    config: &Config,
    options: &RunOptions,
    tool: &T,
    make_encoders: F,
) -> Result<RunSummary>
where
    E: FaceEncoder,
    T: MetadataTool + ?Sized,
    F: FnOnce() -> Result<Vec<E>>,
{
    let mut summary = RunSummary::default();

    if options.inputs.is_empty() {
        tracing::error!("No files supplied to recognize!");
        return Ok(summary);
    }

    let kinds = MediaKinds::default();
    let files = FileScanner::new(kinds.clone())
        .exclude_dir(&options.references)
        .scan(&options.inputs);
    summary.files_scanned = files.len();
    if files.is_empty() {
        tracing::warn!("no supported files found in the given paths");
        return Ok(summary);
    }

    let mut encoders = make_encoders()?;
    if encoders.is_empty() {
        anyhow::bail!("no face encoders available");
    }
    tracing::info!(
        workers = encoders.len(),
        model = encoders[0].model_version(),
        "face models loaded"
    );

    let extractor = FrameExtractor::new(kinds.clone(), config.max_dimension, &config.ffmpeg);
    let build = IndexBuilder::new(&kinds, extractor.clone())
        .build(&options.references, &mut encoders[0]);
    if build.index.is_empty() {
        tracing::warn!(
            dir = %options.references.display(),
            "no known people; every face will be unknown"
        );
    } else {
        tracing::debug!(people = ?build.index.names().collect::<Vec<_>>(), "known people");
    }

    let matcher = DistanceMatcher::new(options.tolerance, config.match_policy);
    let results = BatchOrchestrator::new(extractor, matcher).run(
        &files,
        &build.index.gallery(),
        &mut encoders,
    );

    let reconciler = Reconciler::new(tool, config.category.as_str()).dry_run(options.dry_run);
    for result in &results {
        match reconciler.reconcile(&result.path, &result.labels) {
            Ok(reconciliation) => {
                summary.unknown_faces += reconciliation.unknown_faces;
                match reconciliation.outcome {
                    Outcome::Tagged { added, .. } => {
                        summary.files_tagged += 1;
                        summary.tags_written += added.len();
                    }
                    Outcome::Skipped(SkipReason::Warning(_)) => summary.warnings += 1,
                    Outcome::Skipped(_) | Outcome::UpToDate => summary.skipped += 1,
                }
            }
            Err(e) => {
                tracing::error!(
                    path = %result.path.display(),
                    error = %e,
                    "failed to update metadata"
                );
                summary.warnings += 1;
            }
        }
    }

    tracing::info!(
        files = summary.files_scanned,
        tagged = summary.files_tagged,
        tags = summary.tags_written,
        unknown = summary.unknown_faces,
        warnings = summary.warnings,
        skipped = summary.skipped,
        dry_run = options.dry_run,
        "run complete"
    );
    Ok(summary)
}
