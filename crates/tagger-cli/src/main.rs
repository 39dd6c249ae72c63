use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tagger::{Config, RunOptions};
use tagger_core::{MatchPolicy, DEFAULT_TOLERANCE};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "face_tagger",
    version,
    about = "Recognize known people in photos and videos and write them into the file's keywords"
)]
struct Cli {
    /// Maximum face distance to count as a match; lower is stricter
    #[arg(long, default_value_t = DEFAULT_TOLERANCE, value_parser = parse_tolerance)]
    tolerance: f32,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory with one reference image per known person, named after them;
    /// if it does not exist, every face is reported as unknown
    #[arg(short, long, value_name = "DIR", default_value = "reference_images")]
    references: PathBuf,

    /// Report every known person within tolerance, or only the closest
    #[arg(long, value_name = "all|closest")]
    match_policy: Option<MatchPolicy>,

    /// Number of recognition workers [default: number of CPUs]
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Recognize and log what would be tagged without writing metadata
    #[arg(long)]
    dry_run: bool,

    /// Image/video files or directories to scan recursively
    paths: Vec<PathBuf>,
}

fn parse_tolerance(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(format!("tolerance must be a finite number >= 0, got {value}"))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = Config::from_env();
    if let Some(policy) = cli.match_policy {
        config.match_policy = policy;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers.max(1);
    }
    tracing::debug!(?config, "configuration loaded");

    let options = RunOptions {
        inputs: cli.paths,
        references: cli.references,
        tolerance: cli.tolerance,
        dry_run: cli.dry_run,
    };
    tagger::run(&config, &options)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["face_tagger"]).unwrap();
        assert_eq!(cli.tolerance, DEFAULT_TOLERANCE);
        assert_eq!(cli.references, PathBuf::from("reference_images"));
        assert!(cli.paths.is_empty());
        assert!(cli.match_policy.is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_full_invocation() {
        let cli = Cli::try_parse_from([
            "face_tagger",
            "-v",
            "--tolerance",
            "0.4",
            "-r",
            "/photos/refs",
            "--match-policy",
            "closest",
            "--workers",
            "3",
            "/photos/2023",
            "/photos/2024/img.jpg",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.tolerance, 0.4);
        assert_eq!(cli.references, PathBuf::from("/photos/refs"));
        assert_eq!(cli.match_policy, Some(MatchPolicy::Closest));
        assert_eq!(cli.workers, Some(3));
        assert_eq!(cli.paths.len(), 2);
    }

    #[test]
    fn test_rejects_bad_tolerance() {
        for bad in ["-0.1", "NaN", "inf", "abc"] {
            assert!(Cli::try_parse_from(["face_tagger", "--tolerance", bad]).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_rejects_unknown_policy() {
        assert!(Cli::try_parse_from(["face_tagger", "--match-policy", "best"]).is_err());
    }
}
