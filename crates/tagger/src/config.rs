use std::path::PathBuf;
use tagger_core::MatchPolicy;
use tagger_media::DEFAULT_MAX_DIMENSION;

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    /// exiftool executable used to read and append tags.
    pub exiftool: PathBuf,
    /// ffmpeg executable used to sample a video's first frame.
    pub ffmpeg: PathBuf,
    /// Top-level hierarchical keyword the person tags are nested under.
    pub category: String,
    pub match_policy: MatchPolicy,
    /// Number of recognition workers, each with its own model sessions.
    pub workers: usize,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
    /// Frames larger than this on either side are downscaled before encoding.
    pub max_dimension: u32,
}

impl Config {
    /// Load configuration from `FACE_TAGGER_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACE_TAGGER_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_model_dir());

        let match_policy = std::env::var("FACE_TAGGER_MATCH_POLICY")
            .ok()
            .and_then(|v| match v.parse() {
                Ok(policy) => Some(policy),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring FACE_TAGGER_MATCH_POLICY");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            model_dir,
            exiftool: env_path("FACE_TAGGER_EXIFTOOL", "exiftool"),
            ffmpeg: env_path("FACE_TAGGER_FFMPEG", "ffmpeg"),
            category: std::env::var("FACE_TAGGER_CATEGORY")
                .unwrap_or_else(|_| "Personen".to_string()),
            match_policy,
            workers: env_usize("FACE_TAGGER_WORKERS", num_cpus::get()).max(1),
            intra_threads: env_usize("FACE_TAGGER_INTRA_THREADS", 1).max(1),
            max_dimension: env_u32("FACE_TAGGER_MAX_DIMENSION", DEFAULT_MAX_DIMENSION),
        }
    }
}

/// `$XDG_DATA_HOME/face_tagger/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("face_tagger")
        .join("models")
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var_os(key)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
