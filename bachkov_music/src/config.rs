// Run configuration.
//
// Everything tunable lives in `Config`, loaded from JSON at startup and
// passed down explicitly; nothing reads global state. Missing fields take
// their defaults, so an empty `{}` is a valid config file.
//
// Lookup order: the `--config` path if given (it must exist), otherwise
// `bachkov.json` in the working directory if present, otherwise defaults.
// Command-line flags are applied on top by main.rs.

use crate::error::{Error, Result};
use crate::midi::MIN_TEMPO_BPM;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file picked up from the working directory when no path is given.
pub const LOCAL_CONFIG: &str = "bachkov.json";

/// Rendered output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Midi,
    LilyPond,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory of piece files used for training.
    pub corpus_dir: PathBuf,
    /// Only pieces in this meter are trained on, and generated scores are
    /// barred in it.
    pub time_signature: String,
    /// Playback tempo for rendered output, in quarter notes per minute.
    pub tempo_bpm: u16,
    /// Where rendered scores are written.
    pub output_dir: PathBuf,
    pub formats: Vec<OutputFormat>,
    /// External program that opens a rendered score (e.g. `musescore`).
    pub viewer: Option<String>,
    /// Working directory handed to the viewer.
    pub scratch_dir: Option<PathBuf>,
    /// Upper bound on joint states per generated walk.
    pub max_walk_steps: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            corpus_dir: PathBuf::from("data/corpus"),
            time_signature: "4/4".into(),
            tempo_bpm: 80,
            output_dir: PathBuf::from("output"),
            formats: vec![OutputFormat::Midi, OutputFormat::LilyPond],
            viewer: None,
            scratch_dir: None,
            max_walk_steps: Some(2000),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: Config = serde_json::from_str(&data).map_err(|e| Error::json(path, e))?;
        config.validate()?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tempo_bpm < MIN_TEMPO_BPM {
            return Err(Error::InvalidArgument(format!(
                "tempo_bpm must be at least {MIN_TEMPO_BPM}, got {}",
                self.tempo_bpm
            )));
        }
        Ok(())
    }

    /// Resolve the config for this run (see module comment for the order).
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let local = Path::new(LOCAL_CONFIG);
                if local.is_file() {
                    Self::load(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
