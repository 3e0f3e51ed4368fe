// Notation sinks: where an expanded score goes after generation.
//
// Each output format is a `NotationSink` that writes one file. The pipeline
// renders the score through every sink the config asks for and, when a
// viewer program is configured, opens the first rendered file with it.

use crate::config::{Config, OutputFormat};
use crate::error::{Error, Result};
use crate::expand::Score;
use crate::lilypond::{LilyPondOptions, write_lilypond};
use crate::midi::write_midi;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

pub trait NotationSink {
    /// File extension of the rendered output, without the dot.
    fn extension(&self) -> &'static str;

    fn render(&self, score: &Score, path: &Path) -> Result<()>;
}

pub struct MidiSink {
    pub tempo_bpm: u16,
}

impl NotationSink for MidiSink {
    fn extension(&self) -> &'static str {
        "mid"
    }

    fn render(&self, score: &Score, path: &Path) -> Result<()> {
        write_midi(score, self.tempo_bpm, path)
    }
}

pub struct LilyPondSink {
    pub options: LilyPondOptions,
}

impl NotationSink for LilyPondSink {
    fn extension(&self) -> &'static str {
        "ly"
    }

    fn render(&self, score: &Score, path: &Path) -> Result<()> {
        write_lilypond(score, &self.options, path)
    }
}

/// The sinks selected by `config.formats`, in the order listed.
pub fn sinks_for(config: &Config, title: &str) -> Vec<Box<dyn NotationSink>> {
    config
        .formats
        .iter()
        .map(|format| -> Box<dyn NotationSink> {
            match format {
                OutputFormat::Midi => Box::new(MidiSink {
                    tempo_bpm: config.tempo_bpm,
                }),
                OutputFormat::LilyPond => Box::new(LilyPondSink {
                    options: LilyPondOptions {
                        title: title.to_string(),
                        time_signature: config.time_signature.clone(),
                        tempo_bpm: config.tempo_bpm,
                    },
                }),
            }
        })
        .collect()
}

/// Render `score` through every configured sink into `config.output_dir`.
pub fn render_all(score: &Score, config: &Config, stem: &str) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&config.output_dir).map_err(|e| Error::io(&config.output_dir, e))?;
    let mut written = Vec::new();
    for sink in sinks_for(config, stem) {
        let path = config
            .output_dir
            .join(format!("{}.{}", stem, sink.extension()));
        sink.render(score, &path)?;
        info!(path = %path.display(), "rendered score");
        written.push(path);
    }
    Ok(written)
}

/// Open a rendered file with the configured viewer and wait for it.
pub fn show(viewer: &str, path: &Path, scratch_dir: Option<&Path>) -> Result<()> {
    let mut command = Command::new(viewer);
    command.arg(path);
    if let Some(dir) = scratch_dir {
        std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        command.current_dir(dir);
    }
    let status = command.status().map_err(|e| Error::Viewer {
        command: viewer.to_string(),
        message: e.to_string(),
    })?;
    if !status.success() {
        return Err(Error::Viewer {
            command: viewer.to_string(),
            message: format!("exited with {status}"),
        });
    }
    Ok(())
}
