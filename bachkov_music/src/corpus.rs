// Chorale corpus: JSON piece files, voice streams, and selection filters.
//
// A corpus is a directory of `*.json` files, one piece each, loaded in file
// name order so training is reproducible. A piece lists its parts by name;
// each part is a list of events:
//
//   {"pitch": "G4", "duration": 1}
//   {"rest": true, "duration": "1/2"}
//   {"chord": ["B3", "D4"], "duration": 0.5}    -- first note only
//
// Zero-length events (grace notes) carry no time and would stall the
// synchronizer's counters, so they are dropped at load time.
//
// Only pieces whose parts are exactly Soprano, Alto, Tenor and Bass, whose
// time signature matches the filter, and (optionally) whose key mode
// matches, are handed to training.

use crate::error::{Error, Result};
use crate::event::{Duration, Event, Symbol};
use crate::voice::{VoiceId, VoiceMap};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A lazily consumed, single-pass stream of one voice's events.
pub type VoiceStream<'a> = Box<dyn Iterator<Item = Event> + Send + 'a>;

/// Anything that can hand out the four voice streams of one piece.
pub trait VoiceSource {
    fn id(&self) -> &str;

    fn events(&self, voice: VoiceId) -> VoiceStream<'_>;

    fn voice_streams(&self) -> VoiceMap<VoiceStream<'_>> {
        VoiceMap::from_fn(|voice| self.events(voice))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeySignature {
    pub tonic: String,
    pub mode: String,
}

/// One event as written in a piece file.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    pitch: Option<String>,
    #[serde(default)]
    chord: Option<Vec<String>>,
    #[serde(default)]
    rest: bool,
    duration: RawDuration,
}

/// Like `Duration`, but zero is allowed so grace notes can be recognized.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Integer(u64),
    Float(f64),
    Text(String),
}

impl RawDuration {
    /// `Ok(None)` for a zero-length event.
    fn resolve(&self) -> std::result::Result<Option<Duration>, String> {
        let text = match self {
            RawDuration::Integer(n) => n.to_string(),
            RawDuration::Float(x) => x.to_string(),
            RawDuration::Text(s) => s.clone(),
        };
        let text = text.trim();
        let numerator = text.split_once('/').map_or(text, |(n, _)| n.trim());
        if numerator.contains('0') && numerator.chars().all(|c| c == '0' || c == '.') {
            return Ok(None);
        }
        text.parse().map(Some).map_err(|e: Error| e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RawPart {
    name: String,
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawPiece {
    id: String,
    #[serde(default)]
    title: Option<String>,
    time_signature: String,
    #[serde(default)]
    key: Option<KeySignature>,
    parts: Vec<RawPart>,
}

/// A named part and its parsed events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub events: Vec<Event>,
}

/// One piece of the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub id: String,
    pub title: Option<String>,
    pub time_signature: String,
    pub key: Option<KeySignature>,
    pub parts: Vec<Part>,
    pub source: PathBuf,
}

impl Piece {
    pub fn from_json(json: &str, source: &Path) -> Result<Self> {
        let raw: RawPiece = serde_json::from_str(json).map_err(|e| Error::json(source, e))?;
        let corpus_error = |message: String| Error::Corpus {
            path: source.to_path_buf(),
            message,
        };

        let mut parts = Vec::with_capacity(raw.parts.len());
        for part in raw.parts {
            let mut events = Vec::with_capacity(part.events.len());
            for (i, raw_event) in part.events.iter().enumerate() {
                match parse_event(raw_event) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => {
                        debug!(piece = %raw.id, part = %part.name, index = i, "skipping zero-length event");
                    }
                    Err(message) => {
                        return Err(corpus_error(format!(
                            "part {} event {}: {}",
                            part.name, i, message
                        )));
                    }
                }
            }
            parts.push(Part {
                name: part.name,
                events,
            });
        }

        Ok(Piece {
            id: raw.id,
            title: raw.title,
            time_signature: raw.time_signature,
            key: raw.key,
            parts,
            source: source.to_path_buf(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json(&data, path)
    }

    pub fn part(&self, voice: VoiceId) -> Option<&Part> {
        self.parts
            .iter()
            .find(|p| VoiceId::from_part_name(&p.name) == Some(voice))
    }

    /// True when the parts are exactly the four SATB voices, once each.
    pub fn has_satb_parts(&self) -> bool {
        let mut seen = [false; 4];
        for part in &self.parts {
            match VoiceId::from_part_name(&part.name) {
                Some(voice) if !seen[voice.index()] => seen[voice.index()] = true,
                _ => return false,
            }
        }
        seen.iter().all(|&s| s)
    }

    pub fn mode(&self) -> Option<&str> {
        self.key.as_ref().map(|k| k.mode.as_str())
    }
}

impl VoiceSource for Piece {
    fn id(&self) -> &str {
        &self.id
    }

    fn events(&self, voice: VoiceId) -> VoiceStream<'_> {
        match self.part(voice) {
            Some(part) => Box::new(part.events.iter().copied()),
            None => Box::new(std::iter::empty()),
        }
    }
}

fn parse_event(raw: &RawEvent) -> std::result::Result<Option<Event>, String> {
    let Some(duration) = raw.duration.resolve()? else {
        return Ok(None);
    };
    let symbol = if raw.rest {
        Symbol::Rest
    } else if let Some(pitch) = &raw.pitch {
        pitch.parse().map_err(|e: Error| e.to_string())?
    } else if let Some(first) = raw.chord.as_ref().and_then(|c| c.first()) {
        first.parse().map_err(|e: Error| e.to_string())?
    } else {
        return Err("event has no pitch, chord or rest".into());
    };
    Ok(Some(Event::new(symbol, duration)))
}

/// Which pieces take part in training.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFilter {
    pub time_signature: String,
    pub mode: Option<String>,
}

impl Default for CorpusFilter {
    fn default() -> Self {
        CorpusFilter {
            time_signature: "4/4".into(),
            mode: None,
        }
    }
}

impl CorpusFilter {
    pub fn accepts(&self, piece: &Piece) -> bool {
        if !piece.has_satb_parts() {
            return false;
        }
        if piece.time_signature.trim() != self.time_signature.trim() {
            return false;
        }
        match &self.mode {
            Some(mode) => piece
                .mode()
                .is_some_and(|m| m.eq_ignore_ascii_case(mode.trim())),
            None => true,
        }
    }
}

impl fmt::Display for CorpusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SATB parts, time signature {}", self.time_signature)?;
        if let Some(mode) = &self.mode {
            write!(f, ", mode {mode}")?;
        }
        Ok(())
    }
}

/// All pieces found in a corpus directory.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub root: PathBuf,
    pub pieces: Vec<Piece>,
}

impl Corpus {
    /// Load every `*.json` file directly inside `dir`, in file name order.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| Error::io(dir, e))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let pieces = paths
            .iter()
            .map(|p| Piece::load(p))
            .collect::<Result<Vec<_>>>()?;
        info!(corpus = %dir.display(), pieces = pieces.len(), "loaded corpus");
        Ok(Corpus {
            root: dir.to_path_buf(),
            pieces,
        })
    }

    /// The pieces passing `filter`, in corpus order.
    pub fn select(&self, filter: &CorpusFilter) -> Result<Vec<&Piece>> {
        let selected: Vec<&Piece> = self.pieces.iter().filter(|p| filter.accepts(p)).collect();
        if selected.is_empty() {
            return Err(Error::CorpusFilterEmpty {
                corpus: self.root.clone(),
                filter: filter.to_string(),
            });
        }
        info!(selected = selected.len(), total = self.pieces.len(), %filter, "filtered corpus");
        Ok(selected)
    }
}
