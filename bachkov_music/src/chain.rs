// Finite-order Markov chain over joint-state tokens.
//
// The chorale pipeline only ever sees this through the `SequenceModel`
// trait: train from runs of opaque string symbols, serialize to and from
// JSON, and walk. `Chain` is the implementation, with the usual
// text-generator semantics:
//
// - Each training run is padded on the left with `state_size` BEGIN
//   sentinels and terminated by an END sentinel, so the chain learns how
//   pieces open and how they close.
// - The model maps a context (the last `state_size` symbols, kept as a
//   list so symbols can hold any text) to follower counts. Counts stay integers; sampling uses `WalkRng::weighted_index`.
// - A walk starts from the all-BEGIN context and stops at END, at a context
//   the model has never seen, or at an optional step cap.
//
// Persistence is a single JSON document. Writes go to a `<name>.tmp`
// sibling and are renamed into place, so a crash mid-write never leaves a
// truncated model behind.

use crate::error::{Error, Result};
use bachkov_prng::WalkRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BEGIN: &str = "___BEGIN__";
pub const END: &str = "___END__";

/// Follower symbol -> number of times it was observed.
type TransitionTable = BTreeMap<String, u64>;

/// The narrow interface the pipeline depends on.
pub trait SequenceModel: Sized {
    /// Build a model of the given order from training runs.
    fn train(runs: &[Vec<String>], state_size: usize) -> Result<Self>;

    fn to_json(&self) -> Result<String>;

    fn from_json(json: &str) -> Result<Self>;

    /// Lazily generate one run of symbols, excluding sentinels.
    fn walk<'a>(&'a self, rng: &'a mut WalkRng) -> impl Iterator<Item = String> + 'a;
}

/// Markov chain of fixed order over string symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    state_size: usize,
    model: BTreeMap<Vec<String>, TransitionTable>,
}

/// On-disk layout: a list of `[context, followers]` pairs.
#[derive(Serialize, Deserialize)]
struct ChainJson {
    state_size: usize,
    model: Vec<(Vec<String>, TransitionTable)>,
}

impl Chain {
    pub fn state_size(&self) -> usize {
        self.state_size
    }

    /// Number of distinct contexts in the model.
    pub fn len(&self) -> usize {
        self.model.len()
    }

    pub fn is_empty(&self) -> bool {
        self.model.is_empty()
    }

    /// Follower counts for a context, if it was ever observed.
    pub fn followers(&self, context: &[&str]) -> Option<&BTreeMap<String, u64>> {
        let key: Vec<String> = context.iter().map(|s| s.to_string()).collect();
        self.model.get(&key)
    }

    /// Walk with an upper bound on the number of symbols produced.
    pub fn walk_capped<'a>(
        &'a self,
        rng: &'a mut WalkRng,
        max_steps: Option<usize>,
    ) -> Walk<'a> {
        Walk {
            chain: self,
            rng,
            context: std::iter::repeat_n(BEGIN.to_string(), self.state_size).collect(),
            remaining: max_steps,
            done: false,
        }
    }

    /// Read a model previously written by `save`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let chain = Self::from_json(&data)?;
        debug!(path = %path.display(), contexts = chain.len(), "loaded chain");
        Ok(chain)
    }

    /// Write the model atomically: temp file first, then rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let temp_path = temp_sibling(path);
        if let Err(e) = std::fs::write(&temp_path, json) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(Error::io(&temp_path, e));
        }
        if let Err(e) = std::fs::rename(&temp_path, path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(Error::io(path, e));
        }
        debug!(path = %path.display(), contexts = self.len(), "saved chain");
        Ok(())
    }
}

impl SequenceModel for Chain {
    fn train(runs: &[Vec<String>], state_size: usize) -> Result<Self> {
        if state_size == 0 {
            return Err(Error::InvalidArgument("state size must be at least 1".into()));
        }
        let mut model: BTreeMap<Vec<String>, TransitionTable> = BTreeMap::new();
        for run in runs {
            let padded: Vec<&str> = std::iter::repeat_n(BEGIN, state_size)
                .chain(run.iter().map(String::as_str))
                .chain(std::iter::once(END))
                .collect();
            for window in padded.windows(state_size + 1) {
                let (context, follower) = window.split_at(state_size);
                *model
                    .entry(context.iter().map(|s| s.to_string()).collect())
                    .or_default()
                    .entry(follower[0].to_string())
                    .or_insert(0) += 1;
            }
        }
        Ok(Chain { state_size, model })
    }

    fn to_json(&self) -> Result<String> {
        let doc = ChainJson {
            state_size: self.state_size,
            model: self
                .model
                .iter()
                .map(|(context, table)| (context.clone(), table.clone()))
                .collect(),
        };
        serde_json::to_string(&doc).map_err(|e| Error::Model(e.to_string()))
    }

    fn from_json(json: &str) -> Result<Self> {
        let doc: ChainJson =
            serde_json::from_str(json).map_err(|e| Error::Model(e.to_string()))?;
        if doc.state_size == 0 {
            return Err(Error::Model("state_size must be at least 1".into()));
        }
        let mut model = BTreeMap::new();
        for (context, table) in doc.model {
            if context.len() != doc.state_size {
                return Err(Error::Model(format!(
                    "context of length {} in a chain of order {}",
                    context.len(),
                    doc.state_size
                )));
            }
            model.insert(context, table);
        }
        Ok(Chain {
            state_size: doc.state_size,
            model,
        })
    }

    fn walk<'a>(&'a self, rng: &'a mut WalkRng) -> impl Iterator<Item = String> + 'a {
        self.walk_capped(rng, None)
    }
}

/// A lazily generated run over a `Chain`.
pub struct Walk<'a> {
    chain: &'a Chain,
    rng: &'a mut WalkRng,
    context: Vec<String>,
    remaining: Option<usize>,
    done: bool,
}

impl Iterator for Walk<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                self.done = true;
                return None;
            }
            *remaining -= 1;
        }

        let next = self
            .chain
            .model
            .get(self.context.as_slice())
            .and_then(|table| sample_from_table(table, self.rng));
        match next {
            Some(symbol) if symbol != END => {
                self.context.remove(0);
                self.context.push(symbol.clone());
                Some(symbol)
            }
            _ => {
                self.done = true;
                None
            }
        }
    }
}

/// `model.json` -> `model.json.tmp`, next to the target.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Pick a follower with probability proportional to its count.
fn sample_from_table(table: &TransitionTable, rng: &mut WalkRng) -> Option<String> {
    let weights: Vec<u64> = table.values().copied().collect();
    let index = rng.weighted_index(&weights)?;
    table.keys().nth(index).cloned()
}
