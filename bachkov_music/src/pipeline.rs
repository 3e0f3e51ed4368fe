// The two end-to-end operations: train a model from the corpus, and
// generate a score from a model.
//
// Training: select pieces, synchronize each one into joint-state tokens,
// train the chain, save it atomically. Pieces are independent, so they are
// synchronized on the rayon pool and collected back in corpus order. A
// piece whose voices have unequal lengths is skipped with a warning and
// listed in the report; it never aborts the run.
//
// Generation: load the chain, walk it, decode the walk (a bad first token
// is fatal, a bad later token truncates), expand, and render.

use crate::chain::{Chain, SequenceModel};
use crate::config::Config;
use crate::corpus::{Corpus, CorpusFilter, VoiceSource};
use crate::error::{Error, Result, SyncError};
use crate::expand::{Score, decode_walk, expand};
use crate::sink;
use crate::sync::Synchronizer;
use bachkov_prng::WalkRng;
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{info, warn};

/// Parameters of a training run.
#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub output: PathBuf,
    pub state_size: usize,
    /// Only train on pieces in this key mode (e.g. "major").
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPiece {
    pub id: String,
    pub reason: String,
}

/// What a training run did.
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub pieces_selected: usize,
    pub pieces_trained: usize,
    pub skipped: Vec<SkippedPiece>,
    pub states: usize,
    pub contexts: usize,
}

/// Synchronize one piece and encode every joint state as a token.
pub fn piece_tokens<P: VoiceSource + ?Sized>(piece: &P) -> std::result::Result<Vec<String>, SyncError> {
    Synchronizer::new(piece.voice_streams())
        .map(|state| state.map(|s| s.encode()))
        .collect()
}

/// Turn selected pieces into training runs, skipping the unusable ones.
pub fn training_runs<P: VoiceSource + Sync>(pieces: &[&P]) -> (Vec<Vec<String>>, Vec<SkippedPiece>) {
    let results: Vec<_> = pieces
        .par_iter()
        .map(|piece| (piece.id().to_string(), piece_tokens(*piece)))
        .collect();

    let mut runs = Vec::with_capacity(results.len());
    let mut skipped = Vec::new();
    for (id, result) in results {
        match result {
            Ok(tokens) if tokens.is_empty() => {
                warn!(piece = %id, "skipping piece with no events");
                skipped.push(SkippedPiece {
                    id,
                    reason: "no events".into(),
                });
            }
            Ok(tokens) => runs.push(tokens),
            Err(e) => {
                warn!(piece = %id, error = %e, "skipping piece with unequal voice lengths");
                skipped.push(SkippedPiece {
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }
    (runs, skipped)
}

/// Build and save a model from the configured corpus.
pub fn make_model(config: &Config, options: &ModelOptions) -> Result<TrainingReport> {
    if options.state_size == 0 {
        return Err(Error::InvalidArgument("state size must be at least 1".into()));
    }
    let filter = CorpusFilter {
        time_signature: config.time_signature.clone(),
        mode: options.mode.clone(),
    };
    let corpus = Corpus::load_dir(&config.corpus_dir)?;
    let selected = corpus.select(&filter)?;

    let (runs, skipped) = training_runs(&selected);
    if runs.is_empty() {
        return Err(Error::CorpusFilterEmpty {
            corpus: corpus.root.clone(),
            filter: format!("{filter}; every selected piece was skipped"),
        });
    }

    let chain = Chain::train(&runs, options.state_size)?;
    chain.save(&options.output)?;

    let report = TrainingReport {
        pieces_selected: selected.len(),
        pieces_trained: runs.len(),
        states: runs.iter().map(Vec::len).sum(),
        contexts: chain.len(),
        skipped,
    };
    info!(
        trained = report.pieces_trained,
        skipped = report.skipped.len(),
        states = report.states,
        contexts = report.contexts,
        model = %options.output.display(),
        "model written"
    );
    Ok(report)
}

/// Parameters of a generation run.
#[derive(Debug, Clone)]
pub struct MusicOptions {
    pub model: PathBuf,
    pub seed: Option<u64>,
    /// File name stem for rendered output; defaults to the seed.
    pub stem: Option<String>,
}

/// A generated score and where it was rendered.
#[derive(Debug, Clone)]
pub struct GeneratedMusic {
    pub score: Score,
    pub seed: u64,
    pub states: usize,
    pub files: Vec<PathBuf>,
}

/// Walk a chain and expand the walk into a score.
pub fn generate_score(chain: &Chain, rng: &mut WalkRng, max_steps: Option<usize>) -> Result<(Score, usize)> {
    let states = decode_walk(chain.walk_capped(rng, max_steps))?;
    if states.is_empty() {
        return Err(Error::Model("walk produced no joint states".into()));
    }
    Ok((expand(&states), states.len()))
}

/// Generate music from a saved model, render it, and show it if a viewer
/// is configured.
pub fn make_music(config: &Config, options: &MusicOptions) -> Result<GeneratedMusic> {
    let chain = Chain::load(&options.model)?;
    let (mut rng, seed) = match options.seed {
        Some(seed) => (WalkRng::new(seed), seed),
        None => WalkRng::from_entropy(),
    };
    info!(seed, order = chain.state_size(), "walking chain");

    let (score, states) = generate_score(&chain, &mut rng, config.max_walk_steps)?;
    let stem = options
        .stem
        .clone()
        .unwrap_or_else(|| format!("chorale-{seed}"));
    let files = sink::render_all(&score, config, &stem)?;

    if let (Some(viewer), Some(first)) = (&config.viewer, files.first()) {
        sink::show(viewer, first, config.scratch_dir.as_deref())?;
    }

    Ok(GeneratedMusic {
        score,
        seed,
        states,
        files,
    })
}
