// End-to-end tests over the bundled sample corpus.
//
// The corpus in data/corpus has six pieces: three usable 4/4 SATB pieces
// (two major, one minor), one 3/4 piece, one piece whose alto part stops a
// beat early, and one with an extra continuo part. Each test copies what it
// needs into a temp dir so models and rendered files never land in the
// source tree.

use std::path::{Path, PathBuf};

use bachkov_music::chain::{Chain, SequenceModel};
use bachkov_music::config::{Config, OutputFormat};
use bachkov_music::corpus::{Piece, VoiceSource};
use bachkov_music::error::Error;
use bachkov_music::expand::expand;
use bachkov_music::pipeline::{
    ModelOptions, MusicOptions, generate_score, make_model, make_music, piece_tokens,
};
use bachkov_music::token;
use bachkov_music::voice::VoiceId;
use bachkov_prng::WalkRng;
use pretty_assertions::assert_eq;

fn sample_corpus() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("data/corpus")
}

fn config_in(dir: &Path) -> Config {
    Config {
        corpus_dir: sample_corpus(),
        output_dir: dir.join("out"),
        ..Config::default()
    }
}

fn model_options(dir: &Path, state_size: usize, mode: Option<&str>) -> ModelOptions {
    ModelOptions {
        output: dir.join("model.json"),
        state_size,
        mode: mode.map(String::from),
    }
}

#[test]
fn trains_on_usable_pieces_and_skips_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let report = make_model(&config_in(dir.path()), &model_options(dir.path(), 1, None)).unwrap();

    // 3/4 and continuo pieces are filtered out; the short alto is skipped.
    assert_eq!(report.pieces_selected, 4);
    assert_eq!(report.pieces_trained, 3);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id, "bwv-0005");
    assert!(dir.path().join("model.json").is_file());
    assert!(!dir.path().join("model.json.tmp").exists());
}

#[test]
fn key_mode_narrows_selection() {
    let dir = tempfile::tempdir().unwrap();
    let report = make_model(
        &config_in(dir.path()),
        &model_options(dir.path(), 2, Some("major")),
    )
    .unwrap();
    assert_eq!(report.pieces_selected, 3);
    assert_eq!(report.pieces_trained, 2);

    let chain = Chain::load(&dir.path().join("model.json")).unwrap();
    assert_eq!(chain.state_size(), 2);
    assert_eq!(chain.len(), report.contexts);
}

#[test]
fn unmatched_filter_reports_empty_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let err = make_model(
        &config_in(dir.path()),
        &model_options(dir.path(), 1, Some("dorian")),
    )
    .unwrap_err();
    assert!(matches!(err, Error::CorpusFilterEmpty { .. }), "{err}");
    assert!(!dir.path().join("model.json").exists());
}

#[test]
fn corpus_of_only_skipped_pieces_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = dir.path().join("corpus");
    std::fs::create_dir(&corpus).unwrap();
    std::fs::copy(
        sample_corpus().join("bwv-0005-short-alto.json"),
        corpus.join("only.json"),
    )
    .unwrap();

    let config = Config {
        corpus_dir: corpus,
        ..config_in(dir.path())
    };
    let err = make_model(&config, &model_options(dir.path(), 1, None)).unwrap_err();
    assert!(matches!(err, Error::CorpusFilterEmpty { .. }), "{err}");
}

#[test]
fn deterministic_chain_reproduces_its_only_piece() {
    let piece = Piece::load(&sample_corpus().join("bwv-0003-phrase-in-a-minor.json")).unwrap();
    let tokens = piece_tokens(&piece).unwrap();
    assert_eq!(tokens.len(), 6);
    assert_eq!(
        tokens[3],
        "(('B4', 1), ('E4', 1/2), ('G#3', 1), ('E2', 1))"
    );

    let chain = Chain::train(&[tokens], 1).unwrap();
    let (score, states) = generate_score(&chain, &mut WalkRng::new(99), None).unwrap();
    assert_eq!(states, 6);
    for voice in VoiceId::ALL {
        let original: Vec<_> = piece.events(voice).collect();
        assert_eq!(score.voice(voice).events, original, "{voice}");
    }
}

#[test]
fn every_generated_state_was_seen_in_training() {
    let dir = tempfile::tempdir().unwrap();
    make_model(&config_in(dir.path()), &model_options(dir.path(), 1, None)).unwrap();
    let chain = Chain::load(&dir.path().join("model.json")).unwrap();
    let json = chain.to_json().unwrap();

    for seed in 0..8 {
        let mut rng = WalkRng::new(seed);
        for step in chain.walk_capped(&mut rng, Some(500)) {
            let state = token::decode(&step).unwrap();
            assert!(json.contains(&state.encode()), "seed {seed}: {step}");
        }
    }
}

#[test]
fn make_music_renders_and_is_seed_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    make_model(&config, &model_options(dir.path(), 2, None)).unwrap();

    let options = MusicOptions {
        model: dir.path().join("model.json"),
        seed: Some(7),
        stem: Some("first".into()),
    };
    let first = make_music(&config, &options).unwrap();
    assert_eq!(first.seed, 7);
    assert_eq!(first.files.len(), 2);
    assert!(first.files.iter().all(|p| p.is_file()));
    let ly = std::fs::read_to_string(config.output_dir.join("first.ly")).unwrap();
    assert!(ly.contains("ChoirStaff"));

    let again = make_music(
        &config,
        &MusicOptions {
            stem: Some("second".into()),
            ..options
        },
    )
    .unwrap();
    assert_eq!(again.score, first.score);
}

#[test]
fn expand_of_a_training_walk_matches_synchronized_input() {
    let piece = Piece::load(&sample_corpus().join("bwv-0002-phrase-in-c.json")).unwrap();
    let states: Vec<_> = piece_tokens(&piece)
        .unwrap()
        .iter()
        .map(|t| token::decode(t).unwrap())
        .collect();
    let score = expand(&states);
    for voice in VoiceId::ALL {
        let original: Vec<_> = piece.events(voice).collect();
        assert_eq!(score.voice(voice).events, original, "{voice}");
    }
}

#[test]
fn midi_only_config_writes_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        formats: vec![OutputFormat::Midi],
        ..config_in(dir.path())
    };
    make_model(&config, &model_options(dir.path(), 1, None)).unwrap();
    let music = make_music(
        &config,
        &MusicOptions {
            model: dir.path().join("model.json"),
            seed: Some(1),
            stem: None,
        },
    )
    .unwrap();
    assert_eq!(music.files, vec![config.output_dir.join("chorale-1.mid")]);
}
