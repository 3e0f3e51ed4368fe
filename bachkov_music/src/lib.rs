// Bachkov: four-voice chorales through a joint-state Markov chain.
//
// Training reads SATB pieces from a corpus, steps the four voices forward
// together so every onset in any voice becomes one joint state, encodes
// each state as a text token, and counts token transitions. Generation
// walks the chain, decodes the tokens, and expands the joint states back
// into four independent voice timelines that can be rendered.
//
// Architecture:
// - voice.rs: The four voices and per-voice containers (VoiceMap, VoiceSet)
// - event.rs: Pitches, rests, exact rational durations, events
// - sync.rs: Steps four voice streams into joint states
// - token.rs: Joint-state token encode/decode
// - expand.rs: Joint states back into per-voice timelines (the inverse of sync)
// - chain.rs: Order-n Markov chain over tokens, JSON persistence
// - corpus.rs: Piece files, the corpus directory, and corpus filters
// - pipeline.rs: make_model (corpus to chain) and make_music (chain to score)
// - midi.rs: MIDI file output from scores
// - lilypond.rs: LilyPond sheet music output (.ly files for engraving)
// - sink.rs: Output formats and the external viewer
// - config.rs: JSON run configuration
// - error.rs: Crate error type
//
// Generation is deterministic given a seed.

pub mod chain;
pub mod config;
pub mod corpus;
pub mod error;
pub mod event;
pub mod expand;
pub mod lilypond;
pub mod midi;
pub mod pipeline;
pub mod sink;
pub mod sync;
pub mod token;
pub mod voice;
