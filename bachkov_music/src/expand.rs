// Expansion: a walk of joint states back into four independent voices.
//
// The expander is the synchronizer run backwards. It keeps the same
// per-voice counters and asks the same question at every step, via
// `sync::behind_voices`: which voices are due to advance? Only those voices
// get the state's event appended to their timeline. The other voices'
// events in the state are held-over values from an earlier step and are
// ignored, even when a genuinely new event would look identical (a repeated
// note), because the counters rather than the event values decide.
//
// A generated walk can stop anywhere, so the four timelines need not end at
// the same time. Rendering pads nothing; the notation sinks draw exactly
// what the expander produced.

use crate::error::MalformedToken;
use crate::event::{Beats, Event};
use crate::sync::behind_voices;
use crate::token::{self, JointState};
use crate::voice::{VoiceId, VoiceMap};
use tracing::warn;

/// One voice's events in order, starting at beat zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoiceTimeline {
    pub events: Vec<Event>,
}

impl VoiceTimeline {
    pub fn total(&self) -> Beats {
        self.events
            .iter()
            .fold(Beats::from_integer(0), |acc, e| acc + e.duration.beats())
    }

    /// Events paired with their onset, in quarter lengths from the start.
    pub fn with_onsets(&self) -> impl Iterator<Item = (Beats, &Event)> {
        self.events.iter().scan(Beats::from_integer(0), |onset, event| {
            let start = *onset;
            *onset += event.duration.beats();
            Some((start, event))
        })
    }
}

/// Four voice timelines ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Score {
    pub voices: VoiceMap<VoiceTimeline>,
}

impl Score {
    pub fn voice(&self, voice: VoiceId) -> &VoiceTimeline {
        &self.voices[voice]
    }

    /// Timelines in layering rank order.
    pub fn layered(&self) -> impl Iterator<Item = (VoiceId, &VoiceTimeline)> {
        let mut parts: Vec<_> = self.voices.iter().collect();
        parts.sort_by_key(|(voice, _)| voice.rank());
        parts.into_iter()
    }

    /// Length of the longest voice.
    pub fn total(&self) -> Beats {
        self.voices
            .values()
            .map(VoiceTimeline::total)
            .max()
            .unwrap_or(Beats::from_integer(0))
    }

    pub fn event_count(&self) -> usize {
        self.voices.values().map(|t| t.events.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.event_count() == 0
    }
}

/// Incremental inverse of the synchronizer.
#[derive(Debug, Clone)]
pub struct Expander {
    counters: VoiceMap<Beats>,
    score: Score,
}

impl Default for Expander {
    fn default() -> Self {
        Self::new()
    }
}

impl Expander {
    pub fn new() -> Self {
        Expander {
            counters: VoiceMap([Beats::from_integer(0); 4]),
            score: Score::default(),
        }
    }

    /// Apply one joint state, appending events for the behind voices only.
    pub fn push(&mut self, state: &JointState) {
        for voice in behind_voices(&self.counters).iter() {
            let event = *state.event(voice);
            self.counters[voice] += event.duration.beats();
            self.score.voices[voice].events.push(event);
        }
    }

    pub fn counters(&self) -> &VoiceMap<Beats> {
        &self.counters
    }

    pub fn finish(self) -> Score {
        self.score
    }
}

/// Expand a complete sequence of joint states into a score.
pub fn expand<'a>(states: impl IntoIterator<Item = &'a JointState>) -> Score {
    let mut expander = Expander::new();
    for state in states {
        expander.push(state);
    }
    expander.finish()
}

/// Decode a walk of tokens into joint states.
///
/// A malformed first token means the model is unusable and is returned as
/// an error. A malformed later token ends the walk there; everything before
/// it is kept.
pub fn decode_walk<S: AsRef<str>>(
    tokens: impl IntoIterator<Item = S>,
) -> Result<Vec<JointState>, MalformedToken> {
    let mut states = Vec::new();
    for (i, token) in tokens.into_iter().enumerate() {
        match token::decode(token.as_ref()) {
            Ok(state) => states.push(state),
            Err(e) if i == 0 => return Err(e),
            Err(e) => {
                warn!(step = i, error = %e, "truncating walk at malformed token");
                break;
            }
        }
    }
    Ok(states)
}
