// Voice synchronization: four independently paced event streams in, one
// stream of joint states out.
//
// Each voice carries a counter of elapsed quarter lengths. At every step the
// voices whose counter equals the minimum are "behind"; each of them pulls
// its next event and advances by that event's duration, and then a joint
// state is emitted holding every voice's current event. Voices that were
// ahead keep holding their previous event.
//
// `behind_voices` is the one place that rule is written down. The expander
// (expand.rs) replays it on the decode side, so the two stay exact inverses
// as long as both call this function.
//
// Termination: the run ends cleanly when all four counters are equal and all
// four streams are empty. Any other exhaustion means the voices have unequal
// total length, reported as `SyncError::Exhausted`; callers skip the piece.

use crate::error::SyncError;
use crate::event::{Beats, Event};
use crate::token::JointState;
use crate::voice::{VoiceId, VoiceMap, VoiceSet};
use std::iter::Peekable;

/// The voices whose elapsed time equals the minimum across all four.
///
/// Never empty. On a fresh run (all counters zero) this is every voice.
pub fn behind_voices(counters: &VoiceMap<Beats>) -> VoiceSet {
    let min = counters.values().min().copied().unwrap_or(Beats::from_integer(0));
    counters
        .iter()
        .filter(|(_, elapsed)| **elapsed == min)
        .map(|(voice, _)| voice)
        .collect()
}

/// Lazily merges four voice streams into joint states.
///
/// Yields `Ok(JointState)` per step, then `None` on a clean end, or a single
/// `Err(SyncError::Exhausted)` followed by `None` when lengths mismatch.
pub struct Synchronizer<I: Iterator<Item = Event>> {
    streams: VoiceMap<Peekable<I>>,
    counters: VoiceMap<Beats>,
    current: VoiceMap<Option<Event>>,
    finished: bool,
}

impl<I: Iterator<Item = Event>> Synchronizer<I> {
    pub fn new(streams: VoiceMap<I>) -> Self {
        Synchronizer {
            streams: streams.map(|_, s| s.peekable()),
            counters: VoiceMap([Beats::from_integer(0); 4]),
            current: VoiceMap::default(),
            finished: false,
        }
    }

    /// Elapsed quarter lengths per voice after the steps taken so far.
    pub fn counters(&self) -> &VoiceMap<Beats> {
        &self.counters
    }

    /// Decide whether the run is over before pulling anything.
    ///
    /// `Ok(true)` is a clean end, `Err` names the first behind voice that
    /// has nothing left while the piece is not finished.
    fn check_exhaustion(&mut self, behind: VoiceSet) -> Result<bool, SyncError> {
        let mut exhausted = None;
        for voice in behind.iter() {
            if self.streams[voice].peek().is_none() {
                exhausted.get_or_insert(voice);
            }
        }
        let Some(voice) = exhausted else {
            return Ok(false);
        };

        let all_empty = VoiceId::ALL
            .into_iter()
            .all(|v| self.streams[v].peek().is_none());
        if behind.is_all() && all_empty {
            return Ok(true);
        }

        let furthest = self
            .counters
            .values()
            .max()
            .copied()
            .unwrap_or(Beats::from_integer(0));
        Err(SyncError::Exhausted {
            voice,
            elapsed: self.counters[voice],
            furthest,
        })
    }
}

impl<I: Iterator<Item = Event>> Iterator for Synchronizer<I> {
    type Item = Result<JointState, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let behind = behind_voices(&self.counters);
        match self.check_exhaustion(behind) {
            Ok(false) => {}
            Ok(true) => {
                self.finished = true;
                return None;
            }
            Err(e) => {
                self.finished = true;
                return Some(Err(e));
            }
        }

        // Rank order; the emitted state does not depend on it.
        for voice in behind.iter() {
            if let Some(event) = self.streams[voice].next() {
                self.counters[voice] += event.duration.beats();
                self.current[voice] = Some(event);
            }
        }

        // After the first step every voice has an event, because the first
        // step advances all four.
        match self.current.0 {
            [Some(s), Some(a), Some(t), Some(b)] => Some(Ok(JointState::new([s, a, t, b]))),
            _ => {
                self.finished = true;
                None
            }
        }
    }
}

/// Run a synchronizer to completion, collecting every joint state.
pub fn synchronize<I: Iterator<Item = Event>>(
    streams: VoiceMap<I>,
) -> Result<Vec<JointState>, SyncError> {
    Synchronizer::new(streams).collect()
}
