// MIDI output from expanded scores.
//
// Converts a Score into a Standard MIDI File (SMF Format 1) for playback.
// Track 0 carries the tempo; each voice gets its own named track on its own
// channel, in layering order.
//
// Event onsets and ends are converted to absolute ticks independently and
// the deltas taken between them, so rounding a triplet to whole ticks never
// accumulates across a long voice.

use crate::error::{Error, Result};
use crate::event::{Beats, Symbol};
use crate::expand::{Score, VoiceTimeline};
use crate::voice::VoiceId;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// Ticks per quarter note in MIDI output.
pub const TICKS_PER_QUARTER: u16 = 480;

/// General MIDI "Choir Aahs".
const CHOIR_PROGRAM: u8 = 52;

const NOTE_VELOCITY: u8 = 80;

/// Slowest tempo whose microseconds-per-quarter fits the 24-bit tempo field.
pub const MIN_TEMPO_BPM: u16 = 4;

/// Convert a Score to MIDI and write it to a file.
pub fn write_midi(score: &Score, tempo_bpm: u16, path: &Path) -> Result<()> {
    let smf = score_to_smf(score, tempo_bpm)?;
    let mut buf = Vec::new();
    smf.write_std(&mut buf).map_err(|e| Error::io(path, e))?;
    std::fs::write(path, &buf).map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Absolute tick of a position in quarter lengths, rounded to nearest.
fn to_ticks(beats: Beats) -> u32 {
    let ticks = beats * Beats::from_integer(TICKS_PER_QUARTER as u64);
    ticks.round().to_integer() as u32
}

/// Convert a Score to an in-memory SMF.
pub fn score_to_smf(score: &Score, tempo_bpm: u16) -> Result<Smf<'static>> {
    if tempo_bpm < MIN_TEMPO_BPM {
        return Err(Error::InvalidArgument(format!(
            "tempo {tempo_bpm} bpm is below the MIDI minimum of {MIN_TEMPO_BPM}"
        )));
    }
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    let tempo_microseconds = 60_000_000 / tempo_bpm as u32;
    smf.tracks.push(vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]);

    for (voice, timeline) in score.layered() {
        smf.tracks.push(voice_track(voice, timeline)?);
    }
    Ok(smf)
}

fn voice_track(voice: VoiceId, timeline: &VoiceTimeline) -> Result<Track<'static>> {
    let channel = u4::new(voice.index() as u8);
    let mut track: Track<'static> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(voice.part_name().as_bytes())),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::new(CHOIR_PROGRAM),
                },
            },
        },
    ];

    let mut last_event_tick: u32 = 0;
    for (onset, event) in timeline.with_onsets() {
        // Rests produce no messages; their time folds into the next delta.
        let Symbol::Pitch(pitch) = event.symbol else {
            continue;
        };
        let key = pitch
            .midi_key()
            .ok_or_else(|| Error::InvalidPitch(pitch.to_string()))?;
        let start = to_ticks(onset);
        let end = to_ticks(onset + event.duration.beats()).max(start);

        track.push(TrackEvent {
            delta: u28::new(start - last_event_tick),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(NOTE_VELOCITY),
                },
            },
        });
        track.push(TrackEvent {
            delta: u28::new(end - start),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff {
                    key: u7::new(key),
                    vel: u7::new(0),
                },
            },
        });
        last_event_tick = end;
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    fn ev(symbol: &str, duration: &str) -> Event {
        Event::parse(symbol, duration).unwrap()
    }

    fn score(parts: [Vec<Event>; 4]) -> Score {
        let mut score = Score::default();
        for (voice, events) in VoiceId::ALL.into_iter().zip(parts) {
            score.voices[voice].events = events;
        }
        score
    }

    fn note_events(track: &Track<'_>) -> Vec<(u32, bool, u8)> {
        track
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, .. },
                    ..
                } => Some((e.delta.as_int(), true, key.as_int())),
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOff { key, .. },
                    ..
                } => Some((e.delta.as_int(), false, key.as_int())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn one_tempo_track_plus_four_voices() {
        let smf = score_to_smf(&score([vec![], vec![], vec![], vec![]]), 80).unwrap();
        assert_eq!(smf.tracks.len(), 5);
    }

    #[test]
    fn tempo_field_limits() {
        let empty = score([vec![], vec![], vec![], vec![]]);
        for bpm in [0, 1, 3] {
            assert!(
                matches!(score_to_smf(&empty, bpm), Err(Error::InvalidArgument(_))),
                "accepted {bpm} bpm"
            );
        }
        let slowest = score_to_smf(&empty, MIN_TEMPO_BPM).unwrap();
        let tempo = slowest.tracks[0].iter().find_map(|e| match e.kind {
            TrackEventKind::Meta(MetaMessage::Tempo(t)) => Some(t.as_int()),
            _ => None,
        });
        assert_eq!(tempo, Some(15_000_000));
    }

    #[test]
    fn rests_fold_into_next_delta() {
        let s = score([
            vec![ev("C4", "1"), ev("rest", "1/2"), ev("E4", "1/2")],
            vec![],
            vec![],
            vec![],
        ]);
        let smf = score_to_smf(&s, 80).unwrap();
        assert_eq!(
            note_events(&smf.tracks[1]),
            vec![(0, true, 60), (480, false, 60), (240, true, 64), (240, false, 64)]
        );
    }

    #[test]
    fn triplets_do_not_drift() {
        let s = score([
            vec![ev("C4", "1/3"), ev("D4", "1/3"), ev("E4", "1/3"), ev("F4", "1")],
            vec![],
            vec![],
            vec![],
        ]);
        let smf = score_to_smf(&s, 80).unwrap();
        let total: u32 = note_events(&smf.tracks[1]).iter().map(|(d, _, _)| d).sum();
        assert_eq!(total, 960);
    }

    #[test]
    fn out_of_range_pitch_is_an_error() {
        let s = score([vec![ev("B9", "1")], vec![], vec![], vec![]]);
        assert!(matches!(score_to_smf(&s, 80), Err(Error::InvalidPitch(_))));
    }

    #[test]
    fn writes_a_parseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mid");
        let s = score([
            vec![ev("G4", "2")],
            vec![ev("D4", "2")],
            vec![ev("B3", "2")],
            vec![ev("G2", "2")],
        ]);
        write_midi(&s, 72, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let parsed = Smf::parse(&bytes).unwrap();
        assert_eq!(parsed.tracks.len(), 5);
    }
}
