// LilyPond sheet music output from expanded scores.
//
// Converts a Score into a LilyPond (.ly) file with one staff per voice in a
// ChoirStaff, in layering order. The work is duration spelling: LilyPond
// wants power-of-two note values (optionally dotted), so each event is first
// split at barlines and each fragment is then decomposed into tied values.
// Triplet-based fragments are spelled inside `\tuplet 3/2`. Anything finer
// is rounded to the nearest sixty-fourth with a warning.
//
// Uses absolute pitches (not \relative) for simplicity and correctness.

use crate::error::{Error, Result};
use crate::event::{Beats, Pitch, Symbol};
use crate::expand::{Score, VoiceTimeline};
use std::fmt::Write;
use std::path::Path;
use tracing::warn;

/// Spellable note values in quarter lengths, largest first.
const DURATION_TABLE: [((u64, u64), &str); 12] = [
    ((4, 1), "1"),
    ((3, 1), "2."),
    ((2, 1), "2"),
    ((3, 2), "4."),
    ((1, 1), "4"),
    ((3, 4), "8."),
    ((1, 2), "8"),
    ((3, 8), "16."),
    ((1, 4), "16"),
    ((3, 16), "32."),
    ((1, 8), "32"),
    ((1, 16), "64"),
];

/// Smallest value the decomposition falls back to.
const FINEST: (u64, u64) = (1, 16);

/// One engraved note value; `tuplet` values sit inside `\tuplet 3/2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LyDuration {
    pub text: &'static str,
    pub tuplet: bool,
}

fn ratio((n, d): (u64, u64)) -> Beats {
    Beats::new(n, d)
}

/// Convert a pitch to a LilyPond absolute pitch string.
///
/// LilyPond's `c` with no octave marks is C3; each `'` raises one octave
/// and each `,` lowers one.
pub fn pitch_to_ly(pitch: Pitch) -> String {
    let mut out = pitch.step().to_ascii_lowercase().to_string();
    let accidental = if pitch.alter() > 0 { "is" } else { "es" };
    for _ in 0..pitch.alter().unsigned_abs() {
        out.push_str(accidental);
    }
    let marks = pitch.octave() as i32 - 3;
    let mark = if marks > 0 { '\'' } else { ',' };
    for _ in 0..marks.unsigned_abs() {
        out.push(mark);
    }
    out
}

/// Greedy decomposition into table values. Returns the remainder.
fn greedy(mut beats: Beats, out: &mut Vec<&'static str>) -> Beats {
    for &(value, name) in &DURATION_TABLE {
        let value = ratio(value);
        while beats >= value {
            out.push(name);
            beats -= value;
        }
    }
    beats
}

fn is_dyadic(beats: Beats) -> bool {
    beats.denom().is_power_of_two()
}

/// Decompose a duration into LilyPond note values, largest first. Multiple
/// parts are connected with ties by the caller.
pub fn decompose_duration(beats: Beats) -> Vec<LyDuration> {
    let mut names = Vec::new();
    if *beats.numer() == 0 {
        return Vec::new();
    }

    if is_dyadic(beats) {
        let rest = greedy(beats, &mut names);
        if *rest.numer() == 0 {
            return names.into_iter().map(|text| LyDuration { text, tuplet: false }).collect();
        }
        names.clear();
    }

    // Triplets: 2/3 of the written value.
    let written = beats * Beats::new(3, 2);
    if is_dyadic(written) {
        let rest = greedy(written, &mut names);
        if *rest.numer() == 0 {
            return names.into_iter().map(|text| LyDuration { text, tuplet: true }).collect();
        }
        names.clear();
    }

    let finest = ratio(FINEST);
    let steps = (beats / finest).round().to_integer().max(1);
    warn!(%beats, "rounding unspellable duration to sixty-fourths");
    greedy(finest * Beats::from_integer(steps), &mut names);
    names.into_iter().map(|text| LyDuration { text, tuplet: false }).collect()
}

/// Length of one bar in quarter lengths for a time signature like `"3/4"`.
pub fn measure_length(time_signature: &str) -> Option<Beats> {
    let (n, d) = time_signature.trim().split_once('/')?;
    let n: u64 = n.trim().parse().ok()?;
    let d: u64 = d.trim().parse().ok()?;
    if n == 0 || d == 0 {
        return None;
    }
    Some(Beats::new(n * 4, d))
}

/// Split a duration at barlines.
///
/// A note starting at `start` that crosses one or more barlines is split
/// into pieces that each fit within a single bar.
pub fn split_at_barlines(start: Beats, duration: Beats, bar: Beats) -> Vec<Beats> {
    let mut fragments = Vec::new();
    let mut remaining = duration;
    let mut pos = start;

    while *remaining.numer() > 0 {
        let bar_end = ((pos / bar).floor() + Beats::from_integer(1)) * bar;
        let frag = remaining.min(bar_end - pos);
        fragments.push(frag);
        remaining -= frag;
        pos += frag;
    }
    fragments
}

/// Render a single voice as a LilyPond music expression.
fn render_voice_music(timeline: &VoiceTimeline, bar: Beats) -> String {
    let mut out = String::new();

    for (onset, event) in timeline.with_onsets() {
        let head = match event.symbol {
            Symbol::Pitch(p) => pitch_to_ly(p),
            Symbol::Rest => "r".to_string(),
        };
        let parts: Vec<LyDuration> = split_at_barlines(onset, event.duration.beats(), bar)
            .into_iter()
            .flat_map(decompose_duration)
            .collect();

        for (i, part) in parts.iter().enumerate() {
            if !out.is_empty() {
                out.push(' ');
            }
            let tie = if !event.symbol.is_rest() && i + 1 < parts.len() { "~" } else { "" };
            if part.tuplet {
                let _ = write!(out, "\\tuplet 3/2 {{ {}{}{} }}", head, part.text, tie);
            } else {
                let _ = write!(out, "{}{}{}", head, part.text, tie);
            }
        }
    }

    out
}

/// Engraving parameters for a generated score.
#[derive(Debug, Clone)]
pub struct LilyPondOptions {
    pub title: String,
    pub time_signature: String,
    pub tempo_bpm: u16,
}

/// Generate a complete LilyPond file from a Score.
pub fn score_to_lilypond(score: &Score, options: &LilyPondOptions) -> Result<String> {
    let bar = measure_length(&options.time_signature).ok_or_else(|| {
        Error::InvalidArgument(format!("time signature {:?}", options.time_signature))
    })?;
    let mut ly = String::new();

    ly.push_str("\\version \"2.24.0\"\n\n");
    let _ = write!(
        ly,
        "\\header {{\n  title = \"{}\"\n  tagline = ##f\n}}\n\n",
        options.title.replace('"', "\\\"")
    );
    let _ = write!(
        ly,
        "global = {{\n  \\time {} \\tempo 4 = {}\n}}\n\n",
        options.time_signature.trim(),
        options.tempo_bpm
    );

    for (voice, timeline) in score.layered() {
        let music = render_voice_music(timeline, bar);
        let _ = write!(
            ly,
            "{} = \\absolute {{\n  \\global\n  {}\n}}\n\n",
            voice.part_name().to_lowercase(),
            music
        );
    }

    ly.push_str("\\score {\n  \\new ChoirStaff <<\n");
    for (voice, _) in score.layered() {
        let _ = writeln!(
            ly,
            "    \\new Staff = \"{name}\" \\with {{ instrumentName = \"{label}\" }} {{\n      \\clef {clef}\n      \\{var}\n    }}",
            name = voice.part_name(),
            label = voice.instrument_label(),
            clef = voice.clef(),
            var = voice.part_name().to_lowercase(),
        );
    }
    ly.push_str("  >>\n");
    ly.push_str("  \\layout { }\n");
    ly.push_str("  \\midi { }\n");
    ly.push_str("}\n");

    Ok(ly)
}

/// Write a LilyPond file from a Score.
pub fn write_lilypond(score: &Score, options: &LilyPondOptions, path: &Path) -> Result<()> {
    let ly = score_to_lilypond(score, options)?;
    std::fs::write(path, ly).map_err(|e| Error::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::voice::VoiceId;

    fn b(n: u64, d: u64) -> Beats {
        Beats::new(n, d)
    }

    fn texts(parts: &[LyDuration]) -> Vec<&'static str> {
        parts.iter().map(|p| p.text).collect()
    }

    fn options() -> LilyPondOptions {
        LilyPondOptions {
            title: "Test Piece".into(),
            time_signature: "4/4".into(),
            tempo_bpm: 72,
        }
    }

    #[test]
    fn pitch_names_and_octaves() {
        let ly = |s: &str| pitch_to_ly(s.parse().unwrap());
        assert_eq!(ly("C4"), "c'");
        assert_eq!(ly("C3"), "c");
        assert_eq!(ly("C2"), "c,");
        assert_eq!(ly("C1"), "c,,");
        assert_eq!(ly("C5"), "c''");
        assert_eq!(ly("F#4"), "fis'");
        assert_eq!(ly("B-3"), "bes");
        assert_eq!(ly("E--4"), "eeses'");
    }

    #[test]
    fn decompose_single_values() {
        assert_eq!(texts(&decompose_duration(b(4, 1))), vec!["1"]);
        assert_eq!(texts(&decompose_duration(b(3, 1))), vec!["2."]);
        assert_eq!(texts(&decompose_duration(b(1, 1))), vec!["4"]);
        assert_eq!(texts(&decompose_duration(b(3, 2))), vec!["4."]);
        assert_eq!(texts(&decompose_duration(b(1, 2))), vec!["8"]);
        assert_eq!(texts(&decompose_duration(b(1, 4))), vec!["16"]);
    }

    #[test]
    fn decompose_compound_and_zero() {
        assert_eq!(texts(&decompose_duration(b(5, 2))), vec!["2", "8"]);
        assert_eq!(texts(&decompose_duration(b(7, 2))), vec!["2.", "8"]);
        assert!(decompose_duration(b(0, 1)).is_empty());
    }

    #[test]
    fn decompose_triplets() {
        let parts = decompose_duration(b(1, 3));
        assert_eq!(parts, vec![LyDuration { text: "8", tuplet: true }]);
        let parts = decompose_duration(b(2, 3));
        assert_eq!(parts, vec![LyDuration { text: "4", tuplet: true }]);
    }

    #[test]
    fn decompose_unspellable_rounds() {
        let parts = decompose_duration(b(1, 5));
        assert_eq!(texts(&parts), vec!["32."]);
        assert!(!parts[0].tuplet);
    }

    #[test]
    fn measure_lengths() {
        assert_eq!(measure_length("4/4"), Some(b(4, 1)));
        assert_eq!(measure_length("3/4"), Some(b(3, 1)));
        assert_eq!(measure_length("6/8"), Some(b(3, 1)));
        assert_eq!(measure_length("3/2"), Some(b(6, 1)));
        assert_eq!(measure_length("common"), None);
        assert_eq!(measure_length("0/4"), None);
    }

    #[test]
    fn split_within_and_across_bars() {
        let bar = b(4, 1);
        assert_eq!(split_at_barlines(b(0, 1), b(2, 1), bar), vec![b(2, 1)]);
        assert_eq!(split_at_barlines(b(3, 1), b(2, 1), bar), vec![b(1, 1), b(1, 1)]);
        assert_eq!(
            split_at_barlines(b(2, 1), b(10, 1), bar),
            vec![b(2, 1), b(4, 1), b(4, 1)]
        );
        assert_eq!(split_at_barlines(b(4, 1), b(4, 1), bar), vec![b(4, 1)]);
        assert_eq!(split_at_barlines(b(7, 2), b(1, 1), bar), vec![b(1, 2), b(1, 2)]);
    }

    #[test]
    fn render_ties_across_barline() {
        let timeline = VoiceTimeline {
            events: vec![
                Event::parse("rest", "3").unwrap(),
                Event::parse("C4", "2").unwrap(),
                Event::parse("D4", "3").unwrap(),
            ],
        };
        let music = render_voice_music(&timeline, b(4, 1));
        assert_eq!(music, "r2. c'4~ c'4 d'2.");
    }

    #[test]
    fn rests_are_not_tied() {
        let timeline = VoiceTimeline {
            events: vec![Event::parse("rest", "5/2").unwrap()],
        };
        assert_eq!(render_voice_music(&timeline, b(4, 1)), "r2 r8");
    }

    #[test]
    fn full_file_structure() {
        let mut score = Score::default();
        for (voice, pitch) in VoiceId::ALL.into_iter().zip(["G4", "D4", "B3", "G2"]) {
            score.voices[voice].events = vec![Event::parse(pitch, "4").unwrap()];
        }
        let ly = score_to_lilypond(&score, &options()).unwrap();

        assert!(ly.contains("\\version"));
        assert!(ly.contains("Test Piece"));
        assert!(ly.contains("\\time 4/4"));
        assert!(ly.contains("\\tempo 4 = 72"));
        assert!(ly.contains("ChoirStaff"));
        assert!(ly.contains("instrumentName = \"Tenor\""));
        assert!(ly.contains("\\clef \"treble_8\""));
        assert!(ly.contains("\\clef bass"));
        assert!(ly.contains("g'1"));
        assert!(ly.contains("g,1"));
        let soprano = ly.find("\\new Staff = \"Soprano\"").unwrap();
        let bass = ly.find("\\new Staff = \"Bass\"").unwrap();
        assert!(soprano < bass);
    }

    #[test]
    fn bad_time_signature_is_rejected() {
        let opts = LilyPondOptions {
            time_signature: "C".into(),
            ..options()
        };
        assert!(score_to_lilypond(&Score::default(), &opts).is_err());
    }
}
