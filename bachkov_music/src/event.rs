// Notated events: a pitch or rest held for an exact duration.
//
// Durations are quarter-length rationals (`Ratio<u64>`), never floats. A
// chorale can run to several hundred events per voice, and the synchronizer
// compares cumulative sums for exact equality, so any rounding drift would
// change which voices count as "behind" and break the encode/decode
// symmetry.
//
// Pitch spelling follows the corpus convention: step letter, accidentals
// (`#` sharp, `-` flat; `b` is accepted as a flat on input), octave number.
// "C4" is middle C.

use crate::error::{Error, Result};
use num_rational::Ratio;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Elapsed musical time in quarter lengths. Unlike `Duration` it may be zero.
pub type Beats = Ratio<u64>;

/// Longest decimal fraction accepted when parsing `"0.125"`-style durations.
const MAX_DECIMAL_DIGITS: usize = 18;

// ---------------------------------------------------------------------------
// Duration
// ---------------------------------------------------------------------------

/// A strictly positive exact duration in quarter lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(Ratio<u64>);

impl Duration {
    /// `numer / denom` quarter lengths. `None` if either part is zero.
    pub fn new(numer: u64, denom: u64) -> Option<Self> {
        if numer == 0 || denom == 0 {
            return None;
        }
        Some(Duration(Ratio::new(numer, denom)))
    }

    /// A whole number of quarter notes.
    pub fn quarters(n: u64) -> Option<Self> {
        Duration::new(n, 1)
    }

    pub fn from_beats(beats: Beats) -> Option<Self> {
        if *beats.numer() == 0 {
            None
        } else {
            Some(Duration(beats))
        }
    }

    pub fn beats(self) -> Beats {
        self.0
    }

    pub fn numer(self) -> u64 {
        *self.0.numer()
    }

    pub fn denom(self) -> u64 {
        *self.0.denom()
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denom() == 1 {
            write!(f, "{}", self.numer())
        } else {
            write!(f, "{}/{}", self.numer(), self.denom())
        }
    }
}

impl FromStr for Duration {
    type Err = Error;

    /// Accepts `"2"`, `"3/2"` and finite decimals such as `"0.75"`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidDuration(s.to_string());
        let text = s.trim();
        let ratio = if let Some((n, d)) = text.split_once('/') {
            let n: u64 = parse_digits(n).ok_or_else(invalid)?;
            let d: u64 = parse_digits(d).ok_or_else(invalid)?;
            if d == 0 {
                return Err(invalid());
            }
            Ratio::new(n, d)
        } else if let Some((whole, frac)) = text.split_once('.') {
            if frac.len() > MAX_DECIMAL_DIGITS || (whole.is_empty() && frac.is_empty()) {
                return Err(invalid());
            }
            let whole = if whole.is_empty() { 0 } else { parse_digits(whole).ok_or_else(invalid)? };
            let frac_value = if frac.is_empty() { 0 } else { parse_digits(frac).ok_or_else(invalid)? };
            let scale = 10u64.pow(frac.len() as u32);
            let numer = whole
                .checked_mul(scale)
                .and_then(|w| w.checked_add(frac_value))
                .ok_or_else(invalid)?;
            Ratio::new(numer, scale)
        } else {
            Ratio::from_integer(parse_digits(text).ok_or_else(invalid)?)
        };
        Duration::from_beats(ratio).ok_or_else(invalid)
    }
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Integer(u64),
            Float(f64),
            Text(String),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Integer(n) => n.to_string(),
            Raw::Float(x) => x.to_string(),
            Raw::Text(s) => s,
        };
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Pitch and symbol
// ---------------------------------------------------------------------------

/// A spelled pitch: step letter, alteration in semitones, octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pitch {
    step: char,
    alter: i8,
    octave: u8,
}

impl Pitch {
    /// `step` is an uppercase letter A–G; `alter` is in [-4, 4].
    pub fn new(step: char, alter: i8, octave: u8) -> Option<Self> {
        if !('A'..='G').contains(&step) || !(-4..=4).contains(&alter) {
            return None;
        }
        Some(Pitch { step, alter, octave })
    }

    pub fn step(self) -> char {
        self.step
    }

    pub fn alter(self) -> i8 {
        self.alter
    }

    pub fn octave(self) -> u8 {
        self.octave
    }

    /// Semitone offset of the step letter above C.
    fn step_semitones(self) -> i32 {
        match self.step {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            _ => 11,
        }
    }

    /// MIDI key number (C4 = 60), or `None` outside 0–127.
    pub fn midi_key(self) -> Option<u8> {
        let key = (self.octave as i32 + 1) * 12 + self.step_semitones() + self.alter as i32;
        u8::try_from(key).ok().filter(|k| *k <= 127)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.step)?;
        let mark = if self.alter > 0 { '#' } else { '-' };
        for _ in 0..self.alter.unsigned_abs() {
            write!(f, "{mark}")?;
        }
        write!(f, "{}", self.octave)
    }
}

impl FromStr for Pitch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidPitch(s.to_string());
        let mut chars = s.chars();
        let step = chars.next().ok_or_else(invalid)?.to_ascii_uppercase();
        let rest = chars.as_str();

        let mut alter: i8 = 0;
        let mut digits_start = rest.len();
        for (i, c) in rest.char_indices() {
            match c {
                '#' => alter += 1,
                '-' | 'b' => alter -= 1,
                _ => {
                    digits_start = i;
                    break;
                }
            }
            if alter.abs() > 4 {
                return Err(invalid());
            }
        }
        let octave = parse_digits(&rest[digits_start..])
            .and_then(|o| u8::try_from(o).ok())
            .ok_or_else(invalid)?;
        Pitch::new(step, alter, octave).ok_or_else(invalid)
    }
}

/// What sounds for the length of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Pitch(Pitch),
    Rest,
}

impl Symbol {
    pub const REST_NAME: &'static str = "rest";

    pub fn is_rest(self) -> bool {
        matches!(self, Symbol::Rest)
    }

    pub fn pitch(self) -> Option<Pitch> {
        match self {
            Symbol::Pitch(p) => Some(p),
            Symbol::Rest => None,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Pitch(p) => p.fmt(f),
            Symbol::Rest => f.write_str(Self::REST_NAME),
        }
    }
}

impl FromStr for Symbol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case(Self::REST_NAME) {
            Ok(Symbol::Rest)
        } else {
            s.parse().map(Symbol::Pitch)
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// One notated sound or silence in a single voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event {
    pub symbol: Symbol,
    pub duration: Duration,
}

impl Event {
    pub fn new(symbol: Symbol, duration: Duration) -> Self {
        Event { symbol, duration }
    }

    /// Parse both halves from their text forms, e.g. `("F#4", "3/2")`.
    pub fn parse(symbol: &str, duration: &str) -> Result<Self> {
        Ok(Event {
            symbol: symbol.parse()?,
            duration: duration.parse()?,
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbol, self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parses_integers_fractions_and_decimals() {
        assert_eq!("2".parse::<Duration>().unwrap(), Duration::quarters(2).unwrap());
        assert_eq!("3/2".parse::<Duration>().unwrap(), Duration::new(3, 2).unwrap());
        assert_eq!("1.5".parse::<Duration>().unwrap(), Duration::new(3, 2).unwrap());
        assert_eq!("0.25".parse::<Duration>().unwrap(), Duration::new(1, 4).unwrap());
        assert_eq!(".5".parse::<Duration>().unwrap(), Duration::new(1, 2).unwrap());
        assert_eq!("2/6".parse::<Duration>().unwrap(), Duration::new(1, 3).unwrap());
    }

    #[test]
    fn duration_rejects_zero_and_garbage() {
        for bad in ["0", "0/4", "1/0", "", "-1", "abc", "1/2/3", "1.2.3", "."] {
            assert!(bad.parse::<Duration>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn duration_display_is_lowest_terms() {
        assert_eq!(Duration::new(4, 2).unwrap().to_string(), "2");
        assert_eq!(Duration::new(6, 4).unwrap().to_string(), "3/2");
    }

    #[test]
    fn thirds_sum_exactly() {
        let third = Duration::new(1, 3).unwrap().beats();
        assert_eq!(third + third + third, Beats::from_integer(1));
    }

    #[test]
    fn duration_deserializes_from_json_numbers_and_strings() {
        let ds: Vec<Duration> = serde_json::from_str(r#"[1, 0.5, "1/3", "2"]"#).unwrap();
        assert_eq!(
            ds,
            vec![
                Duration::quarters(1).unwrap(),
                Duration::new(1, 2).unwrap(),
                Duration::new(1, 3).unwrap(),
                Duration::quarters(2).unwrap(),
            ]
        );
        assert!(serde_json::from_str::<Duration>("0").is_err());
    }

    #[test]
    fn pitch_parse_and_canonical_display() {
        assert_eq!("C4".parse::<Pitch>().unwrap().to_string(), "C4");
        assert_eq!("F#3".parse::<Pitch>().unwrap().to_string(), "F#3");
        assert_eq!("B-3".parse::<Pitch>().unwrap().to_string(), "B-3");
        assert_eq!("Bb3".parse::<Pitch>().unwrap().to_string(), "B-3");
        assert_eq!("E--5".parse::<Pitch>().unwrap().alter(), -2);
    }

    #[test]
    fn pitch_rejects_malformed_names() {
        for bad in ["", "H4", "C", "C#", "4C", "C#x4", "C#####4", "C300"] {
            assert!(bad.parse::<Pitch>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn midi_keys() {
        assert_eq!("C4".parse::<Pitch>().unwrap().midi_key(), Some(60));
        assert_eq!("A4".parse::<Pitch>().unwrap().midi_key(), Some(69));
        assert_eq!("B-3".parse::<Pitch>().unwrap().midi_key(), Some(58));
        assert_eq!("C-0".parse::<Pitch>().unwrap().midi_key(), Some(11));
        assert_eq!("G9".parse::<Pitch>().unwrap().midi_key(), Some(127));
        assert_eq!("A9".parse::<Pitch>().unwrap().midi_key(), None);
    }

    #[test]
    fn symbol_rest_and_pitch() {
        assert_eq!("rest".parse::<Symbol>().unwrap(), Symbol::Rest);
        assert!("D5".parse::<Symbol>().unwrap().pitch().is_some());
        assert_eq!(Symbol::Rest.to_string(), "rest");
    }
}
