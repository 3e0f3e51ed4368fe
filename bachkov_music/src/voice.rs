// Voice identity and per-voice containers.
//
// A chorale has exactly four voices. `VoiceId` names them and fixes their
// rank (Soprano < Alto < Tenor < Bass). The rank decides output layering and
// the order in which tied voices are advanced; it never decides which voices
// advance, which is purely a function of elapsed duration (see sync.rs).
//
// `VoiceMap<T>` holds one value per voice, indexed by `VoiceId`. `VoiceSet`
// is the result type of the "which voices are behind" rule.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// One of the four fixed voice parts, in SATB rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VoiceId {
    Soprano = 0,
    Alto = 1,
    Tenor = 2,
    Bass = 3,
}

impl VoiceId {
    pub const ALL: [VoiceId; 4] = [VoiceId::Soprano, VoiceId::Alto, VoiceId::Tenor, VoiceId::Bass];

    pub fn index(self) -> usize {
        self as usize
    }

    /// 1-based layering rank used when inserting parts into a score.
    pub fn rank(self) -> u8 {
        self as u8 + 1
    }

    /// The part name a corpus piece uses for this voice.
    pub fn part_name(self) -> &'static str {
        match self {
            VoiceId::Soprano => "Soprano",
            VoiceId::Alto => "Alto",
            VoiceId::Tenor => "Tenor",
            VoiceId::Bass => "Bass",
        }
    }

    /// Look up a voice by its corpus part name (case-insensitive).
    pub fn from_part_name(name: &str) -> Option<VoiceId> {
        VoiceId::ALL
            .into_iter()
            .find(|v| v.part_name().eq_ignore_ascii_case(name.trim()))
    }

    /// Instrument label printed on the staff.
    pub fn instrument_label(self) -> &'static str {
        self.part_name()
    }

    /// LilyPond clef for this voice's staff.
    pub fn clef(self) -> &'static str {
        match self {
            VoiceId::Soprano | VoiceId::Alto => "treble",
            VoiceId::Tenor => "\"treble_8\"",
            VoiceId::Bass => "bass",
        }
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.part_name())
    }
}

/// One value per voice, indexed by `VoiceId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VoiceMap<T>(pub [T; 4]);

impl<T> VoiceMap<T> {
    pub fn from_fn(mut f: impl FnMut(VoiceId) -> T) -> Self {
        VoiceMap(VoiceId::ALL.map(&mut f))
    }

    pub fn map<U>(self, mut f: impl FnMut(VoiceId, T) -> U) -> VoiceMap<U> {
        let mut i = 0;
        VoiceMap(self.0.map(|value| {
            let voice = VoiceId::ALL[i];
            i += 1;
            f(voice, value)
        }))
    }

    /// Iterate `(voice, value)` pairs in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (VoiceId, &T)> {
        VoiceId::ALL.into_iter().zip(self.0.iter())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }
}

impl<T> Index<VoiceId> for VoiceMap<T> {
    type Output = T;

    fn index(&self, voice: VoiceId) -> &T {
        &self.0[voice.index()]
    }
}

impl<T> IndexMut<VoiceId> for VoiceMap<T> {
    fn index_mut(&mut self, voice: VoiceId) -> &mut T {
        &mut self.0[voice.index()]
    }
}

/// A subset of the four voices. Iterates in rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VoiceSet([bool; 4]);

impl VoiceSet {
    pub fn empty() -> Self {
        VoiceSet([false; 4])
    }

    pub fn all() -> Self {
        VoiceSet([true; 4])
    }

    pub fn insert(&mut self, voice: VoiceId) {
        self.0[voice.index()] = true;
    }

    pub fn contains(&self, voice: VoiceId) -> bool {
        self.0[voice.index()]
    }

    pub fn len(&self) -> usize {
        self.0.iter().filter(|&&b| b).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_all(&self) -> bool {
        self.0.iter().all(|&b| b)
    }

    pub fn iter(&self) -> impl Iterator<Item = VoiceId> + '_ {
        VoiceId::ALL.into_iter().filter(|v| self.contains(*v))
    }
}

impl FromIterator<VoiceId> for VoiceSet {
    fn from_iter<I: IntoIterator<Item = VoiceId>>(iter: I) -> Self {
        let mut set = VoiceSet::empty();
        for voice in iter {
            set.insert(voice);
        }
        set
    }
}
