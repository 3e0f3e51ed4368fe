// Joint states and their canonical text tokens.
//
// A joint state is the four voices' current events at one synchronization
// step. The Markov chain treats states as opaque strings, so every state is
// encoded as a token of the form
//
//   (('C4', 1), ('E4', 2), ('G3', 2), ('C3', 1/2))
//
// in SATB order, rests spelled 'rest', durations as exact `n` or `n/d`.
// Encoding is canonical (one token per state), so identical states collapse
// to the same chain symbol. Decoding is strict: anything that is not exactly
// four well-formed pairs is a `MalformedToken`, never a partial state.

use crate::error::MalformedToken;
use crate::event::{Duration, Event, Symbol};
use crate::voice::{VoiceId, VoiceMap};
use std::fmt::Write;

/// All four voices' current events at one step, in SATB order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointState {
    events: VoiceMap<Event>,
}

impl JointState {
    pub fn new(events: [Event; 4]) -> Self {
        JointState {
            events: VoiceMap(events),
        }
    }

    pub fn event(&self, voice: VoiceId) -> &Event {
        &self.events[voice]
    }

    pub fn events(&self) -> &VoiceMap<Event> {
        &self.events
    }

    pub fn encode(&self) -> String {
        encode(self)
    }
}

/// Encode a joint state as its canonical token.
pub fn encode(state: &JointState) -> String {
    let mut out = String::from("(");
    for (voice, event) in state.events().iter() {
        if voice != VoiceId::Soprano {
            out.push_str(", ");
        }
        let _ = write!(out, "('{}', {})", event.symbol, event.duration);
    }
    out.push(')');
    out
}

/// Decode a token back into the joint state it was encoded from.
pub fn decode(token: &str) -> Result<JointState, MalformedToken> {
    let mut cursor = Cursor { src: token, pos: 0 };
    cursor.expect('(')?;
    let mut events = Vec::with_capacity(4);
    for i in 0..4 {
        if i > 0 {
            cursor.expect(',')?;
        }
        events.push(cursor.pair()?);
    }
    // Python-style trailing comma is tolerated.
    if cursor.peek() == Some(',') {
        cursor.bump();
    }
    cursor.expect(')')?;
    cursor.skip_ws();
    if cursor.pos != token.len() {
        return Err(cursor.error("trailing input after joint state"));
    }

    match events.as_slice() {
        [s, a, t, b] => Ok(JointState::new([*s, *a, *t, *b])),
        _ => Err(MalformedToken::new(0, "expected four voices")),
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn error(&self, message: impl Into<String>) -> MalformedToken {
        MalformedToken::new(self.pos, message)
    }

    fn skip_ws(&mut self) {
        let rest = &self.src[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.src[self.pos..].chars().next() {
            self.pos += c.len_utf8();
        }
    }

    fn expect(&mut self, want: char) -> Result<(), MalformedToken> {
        match self.peek() {
            Some(c) if c == want => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected {want:?}, found {c:?}"))),
            None => Err(self.error(format!("expected {want:?}, found end of token"))),
        }
    }

    /// `('<symbol>', <duration>)`
    fn pair(&mut self) -> Result<Event, MalformedToken> {
        self.expect('(')?;
        let start = self.pos;
        let symbol: Symbol = self
            .quoted()?
            .parse()
            .map_err(|e| MalformedToken::new(start, format!("{e}")))?;
        self.expect(',')?;
        let start = self.pos;
        let duration: Duration = self
            .number()
            .parse()
            .map_err(|e| MalformedToken::new(start, format!("{e}")))?;
        self.expect(')')?;
        Ok(Event::new(symbol, duration))
    }

    fn quoted(&mut self) -> Result<&'a str, MalformedToken> {
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected a quoted symbol")),
        };
        self.bump();
        let start = self.pos;
        let len = self.src[start..]
            .find(quote)
            .ok_or_else(|| self.error("unterminated symbol"))?;
        self.pos = start + len + quote.len_utf8();
        Ok(&self.src[start..start + len])
    }

    fn number(&mut self) -> &'a str {
        self.skip_ws();
        let start = self.pos;
        let len = self.src[start..]
            .find(|c: char| !(c.is_ascii_digit() || c == '/' || c == '.'))
            .unwrap_or(self.src.len() - start);
        self.pos = start + len;
        &self.src[start..start + len]
    }
}
