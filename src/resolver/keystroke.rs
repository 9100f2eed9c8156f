//! KeystrokeInjector trait: synthetic copy/paste chords.

use std::fmt;

use super::ResolverError;

/// Keyboard chords the engine needs to synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chord {
    /// Ctrl+C
    Copy,
    /// Ctrl+V
    Paste,
}

impl Chord {
    /// Keysym of the letter pressed while Control is held.
    pub fn letter_keysym(self) -> u32 {
        match self {
            Chord::Copy => 0x0063,  // 'c'
            Chord::Paste => 0x0076, // 'v'
        }
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chord::Copy => f.write_str("ctrl+c"),
            Chord::Paste => f.write_str("ctrl+v"),
        }
    }
}

/// Delivers synthetic key chords to whichever window has input focus.
///
/// There is no completion signal: a successful return only means the
/// events were queued with the display server.
pub trait KeystrokeInjector: Send + Sync {
    fn send_chord(&self, chord: Chord) -> Result<(), ResolverError>;
}
