//! Resolver abstraction: pluggable platform adapters.
//!
//! Extracts all platform-specific behavior (clipboard access, synthetic
//! copy/paste keystrokes) into small traits. The engine only talks to
//! these traits; the X11 adapters under [`x11`] are composed at startup.

pub mod clipboard;
pub mod keystroke;
pub mod x11;

use std::sync::Arc;

pub use clipboard::ClipboardProvider;
pub use keystroke::{Chord, KeystrokeInjector};

/// Errors returned by resolver adapters.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// Display connection or extension query failed.
    #[error("display: {0}")]
    Display(String),

    /// Synthetic key event could not be delivered (e.g. XTEST missing,
    /// keysym absent from the keyboard mapping).
    #[error("keystroke: {0}")]
    Keystroke(String),

    /// Clipboard operation failed (e.g. xclip not found, pipe error).
    #[error("clipboard: {0}")]
    Clipboard(String),
}

/// A composed set of platform adapters.
///
/// Cheap to clone; each adapter is shared with the blocking workers
/// that run clipboard scopes.
#[derive(Clone)]
pub struct ResolverSet {
    /// Reads and writes the system clipboard.
    pub clipboard: Arc<dyn ClipboardProvider>,

    /// Sends the copy/paste chords to the focused window.
    pub keystrokes: Arc<dyn KeystrokeInjector>,
}

impl ResolverSet {
    /// Connect the X11 reference adapters.
    pub fn x11() -> Result<Self, ResolverError> {
        let shared = x11::X11Shared::connect()?;
        let keystrokes = x11::keystroke::X11KeystrokeInjector::new(&shared)?;
        Ok(Self {
            clipboard: Arc::new(x11::clipboard::X11ClipboardProvider::new()),
            keystrokes: Arc::new(keystrokes),
        })
    }
}
