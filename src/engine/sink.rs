//! Replacement sink: pastes forwarded text into the focused window.
//!
//! Every increment is pasted inside its own clipboard scope: write the
//! text, send Ctrl+V, wait the settle delay, restore. Trailing line
//! breaks of an increment are held back and prepended to the next one,
//! so the pasted answer keeps its interior line breaks but never ends
//! with a newline.

use std::sync::Arc;
use std::time::Duration;

use super::EngineError;
use super::guard::with_clipboard;
use crate::presenter::Presenter;
use crate::resolver::{Chord, ResolverError, ResolverSet};

pub struct ReplacementSink {
    resolver: ResolverSet,
    presenter: Arc<dyn Presenter>,
    settle: Duration,
    /// Line breaks stripped from the end of the last increment.
    carry: String,
    /// Whether anything was pasted for the current handle.
    pasted: bool,
}

impl ReplacementSink {
    pub fn new(resolver: ResolverSet, presenter: Arc<dyn Presenter>, settle: Duration) -> Self {
        Self {
            resolver,
            presenter,
            settle,
            carry: String::new(),
            pasted: false,
        }
    }

    /// Prepare for a new handle.
    pub fn reset(&mut self) {
        self.carry.clear();
        self.pasted = false;
    }

    pub fn pasted_anything(&self) -> bool {
        self.pasted
    }

    /// Paste one forwarded increment.
    ///
    /// Clipboard and keystroke failures are logged and swallowed; the
    /// stream keeps going.
    pub async fn on_forward(&mut self, text: String) {
        let mut increment = std::mem::take(&mut self.carry);
        increment.push_str(&text);

        let keep = increment.trim_end_matches(['\n', '\r']).len();
        self.carry = increment.split_off(keep);
        if increment.is_empty() {
            return;
        }

        self.presenter.on_replace(&increment);

        let resolver = self.resolver.clone();
        let settle = self.settle;
        let len = increment.len();
        let pasted = tokio::task::spawn_blocking(move || paste_text(&resolver, &increment, settle)).await;

        match pasted {
            Ok(Ok(())) => {
                self.pasted = true;
                tracing::debug!(bytes = len, "increment pasted");
            }
            Ok(Err(e)) => {
                let e = EngineError::ClipboardAccess(e);
                tracing::warn!(error = %e, "paste failed");
            }
            Err(e) => tracing::error!(error = %e, "paste worker failed"),
        }
    }

    /// The handle's output was the sentinel: notify, touch nothing.
    pub fn on_suppressed(&mut self) {
        self.carry.clear();
        self.report(&EngineError::SentinelDetected);
    }

    /// End of stream. Held-back trailing line breaks are dropped.
    pub fn on_stream_end(&mut self) {
        self.carry.clear();
    }

    pub fn report(&self, error: &EngineError) {
        self.presenter.on_error(error.title(), &error.to_string());
    }
}

/// Paste `text` into the focused window, restoring the clipboard after.
pub fn paste_text(resolver: &ResolverSet, text: &str, settle: Duration) -> Result<(), ResolverError> {
    with_clipboard(&*resolver.clipboard, |clipboard| {
        clipboard.write(text.as_bytes())?;
        resolver.keystrokes.send_chord(Chord::Paste)?;
        std::thread::sleep(settle);
        Ok(())
    })
}
