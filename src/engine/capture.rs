//! Selection capture: "simulate copy, read clipboard".
//!
//! There is no completion signal for a synthetic copy, so the capturer
//! waits a fixed settle delay before reading. The clipboard is cleared
//! first so an empty read means "nothing selected" rather than a stale
//! value.

use std::time::Duration;

use super::guard::with_clipboard;
use crate::resolver::{Chord, ResolverSet};

/// Default wait between a synthetic chord and its effect on the clipboard.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Captures the foreground application's current selection.
#[derive(Clone)]
pub struct SelectionCapturer {
    resolver: ResolverSet,
    settle: Duration,
}

impl SelectionCapturer {
    pub fn new(resolver: ResolverSet, settle: Duration) -> Self {
        Self { resolver, settle }
    }

    /// Capture on a blocking worker so the settle delay never stalls the
    /// async executor. Returns `""` when nothing could be captured.
    pub async fn capture(&self) -> String {
        let this = self.clone();
        match tokio::task::spawn_blocking(move || this.capture_blocking()).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "selection capture worker failed");
                String::new()
            }
        }
    }

    /// Blocking capture; the clipboard is restored before returning.
    pub fn capture_blocking(&self) -> String {
        let keystrokes = &self.resolver.keystrokes;

        let text = with_clipboard(&*self.resolver.clipboard, |clipboard| {
            if let Err(e) = clipboard.clear() {
                tracing::warn!(error = %e, "could not clear clipboard before copy");
            }

            if let Err(e) = keystrokes.send_chord(Chord::Copy) {
                tracing::warn!(error = %e, "copy chord failed");
                return String::new();
            }

            std::thread::sleep(self.settle);

            match clipboard.read() {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    tracing::debug!(error = %e, "nothing copied");
                    String::new()
                }
            }
        });

        tracing::debug!(chars = text.chars().count(), "selection captured");
        text
    }
}
