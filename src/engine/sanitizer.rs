//! Stream sanitizer: keeps the error sentinel out of the document.
//!
//! Backends answer [`ERROR_SENTINEL`] when the selection is
//! incompatible with the requested change. The sentinel may arrive
//! split across any number of chunks, so output is held while it could
//! still turn into the sentinel and released only once it provably
//! cannot.
//!
//! ```text
//!   Buffering ──(not a sentinel prefix)──▶ Forwarding
//!       │
//!       └──────(exact sentinel)──────────▶ Suppressed
//! ```
//!
//! `Forwarding` and `Suppressed` are terminal until the next handle.

use super::slot::HandleId;

/// Answer a backend gives when the input does not fit the request.
pub const ERROR_SENTINEL: &str = "ERROR_TEXT_INCOMPATIBLE_WITH_REQUEST";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizerState {
    /// Output so far could still become the sentinel.
    Buffering,
    /// Output can never become the sentinel; chunks pass straight through.
    Forwarding,
    /// Output was the sentinel; nothing for this handle reaches the sink.
    Suppressed,
}

/// What the caller should do after a chunk was fed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardDecision {
    /// Chunk belongs to a stale handle or a suppressed stream.
    Drop,
    /// Nothing to forward yet.
    Hold,
    /// Paste this text. On the transition out of `Buffering` it is the
    /// whole accumulated output; afterwards it is just the new chunk.
    Forward(String),
    /// The output is the sentinel. Emitted once per handle.
    Suppress,
}

/// Per-handle accumulator and three-state decision machine.
#[derive(Debug)]
pub struct StreamSanitizer {
    active: Option<HandleId>,
    output: String,
    state: SanitizerState,
}

impl StreamSanitizer {
    pub fn new() -> Self {
        Self {
            active: None,
            output: String::new(),
            state: SanitizerState::Buffering,
        }
    }

    /// Start accumulating for a new handle, discarding any previous
    /// handle's output.
    pub fn reset(&mut self, handle: HandleId) {
        self.active = Some(handle);
        self.output.clear();
        self.state = SanitizerState::Buffering;
    }

    /// Forget the current handle; every chunk is dropped until the next
    /// [`reset`](Self::reset).
    pub fn clear(&mut self) {
        self.active = None;
        self.output.clear();
        self.state = SanitizerState::Buffering;
    }

    pub fn state(&self) -> SanitizerState {
        self.state
    }

    /// Everything accumulated for the active handle so far.
    #[cfg(test)]
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn on_chunk(&mut self, handle: HandleId, chunk: &str) -> ForwardDecision {
        if self.active != Some(handle) {
            return ForwardDecision::Drop;
        }

        match self.state {
            SanitizerState::Suppressed => return ForwardDecision::Drop,
            SanitizerState::Forwarding => {
                if chunk.is_empty() {
                    return ForwardDecision::Hold;
                }
                self.output.push_str(chunk);
                return ForwardDecision::Forward(chunk.to_owned());
            }
            SanitizerState::Buffering => {}
        }

        self.output.push_str(chunk);
        let trimmed = self.output.trim();

        if trimmed == ERROR_SENTINEL {
            self.state = SanitizerState::Suppressed;
            return ForwardDecision::Suppress;
        }

        if trimmed.chars().count() <= ERROR_SENTINEL.len() && could_become_sentinel(trimmed) {
            return ForwardDecision::Hold;
        }

        self.state = SanitizerState::Forwarding;
        ForwardDecision::Forward(self.output.clone())
    }

    /// End of stream for `handle`.
    ///
    /// Returns text still held in `Buffering` that must now be flushed:
    /// once the stream is over it can no longer become the sentinel.
    /// Whitespace-only leftovers are discarded.
    pub fn finish(&mut self, handle: HandleId) -> Option<String> {
        if self.active != Some(handle) {
            return None;
        }

        let state = self.state;
        let held = std::mem::take(&mut self.output);
        self.clear();

        match state {
            SanitizerState::Buffering if !held.trim().is_empty() => Some(held),
            _ => None,
        }
    }
}

impl Default for StreamSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `text`, ignoring all whitespace, is a prefix of the sentinel
/// (also ignoring whitespace).
fn could_become_sentinel(text: &str) -> bool {
    let mut sentinel = ERROR_SENTINEL.chars().filter(|c| !c.is_whitespace());
    text.chars()
        .filter(|c| !c.is_whitespace())
        .all(|c| sentinel.next() == Some(c))
}
