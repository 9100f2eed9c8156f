//! Scoped clipboard access.
//!
//! A [`ClipboardGuard`] snapshots the clipboard when acquired and
//! writes the snapshot back when dropped, so the user's clipboard
//! survives every capture and paste no matter how the scope exits
//! (early return, error, or unwinding panic).

use crate::resolver::ClipboardProvider;

/// Clipboard contents taken at the start of a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardSnapshot(Vec<u8>);

impl ClipboardSnapshot {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Restores the clipboard snapshot on drop.
pub struct ClipboardGuard<'a> {
    clipboard: &'a dyn ClipboardProvider,
    snapshot: ClipboardSnapshot,
}

impl<'a> ClipboardGuard<'a> {
    /// Snapshot the clipboard.
    ///
    /// A failed read (commonly: nothing owns the clipboard) is logged
    /// and recorded as an empty snapshot.
    pub fn acquire(clipboard: &'a dyn ClipboardProvider) -> Self {
        let content = match clipboard.read() {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(error = %e, "clipboard backup unavailable, treating as empty");
                Vec::new()
            }
        };
        tracing::trace!(bytes = content.len(), "clipboard snapshot taken");

        Self {
            clipboard,
            snapshot: ClipboardSnapshot(content),
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> &ClipboardSnapshot {
        &self.snapshot
    }

    pub fn clipboard(&self) -> &'a dyn ClipboardProvider {
        self.clipboard
    }
}

impl Drop for ClipboardGuard<'_> {
    fn drop(&mut self) {
        // Never propagate.
        match self.clipboard.write(self.snapshot.as_bytes()) {
            Ok(()) => tracing::trace!(bytes = self.snapshot.0.len(), "clipboard restored"),
            Err(e) => tracing::warn!(error = %e, "clipboard restore failed"),
        }
    }
}

/// Run `action` with exclusive use of the clipboard, restoring the
/// prior contents afterwards.
pub fn with_clipboard<T>(
    clipboard: &dyn ClipboardProvider,
    action: impl FnOnce(&dyn ClipboardProvider) -> T,
) -> T {
    let guard = ClipboardGuard::acquire(clipboard);
    action(guard.clipboard())
}
