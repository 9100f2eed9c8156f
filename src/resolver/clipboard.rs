//! ClipboardProvider trait: system clipboard read/write abstraction.

use super::ResolverError;

/// Reads and writes the system clipboard.
///
/// Platform adapters implement this trait to abstract clipboard access.
/// Calls are blocking; the engine issues them from blocking workers.
///
/// `Send + Sync` is required because clipboard scopes are moved onto
/// `spawn_blocking` threads.
pub trait ClipboardProvider: Send + Sync {
    /// Set the system clipboard content to the given bytes.
    fn write(&self, content: &[u8]) -> Result<(), ResolverError>;

    /// Read the current system clipboard content.
    fn read(&self) -> Result<Vec<u8>, ResolverError>;

    /// Empty the clipboard so a following read can tell a fresh copy
    /// apart from a stale value.
    fn clear(&self) -> Result<(), ResolverError> {
        self.write(b"")
    }
}
