//! AI backend boundary.
//!
//! A [`Provider`] turns `(system_instruction, prompt)` into a stream of
//! text chunks. The stream ends at logical completion; there is no
//! explicit "done" chunk. `cancel()` is idempotent and never blocks.

mod codec;
pub mod command;

use std::pin::Pin;

use futures::Stream;

pub use command::CommandProvider;

/// Stream of text chunks produced by a backend.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Errors surfaced by a backend while starting or streaming a response.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
    },
    #[error("stream: {0}")]
    Stream(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A pluggable AI backend.
pub trait Provider: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    /// Start a response for the given system instruction and prompt.
    ///
    /// Must be called from within a tokio runtime.
    fn get_response(
        &self,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<ChunkStream, ProviderError>;

    /// Abort the response currently in flight, if any.
    fn cancel(&self);
}
