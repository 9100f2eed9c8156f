//! Command-backed provider: streams the stdout of an external program.
//!
//! The prompt is written to the child's stdin, the system instruction
//! is exported in [`SYSTEM_INSTRUCTION_ENV`], and stdout is decoded
//! into UTF-8 chunks as it is produced. Any model CLI that streams its
//! answer to stdout works as a backend, e.g.
//! `sh -c 'llm -s "$REWRITED_SYSTEM_INSTRUCTION"'`.

use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use futures::{StreamExt, stream};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use super::codec::Utf8ChunkCodec;
use super::{ChunkStream, Provider, ProviderError};

/// Environment variable carrying the system instruction to the child.
pub const SYSTEM_INSTRUCTION_ENV: &str = "REWRITED_SYSTEM_INSTRUCTION";

/// Runs `program args...` once per request.
pub struct CommandProvider {
    program: String,
    args: Vec<String>,
    name: String,
    /// Token of the most recent response; cancelled by `cancel()`.
    current: Mutex<CancellationToken>,
}

impl CommandProvider {
    /// Build from a command line: the first element is the program.
    ///
    /// Returns `None` for an empty command line.
    pub fn new(command: Vec<String>) -> Option<Self> {
        let mut parts = command.into_iter();
        let program = parts.next()?;
        let args: Vec<String> = parts.collect();
        let name = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        Some(Self {
            program,
            args,
            name,
            current: Mutex::new(CancellationToken::new()),
        })
    }
}

impl Provider for CommandProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_response(
        &self,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<ChunkStream, ProviderError> {
        let token = CancellationToken::new();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(SYSTEM_INSTRUCTION_ENV, system_instruction)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProviderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::Stream("child stdout not captured".into()))?;

        // Feed stdin from its own task so a large prompt cannot deadlock
        // against a child that starts writing before reading everything.
        if let Some(mut stdin) = child.stdin.take() {
            let prompt = prompt.to_owned();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    tracing::debug!(error = %e, "provider stdin closed early");
                }
                // Drop stdin to signal end of prompt.
            });
        }

        tracing::debug!(provider = %self.name, pid = ?child.id(), "provider started");

        let program = self.program.clone();
        let exit = stream::once(async move {
            match child.wait().await {
                Ok(status) if status.success() => None::<Result<String, ProviderError>>,
                Ok(status) => Some(Err(ProviderError::Exit { program, status })),
                Err(e) => Some(Err(ProviderError::Io(e))),
            }
        })
        .filter_map(|item| async move { item });

        let chunks = FramedRead::new(stdout, Utf8ChunkCodec::new())
            .map(|item| item.map_err(ProviderError::Io))
            .chain(exit)
            .take_until(token.cancelled_owned());

        Ok(Box::pin(chunks))
    }

    fn cancel(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandProvider {
        CommandProvider::new(vec!["sh".into(), "-c".into(), script.into()]).unwrap()
    }

    async fn collect(mut stream: ChunkStream) -> (String, Option<ProviderError>) {
        let mut out = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => out.push_str(&chunk),
                Err(e) => return (out, Some(e)),
            }
        }
        (out, None)
    }

    #[test]
    fn empty_command_rejected() {
        assert!(CommandProvider::new(Vec::new()).is_none());
    }

    #[test]
    fn name_is_command_line() {
        let p = sh("cat");
        assert_eq!(p.name(), "sh -c cat");
    }

    #[tokio::test]
    async fn prompt_arrives_on_stdin() {
        let p = sh("cat");
        let stream = p.get_response("sys", "hello there").unwrap();
        let (out, err) = collect(stream).await;
        assert!(err.is_none());
        assert_eq!(out, "hello there");
    }

    #[tokio::test]
    async fn system_instruction_exported() {
        let p = sh("printf '%s' \"$REWRITED_SYSTEM_INSTRUCTION\"");
        let stream = p.get_response("be terse", "ignored").unwrap();
        let (out, _) = collect(stream).await;
        assert_eq!(out, "be terse");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let p = sh("printf partial; exit 3");
        let stream = p.get_response("", "").unwrap();
        let (out, err) = collect(stream).await;
        assert_eq!(out, "partial");
        assert!(matches!(err, Some(ProviderError::Exit { .. })));
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let p = CommandProvider::new(vec!["/nonexistent/rewrited-backend".into()]).unwrap();
        assert!(matches!(
            p.get_response("", ""),
            Err(ProviderError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_ends_stream() {
        let p = sh("printf first; sleep 30; printf never");
        let mut stream = p.get_response("", "").unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, "first");

        p.cancel();
        let next = tokio::time::timeout(std::time::Duration::from_secs(5), stream.next())
            .await
            .expect("cancelled stream should end promptly");
        assert!(next.is_none());

        // Idempotent.
        p.cancel();
    }
}
