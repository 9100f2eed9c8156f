//! X11 clipboard provider over `xclip`.
//!
//! Every call is a short-lived `xclip` process on the CLIPBOARD
//! selection. Reads are bounded by a deadline: a selection owner that
//! never answers would otherwise stall the capture scope and, with it,
//! the restore.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::resolver::{ClipboardProvider, ResolverError};

/// How long a selection owner gets to answer a read.
const READ_DEADLINE: Duration = Duration::from_secs(1);

pub struct X11ClipboardProvider {
    read_deadline: Duration,
}

impl X11ClipboardProvider {
    pub fn new() -> Self {
        Self {
            read_deadline: READ_DEADLINE,
        }
    }

    fn xclip() -> Command {
        let mut cmd = Command::new("xclip");
        cmd.args(["-selection", "clipboard"]).stderr(Stdio::null());
        cmd
    }
}

impl ClipboardProvider for X11ClipboardProvider {
    fn write(&self, content: &[u8]) -> Result<(), ResolverError> {
        let mut child = Self::xclip()
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| ResolverError::Clipboard(format!("spawn xclip: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(content)
                .map_err(|e| ResolverError::Clipboard(format!("write to xclip: {e}")))?;
        }

        // xclip forks a selection owner and the parent exits.
        let status = child
            .wait()
            .map_err(|e| ResolverError::Clipboard(format!("wait for xclip: {e}")))?;
        check_status("xclip", status)
    }

    fn read(&self) -> Result<Vec<u8>, ResolverError> {
        let mut cmd = Self::xclip();
        cmd.arg("-o");
        run_with_deadline(&mut cmd, self.read_deadline)
    }

    fn clear(&self) -> Result<(), ResolverError> {
        let status = Self::xclip()
            .args(["-i", "/dev/null"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .map_err(|e| ResolverError::Clipboard(format!("spawn xclip: {e}")))?;
        check_status("xclip -i /dev/null", status)
    }
}

fn check_status(what: &str, status: ExitStatus) -> Result<(), ResolverError> {
    if status.success() {
        Ok(())
    } else {
        Err(ResolverError::Clipboard(format!("{what} exited with {status}")))
    }
}

/// Run `cmd` and collect its stdout, killing it after `deadline`.
///
/// Stdout is drained on a side thread so a large selection cannot fill
/// the pipe while the deadline is being watched.
fn run_with_deadline(cmd: &mut Command, deadline: Duration) -> Result<Vec<u8>, ResolverError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| ResolverError::Clipboard(format!("spawn xclip -o: {e}")))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| ResolverError::Clipboard("xclip stdout not captured".into()))?;
    let reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).map(|_| buf)
    });

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                return Err(ResolverError::Clipboard(format!(
                    "selection owner did not answer within {}ms",
                    deadline.as_millis()
                )));
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(5)),
            Err(e) => return Err(ResolverError::Clipboard(format!("wait for xclip -o: {e}"))),
        }
    };

    let output = reader
        .join()
        .map_err(|_| ResolverError::Clipboard("xclip reader panicked".into()))?
        .map_err(|e| ResolverError::Clipboard(format!("read from xclip: {e}")))?;

    // Non-zero when no client owns the selection.
    check_status("xclip -o", status)?;
    Ok(output)
}
