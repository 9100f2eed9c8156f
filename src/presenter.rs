//! Presentation boundary: where user-visible feedback goes.

use std::process::{Command, Stdio};

/// Receives engine feedback. Calls come from the control task and must
/// not block for long.
pub trait Presenter: Send + Sync {
    /// The selection captured for a new request (may be empty).
    fn on_selection(&self, selected: &str);

    /// An increment about to be pasted.
    fn on_replace(&self, text: &str);

    /// A per-request failure the user should see.
    fn on_error(&self, title: &str, message: &str);
}

/// Desktop presenter: log every event and raise a `notify-send` popup
/// for errors. One-shot runs also print errors to stderr; the daemon
/// leaves that to the log.
pub struct DesktopPresenter {
    notify: bool,
    status_line: bool,
}

impl DesktopPresenter {
    pub fn new(notify: bool, status_line: bool) -> Self {
        Self {
            notify,
            status_line,
        }
    }

    fn status_message(&self, message: &str) -> Option<String> {
        self.status_line.then(|| format!("rewrited: {message}"))
    }
}

impl Presenter for DesktopPresenter {
    fn on_selection(&self, selected: &str) {
        tracing::debug!(chars = selected.chars().count(), "selection");
    }

    fn on_replace(&self, text: &str) {
        tracing::trace!(bytes = text.len(), "replacing");
    }

    fn on_error(&self, title: &str, message: &str) {
        tracing::warn!(title, message, "request error");
        if let Some(line) = self.status_message(message) {
            eprintln!("{line}");
        }

        if !self.notify {
            return;
        }

        let child = Command::new("notify-send")
            .args(["--app-name=rewrited", title, message])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        // Reap on a side thread; notify-send may wait on the daemon.
        match child {
            Ok(mut child) => {
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(e) => tracing::debug!(error = %e, "notify-send unavailable"),
        }
    }
}
