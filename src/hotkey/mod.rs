//! Hotkey listener: global shortcut grab and trigger delivery.
//!
//! Grabs one global X11 shortcut and delivers a zero-argument
//! [`Trigger`] for every press over a channel. The engine treats each
//! trigger identically regardless of origin.

pub mod keybinding;
mod x11;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use tokio::sync::mpsc;
use x11rb::connection::Connection;

use keybinding::{Binding, parse_shortcut, resolve_binding};
use x11::X11Context;

/// Hotkey listener errors.
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("X11: {0}")]
    X11(String),
    #[error("invalid shortcut: {0}")]
    InvalidBinding(String),
    #[error("shortcut {0} is grabbed by another application")]
    Conflict(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One press of the global shortcut.
#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    /// When the press was observed by the listener thread.
    pub at: Instant,
}

/// A running global shortcut grab.
///
/// Call [`HotkeyListener::stop`] to ungrab and join the event thread.
pub struct HotkeyListener {
    x11: X11Context,
    binding: Binding,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HotkeyListener {
    /// Parse `shortcut`, grab it on the root window and start the
    /// trigger thread.
    ///
    /// Fails if the shortcut is malformed, the display is unreachable,
    /// or another client already owns the grab.
    pub fn start(shortcut: &str) -> Result<(Self, mpsc::UnboundedReceiver<Trigger>), HotkeyError> {
        // Reject malformed shortcuts before touching the display.
        parse_shortcut(shortcut)?;

        let x11 = X11Context::connect()?;
        let binding = resolve_binding(shortcut, &**x11.conn(), x11.conn().setup())?;

        tracing::info!(
            shortcut = %binding.raw,
            keycode = binding.keycode,
            modifiers = format_args!("0x{:04x}", binding.modifiers),
            "shortcut parsed"
        );

        if !x11.grab_key(&binding)? {
            x11.ungrab_key(&binding);
            return Err(HotkeyError::Conflict(binding.raw));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (rx, thread) = x11::spawn_trigger_thread(
            Arc::clone(x11.conn()),
            binding.clone(),
            x11.numlock_mask(),
            Arc::clone(&stop),
        )?;

        tracing::info!(shortcut = %binding.raw, "shortcut grabbed");

        Ok((
            Self {
                x11,
                binding,
                stop,
                thread: Some(thread),
            },
            rx,
        ))
    }

    /// Ungrab the shortcut and wait for the event thread to exit
    /// (within one 100ms poll interval).
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.x11.ungrab_key(&self.binding);

        if let Some(thread) = self.thread.take()
            && let Err(e) = thread.join()
        {
            tracing::warn!("X11 hotkey thread panicked: {e:?}");
        }

        tracing::info!(shortcut = %self.binding.raw, "shortcut released");
    }
}
