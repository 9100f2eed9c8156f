//! X11 integration: connection, key grabs, and the trigger thread.
//!
//! Wraps `x11rb::rust_connection::RustConnection` for hotkey
//! registration and a polling thread that turns matching `KeyPress`
//! events into [`Trigger`]s for the async control loop.

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::{self, GrabMode, Keysym, ModMask, Window};
use x11rb::rust_connection::RustConnection;

use super::HotkeyError;
use super::Trigger;
use super::keybinding::{Binding, event_matches_binding};

/// CapsLock modifier bit (always LockMask, bit 1).
const LOCK_MASK: u16 = 0x0002;

/// XK_Num_Lock keysym for dynamic modifier detection.
const XK_NUM_LOCK: Keysym = 0xff7f;

/// X11 connection context for the hotkey listener.
pub struct X11Context {
    conn: Arc<RustConnection>,
    root: Window,
    numlock_mask: u16,
}

impl X11Context {
    /// Connect to the X11 display.
    pub fn connect() -> Result<Self, HotkeyError> {
        let (conn, screen_num) = RustConnection::connect(None)
            .map_err(|e| HotkeyError::X11(format!("connect failed: {e}")))?;

        let root = conn.setup().roots[screen_num].root;

        let numlock_mask = detect_numlock_mask(&conn);
        tracing::debug!(
            screen = screen_num,
            numlock_mask = format_args!("0x{numlock_mask:04x}"),
            "detected NumLock modifier"
        );

        Ok(Self {
            conn: Arc::new(conn),
            root,
            numlock_mask,
        })
    }

    /// Register a global key grab on the root window.
    ///
    /// Registers 4 grabs per binding (with/without NumLock/CapsLock).
    /// Returns `Ok(false)` if another client already holds the grab.
    pub fn grab_key(&self, binding: &Binding) -> Result<bool, HotkeyError> {
        let mut all_ok = true;

        for lock_mask in self.lock_masks() {
            let mods = ModMask::from(binding.modifiers | lock_mask);

            let cookie = xproto::grab_key(
                &*self.conn,
                true, // owner_events
                self.root,
                mods,
                binding.keycode,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )
            .map_err(|e| HotkeyError::X11(format!("grab_key send: {e}")))?;

            if let Err(e) = cookie.check() {
                tracing::warn!(
                    binding = %binding.raw,
                    lock_mask,
                    error = %e,
                    "XGrabKey failed, shortcut may conflict with another application"
                );
                all_ok = false;
            }
        }

        Ok(all_ok)
    }

    /// Unregister a global key grab. Best-effort; errors are logged.
    pub fn ungrab_key(&self, binding: &Binding) {
        for lock_mask in self.lock_masks() {
            let mods = ModMask::from(binding.modifiers | lock_mask);

            if let Err(e) = xproto::ungrab_key(&*self.conn, binding.keycode, self.root, mods) {
                tracing::debug!(binding = %binding.raw, error = %e, "XUngrabKey failed");
            }
        }

        if let Err(e) = self.conn.flush() {
            tracing::debug!(error = %e, "flush after ungrab failed");
        }
    }

    /// Get a shared reference to the X11 connection.
    pub fn conn(&self) -> &Arc<RustConnection> {
        &self.conn
    }

    /// Get the dynamically detected NumLock modifier mask.
    pub fn numlock_mask(&self) -> u16 {
        self.numlock_mask
    }

    /// Lock mask combinations: [0, CapsLock, NumLock, CapsLock|NumLock].
    fn lock_masks(&self) -> [u16; 4] {
        [
            0,
            LOCK_MASK,
            self.numlock_mask,
            LOCK_MASK | self.numlock_mask,
        ]
    }
}

/// Detect which modifier bit corresponds to NumLock.
///
/// Falls back to Mod2 (0x0010) if detection fails.
fn detect_numlock_mask(conn: &RustConnection) -> u16 {
    const FALLBACK: u16 = 0x0010; // Mod2Mask

    let Some(mod_reply) = xproto::get_modifier_mapping(conn)
        .ok()
        .and_then(|cookie| cookie.reply().ok())
    else {
        return FALLBACK;
    };

    let keycodes_per_mod = mod_reply.keycodes_per_modifier() as usize;
    if keycodes_per_mod == 0 {
        return FALLBACK;
    }

    let setup = conn.setup();
    let Some(numlock_keycode) = super::keybinding::keysym_to_keycode(conn, setup, XK_NUM_LOCK)
    else {
        return FALLBACK;
    };

    // Modifier map: 8 rows (Shift, Lock, Control, Mod1..Mod5) of
    // keycodes_per_modifier entries; row i is mask bit 1 << i.
    mod_reply
        .keycodes
        .chunks(keycodes_per_mod)
        .take(8)
        .position(|row| row.contains(&numlock_keycode))
        .map_or(FALLBACK, |row| 1u16 << row)
}

/// Spawn a dedicated thread that polls the X11 connection for events
/// and emits a [`Trigger`] for every `KeyPress` matching `binding`.
///
/// Uses `nix::poll()` on the X11 connection fd with a 100ms timeout so
/// the `stop` flag is observed promptly.
pub fn spawn_trigger_thread(
    conn: Arc<RustConnection>,
    binding: Binding,
    numlock_mask: u16,
    stop: Arc<AtomicBool>,
) -> Result<(tokio::sync::mpsc::UnboundedReceiver<Trigger>, JoinHandle<()>), HotkeyError> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    let handle = std::thread::Builder::new()
        .name("x11-hotkey".into())
        .spawn(move || {
            let raw_fd = conn.stream().as_raw_fd();

            while !stop.load(Ordering::Relaxed) {
                // SAFETY: raw_fd is the X11 connection fd, valid while conn is alive.
                let borrowed = unsafe { BorrowedFd::borrow_raw(raw_fd) };
                let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];

                match poll(&mut fds, PollTimeout::from(100u16)) {
                    Ok(0) => continue,
                    Ok(_) => loop {
                        match conn.poll_for_event() {
                            Ok(Some(Event::KeyPress(key))) => {
                                let state = u16::from(key.state);
                                if !event_matches_binding(key.detail, state, &binding, numlock_mask)
                                {
                                    continue;
                                }
                                tracing::debug!(binding = %binding.raw, "hotkey pressed");
                                let trigger = Trigger {
                                    at: Instant::now(),
                                };
                                if tx.send(trigger).is_err() {
                                    // Receiver dropped.
                                    return;
                                }
                            }
                            Ok(Some(_)) => {}
                            Ok(None) => break,
                            Err(e) => {
                                tracing::error!(error = %e, "X11 connection error");
                                return;
                            }
                        }
                    },
                    Err(nix::Error::EINTR) => continue,
                    Err(e) => {
                        tracing::error!(error = %e, "poll error on X11 fd");
                        return;
                    }
                }
            }
        })?;

    Ok((rx, handle))
}
