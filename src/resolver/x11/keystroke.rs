//! X11 keystroke injector: synthetic Ctrl+C / Ctrl+V via XTEST.
//!
//! Keycodes are resolved once from the server's keyboard mapping at
//! construction; each chord is four `FakeInput` requests (press Control,
//! press letter, release letter, release Control) followed by a flush.

use std::sync::Arc;

use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::xproto::{self, Keysym, Window};
use x11rb::protocol::xtest;
use x11rb::rust_connection::RustConnection;

use crate::hotkey::keybinding::keysym_to_keycode;
use crate::resolver::{Chord, KeystrokeInjector, ResolverError};

/// XK_Control_L
const XK_CONTROL_L: Keysym = 0xffe3;

/// X11 implementation of `KeystrokeInjector`.
pub struct X11KeystrokeInjector {
    conn: Arc<RustConnection>,
    root: Window,
    control: u8,
    copy_key: u8,
    paste_key: u8,
}

impl X11KeystrokeInjector {
    /// Create from shared X11 connection state.
    ///
    /// Fails if the server lacks the XTEST extension or if any of the
    /// required keysyms is missing from the keyboard mapping.
    pub fn new(shared: &super::X11Shared) -> Result<Self, ResolverError> {
        let conn = Arc::clone(&shared.conn);

        let xtest_info = conn
            .extension_information(xtest::X11_EXTENSION_NAME)
            .map_err(|e| ResolverError::Display(format!("query XTEST: {e}")))?;
        if xtest_info.is_none() {
            return Err(ResolverError::Keystroke(
                "X server does not support the XTEST extension".into(),
            ));
        }

        let resolve = |keysym: Keysym| {
            keysym_to_keycode(&*conn, conn.setup(), keysym).ok_or_else(|| {
                ResolverError::Keystroke(format!(
                    "keysym 0x{keysym:04x} not found in keyboard mapping"
                ))
            })
        };
        let control = resolve(XK_CONTROL_L)?;
        let copy_key = resolve(Chord::Copy.letter_keysym())?;
        let paste_key = resolve(Chord::Paste.letter_keysym())?;

        tracing::debug!(control, copy_key, paste_key, "XTEST keycodes resolved");

        Ok(Self {
            conn,
            root: shared.root,
            control,
            copy_key,
            paste_key,
        })
    }

    fn fake_key(&self, event_type: u8, keycode: u8) -> Result<(), ResolverError> {
        xtest::fake_input(
            &*self.conn,
            event_type,
            keycode,
            x11rb::CURRENT_TIME,
            self.root,
            0,
            0,
            0,
        )
        .map_err(|e| ResolverError::Keystroke(format!("fake_input send: {e}")))?
        .check()
        .map_err(|e| ResolverError::Keystroke(format!("fake_input: {e}")))
    }
}

impl KeystrokeInjector for X11KeystrokeInjector {
    fn send_chord(&self, chord: Chord) -> Result<(), ResolverError> {
        let letter = match chord {
            Chord::Copy => self.copy_key,
            Chord::Paste => self.paste_key,
        };

        press_chord(self.control, letter, |event_type, keycode| {
            self.fake_key(event_type, keycode)
        })?;

        self.conn
            .flush()
            .map_err(|e| ResolverError::Keystroke(format!("flush: {e}")))?;

        tracing::trace!(%chord, "chord injected");
        Ok(())
    }
}

/// Press `letter` while holding `modifier`.
///
/// Once the modifier press went through, its release is always sent,
/// even when the letter events fail; the first error is returned.
fn press_chord(
    modifier: u8,
    letter: u8,
    mut fake_key: impl FnMut(u8, u8) -> Result<(), ResolverError>,
) -> Result<(), ResolverError> {
    fake_key(xproto::KEY_PRESS_EVENT, modifier)?;

    let tapped = fake_key(xproto::KEY_PRESS_EVENT, letter)
        .and_then(|()| fake_key(xproto::KEY_RELEASE_EVENT, letter));
    let released = fake_key(xproto::KEY_RELEASE_EVENT, modifier);

    if let Err(e) = &released {
        tracing::warn!(error = %e, modifier, "modifier release failed");
    }
    tapped.and(released)
}
