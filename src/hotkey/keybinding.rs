//! Shortcut parser: "ctrl+space" → (modifier mask, keycode).
//!
//! Parsing happens in two steps: [`parse_shortcut`] turns the text into
//! a modifier mask and keysym without touching the display, then
//! [`resolve_binding`] maps the keysym to a keycode using the server's
//! keyboard mapping.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{self, Keysym, ModMask, Setup};

use super::HotkeyError;

/// A shortcut parsed from text, not yet bound to a keyboard layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
    /// X11 modifier mask (e.g., Control | Mod1).
    pub modifiers: u16,
    /// X11 keysym of the non-modifier key.
    pub keysym: Keysym,
}

/// A parsed key binding ready for X11 grab registration.
#[derive(Debug, Clone)]
pub struct Binding {
    /// X11 modifier mask.
    pub modifiers: u16,
    /// X11 keycode for the key.
    pub keycode: u8,
    /// Original user-provided string.
    pub raw: String,
}

/// Parse a shortcut string.
///
/// Format: `modifier[+modifier...]+key`, case-insensitive, with
/// optional `<...>` around each token (`<ctrl>+<alt>+h` is accepted).
///
/// Modifiers: `shift`, `ctrl`/`control`, `alt`, `super`/`cmd`/`win`.
/// Keys: single letter, digit, F1-F12, or a named key (space, return,
/// escape, tab, ...). At least one modifier is required so the grab
/// does not swallow plain typing.
pub fn parse_shortcut(spec: &str) -> Result<Shortcut, HotkeyError> {
    let parts: Vec<&str> = spec
        .split('+')
        .map(|p| p.trim().trim_start_matches('<').trim_end_matches('>'))
        .collect();

    if parts.iter().all(|p| p.is_empty()) {
        return Err(HotkeyError::InvalidBinding("empty shortcut".into()));
    }
    if parts.len() < 2 {
        return Err(HotkeyError::InvalidBinding(format!(
            "bare key without modifier: {spec:?}"
        )));
    }

    let (modifier_parts, key_name) = parts.split_at(parts.len() - 1);
    let key_name = key_name[0];

    let mut modifiers: u16 = 0;
    for &m in modifier_parts {
        let mask = parse_modifier(m)
            .ok_or_else(|| HotkeyError::InvalidBinding(format!("unknown modifier: {m:?}")))?;
        modifiers |= mask;
    }

    let keysym = key_name_to_keysym(key_name)
        .ok_or_else(|| HotkeyError::InvalidBinding(format!("unknown key: {key_name:?}")))?;

    Ok(Shortcut { modifiers, keysym })
}

/// Parse a shortcut and resolve it against the server's keyboard mapping.
pub fn resolve_binding(
    spec: &str,
    conn: &impl Connection,
    setup: &Setup,
) -> Result<Binding, HotkeyError> {
    let shortcut = parse_shortcut(spec)?;

    let keycode = keysym_to_keycode(conn, setup, shortcut.keysym).ok_or_else(|| {
        HotkeyError::InvalidBinding(format!(
            "keysym 0x{:04x} not found in keyboard mapping",
            shortcut.keysym
        ))
    })?;

    Ok(Binding {
        modifiers: shortcut.modifiers,
        keycode,
        raw: spec.to_string(),
    })
}

/// Parse a modifier name to its X11 modifier mask bits.
fn parse_modifier(name: &str) -> Option<u16> {
    match name.to_ascii_lowercase().as_str() {
        "shift" => Some(ModMask::SHIFT.into()),
        "control" | "ctrl" => Some(ModMask::CONTROL.into()),
        "alt" | "mod1" => Some(u16::from(ModMask::M1)),
        "super" | "cmd" | "win" | "mod4" => Some(u16::from(ModMask::M4)),
        _ => None,
    }
}

/// Map a key name to an X11 keysym.
fn key_name_to_keysym(name: &str) -> Option<Keysym> {
    // Single ASCII letter → lowercase keysym.
    if name.len() == 1 {
        let ch = name.chars().next()?;
        if ch.is_ascii_alphabetic() {
            return Some(ch.to_ascii_lowercase() as Keysym);
        }
        if ch.is_ascii_digit() {
            return Some(ch as Keysym);
        }
    }

    if let Some(rest) = name.strip_prefix('F').or_else(|| name.strip_prefix('f'))
        && let Ok(n) = rest.parse::<u32>()
        && (1..=12).contains(&n)
    {
        // XK_F1 = 0xffbe
        return Some(0xffbe + n - 1);
    }

    match name.to_ascii_lowercase().as_str() {
        "space" => Some(0x0020),
        "return" | "enter" => Some(0xff0d),
        "escape" | "esc" => Some(0xff1b),
        "tab" => Some(0xff09),
        "backspace" => Some(0xff08),
        "delete" => Some(0xffff),
        "insert" => Some(0xff63),
        "home" => Some(0xff50),
        "end" => Some(0xff57),
        "page_up" | "pageup" => Some(0xff55),
        "page_down" | "pagedown" => Some(0xff56),
        _ => None,
    }
}

/// Resolve a keysym to a keycode using the server's keyboard mapping.
///
/// Returns the first matching keycode. Shared with the XTEST keystroke
/// adapter, which needs the same lookup for Control, `c` and `v`.
pub(crate) fn keysym_to_keycode(
    conn: &impl Connection,
    setup: &Setup,
    keysym: Keysym,
) -> Option<u8> {
    let min_keycode = setup.min_keycode;
    let max_keycode = setup.max_keycode;
    let count = max_keycode - min_keycode + 1;

    let reply = xproto::get_keyboard_mapping(conn, min_keycode, count)
        .ok()?
        .reply()
        .ok()?;

    let syms_per_code = reply.keysyms_per_keycode as usize;
    if syms_per_code == 0 {
        return None;
    }

    (0..count as usize)
        .find(|&i| {
            let base = i * syms_per_code;
            reply.keysyms[base..base + syms_per_code].contains(&keysym)
        })
        .map(|i| min_keycode + i as u8)
}

/// Check if a key event matches a binding.
///
/// CapsLock and the detected NumLock bit are ignored, as are pointer
/// button bits, so the shortcut fires regardless of lock state.
pub fn event_matches_binding(
    event_keycode: u8,
    event_state: u16,
    binding: &Binding,
    numlock_mask: u16,
) -> bool {
    let lock_mask: u16 = u16::from(ModMask::LOCK) | numlock_mask;
    let clean_mods = event_state & !lock_mask & 0x00ff;

    event_keycode == binding.keycode && clean_mods == binding.modifiers
}
