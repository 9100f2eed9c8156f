//! X11 platform adapters: reference implementation for the resolver
//! abstraction.
//!
//! The keystroke adapter shares an `Arc<RustConnection>` created by
//! [`X11Shared::connect`]. The clipboard adapter shells out to `xclip`
//! and needs no connection of its own.

pub mod clipboard;
pub mod keystroke;

use std::sync::Arc;

use x11rb::connection::Connection;
use x11rb::protocol::xproto::Window;
use x11rb::rust_connection::RustConnection;

use super::ResolverError;

/// Shared X11 connection state used by the adapters.
pub struct X11Shared {
    /// Shared X11 connection.
    pub conn: Arc<RustConnection>,
    /// Root window of the default screen.
    pub root: Window,
}

impl X11Shared {
    /// Connect to the X11 display.
    pub fn connect() -> Result<Self, ResolverError> {
        let (conn, screen_num) = RustConnection::connect(None)
            .map_err(|e| ResolverError::Display(format!("X11 connect failed: {e}")))?;

        let root = conn.setup().roots[screen_num].root;
        tracing::debug!(screen = screen_num, root, "X11Shared: connected");

        Ok(Self {
            conn: Arc::new(conn),
            root,
        })
    }
}
