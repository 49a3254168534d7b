//! EWMH and ICCCM atom management and property helpers.
//!
//! All atoms the window manager touches are interned up front; the
//! stateless query/update helpers here keep protocol details out of the
//! event handlers.

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

/// ICCCM WM_STATE values
pub const WITHDRAWN_STATE: u32 = 0;
pub const NORMAL_STATE: u32 = 1;
pub const ICONIC_STATE: u32 = 3;

/// EWMH and ICCCM atoms used by the window manager
pub struct Atoms {
    // ICCCM atoms
    pub wm_protocols: Atom,
    pub wm_delete_window: Atom,
    pub wm_take_focus: Atom,
    pub wm_state: Atom,

    // Core EWMH atoms
    pub net_supported: Atom,
    pub net_client_list: Atom,
    pub net_active_window: Atom,
    pub net_wm_name: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_fullscreen: Atom,
    pub net_wm_window_type: Atom,
    pub net_wm_window_type_dialog: Atom,
    pub net_supporting_wm_check: Atom,
    pub utf8_string: Atom,

    // Workspace-related atoms
    pub net_current_desktop: Atom,
    pub net_number_of_desktops: Atom,
    pub net_desktop_names: Atom,
    pub net_desktop_viewport: Atom,

    // Command channel for the control clients
    pub command: Atom,
}

impl Atoms {
    /// Create and intern all required atoms
    pub fn new(conn: &RustConnection) -> Result<Self> {
        Ok(Self {
            wm_protocols: Self::intern(conn, b"WM_PROTOCOLS")?,
            wm_delete_window: Self::intern(conn, b"WM_DELETE_WINDOW")?,
            wm_take_focus: Self::intern(conn, b"WM_TAKE_FOCUS")?,
            wm_state: Self::intern(conn, b"WM_STATE")?,
            net_supported: Self::intern(conn, b"_NET_SUPPORTED")?,
            net_client_list: Self::intern(conn, b"_NET_CLIENT_LIST")?,
            net_active_window: Self::intern(conn, b"_NET_ACTIVE_WINDOW")?,
            net_wm_name: Self::intern(conn, b"_NET_WM_NAME")?,
            net_wm_state: Self::intern(conn, b"_NET_WM_STATE")?,
            net_wm_state_fullscreen: Self::intern(conn, b"_NET_WM_STATE_FULLSCREEN")?,
            net_wm_window_type: Self::intern(conn, b"_NET_WM_WINDOW_TYPE")?,
            net_wm_window_type_dialog: Self::intern(conn, b"_NET_WM_WINDOW_TYPE_DIALOG")?,
            net_supporting_wm_check: Self::intern(conn, b"_NET_SUPPORTING_WM_CHECK")?,
            utf8_string: Self::intern(conn, b"UTF8_STRING")?,
            net_current_desktop: Self::intern(conn, b"_NET_CURRENT_DESKTOP")?,
            net_number_of_desktops: Self::intern(conn, b"_NET_NUMBER_OF_DESKTOPS")?,
            net_desktop_names: Self::intern(conn, b"_NET_DESKTOP_NAMES")?,
            net_desktop_viewport: Self::intern(conn, b"_NET_DESKTOP_VIEWPORT")?,
            command: Self::intern(conn, b"_MOSAIC_COMMAND")?,
        })
    }

    /// Every atom listed in _NET_SUPPORTED; nothing else is advertised.
    pub fn supported(&self) -> Vec<Atom> {
        vec![
            self.net_supported,
            self.net_client_list,
            self.net_active_window,
            self.net_wm_name,
            self.net_wm_state,
            self.net_wm_state_fullscreen,
            self.net_wm_window_type,
            self.net_wm_window_type_dialog,
            self.net_supporting_wm_check,
            self.net_current_desktop,
            self.net_number_of_desktops,
            self.net_desktop_names,
            self.net_desktop_viewport,
        ]
    }

    /// Intern an atom name
    fn intern(conn: &RustConnection, name: &[u8]) -> Result<Atom> {
        Ok(conn.intern_atom(false, name)?.reply()?.atom)
    }
}

/// Get the window title from _NET_WM_NAME or WM_NAME.
pub fn get_window_title(conn: &impl Connection, atoms: &Atoms, window: Window) -> String {
    for (prop, type_) in [
        (atoms.net_wm_name, atoms.utf8_string),
        (u32::from(AtomEnum::WM_NAME), u32::from(AtomEnum::STRING)),
    ] {
        if let Ok(reply) = conn.get_property(false, window, prop, type_, 0, 1024) {
            if let Ok(reply) = reply.reply() {
                if !reply.value.is_empty() {
                    if let Ok(s) = String::from_utf8(reply.value) {
                        return s;
                    }
                }
            }
        }
    }
    format!("0x{:x}", window)
}

/// First atom stored in an ATOM-typed property, or NONE.
pub fn get_atom_property(conn: &impl Connection, window: Window, prop: Atom) -> Atom {
    if let Ok(cookie) = conn.get_property(false, window, prop, AtomEnum::ATOM, 0, 1) {
        if let Ok(reply) = cookie.reply() {
            if let Some(mut atoms) = reply.value32() {
                if let Some(a) = atoms.next() {
                    return a;
                }
            }
        }
    }
    x11rb::NONE
}

/// The window this one is transient for, if any.
pub fn get_transient_for(conn: &impl Connection, window: Window) -> Option<Window> {
    let reply = conn
        .get_property(
            false,
            window,
            AtomEnum::WM_TRANSIENT_FOR,
            AtomEnum::WINDOW,
            0,
            1,
        )
        .ok()?
        .reply()
        .ok()?;
    let window = reply.value32()?.next();
    window.filter(|&w| w != x11rb::NONE)
}

/// Check if a window advertises a WM protocol in WM_PROTOCOLS.
pub fn supports_protocol(
    conn: &impl Connection,
    atoms: &Atoms,
    window: Window,
    protocol: Atom,
) -> bool {
    if let Ok(cookie) = conn.get_property(false, window, atoms.wm_protocols, AtomEnum::ATOM, 0, 32)
    {
        if let Ok(reply) = cookie.reply() {
            if let Some(protocol_atoms) = reply.value32() {
                return protocol_atoms.into_iter().any(|a| a == protocol);
            }
        }
    }
    false
}

/// Deliver a WM protocol client message (WM_DELETE_WINDOW, WM_TAKE_FOCUS).
pub fn send_protocol_event(
    conn: &impl Connection,
    atoms: &Atoms,
    window: Window,
    protocol: Atom,
) -> Result<()> {
    let data = ClientMessageData::from([protocol, x11rb::CURRENT_TIME, 0u32, 0u32, 0u32]);
    let event = ClientMessageEvent {
        response_type: CLIENT_MESSAGE_EVENT,
        format: 32,
        sequence: 0,
        window,
        type_: atoms.wm_protocols,
        data,
    };
    conn.send_event(false, window, EventMask::NO_EVENT, event)?;
    Ok(())
}

/// Set the ICCCM WM_STATE property.
pub fn set_wm_state(
    conn: &impl Connection,
    atoms: &Atoms,
    window: Window,
    state: u32,
) -> Result<()> {
    conn.change_property32(
        PropMode::REPLACE,
        window,
        atoms.wm_state,
        atoms.wm_state,
        &[state, x11rb::NONE],
    )?;
    Ok(())
}

/// Read back WM_STATE, used when adopting windows at startup.
pub fn get_wm_state(conn: &impl Connection, atoms: &Atoms, window: Window) -> Option<u32> {
    let reply = conn
        .get_property(false, window, atoms.wm_state, atoms.wm_state, 0, 2)
        .ok()?
        .reply()
        .ok()?;
    let state = reply.value32()?.next();
    state
}

/// Publish the static desktop properties derived from the workspace list.
pub fn set_desktop_properties(
    conn: &impl Connection,
    atoms: &Atoms,
    root: Window,
    names: &[String],
) -> Result<()> {
    conn.change_property32(
        PropMode::REPLACE,
        root,
        atoms.net_number_of_desktops,
        AtomEnum::CARDINAL,
        &[names.len() as u32],
    )?;
    let mut name_bytes = Vec::new();
    for n in names {
        name_bytes.extend_from_slice(n.as_bytes());
        name_bytes.push(0);
    }
    conn.change_property8(
        PropMode::REPLACE,
        root,
        atoms.net_desktop_names,
        atoms.utf8_string,
        &name_bytes,
    )?;
    conn.change_property32(
        PropMode::REPLACE,
        root,
        atoms.net_desktop_viewport,
        AtomEnum::CARDINAL,
        &[0, 0],
    )?;
    Ok(())
}

/// Publish the lowest visible workspace as _NET_CURRENT_DESKTOP.
pub fn set_current_desktop(
    conn: &impl Connection,
    atoms: &Atoms,
    root: Window,
    workspace_set: u32,
) -> Result<()> {
    let current = workspace_set.trailing_zeros();
    conn.change_property32(
        PropMode::REPLACE,
        root,
        atoms.net_current_desktop,
        AtomEnum::CARDINAL,
        &[current],
    )?;
    Ok(())
}
