//! Control channel between `mosaicctl` and a running window manager.
//!
//! Commands travel as a single CARDINAL written to a root property,
//! followed by a ClientMessage that wakes the event loop. The client
//! side refuses to send anything when no compositor-side check window
//! is advertised.

use anyhow::{bail, Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::ewmh::{self, Atoms};
use crate::Wm;

pub const CMD_RELOAD: u32 = 1;
pub const CMD_QUIT: u32 = 2;

/// Deliver one command to the running window manager.
pub fn send_command(command: u32) -> Result<()> {
    let (conn, screen_num) =
        RustConnection::connect(None).context("failed to connect to the X server")?;
    let root = conn.setup().roots[screen_num].root;
    let atoms = Atoms::new(&conn)?;

    if !wm_is_running(&conn, &atoms, root) {
        bail!("no running window manager found");
    }

    conn.change_property32(
        PropMode::REPLACE,
        root,
        atoms.command,
        AtomEnum::CARDINAL,
        &[command],
    )?;
    let event = ClientMessageEvent {
        response_type: CLIENT_MESSAGE_EVENT,
        format: 32,
        sequence: 0,
        window: root,
        type_: atoms.command,
        data: ClientMessageData::from([command, 0, 0, 0, 0]),
    };
    conn.send_event(false, root, EventMask::SUBSTRUCTURE_REDIRECT, event)?;
    conn.flush()?;
    Ok(())
}

/// A window manager advertises itself through a supporting check
/// window on the root.
fn wm_is_running(conn: &RustConnection, atoms: &Atoms, root: Window) -> bool {
    let Ok(cookie) = conn.get_property(
        false,
        root,
        atoms.net_supporting_wm_check,
        AtomEnum::WINDOW,
        0,
        1,
    ) else {
        return false;
    };
    match cookie.reply() {
        Ok(reply) => reply
            .value32()
            .and_then(|mut v| v.next())
            .is_some_and(|w| w != 0),
        Err(_) => false,
    }
}

impl Wm {
    pub fn handle_command(&mut self, command: u32) -> Result<()> {
        match command {
            CMD_RELOAD => {
                log::info!("reload requested over the command channel");
                self.reload_config()
            }
            CMD_QUIT => {
                log::info!("quit requested over the command channel");
                self.state.running = false;
                Ok(())
            }
            other => {
                log::warn!("ignoring unknown command {}", other);
                Ok(())
            }
        }
    }

    /// Re-read the configuration file and push the parts that can
    /// change at runtime out to the server: key grabs, border styling,
    /// gaps, dash geometry and the advertised workspace names.
    pub fn reload_config(&mut self) -> Result<()> {
        let path = crate::config::Config::default_path();
        match crate::config::Config::try_load_from_path(&path) {
            Ok(Some(config)) => self.config = config,
            Ok(None) => self.config = crate::config::Config::default(),
            Err(e) => {
                log::error!(
                    "Failed to parse {:?}, keeping the running configuration: {}",
                    path,
                    e
                );
                return Ok(());
            }
        }
        self.keybindings = self.config.parse_keybindings();
        self.grab_keys()?;
        let defaults = self.monitor_defaults();
        self.state.apply_monitor_defaults(&defaults);

        let border_w = self.config.border.width as u32;
        let inactive = self.config.inactive_border_pixel();
        let active_pixel = self.config.active_border_pixel();
        let active = self.state.selected().active;
        let ids: Vec<_> = self.state.clients.keys().collect();
        for id in ids {
            let c = &mut self.state.clients[id];
            if !c.is_fullscreen {
                c.border_w = border_w as i32;
            }
            let win = self.state.clients[id].win;
            let bw = self.state.clients[id].border_w as u32;
            self.conn
                .configure_window(win, &ConfigureWindowAux::new().border_width(bw))?;
            let pixel = if active == Some(id) { active_pixel } else { inactive };
            self.set_border_color(id, pixel)?;
        }

        self.destroy_dash_windows();
        self.create_dash_windows()?;
        let mons: Vec<_> = self.state.mon_order.clone();
        for mon in mons {
            self.apply_dash_strut(mon);
        }
        ewmh::set_desktop_properties(
            &self.conn,
            &self.atoms,
            self.root,
            self.config.workspace_names(),
        )?;
        self.arrange_all()?;
        self.draw_all_dashes();
        self.conn.flush()?;
        log::info!("configuration reloaded");
        Ok(())
    }
}
