//! mosaicwm - a dynamic tiling and floating window manager for X11.
//!
//! One monitor shows one workspace set at a time; clients carry a
//! workspace bitmask and layouts rearrange whatever is visible. The
//! event loop owns a single `Wm` value holding the X connection, the
//! pure bookkeeping state and the active configuration snapshot.

mod actions;
mod client;
mod command;
mod config;
mod dash;
mod event;
mod ewmh;
mod focus;
mod input;
mod layout;
mod manage;
mod startup;
mod state;
mod types;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use x11rb::connection::Connection;
use x11rb::protocol::xinerama;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use config::{Config, Keybinding};
use ewmh::Atoms;
use input::KeyMap;
use state::{MonitorDefaults, WmState};
use types::{workspace_mask, Rect};

#[derive(Parser)]
#[command(name = "mosaicwm", disable_version_flag = true)]
struct Cli {
    /// Print version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Ask a running instance to reload its configuration
    Reload,
}

/// Cursors created from the core cursor font.
pub struct Cursors {
    pub normal: Cursor,
    pub moving: Cursor,
    pub resizing: Cursor,
}

impl Cursors {
    fn new(conn: &RustConnection) -> Result<Self> {
        // Core cursor font glyphs: left_ptr, fleur, sizing
        let font = conn.generate_id()?;
        conn.open_font(font, b"cursor")?;
        let normal = Self::glyph(conn, font, 68)?;
        let moving = Self::glyph(conn, font, 52)?;
        let resizing = Self::glyph(conn, font, 120)?;
        conn.close_font(font)?;
        Ok(Self {
            normal,
            moving,
            resizing,
        })
    }

    fn glyph(conn: &RustConnection, font: Font, glyph: u16) -> Result<Cursor> {
        let cursor = conn.generate_id()?;
        conn.create_glyph_cursor(
            cursor,
            font,
            font,
            glyph,
            glyph + 1,
            0,
            0,
            0,
            0xffff,
            0xffff,
            0xffff,
        )?;
        Ok(cursor)
    }
}

/// The window manager
pub struct Wm {
    pub conn: RustConnection,
    pub screen_num: usize,
    pub root: Window,
    pub screen_w: i32,
    pub screen_h: i32,
    pub atoms: Atoms,
    pub cursors: Cursors,
    pub config: Config,
    pub keybindings: Vec<Keybinding>,
    pub keymap: KeyMap,
    pub numlock_mask: u16,
    pub state: WmState,
    /// EWMH check window; also carries the command-channel property.
    pub check_win: Window,
    /// Root window name, shown on the dash.
    pub status_text: String,
    /// Events put back by selective drains (restack, drag release).
    pub pending: std::collections::VecDeque<x11rb::protocol::Event>,
    pub dash_gc: Gcontext,
    pub dash_font: Font,
}

impl Wm {
    pub fn new(config: Config) -> Result<Self> {
        let (conn, screen_num) =
            RustConnection::connect(None).context("Failed to connect to X server")?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let screen_w = screen.width_in_pixels as i32;
        let screen_h = screen.height_in_pixels as i32;

        become_wm(&conn, root)?;
        startup::ignore_sigchld();

        let atoms = Atoms::new(&conn)?;
        let cursors = Cursors::new(&conn)?;
        let keybindings = config.parse_keybindings();
        let state = WmState::new(workspace_mask(config.workspace_names().len()));
        let keymap = KeyMap::fetch(&conn)?;

        let check_win = conn.generate_id()?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            check_win,
            root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            0,
            &CreateWindowAux::default().override_redirect(1),
        )?;

        let dash_gc = conn.generate_id()?;
        let dash_font = conn.generate_id()?;
        conn.open_font(dash_font, b"fixed")?;
        conn.create_gc(
            dash_gc,
            root,
            &CreateGCAux::default()
                .font(dash_font)
                .graphics_exposures(0),
        )?;

        let mut wm = Self {
            conn,
            screen_num,
            root,
            screen_w,
            screen_h,
            atoms,
            cursors,
            config,
            keybindings,
            keymap,
            numlock_mask: 0,
            state,
            check_win,
            status_text: String::from("mosaicwm"),
            pending: std::collections::VecDeque::new(),
            dash_gc,
            dash_font,
        };

        wm.update_monitor_geometry()?;
        wm.setup_ewmh()?;
        wm.select_root_events()?;
        wm.update_numlock_mask()?;
        wm.grab_keys()?;
        wm.create_dash_windows()?;
        wm.update_status_text();
        wm.scan()?;
        wm.focus(None)?;
        wm.arrange_all()?;
        wm.draw_all_dashes();
        wm.conn.flush()?;
        Ok(wm)
    }

    /// Publish the EWMH identity and desktop properties.
    fn setup_ewmh(&self) -> Result<()> {
        let c = &self.conn;
        c.change_property32(
            PropMode::REPLACE,
            self.check_win,
            self.atoms.net_supporting_wm_check,
            AtomEnum::WINDOW,
            &[self.check_win],
        )?;
        c.change_property8(
            PropMode::REPLACE,
            self.check_win,
            self.atoms.net_wm_name,
            self.atoms.utf8_string,
            b"mosaicwm",
        )?;
        c.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms.net_supporting_wm_check,
            AtomEnum::WINDOW,
            &[self.check_win],
        )?;
        c.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms.net_supported,
            AtomEnum::ATOM,
            &self.atoms.supported(),
        )?;
        c.delete_property(self.root, self.atoms.net_client_list)?;
        ewmh::set_desktop_properties(c, &self.atoms, self.root, self.config.workspace_names())?;
        ewmh::set_current_desktop(
            c,
            &self.atoms,
            self.root,
            self.state.selected().active_workspaces(),
        )?;
        Ok(())
    }

    fn select_root_events(&self) -> Result<()> {
        let mask = EventMask::SUBSTRUCTURE_REDIRECT
            | EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::BUTTON_PRESS
            | EventMask::POINTER_MOTION
            | EventMask::ENTER_WINDOW
            | EventMask::STRUCTURE_NOTIFY
            | EventMask::PROPERTY_CHANGE;
        self.conn.change_window_attributes(
            self.root,
            &ChangeWindowAttributesAux::default()
                .event_mask(mask)
                .cursor(self.cursors.normal),
        )?;
        Ok(())
    }

    /// Query Xinerama for the output list and fold it into the monitor
    /// registry; without the extension a single monitor covers the root.
    pub fn update_monitor_geometry(&mut self) -> Result<bool> {
        let defaults = self.monitor_defaults();
        let geoms = self.query_output_geometries()?;
        let dirty = self.state.reconcile_monitors(&geoms, &defaults);
        if self.state.mon_order.is_empty() {
            bail!("No usable monitors");
        }
        for &m in &self.state.mon_order.clone() {
            self.apply_dash_strut(m);
        }
        Ok(dirty)
    }

    fn query_output_geometries(&self) -> Result<Vec<Rect>> {
        let active = xinerama::is_active(&self.conn)?.reply()?;
        if active.state != 0 {
            let screens = xinerama::query_screens(&self.conn)?.reply()?;
            if !screens.screen_info.is_empty() {
                return Ok(screens
                    .screen_info
                    .iter()
                    .map(|s| {
                        Rect::new(
                            s.x_org as i32,
                            s.y_org as i32,
                            s.width as i32,
                            s.height as i32,
                        )
                    })
                    .collect());
            }
        }
        Ok(vec![Rect::new(0, 0, self.screen_w, self.screen_h)])
    }

    pub fn monitor_defaults(&self) -> MonitorDefaults {
        MonitorDefaults {
            master_factor: self.config.master_factor(),
            num_master: self.config.layout.num_master,
            layouts: [self.config.default_layout(), layout::LayoutKind::Floating],
            show_dash: self.config.dash.show,
        }
    }

    /// Main event loop: block, dispatch, flush, until quit.
    pub fn run(&mut self) -> Result<()> {
        while self.state.running {
            self.conn.flush()?;
            let event = match self.pending.pop_front() {
                Some(event) => event,
                None => self.conn.wait_for_event()?,
            };
            self.handle_event(event);
        }
        Ok(())
    }

    /// Release everything we changed on the server before exiting.
    pub fn cleanup(&mut self) {
        let wins: Vec<u32> = self.state.clients.values().map(|c| c.win).collect();
        for win in wins {
            if let Some((id, _)) = self.state.find_client(win) {
                let _ = self.unmanage(id, false);
            }
        }
        let _ = self
            .conn
            .ungrab_key(Grab::ANY, self.root, ModMask::ANY);
        let _ = self.conn.set_input_focus(
            InputFocus::POINTER_ROOT,
            self.root,
            x11rb::CURRENT_TIME,
        );
        let _ = self.conn.delete_property(self.root, self.atoms.net_active_window);
        let _ = self.conn.destroy_window(self.check_win);
        self.destroy_dash_windows();
        let _ = self.conn.flush();
    }
}

/// Selecting SubstructureRedirect on the root is exclusive; failure
/// means another window manager owns this display.
fn become_wm(conn: &RustConnection, root: Window) -> Result<()> {
    let change = ChangeWindowAttributesAux::default()
        .event_mask(EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY);
    let res = conn.change_window_attributes(root, &change)?.check();
    if res.is_err() {
        bail!("Another window manager is already running");
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if cli.version {
        println!("mosaicwm {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    // Load first, log after: the filter level comes from the file.
    let config_path = Config::default_path();
    let (config, load_outcome) = match Config::try_load_from_path(&config_path) {
        Ok(Some(config)) => (config, Ok(true)),
        Ok(None) => (Config::default(), Ok(false)),
        Err(e) => (Config::default(), Err(e)),
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.clone()),
    )
    .init();
    match load_outcome {
        Ok(true) => log::info!("Loaded config from {:?}", config_path),
        Ok(false) => log::info!("No config file found at {:?}, using defaults", config_path),
        Err(e) => log::warn!("Failed to parse {:?}, using defaults: {}", config_path, e),
    }

    if let Some(CliCommand::Reload) = cli.command {
        std::process::exit(match command::send_command(command::CMD_RELOAD) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("mosaicwm: {}", e);
                1
            }
        });
    }

    log::info!("mosaicwm {} starting", env!("CARGO_PKG_VERSION"));
    let mut wm = match Wm::new(config) {
        Ok(wm) => wm,
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
    };
    startup::run_startup_programs(&wm.config.startup);
    if let Err(e) = wm.run() {
        log::error!("Event loop failed: {:#}", e);
        wm.cleanup();
        std::process::exit(1);
    }
    wm.cleanup();
    log::info!("mosaicwm exiting");
}
