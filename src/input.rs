//! Keyboard and pointer input: grabs, mapping tables, mouse drags.
//!
//! Key grabs are repeated for every NumLock/CapsLock combination so
//! chords fire regardless of lock state. The drag loops are nested
//! event loops that keep servicing redirect traffic while the pointer
//! is grabbed; motion samples are throttled to the configured refresh
//! rate.

use std::time::Instant;

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use crate::layout::LayoutKind;
use crate::state::ClientId;
use crate::Wm;

const XK_NUM_LOCK: u32 = 0xff7f;
const LOCK_MASK: u16 = 2;
/// Modifier for the built-in pointer chords.
pub const DRAG_MOD: u16 = 64; // Mod4

fn mouse_mask() -> EventMask {
    EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION
}

/// Snapshot of the server's keycode -> keysym table.
pub struct KeyMap {
    min_keycode: u8,
    keysyms_per_keycode: u8,
    keysyms: Vec<u32>,
}

impl KeyMap {
    pub fn fetch(conn: &RustConnection) -> Result<Self> {
        let setup = conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let reply = conn.get_keyboard_mapping(min, max - min + 1)?.reply()?;
        Ok(Self {
            min_keycode: min,
            keysyms_per_keycode: reply.keysyms_per_keycode,
            keysyms: reply.keysyms,
        })
    }

    /// Primary (unshifted) keysym for a keycode.
    pub fn keysym(&self, keycode: u8) -> u32 {
        let idx = (keycode.saturating_sub(self.min_keycode)) as usize
            * self.keysyms_per_keycode as usize;
        self.keysyms.get(idx).copied().unwrap_or(0)
    }

    /// All keycodes whose primary keysym matches.
    pub fn keycodes_for(&self, keysym: u32) -> Vec<u8> {
        let per = self.keysyms_per_keycode as usize;
        let mut codes = Vec::new();
        for (i, chunk) in self.keysyms.chunks(per).enumerate() {
            if chunk.first() == Some(&keysym) {
                codes.push(self.min_keycode + i as u8);
            }
        }
        codes
    }
}

impl Wm {
    /// Find which modifier row NumLock lives on.
    pub fn update_numlock_mask(&mut self) -> Result<()> {
        let reply = self.conn.get_modifier_mapping()?.reply()?;
        let per = reply.keycodes_per_modifier() as usize;
        let numlock_codes = self.keymap.keycodes_for(XK_NUM_LOCK);
        self.numlock_mask = 0;
        for (i, row) in reply.keycodes.chunks(per).enumerate() {
            if row.iter().any(|kc| numlock_codes.contains(kc)) {
                self.numlock_mask = 1 << i;
            }
        }
        Ok(())
    }

    fn lock_combos(&self) -> [u16; 4] {
        [
            0,
            LOCK_MASK,
            self.numlock_mask,
            self.numlock_mask | LOCK_MASK,
        ]
    }

    /// Strip lock modifiers and pointer-button bits before matching
    /// against bound chords.
    pub fn clean_mask(&self, state: u16) -> u16 {
        state & !(self.numlock_mask | LOCK_MASK) & 0xff
    }

    /// Drop and re-establish every key grab from the binding table.
    pub fn grab_keys(&mut self) -> Result<()> {
        self.update_numlock_mask()?;
        self.conn.ungrab_key(Grab::ANY, self.root, ModMask::ANY)?;
        for binding in self.keybindings.clone() {
            for keycode in self.keymap.keycodes_for(binding.keysym) {
                for extra in self.lock_combos() {
                    self.conn.grab_key(
                        true,
                        self.root,
                        ModMask::from(binding.modifiers | extra),
                        keycode,
                        GrabMode::ASYNC,
                        GrabMode::ASYNC,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Button grabs on one client. Unfocused clients carry a universal
    /// synchronous grab so the first click can focus them and then be
    /// replayed; the Mod-chords for move/resize/toggle are always
    /// grabbed.
    pub fn grab_buttons(&mut self, id: ClientId, focused: bool) -> Result<()> {
        let win = self.state.clients[id].win;
        self.conn
            .ungrab_button(ButtonIndex::ANY, win, ModMask::ANY)?;
        if !focused {
            self.conn.grab_button(
                false,
                win,
                mouse_mask(),
                GrabMode::SYNC,
                GrabMode::SYNC,
                x11rb::NONE,
                x11rb::NONE,
                ButtonIndex::ANY,
                ModMask::ANY,
            )?;
        }
        for button in [ButtonIndex::M1, ButtonIndex::M2, ButtonIndex::M3] {
            for extra in self.lock_combos() {
                self.conn.grab_button(
                    false,
                    win,
                    mouse_mask(),
                    GrabMode::ASYNC,
                    GrabMode::SYNC,
                    x11rb::NONE,
                    x11rb::NONE,
                    button,
                    ModMask::from(DRAG_MOD | extra),
                )?;
            }
        }
        Ok(())
    }

    /// Interactive move. A tiled client that travels past the snap
    /// threshold becomes floating; floating clients snap to the work
    /// area edges. On release the client re-homes to the monitor under
    /// the pointer.
    pub fn move_client_with_mouse(&mut self, id: ClientId) -> Result<()> {
        if self.state.clients[id].is_fullscreen {
            return Ok(());
        }
        let mon = self.state.client_mon(id);
        self.restack(mon)?;
        let origin = self.state.clients[id].geom;

        let grab = self
            .conn
            .grab_pointer(
                false,
                self.root,
                mouse_mask(),
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                self.cursors.moving,
                x11rb::CURRENT_TIME,
            )?
            .reply()?;
        if grab.status != GrabStatus::SUCCESS {
            return Ok(());
        }
        let start = self.conn.query_pointer(self.root)?.reply()?;
        let (start_x, start_y) = (start.root_x as i32, start.root_y as i32);

        let interval = self.config.refresh_interval();
        let snap = self.config.windows.snap as i32;
        let mut last_sample = Instant::now() - interval;
        loop {
            let event = self.conn.wait_for_event()?;
            match event {
                Event::ConfigureRequest(_) | Event::Expose(_) | Event::MapRequest(_) => {
                    self.handle_event(event);
                }
                Event::MotionNotify(e) => {
                    if last_sample.elapsed() < interval {
                        continue;
                    }
                    last_sample = Instant::now();
                    let mut nx = origin.x + (e.root_x as i32 - start_x);
                    let mut ny = origin.y + (e.root_y as i32 - start_y);
                    let work = self.state.monitors[self.state.selected_mon].work;
                    let c = &self.state.clients[id];
                    let (cw, ch) = (c.width(), c.height());
                    if (work.x - nx).abs() < snap {
                        nx = work.x;
                    } else if ((work.x + work.w) - (nx + cw)).abs() < snap {
                        nx = work.x + work.w - cw;
                    }
                    if (work.y - ny).abs() < snap {
                        ny = work.y;
                    } else if ((work.y + work.h) - (ny + ch)).abs() < snap {
                        ny = work.y + work.h - ch;
                    }
                    let float_layout = self.state.monitors[self.state.selected_mon].layout()
                        == LayoutKind::Floating;
                    if !self.state.clients[id].is_floating
                        && !float_layout
                        && ((nx - self.state.clients[id].geom.x).abs() > snap
                            || (ny - self.state.clients[id].geom.y).abs() > snap)
                    {
                        self.toggle_floating()?;
                    }
                    if self.state.clients[id].is_floating || float_layout {
                        let (w, h) = {
                            let g = self.state.clients[id].geom;
                            (g.w, g.h)
                        };
                        self.resize(id, nx, ny, w, h, true)?;
                    }
                }
                Event::ButtonRelease(_) => break,
                other => self.pending.push_back(other),
            }
        }
        self.conn.ungrab_pointer(x11rb::CURRENT_TIME)?;
        self.finish_drag(id)?;
        Ok(())
    }

    /// Interactive resize from the bottom-right corner. Floating
    /// clients (and the floating layout) resize live; a tiled client
    /// under the gapped spiral adjusts its split ratio so the whole
    /// layout follows the pointer; tiled clients elsewhere float once
    /// dragged past the snap threshold.
    pub fn resize_client_with_mouse(&mut self, id: ClientId) -> Result<()> {
        if self.state.clients[id].is_fullscreen {
            return Ok(());
        }
        let mon = self.state.client_mon(id);
        self.restack(mon)?;
        let origin = self.state.clients[id].geom;
        let border_w = self.state.clients[id].border_w;

        let grab = self
            .conn
            .grab_pointer(
                false,
                self.root,
                mouse_mask(),
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                self.cursors.resizing,
                x11rb::CURRENT_TIME,
            )?
            .reply()?;
        if grab.status != GrabStatus::SUCCESS {
            return Ok(());
        }
        self.warp_to_corner(id)?;

        let interval = self.config.refresh_interval();
        let snap = self.config.windows.snap as i32;
        let mut last_sample = Instant::now() - interval;
        let mut last_pos: Option<(i32, i32)> = None;
        loop {
            let event = self.conn.wait_for_event()?;
            match event {
                Event::ConfigureRequest(_) | Event::Expose(_) | Event::MapRequest(_) => {
                    self.handle_event(event);
                }
                Event::MotionNotify(e) => {
                    if last_sample.elapsed() < interval {
                        continue;
                    }
                    last_sample = Instant::now();
                    let (px, py) = (e.root_x as i32, e.root_y as i32);
                    let nw = (px - origin.x - 2 * border_w + 1).max(1);
                    let nh = (py - origin.y - 2 * border_w + 1).max(1);
                    let sel = self.state.selected_mon;
                    let layout = self.state.monitors[sel].layout();
                    let floating = self.state.clients[id].is_floating;
                    if !floating && layout == LayoutKind::DwindleGaps {
                        let prev = last_pos.unwrap_or((px, py));
                        self.adjust_split_ratio(id, px - prev.0, py - prev.1)?;
                    } else {
                        if !floating
                            && layout != LayoutKind::Floating
                            && ((nw - self.state.clients[id].geom.w).abs() > snap
                                || (nh - self.state.clients[id].geom.h).abs() > snap)
                        {
                            self.toggle_floating()?;
                        }
                        if self.state.clients[id].is_floating
                            || layout == LayoutKind::Floating
                        {
                            let (x, y) = {
                                let g = self.state.clients[id].geom;
                                (g.x, g.y)
                            };
                            self.resize(id, x, y, nw, nh, true)?;
                        }
                    }
                    last_pos = Some((px, py));
                }
                Event::ButtonRelease(_) => break,
                other => self.pending.push_back(other),
            }
        }
        self.conn.ungrab_pointer(x11rb::CURRENT_TIME)?;
        self.finish_drag(id)?;
        Ok(())
    }

    /// Nudge the dragged client's split fraction by the pointer delta
    /// along its cut axis and re-run the layout, so spiral neighbours
    /// follow in the same motion sample.
    fn adjust_split_ratio(&mut self, id: ClientId, dx: i32, dy: i32) -> Result<()> {
        let mon = self.state.client_mon(id);
        let tiled = self.state.tiled_visible(mon);
        let Some(index) = tiled.iter().position(|&c| c == id) else {
            return Ok(());
        };
        // The last client owns no cut of its own.
        if index + 1 == tiled.len() {
            return Ok(());
        }
        let horizontal = index % 2 == 0;
        let c = &mut self.state.clients[id];
        if horizontal {
            let ratio = c.horizontal_ratio;
            let region = (c.geom.w as f32 / ratio).max(1.0);
            c.horizontal_ratio = (ratio + dx as f32 / region).clamp(0.1, 0.9);
        } else {
            let ratio = c.vertical_ratio;
            let region = (c.geom.h as f32 / ratio).max(1.0);
            c.vertical_ratio = (ratio + dy as f32 / region).clamp(0.1, 0.9);
        }
        self.arrange_monitor(mon)?;
        Ok(())
    }

    fn warp_to_corner(&self, id: ClientId) -> Result<()> {
        let c = &self.state.clients[id];
        self.conn.warp_pointer(
            x11rb::NONE,
            c.win,
            0,
            0,
            0,
            0,
            (c.geom.w + c.border_w - 1) as i16,
            (c.geom.h + c.border_w - 1) as i16,
        )?;
        Ok(())
    }

    /// Shared drag epilogue: re-home the client to the monitor under
    /// the pointer and drop stale crossing events.
    fn finish_drag(&mut self, id: ClientId) -> Result<()> {
        let pointer = self.conn.query_pointer(self.root)?.reply()?;
        let target = self
            .state
            .monitor_at(pointer.root_x as i32, pointer.root_y as i32);
        if target != self.state.client_mon(id) {
            self.send_client_to_monitor(id, target)?;
            self.state.selected_mon = target;
            self.focus(Some(id))?;
        }
        self.drain_enter_events()?;
        Ok(())
    }
}
