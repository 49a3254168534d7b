//! Window adoption, release, and geometry application.
//!
//! `manage` turns a top-level window into a Client and slots it into
//! the monitor lists; `unmanage` undoes every server-side change we
//! made. The arrange pass runs the layout engine and pushes the
//! resulting placements through the constraint solver.

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::properties::WmSizeHints;
use x11rb::protocol::xproto::*;
use x11rb::wrapper::ConnectionExt as _;

use crate::client::{apply_size_constraints, Client, SizeHints};
use crate::ewmh;
use crate::layout::{self, LayoutKind, LayoutParams};
use crate::state::{ClientId, MonitorId};
use crate::types::Rect;
use crate::Wm;

impl Wm {
    /// Adopt a top-level window.
    pub fn manage(&mut self, win: Window) -> Result<()> {
        if self.state.find_client(win).is_some() {
            return Ok(());
        }
        let geom = self.conn.get_geometry(win)?.reply()?;
        let mut client = Client::new(
            win,
            Rect::new(
                geom.x as i32,
                geom.y as i32,
                geom.width as i32,
                geom.height as i32,
            ),
            self.config.border.width as i32,
        );
        client.old_border_w = geom.border_width as i32;

        // Transients join their parent's monitor and workspaces.
        let mut mon = self.state.selected_mon;
        let mut transient = false;
        if let Some(parent) = ewmh::get_transient_for(&self.conn, win) {
            if let Some((pid, pmon)) = self.state.find_client(parent) {
                mon = pmon;
                client.workspaces = self.state.clients[pid].workspaces;
                transient = true;
            }
        }
        if client.workspaces == 0 {
            client.workspaces = self.state.monitors[mon].active_workspaces();
        }

        // Keep the window entirely on its monitor.
        let screen = self.state.monitors[mon].screen;
        let bw2 = 2 * client.border_w;
        if client.geom.x + client.geom.w + bw2 > screen.x + screen.w {
            client.geom.x = screen.x + screen.w - client.geom.w - bw2;
        }
        if client.geom.y + client.geom.h + bw2 > screen.y + screen.h {
            client.geom.y = screen.y + screen.h - client.geom.h - bw2;
        }
        client.geom.x = client.geom.x.max(screen.x);
        client.geom.y = client.geom.y.max(screen.y);
        client.old_geom = client.geom;
        client.is_floating = transient;

        let id = self.state.add_client(mon, client);

        self.conn.configure_window(
            win,
            &ConfigureWindowAux::default().border_width(self.config.border.width),
        )?;
        self.set_border_color(id, self.config.inactive_border_pixel())?;
        self.send_configure_notify(id)?;
        self.update_window_type(id)?;
        self.refresh_size_hints(id)?;
        self.update_wm_hints(id)?;
        self.update_title(id);
        self.conn.change_window_attributes(
            win,
            &ChangeWindowAttributesAux::default().event_mask(
                EventMask::ENTER_WINDOW
                    | EventMask::FOCUS_CHANGE
                    | EventMask::PROPERTY_CHANGE
                    | EventMask::STRUCTURE_NOTIFY,
            ),
        )?;
        self.grab_buttons(id, false)?;

        if !self.state.clients[id].is_floating {
            let floating = self.state.clients[id].is_fixed_size();
            self.state.clients[id].is_floating = floating;
            self.state.clients[id].old_state = floating;
        }
        if self.state.clients[id].is_floating {
            self.conn.configure_window(
                win,
                &ConfigureWindowAux::default().stack_mode(StackMode::ABOVE),
            )?;
        }

        self.conn.change_property32(
            PropMode::APPEND,
            self.root,
            self.atoms.net_client_list,
            AtomEnum::WINDOW,
            &[win],
        )?;
        ewmh::set_wm_state(&self.conn, &self.atoms, win, ewmh::NORMAL_STATE)?;

        // Park it off screen until the arrange pass places it.
        let hidden_x = self.state.clients[id].geom.x + 2 * self.screen_w;
        self.conn.configure_window(
            win,
            &ConfigureWindowAux::default().x(hidden_x),
        )?;
        self.conn.map_window(win)?;
        self.arrange_monitor(mon)?;

        if self.config.windows.focus_new_windows && mon == self.state.selected_mon {
            self.focus(Some(id))?;
        } else {
            let current = self.state.monitors[self.state.selected_mon].active;
            self.focus(current)?;
        }
        log::debug!("Managed window 0x{:x}", win);
        Ok(())
    }

    /// Release a client, restoring the window's pre-management state
    /// unless it is already gone from the server.
    pub fn unmanage(&mut self, id: ClientId, destroyed: bool) -> Result<()> {
        let mon = self.state.client_mon(id);
        let client = self.state.remove_client(id);
        if !destroyed {
            // The window may be half destroyed; ignore errors wholesale.
            let _ = self.conn.grab_server();
            let _ = self.conn.configure_window(
                client.win,
                &ConfigureWindowAux::default().border_width(client.old_border_w as u32),
            );
            let _ = self
                .conn
                .ungrab_button(ButtonIndex::ANY, client.win, ModMask::ANY);
            let _ = ewmh::set_wm_state(&self.conn, &self.atoms, client.win, ewmh::WITHDRAWN_STATE);
            let _ = self.conn.ungrab_server();
            let _ = self.conn.flush();
        }
        self.update_client_list()?;
        self.focus(None)?;
        self.arrange_monitor(mon)?;
        log::debug!("Unmanaged window 0x{:x}", client.win);
        Ok(())
    }

    /// Rebuild _NET_CLIENT_LIST from the registry.
    pub fn update_client_list(&self) -> Result<()> {
        let wins: Vec<u32> = self
            .state
            .mon_order
            .iter()
            .flat_map(|&m| self.state.monitors[m].clients.iter())
            .map(|&id| self.state.clients[id].win)
            .collect();
        self.conn.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms.net_client_list,
            AtomEnum::WINDOW,
            &wins,
        )?;
        Ok(())
    }

    /// Constrained resize. The ICCCM hint pass only applies to floating
    /// clients and the floating layout; the hint cache is refreshed
    /// first if a property change invalidated it.
    pub fn resize(
        &mut self,
        id: ClientId,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        interact: bool,
    ) -> Result<()> {
        let mon = self.state.client_mon(id);
        let float_ctx = self.state.clients[id].is_floating
            || self.state.monitors[mon].layout() == LayoutKind::Floating;
        if float_ctx && self.state.clients[id].hints.is_none() {
            self.refresh_size_hints(id)?;
        }
        let hints = if float_ctx {
            self.state.clients[id].hints
        } else {
            None
        };
        let (rect, changed) = apply_size_constraints(
            self.state.clients[id].geom,
            self.state.clients[id].border_w,
            hints.as_ref(),
            self.state.monitors[mon].work,
            self.screen_w,
            self.screen_h,
            x,
            y,
            w,
            h,
            interact,
        );
        if changed {
            self.resize_apply(id, rect)?;
        }
        Ok(())
    }

    /// Write geometry to the client and the server, bypassing the
    /// solver (fullscreen covers the monitor exactly).
    pub fn resize_apply(&mut self, id: ClientId, rect: Rect) -> Result<()> {
        let border_w = self.state.clients[id].border_w;
        self.state.clients[id].geom = rect;
        let win = self.state.clients[id].win;
        self.conn.configure_window(
            win,
            &ConfigureWindowAux::default()
                .x(rect.x)
                .y(rect.y)
                .width(rect.w.max(1) as u32)
                .height(rect.h.max(1) as u32)
                .border_width(border_w as u32),
        )?;
        self.send_configure_notify(id)?;
        Ok(())
    }

    /// Synthetic ConfigureNotify restating the current geometry.
    pub fn send_configure_notify(&self, id: ClientId) -> Result<()> {
        let c = &self.state.clients[id];
        let event = ConfigureNotifyEvent {
            response_type: CONFIGURE_NOTIFY_EVENT,
            sequence: 0,
            event: c.win,
            window: c.win,
            above_sibling: x11rb::NONE,
            x: c.geom.x as i16,
            y: c.geom.y as i16,
            width: c.geom.w.max(1) as u16,
            height: c.geom.h.max(1) as u16,
            border_width: c.border_w as u16,
            override_redirect: false,
        };
        self.conn
            .send_event(false, c.win, EventMask::STRUCTURE_NOTIFY, event)?;
        Ok(())
    }

    pub fn set_fullscreen(&mut self, id: ClientId, fullscreen: bool) -> Result<()> {
        let win = self.state.clients[id].win;
        let mon = self.state.client_mon(id);
        if fullscreen && !self.state.clients[id].is_fullscreen {
            self.conn.change_property32(
                PropMode::REPLACE,
                win,
                self.atoms.net_wm_state,
                AtomEnum::ATOM,
                &[self.atoms.net_wm_state_fullscreen],
            )?;
            let c = self.state.clients.get_mut(id).unwrap();
            c.is_fullscreen = true;
            c.old_state = c.is_floating;
            c.old_border_w = c.border_w;
            c.old_geom = c.geom;
            c.border_w = 0;
            c.is_floating = true;
            let screen = self.state.monitors[mon].screen;
            self.resize_apply(id, screen)?;
            self.conn.configure_window(
                win,
                &ConfigureWindowAux::default().stack_mode(StackMode::ABOVE),
            )?;
        } else if !fullscreen && self.state.clients[id].is_fullscreen {
            self.conn.change_property32(
                PropMode::REPLACE,
                win,
                self.atoms.net_wm_state,
                AtomEnum::ATOM,
                &[],
            )?;
            let c = self.state.clients.get_mut(id).unwrap();
            c.is_fullscreen = false;
            c.is_floating = c.old_state;
            c.border_w = c.old_border_w;
            let restored = c.old_geom;
            self.resize_apply(id, restored)?;
            self.arrange_monitor(mon)?;
        }
        Ok(())
    }

    pub fn set_urgent(&mut self, id: ClientId, urgent: bool) -> Result<()> {
        self.state.clients[id].is_urgent = urgent;
        let mon = self.state.client_mon(id);
        if urgent && self.state.monitors[mon].active != Some(id) {
            self.set_border_color(id, self.config.urgent_border_pixel())?;
        } else if !urgent && self.state.monitors[mon].active != Some(id) {
            self.set_border_color(id, self.config.inactive_border_pixel())?;
        }
        self.draw_dash(mon);
        Ok(())
    }

    /// Re-read WM_NORMAL_HINTS into the cache. A fixed-size window is
    /// forced floating.
    pub fn refresh_size_hints(&mut self, id: ClientId) -> Result<()> {
        let win = self.state.clients[id].win;
        let hints = match WmSizeHints::get_normal_hints(&self.conn, win)?.reply() {
            Ok(Some(h)) => SizeHints::from_normal_hints(&h),
            Ok(None) | Err(_) => SizeHints::default(),
        };
        let c = self.state.clients.get_mut(id).unwrap();
        c.hints = Some(hints);
        if hints.is_fixed() {
            c.is_floating = true;
        }
        Ok(())
    }

    /// Urgency and input-model changes from WM_HINTS. Read raw: flags
    /// word, then the input field when the InputHint bit is set.
    pub fn update_wm_hints(&mut self, id: ClientId) -> Result<()> {
        const INPUT_HINT: u32 = 1;
        const URGENCY_HINT: u32 = 256;
        let win = self.state.clients[id].win;
        let Ok(reply) = self
            .conn
            .get_property(false, win, AtomEnum::WM_HINTS, AtomEnum::WM_HINTS, 0, 9)?
            .reply()
        else {
            return Ok(());
        };
        let values: Vec<u32> = match reply.value32() {
            Some(v) => v.collect(),
            None => return Ok(()),
        };
        let Some(&flags) = values.first() else {
            return Ok(());
        };
        let urgent = flags & URGENCY_HINT != 0;
        let mon = self.state.client_mon(id);
        let is_active = self.state.monitors[mon].active == Some(id);
        if urgent && is_active {
            // Clear the bit on the window itself so the hint does not
            // re-latch on the next property change.
            let mut cleared = values.clone();
            cleared[0] = flags & !URGENCY_HINT;
            self.conn.change_property32(
                PropMode::REPLACE,
                win,
                AtomEnum::WM_HINTS,
                AtomEnum::WM_HINTS,
                &cleared,
            )?;
        } else if urgent {
            self.set_urgent(id, true)?;
        } else if !urgent && self.state.clients[id].is_urgent {
            self.set_urgent(id, false)?;
        }
        if flags & INPUT_HINT != 0 {
            if let Some(&input) = values.get(1) {
                self.state.clients[id].never_focus = input == 0;
            }
        }
        Ok(())
    }

    pub fn update_title(&mut self, id: ClientId) {
        let win = self.state.clients[id].win;
        let name = ewmh::get_window_title(&self.conn, &self.atoms, win);
        self.state.clients[id].name = name;
        let mon = self.state.client_mon(id);
        if self.state.monitors[mon].active == Some(id) {
            self.draw_dash(mon);
        }
    }

    /// Fullscreen state and dialog window type derivation.
    pub fn update_window_type(&mut self, id: ClientId) -> Result<()> {
        let win = self.state.clients[id].win;
        let state = ewmh::get_atom_property(&self.conn, win, self.atoms.net_wm_state);
        if state == self.atoms.net_wm_state_fullscreen {
            self.set_fullscreen(id, true)?;
        }
        let wtype = ewmh::get_atom_property(&self.conn, win, self.atoms.net_wm_window_type);
        if wtype == self.atoms.net_wm_window_type_dialog {
            self.state.clients[id].is_floating = true;
        }
        Ok(())
    }

    /// Two-pass sweep over the focus stack: visible windows surface at
    /// their stored position top-down, hidden ones are banished off
    /// screen bottom-up so reveal happens before conceal.
    pub fn show_hide(&mut self, mon: MonitorId) -> Result<()> {
        let stack = self.state.monitors[mon].stack.clone();
        let set = self.state.monitors[mon].active_workspaces();
        let float_layout = self.state.monitors[mon].layout() == LayoutKind::Floating;
        for &id in &stack {
            let c = &self.state.clients[id];
            if !c.is_visible_on(set) {
                continue;
            }
            let (win, geom) = (c.win, c.geom);
            let needs_float_resize = (c.is_floating || float_layout) && !c.is_fullscreen;
            self.conn
                .configure_window(win, &ConfigureWindowAux::default().x(geom.x).y(geom.y))?;
            if needs_float_resize {
                self.resize(id, geom.x, geom.y, geom.w, geom.h, false)?;
            }
        }
        for &id in stack.iter().rev() {
            let c = &self.state.clients[id];
            if c.is_visible_on(set) {
                continue;
            }
            let hidden_x = -2 * c.width();
            self.conn.configure_window(
                c.win,
                &ConfigureWindowAux::default().x(hidden_x).y(c.geom.y),
            )?;
        }
        Ok(())
    }

    /// Full arrange pass for one monitor: visibility sweep, layout
    /// placements through the solver, stacking, dash refresh.
    pub fn arrange_monitor(&mut self, mon: MonitorId) -> Result<()> {
        self.show_hide(mon)?;
        let params = LayoutParams {
            border_w: self.config.border.width as i32,
            outer_gap: self.config.gaps.outer as i32,
            inner_gap: self.config.gaps.inner as i32,
        };
        let placements = layout::arrange(&self.state, mon, &params);
        for (id, rect) in placements {
            self.resize(id, rect.x, rect.y, rect.w, rect.h, false)?;
        }
        let symbol = layout::symbol_for(&self.state, mon);
        self.state.monitors.get_mut(mon).unwrap().layout_symbol = symbol;
        self.restack(mon)?;
        Ok(())
    }

    pub fn arrange_all(&mut self) -> Result<()> {
        for mon in self.state.mon_order.clone() {
            self.arrange_monitor(mon)?;
        }
        Ok(())
    }

    /// Adopt windows that already exist: first ordinary top-levels,
    /// then transients, so parents are managed before their dialogs.
    pub fn scan(&mut self) -> Result<()> {
        let tree = self.conn.query_tree(self.root)?.reply()?;
        let mut deferred = Vec::new();
        for &win in &tree.children {
            let Ok(attrs) = self.conn.get_window_attributes(win)?.reply() else {
                continue;
            };
            if attrs.override_redirect {
                continue;
            }
            if ewmh::get_transient_for(&self.conn, win).is_some() {
                deferred.push((win, attrs.map_state));
                continue;
            }
            if attrs.map_state == MapState::VIEWABLE
                || ewmh::get_wm_state(&self.conn, &self.atoms, win) == Some(ewmh::ICONIC_STATE)
            {
                self.manage(win)?;
            }
        }
        for (win, map_state) in deferred {
            if map_state == MapState::VIEWABLE
                || ewmh::get_wm_state(&self.conn, &self.atoms, win) == Some(ewmh::ICONIC_STATE)
            {
                self.manage(win)?;
            }
        }
        Ok(())
    }

    /// Move a client to another monitor and re-arrange both ends.
    pub fn send_client_to_monitor(&mut self, id: ClientId, target: MonitorId) -> Result<()> {
        let source = self.state.client_mon(id);
        if source == target {
            return Ok(());
        }
        self.unfocus(id, true)?;
        self.state.send_to_monitor(id, target);
        self.focus(None)?;
        self.arrange_monitor(source)?;
        self.arrange_monitor(target)?;
        Ok(())
    }
}
