//! Focus and stacking order control.
//!
//! Focus always lands on a visible client of the selected monitor; when
//! the requested one is gone or hidden the most recently focused
//! visible client takes over, and with nothing left input reverts to
//! the root so keybindings keep working on an empty workspace.

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::wrapper::ConnectionExt as _;

use crate::ewmh;
use crate::layout::LayoutKind;
use crate::state::{ClientId, MonitorId};
use crate::Wm;

impl Wm {
    /// Give focus to a client, or to the best visible fallback.
    pub fn focus(&mut self, target: Option<ClientId>) -> Result<()> {
        let mon = self.state.selected_mon;
        let target = target
            .filter(|&id| self.state.is_visible(id, self.state.client_mon(id)))
            .or_else(|| self.state.first_visible_in_stack(mon));

        let prev = self.state.monitors[mon].active;
        if prev.is_some() && prev != target {
            self.unfocus(prev.unwrap(), false)?;
        }

        match target {
            Some(id) => {
                let client_mon = self.state.client_mon(id);
                if client_mon != self.state.selected_mon {
                    self.state.selected_mon = client_mon;
                }
                if self.state.clients[id].is_urgent {
                    self.set_urgent(id, false)?;
                }
                self.state.raise_in_stack(client_mon, id);
                self.grab_buttons(id, true)?;
                self.set_border_color(id, self.config.active_border_pixel())?;
                self.set_input_focus(id)?;
                self.state.monitors.get_mut(client_mon).unwrap().active = Some(id);
                if self.config.windows.move_cursor_with_focus {
                    self.warp_to_client(id)?;
                }
            }
            None => {
                self.conn.set_input_focus(
                    InputFocus::POINTER_ROOT,
                    self.root,
                    x11rb::CURRENT_TIME,
                )?;
                self.conn
                    .delete_property(self.root, self.atoms.net_active_window)?;
                let sel = self.state.selected_mon;
                self.state.monitors.get_mut(sel).unwrap().active = None;
            }
        }
        self.draw_dash(self.state.selected_mon);
        Ok(())
    }

    /// Drop focus styling from a client; optionally point input back at
    /// the root (used when the client leaves for another monitor).
    pub fn unfocus(&mut self, id: ClientId, revert_to_root: bool) -> Result<()> {
        self.grab_buttons(id, false)?;
        self.set_border_color(id, self.config.inactive_border_pixel())?;
        if revert_to_root {
            self.conn.set_input_focus(
                InputFocus::POINTER_ROOT,
                self.root,
                x11rb::CURRENT_TIME,
            )?;
            self.conn
                .delete_property(self.root, self.atoms.net_active_window)?;
        }
        Ok(())
    }

    /// X-side focus transfer, honoring the ICCCM input hint and the
    /// WM_TAKE_FOCUS protocol.
    pub fn set_input_focus(&mut self, id: ClientId) -> Result<()> {
        let win = self.state.clients[id].win;
        if !self.state.clients[id].never_focus {
            self.conn
                .set_input_focus(InputFocus::POINTER_ROOT, win, x11rb::CURRENT_TIME)?;
            self.conn.change_property32(
                PropMode::REPLACE,
                self.root,
                self.atoms.net_active_window,
                AtomEnum::WINDOW,
                &[win],
            )?;
        }
        if ewmh::supports_protocol(&self.conn, &self.atoms, win, self.atoms.wm_take_focus) {
            ewmh::send_protocol_event(&self.conn, &self.atoms, win, self.atoms.wm_take_focus)?;
        }
        Ok(())
    }

    /// Cycle focus through the visible clients of the selected monitor.
    pub fn cycle_focus(&mut self, forward: bool) -> Result<()> {
        let mon = self.state.selected_mon;
        if let Some(active) = self.state.monitors[mon].active {
            if self.state.clients[active].is_fullscreen && self.config.windows.lock_fullscreen {
                return Ok(());
            }
        }
        if let Some(target) = self.state.cycle_target(mon, forward) {
            self.focus(Some(target))?;
            self.restack(self.state.selected_mon)?;
        }
        Ok(())
    }

    /// Re-assert stacking: the active floating client on top, tiled
    /// clients below the dash in focus order. EnterNotify events caused
    /// by windows sliding under the pointer are dropped afterwards so
    /// focus does not ping-pong.
    pub fn restack(&mut self, mon: MonitorId) -> Result<()> {
        self.draw_dash(mon);
        let Some(active) = self.state.monitors[mon].active else {
            return Ok(());
        };
        let float_layout = self.state.monitors[mon].layout() == LayoutKind::Floating;
        if self.state.clients[active].is_floating || float_layout {
            let win = self.state.clients[active].win;
            self.conn.configure_window(
                win,
                &ConfigureWindowAux::default().stack_mode(StackMode::ABOVE),
            )?;
        }
        if !float_layout {
            let mut sibling = self.state.monitors[mon].dash_win;
            let stack = self.state.monitors[mon].stack.clone();
            let set = self.state.monitors[mon].active_workspaces();
            for id in stack {
                let c = &self.state.clients[id];
                if c.is_floating || !c.is_visible_on(set) {
                    continue;
                }
                let mut aux = ConfigureWindowAux::default().stack_mode(StackMode::BELOW);
                if let Some(s) = sibling {
                    aux = aux.sibling(s);
                }
                self.conn.configure_window(c.win, &aux)?;
                sibling = Some(c.win);
            }
        }
        self.drain_enter_events()?;
        Ok(())
    }

    /// Discard queued EnterNotify events; anything else is put back for
    /// the main loop.
    pub fn drain_enter_events(&mut self) -> Result<()> {
        self.conn.sync()?;
        while let Some(event) = self.conn.poll_for_event()? {
            match event {
                Event::EnterNotify(_) => {}
                other => self.pending.push_back(other),
            }
        }
        Ok(())
    }

    pub fn set_border_color(&self, id: ClientId, pixel: u32) -> Result<()> {
        let win = self.state.clients[id].win;
        self.conn.change_window_attributes(
            win,
            &ChangeWindowAttributesAux::default().border_pixel(pixel),
        )?;
        Ok(())
    }

    /// Move the pointer to the middle of a client.
    pub fn warp_to_client(&self, id: ClientId) -> Result<()> {
        let c = &self.state.clients[id];
        self.conn.warp_pointer(
            x11rb::NONE,
            c.win,
            0,
            0,
            0,
            0,
            (c.geom.w / 2) as i16,
            (c.geom.h / 2) as i16,
        )?;
        Ok(())
    }

    /// Select another monitor, moving focus with it.
    pub fn focus_monitor(&mut self, target: MonitorId) -> Result<()> {
        if target == self.state.selected_mon {
            return Ok(());
        }
        let prev_active = self.state.monitors[self.state.selected_mon].active;
        if let Some(id) = prev_active {
            self.unfocus(id, true)?;
        }
        self.state.selected_mon = target;
        self.focus(None)?;
        ewmh::set_current_desktop(
            &self.conn,
            &self.atoms,
            self.root,
            self.state.monitors[target].active_workspaces(),
        )?;
        Ok(())
    }
}
