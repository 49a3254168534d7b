//! Event dispatch: one handler per X event type the window manager
//! cares about, plus the asynchronous error policy.
//!
//! Errors from a handler are logged and the loop keeps running; a
//! window manager that dies on a stale window id takes the session
//! with it.

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::protocol::{ErrorKind, Event};
use x11rb::x11_utils::X11Error;

use crate::ewmh;
use crate::input::{KeyMap, DRAG_MOD};
use crate::Wm;

// Request opcodes whose failures are routine for a window manager.
const OP_CONFIGURE_WINDOW: u8 = 12;
const OP_GRAB_BUTTON: u8 = 28;
const OP_GRAB_KEY: u8 = 33;
const OP_SET_INPUT_FOCUS: u8 = 42;
const OP_COPY_AREA: u8 = 62;
const OP_POLY_SEGMENT: u8 = 66;
const OP_POLY_FILL_RECTANGLE: u8 = 70;
const OP_POLY_TEXT8: u8 = 74;
const OP_IMAGE_TEXT8: u8 = 76;

impl Wm {
    pub fn handle_event(&mut self, event: Event) {
        let result = match event {
            Event::ButtonPress(e) => self.handle_button_press(e),
            Event::ClientMessage(e) => self.handle_client_message(e),
            Event::ConfigureRequest(e) => self.handle_configure_request(e),
            Event::ConfigureNotify(e) => self.handle_configure_notify(e),
            Event::DestroyNotify(e) => self.handle_destroy_notify(e),
            Event::EnterNotify(e) => self.handle_enter_notify(e),
            Event::Expose(e) => self.handle_expose(e),
            Event::FocusIn(e) => self.handle_focus_in(e),
            Event::KeyPress(e) => self.handle_key_press(e),
            Event::MappingNotify(e) => self.handle_mapping_notify(e),
            Event::MapRequest(e) => self.handle_map_request(e),
            Event::MotionNotify(e) => self.handle_motion_notify(e),
            Event::PropertyNotify(e) => self.handle_property_notify(e),
            Event::UnmapNotify(e) => self.handle_unmap_notify(e),
            Event::Error(e) => {
                self.handle_x_error(e);
                Ok(())
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            log::error!("event handler failed: {:#}", e);
        }
    }

    /// Click-to-focus plus the Mod-chorded move/resize/toggle drags
    /// and dash cell clicks.
    fn handle_button_press(&mut self, e: ButtonPressEvent) -> Result<()> {
        if let Some((id, mon)) = self.state.find_client(e.event) {
            if mon != self.state.selected_mon {
                self.state.selected_mon = mon;
            }
            self.focus(Some(id))?;
            self.restack(mon)?;
            self.conn.allow_events(Allow::REPLAY_POINTER, e.time)?;
            if self.clean_mask(u16::from(e.state)) == DRAG_MOD {
                match e.detail {
                    1 => self.move_client_with_mouse(id)?,
                    2 => self.toggle_floating()?,
                    3 => self.resize_client_with_mouse(id)?,
                    _ => {}
                }
            }
        } else if let Some(mon) = self.state.find_monitor_by_dash(e.event) {
            self.handle_dash_click(mon, e.event_x as i32)?;
        } else if e.event == self.root {
            let mon = self.state.monitor_at(e.root_x as i32, e.root_y as i32);
            if mon != self.state.selected_mon {
                self.focus_monitor(mon)?;
            }
        }
        Ok(())
    }

    fn handle_client_message(&mut self, e: ClientMessageEvent) -> Result<()> {
        if e.type_ == self.atoms.command {
            return self.handle_command(e.data.as_data32()[0]);
        }
        let Some((id, _)) = self.state.find_client(e.window) else {
            return Ok(());
        };
        if e.type_ == self.atoms.net_wm_state {
            let data = e.data.as_data32();
            if data[1] == self.atoms.net_wm_state_fullscreen
                || data[2] == self.atoms.net_wm_state_fullscreen
            {
                // 0 remove, 1 add, 2 toggle
                let on = data[0] == 1
                    || (data[0] == 2 && !self.state.clients[id].is_fullscreen);
                self.set_fullscreen(id, on)?;
            }
        } else if e.type_ == self.atoms.net_active_window
            && self.state.selected().active != Some(id)
        {
            self.set_urgent(id, true)?;
        }
        Ok(())
    }

    /// Floating clients get what they asked for, clamped onto their
    /// monitor; tiled clients get a synthetic notify restating the
    /// geometry the layout gave them.
    pub fn handle_configure_request(&mut self, e: ConfigureRequestEvent) -> Result<()> {
        if let Some((id, mon)) = self.state.find_client(e.window) {
            let float_layout =
                self.state.monitors[mon].layout() == crate::layout::LayoutKind::Floating;
            if e.value_mask.contains(ConfigWindow::BORDER_WIDTH) {
                self.state.clients[id].border_w = e.border_width as i32;
            }
            if self.state.clients[id].is_floating || float_layout {
                let screen = self.state.monitors[mon].screen;
                let mut g = self.state.clients[id].geom;
                if e.value_mask.contains(ConfigWindow::X) {
                    g.x = e.x as i32;
                }
                if e.value_mask.contains(ConfigWindow::Y) {
                    g.y = e.y as i32;
                }
                if e.value_mask.contains(ConfigWindow::WIDTH) {
                    g.w = e.width as i32;
                }
                if e.value_mask.contains(ConfigWindow::HEIGHT) {
                    g.h = e.height as i32;
                }
                let bw = self.state.clients[id].border_w;
                if g.x + g.w + 2 * bw > screen.x + screen.w {
                    g.x = screen.x + (screen.w - g.w) / 2;
                }
                if g.y + g.h + 2 * bw > screen.y + screen.h {
                    g.y = screen.y + (screen.h - g.h) / 2;
                }
                if self.state.is_visible(id, mon) {
                    self.resize_apply(id, g)?;
                } else {
                    self.state.clients[id].geom = g;
                    self.send_configure_notify(id)?;
                }
            } else {
                self.send_configure_notify(id)?;
            }
        } else {
            let aux = ConfigureWindowAux::from_configure_request(&e);
            self.conn.configure_window(e.window, &aux)?;
        }
        self.conn.flush()?;
        Ok(())
    }

    /// Root geometry changed, usually an output coming or going.
    fn handle_configure_notify(&mut self, e: ConfigureNotifyEvent) -> Result<()> {
        if e.window != self.root {
            return Ok(());
        }
        let dirty = self.screen_w != e.width as i32 || self.screen_h != e.height as i32;
        self.screen_w = e.width as i32;
        self.screen_h = e.height as i32;
        if self.update_monitor_geometry()? || dirty {
            self.create_dash_windows()?;
            self.focus(None)?;
            self.arrange_all()?;
            self.draw_all_dashes();
        }
        Ok(())
    }

    fn handle_destroy_notify(&mut self, e: DestroyNotifyEvent) -> Result<()> {
        if let Some((id, _)) = self.state.find_client(e.window) {
            self.unmanage(id, true)?;
        }
        Ok(())
    }

    /// A synthetic unmap is the ICCCM way for a client to withdraw
    /// itself; a real one means the window is simply gone from view.
    fn handle_unmap_notify(&mut self, e: UnmapNotifyEvent) -> Result<()> {
        if let Some((id, _)) = self.state.find_client(e.window) {
            if e.response_type & 0x80 != 0 {
                let win = self.state.clients[id].win;
                ewmh::set_wm_state(&self.conn, &self.atoms, win, ewmh::WITHDRAWN_STATE)?;
            } else {
                self.unmanage(id, false)?;
            }
        }
        Ok(())
    }

    /// Focus follows the pointer into client windows and across
    /// monitor edges.
    fn handle_enter_notify(&mut self, e: EnterNotifyEvent) -> Result<()> {
        if (e.mode != NotifyMode::NORMAL || e.detail == NotifyDetail::INFERIOR)
            && e.event != self.root
        {
            return Ok(());
        }
        let client = self.state.find_client(e.event);
        let mon = match client {
            Some((id, _)) => self.state.client_mon(id),
            None if e.event == self.root => {
                self.state.monitor_at(e.root_x as i32, e.root_y as i32)
            }
            None => return Ok(()),
        };
        if mon != self.state.selected_mon {
            if let Some(active) = self.state.selected().active {
                self.unfocus(active, true)?;
            }
            self.state.selected_mon = mon;
        } else if client.map(|(id, _)| id) == self.state.selected().active {
            return Ok(());
        }
        self.focus(client.map(|(id, _)| id))?;
        Ok(())
    }

    fn handle_expose(&mut self, e: ExposeEvent) -> Result<()> {
        if e.count == 0 {
            if let Some(mon) = self.state.find_monitor_by_dash(e.window) {
                self.draw_dash(mon);
            }
        }
        Ok(())
    }

    /// Some clients grab focus without asking; pull it back to the
    /// active window.
    fn handle_focus_in(&mut self, e: FocusInEvent) -> Result<()> {
        if let Some(active) = self.state.selected().active {
            if self.state.clients[active].win != e.event {
                self.set_input_focus(active)?;
            }
        }
        Ok(())
    }

    fn handle_key_press(&mut self, e: KeyPressEvent) -> Result<()> {
        let keysym = self.keymap.keysym(e.detail);
        let mods = self.clean_mask(u16::from(e.state));
        let action = self
            .keybindings
            .iter()
            .find(|b| b.keysym == keysym && b.modifiers == mods)
            .map(|b| b.action.clone());
        if let Some(action) = action {
            self.execute_action(&action)?;
        }
        Ok(())
    }

    fn handle_mapping_notify(&mut self, e: MappingNotifyEvent) -> Result<()> {
        match e.request {
            Mapping::KEYBOARD => {
                self.keymap = KeyMap::fetch(&self.conn)?;
                self.grab_keys()?;
            }
            Mapping::MODIFIER => self.update_numlock_mask()?,
            _ => {}
        }
        Ok(())
    }

    pub fn handle_map_request(&mut self, e: MapRequestEvent) -> Result<()> {
        let attrs = match self.conn.get_window_attributes(e.window)?.reply() {
            Ok(attrs) => attrs,
            Err(_) => return Ok(()),
        };
        if attrs.override_redirect {
            return Ok(());
        }
        self.manage(e.window)
    }

    /// Pointer motion over bare root re-selects the monitor under it.
    fn handle_motion_notify(&mut self, e: MotionNotifyEvent) -> Result<()> {
        if e.event != self.root {
            return Ok(());
        }
        let mon = self.state.monitor_at(e.root_x as i32, e.root_y as i32);
        if mon != self.state.selected_mon {
            if let Some(active) = self.state.selected().active {
                self.unfocus(active, true)?;
            }
            self.state.selected_mon = mon;
            self.focus(None)?;
        }
        Ok(())
    }

    fn handle_property_notify(&mut self, e: PropertyNotifyEvent) -> Result<()> {
        if e.state == Property::DELETE {
            return Ok(());
        }
        if e.window == self.root {
            if e.atom == u32::from(AtomEnum::WM_NAME) {
                self.update_status_text();
                self.draw_dash(self.state.selected_mon);
            }
            return Ok(());
        }
        let Some((id, mon)) = self.state.find_client(e.window) else {
            return Ok(());
        };
        if e.atom == u32::from(AtomEnum::WM_NORMAL_HINTS) {
            // Re-read lazily on the next resize.
            self.state.clients[id].hints = None;
        } else if e.atom == u32::from(AtomEnum::WM_HINTS) {
            self.update_wm_hints(id)?;
            self.draw_all_dashes();
        } else if e.atom == u32::from(AtomEnum::WM_TRANSIENT_FOR) {
            if !self.state.clients[id].is_floating {
                let win = self.state.clients[id].win;
                let parent = ewmh::get_transient_for(&self.conn, win);
                if parent.and_then(|p| self.state.find_client(p)).is_some() {
                    self.state.clients[id].is_floating = true;
                    self.arrange_monitor(mon)?;
                }
            }
        } else if e.atom == u32::from(AtomEnum::WM_NAME) || e.atom == self.atoms.net_wm_name {
            self.update_title(id);
        } else if e.atom == self.atoms.net_wm_window_type {
            self.update_window_type(id)?;
        }
        Ok(())
    }

    /// Most failures against windows that vanished mid-request are
    /// routine; everything else is reported.
    fn handle_x_error(&self, e: X11Error) {
        let routine = match e.error_kind {
            ErrorKind::Window => true,
            ErrorKind::Match => matches!(
                e.major_opcode,
                OP_SET_INPUT_FOCUS | OP_CONFIGURE_WINDOW
            ),
            ErrorKind::Access => matches!(e.major_opcode, OP_GRAB_BUTTON | OP_GRAB_KEY),
            ErrorKind::Drawable => matches!(
                e.major_opcode,
                OP_COPY_AREA
                    | OP_POLY_SEGMENT
                    | OP_POLY_FILL_RECTANGLE
                    | OP_POLY_TEXT8
                    | OP_IMAGE_TEXT8
            ),
            _ => false,
        };
        if routine {
            log::debug!(
                "ignoring X error {:?} on request {}",
                e.error_kind,
                e.major_opcode
            );
        } else {
            log::error!(
                "X error {:?} on request {} (sequence {})",
                e.error_kind,
                e.major_opcode,
                e.sequence
            );
        }
    }
}
