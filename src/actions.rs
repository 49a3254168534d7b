//! Dispatch of bound actions, whether they arrive from a keybinding,
//! a dash click, or the command channel.

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;

use crate::config::Action;
use crate::ewmh;
use crate::startup;
use crate::Wm;

impl Wm {
    pub fn execute_action(&mut self, action: &Action) -> Result<()> {
        log::debug!("executing action {:?}", action);
        match action {
            Action::Spawn(command) => startup::spawn_command(command),
            Action::KillClient => self.kill_active_client()?,
            Action::CycleFocus(forward) => self.cycle_focus(*forward)?,
            Action::CycleLayout => {
                let m = self.state.selected_mut();
                m.sel_layout ^= 1;
                self.arrange_monitor(self.state.selected_mon)?;
            }
            Action::SetLayout(kind) => {
                let m = self.state.selected_mut();
                m.layouts[m.sel_layout] = *kind;
                self.arrange_monitor(self.state.selected_mon)?;
            }
            Action::IncMaster(delta) => {
                let m = self.state.selected_mut();
                m.num_master = (m.num_master as i32 + delta).max(0) as u32;
                self.arrange_monitor(self.state.selected_mon)?;
            }
            Action::AdjustMasterFactor(delta) => {
                let m = self.state.selected_mut();
                m.master_factor = (m.master_factor + delta).clamp(0.05, 0.95);
                self.arrange_monitor(self.state.selected_mon)?;
            }
            Action::Zoom => {
                if let Some(id) = self.state.zoom() {
                    self.focus(Some(id))?;
                    self.arrange_monitor(self.state.selected_mon)?;
                }
            }
            Action::ToggleFloating => self.toggle_floating()?,
            Action::ToggleFullscreen => {
                if let Some(id) = self.state.selected().active {
                    let on = !self.state.clients[id].is_fullscreen;
                    self.set_fullscreen(id, on)?;
                }
            }
            Action::ToggleDash => self.toggle_dash()?,
            Action::ViewWorkspace(index) => {
                if self.state.view(1 << index) {
                    self.after_workspace_change()?;
                }
            }
            Action::MoveToWorkspace(index) => {
                if self.state.move_active_to(1 << index) {
                    self.focus(None)?;
                    self.arrange_monitor(self.state.selected_mon)?;
                }
            }
            Action::DuplicateToWorkspace(index) => {
                if self.state.duplicate_active_to(1 << index) {
                    self.focus(None)?;
                    self.arrange_monitor(self.state.selected_mon)?;
                }
            }
            Action::ToggleWorkspace(index) => {
                if self.state.toggle_visible(1 << index) {
                    self.after_workspace_change()?;
                }
            }
            Action::FocusMonitor(dir) => {
                if let Some(target) = self.state.monitor_in_direction(*dir) {
                    if target != self.state.selected_mon {
                        self.focus_monitor(target)?;
                    }
                }
            }
            Action::MoveToMonitor(dir) => {
                let Some(active) = self.state.selected().active else {
                    return Ok(());
                };
                if let Some(target) = self.state.monitor_in_direction(*dir) {
                    if target != self.state.selected_mon {
                        self.send_client_to_monitor(active, target)?;
                    }
                }
            }
            Action::Reload => self.reload_config()?,
            Action::Quit => self.state.running = false,
        }
        Ok(())
    }

    /// Ask the active client to close, falling back to a server-side
    /// kill when it does not speak WM_DELETE_WINDOW.
    fn kill_active_client(&mut self) -> Result<()> {
        let Some(active) = self.state.selected().active else {
            return Ok(());
        };
        let win = self.state.clients[active].win;
        if ewmh::supports_protocol(&self.conn, &self.atoms, win, self.atoms.wm_delete_window) {
            ewmh::send_protocol_event(&self.conn, &self.atoms, win, self.atoms.wm_delete_window)?;
        } else {
            self.conn.grab_server()?;
            self.conn.set_close_down_mode(CloseDown::DESTROY_ALL)?;
            self.conn.kill_client(win)?;
            self.conn.ungrab_server()?;
            self.conn.flush()?;
        }
        Ok(())
    }

    /// Flip the active client between tiled and floating. Fixed-size
    /// clients stay floating; fullscreen clients are left alone.
    pub fn toggle_floating(&mut self) -> Result<()> {
        let Some(active) = self.state.selected().active else {
            return Ok(());
        };
        if self.state.clients[active].is_fullscreen {
            return Ok(());
        }
        let c = &mut self.state.clients[active];
        c.is_floating = !c.is_floating || c.is_fixed_size();
        if self.state.clients[active].is_floating {
            let g = self.state.clients[active].geom;
            self.resize(active, g.x, g.y, g.w, g.h, false)?;
        }
        self.arrange_monitor(self.state.selected_mon)?;
        Ok(())
    }

    /// Refocus, re-tile and republish the desktop hint after the
    /// visible workspace set changed.
    pub fn after_workspace_change(&mut self) -> Result<()> {
        self.focus(None)?;
        self.arrange_monitor(self.state.selected_mon)?;
        ewmh::set_current_desktop(
            &self.conn,
            &self.atoms,
            self.root,
            self.state.selected().active_workspaces(),
        )?;
        Ok(())
    }
}
