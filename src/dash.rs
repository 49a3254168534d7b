//! The dash: a per-monitor strip along the top edge showing the
//! workspace cells, the layout symbol, the active window title and the
//! root status text.
//!
//! Drawing uses the core protocol only, with the server-side "fixed"
//! font. Cell hit-testing for clicks mirrors the drawing pass so the
//! two can never disagree about where a cell starts.

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;

use crate::config::Action;
use crate::state::MonitorId;
use crate::Wm;

const DASH_FG: u32 = 0xbbbbbb;
const DASH_BG: u32 = 0x111111;
const DASH_FG_SEL: u32 = 0xeeeeee;

// Metrics of the "fixed" font (6x13).
const CHAR_W: i32 = 6;
const FONT_ASCENT: i32 = 11;
const FONT_DESCENT: i32 = 2;
const CELL_PAD: i32 = CHAR_W;

impl Wm {
    /// Create dash windows for monitors that lack one and push every
    /// existing one back to its monitor's geometry. Safe to call again
    /// after the output list changes.
    pub fn create_dash_windows(&mut self) -> Result<()> {
        let height = self.config.dash.height as i32;
        for &mon in &self.state.mon_order.clone() {
            let m = &self.state.monitors[mon];
            let (screen, show) = (m.screen, m.show_dash);
            let win = match m.dash_win {
                Some(win) => {
                    self.conn.configure_window(
                        win,
                        &ConfigureWindowAux::new()
                            .x(screen.x)
                            .y(screen.y)
                            .width(screen.w as u32)
                            .height(height as u32),
                    )?;
                    win
                }
                None => {
                    let win = self.conn.generate_id()?;
                    self.conn.create_window(
                        x11rb::COPY_DEPTH_FROM_PARENT,
                        win,
                        self.root,
                        screen.x as i16,
                        screen.y as i16,
                        screen.w as u16,
                        height as u16,
                        0,
                        WindowClass::INPUT_OUTPUT,
                        x11rb::COPY_FROM_PARENT,
                        &CreateWindowAux::new()
                            .override_redirect(1)
                            .background_pixel(DASH_BG)
                            .event_mask(EventMask::BUTTON_PRESS | EventMask::EXPOSURE),
                    )?;
                    self.state.monitors.get_mut(mon).unwrap().dash_win = Some(win);
                    win
                }
            };
            if show {
                self.conn.map_window(win)?;
            } else {
                self.conn.unmap_window(win)?;
            }
        }
        Ok(())
    }

    pub fn destroy_dash_windows(&mut self) {
        for &mon in &self.state.mon_order.clone() {
            if let Some(win) = self.state.monitors[mon].dash_win.take() {
                let _ = self.conn.destroy_window(win);
            }
        }
    }

    /// Reserve the dash strip: the work area is the screen minus the
    /// strip when the dash is shown.
    pub fn apply_dash_strut(&mut self, mon: MonitorId) {
        let height = self.config.dash.height as i32;
        let m = self.state.monitors.get_mut(mon).unwrap();
        m.work = m.screen;
        if m.show_dash {
            m.work.y += height;
            m.work.h = (m.work.h - height).max(1);
        }
    }

    pub fn toggle_dash(&mut self) -> Result<()> {
        let mon = self.state.selected_mon;
        let m = self.state.monitors.get_mut(mon).unwrap();
        m.show_dash = !m.show_dash;
        let (show, win) = (m.show_dash, m.dash_win);
        self.apply_dash_strut(mon);
        if let Some(win) = win {
            if show {
                self.conn.map_window(win)?;
            } else {
                self.conn.unmap_window(win)?;
            }
        }
        self.arrange_monitor(mon)?;
        self.draw_dash(mon);
        Ok(())
    }

    /// Re-read the root window name; clients update it to publish a
    /// status line.
    pub fn update_status_text(&mut self) {
        self.status_text = String::from("mosaicwm");
        let Ok(cookie) = self.conn.get_property(
            false,
            self.root,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            0,
            256,
        ) else {
            return;
        };
        if let Ok(reply) = cookie.reply() {
            if !reply.value.is_empty() {
                if let Ok(s) = String::from_utf8(reply.value) {
                    self.status_text = s;
                }
            }
        }
    }

    pub fn draw_all_dashes(&self) {
        for &mon in &self.state.mon_order {
            self.draw_dash(mon);
        }
    }

    pub fn draw_dash(&self, mon: MonitorId) {
        if let Err(e) = self.draw_dash_inner(mon) {
            log::warn!("dash draw failed: {:#}", e);
        }
    }

    fn draw_dash_inner(&self, mon: MonitorId) -> Result<()> {
        let m = &self.state.monitors[mon];
        let Some(win) = m.dash_win else {
            return Ok(());
        };
        if !m.show_dash {
            return Ok(());
        }
        let width = m.screen.w;
        let height = self.config.dash.height as i32;
        let selected = mon == self.state.selected_mon;
        let baseline = ((height + FONT_ASCENT - FONT_DESCENT) / 2) as i16;

        self.fill(win, DASH_BG, 0, width, height)?;

        // Workspace cells.
        let visible = m.active_workspaces();
        let mut x = 0;
        for (i, name) in self.config.workspace_names().iter().enumerate() {
            let cell_w = name.len() as i32 * CHAR_W + 2 * CELL_PAD;
            let occupied = 1 << i & self.workspace_occupancy(mon);
            let urgent = 1 << i & self.workspace_urgency() != 0;
            let shown = visible & (1 << i) != 0;
            let (bg, fg) = if urgent {
                (self.config.urgent_border_pixel(), DASH_FG_SEL)
            } else if shown {
                (self.config.active_border_pixel(), DASH_FG_SEL)
            } else {
                (DASH_BG, if occupied != 0 { DASH_FG_SEL } else { DASH_FG })
            };
            self.fill(win, bg, x, cell_w, height)?;
            self.text(win, fg, bg, x + CELL_PAD, baseline, name)?;
            x += cell_w;
        }

        // Layout symbol.
        let symbol = &m.layout_symbol;
        let symbol_w = symbol.len() as i32 * CHAR_W + 2 * CELL_PAD;
        self.text(win, DASH_FG_SEL, DASH_BG, x + CELL_PAD, baseline, symbol)?;
        x += symbol_w;

        // Status text, right aligned, selected monitor only.
        let mut right = width;
        if selected && !self.status_text.is_empty() {
            let text = &self.status_text;
            let text_w = text.len() as i32 * CHAR_W + CELL_PAD;
            right = width - text_w;
            self.text(win, DASH_FG, DASH_BG, right, baseline, text)?;
        }

        // Active window title in whatever is left.
        if let Some(active) = m.active {
            let avail = ((right - x - 2 * CELL_PAD) / CHAR_W).max(0) as usize;
            let title = &self.state.clients[active].name;
            let end = title
                .char_indices()
                .nth(avail)
                .map_or(title.len(), |(i, _)| i);
            self.text(win, DASH_FG_SEL, DASH_BG, x + CELL_PAD, baseline, &title[..end])?;
        }
        Ok(())
    }

    /// Workspaces with at least one client on this monitor.
    fn workspace_occupancy(&self, mon: MonitorId) -> u32 {
        self.state.monitors[mon]
            .clients
            .iter()
            .fold(0, |acc, &id| acc | self.state.clients[id].workspaces)
    }

    /// Workspaces with an urgent client anywhere.
    fn workspace_urgency(&self) -> u32 {
        self.state
            .clients
            .values()
            .filter(|c| c.is_urgent)
            .fold(0, |acc, c| acc | c.workspaces)
    }

    /// Map a click on the dash back to the cell under it.
    pub fn handle_dash_click(&mut self, mon: MonitorId, click_x: i32) -> Result<()> {
        if mon != self.state.selected_mon {
            self.focus_monitor(mon)?;
        }
        let names = self.config.workspace_names().to_vec();
        let mut x = 0;
        for (i, name) in names.iter().enumerate() {
            x += name.len() as i32 * CHAR_W + 2 * CELL_PAD;
            if click_x < x {
                return self.execute_action(&Action::ViewWorkspace(i));
            }
        }
        let symbol_w = self.state.monitors[mon].layout_symbol.len() as i32 * CHAR_W + 2 * CELL_PAD;
        if click_x < x + symbol_w {
            return self.execute_action(&Action::CycleLayout);
        }
        Ok(())
    }

    fn fill(&self, win: Window, pixel: u32, x: i32, w: i32, h: i32) -> Result<()> {
        self.conn
            .change_gc(self.dash_gc, &ChangeGCAux::new().foreground(pixel))?;
        self.conn.poly_fill_rectangle(
            win,
            self.dash_gc,
            &[Rectangle {
                x: x as i16,
                y: 0,
                width: w.max(0) as u16,
                height: h as u16,
            }],
        )?;
        Ok(())
    }

    fn text(&self, win: Window, fg: u32, bg: u32, x: i32, baseline: i16, s: &str) -> Result<()> {
        if s.is_empty() {
            return Ok(());
        }
        self.conn.change_gc(
            self.dash_gc,
            &ChangeGCAux::new().foreground(fg).background(bg),
        )?;
        let bytes = s.as_bytes();
        let end = bytes.len().min(255);
        self.conn
            .image_text8(win, self.dash_gc, x as i16, baseline, &bytes[..end])?;
        Ok(())
    }
}
