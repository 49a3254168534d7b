//! Core window manager state: client and monitor registries.
//!
//! Everything here is pure bookkeeping over slotmap arenas, with no X
//! connection in sight, so ordering and migration rules can be tested
//! directly. Each monitor keeps two client lists over the same id set:
//! `clients` in attach (insertion) order, used by the layouts and for
//! focus cycling, and `stack` in most-recently-focused order, used for
//! restacking and focus fallback.

use slotmap::{new_key_type, SlotMap};

use crate::client::Client;
use crate::layout::LayoutKind;
use crate::types::{Direction, Rect};

new_key_type! {
    pub struct ClientId;
    pub struct MonitorId;
}

/// Per-monitor settings seeded from the active configuration.
#[derive(Debug, Clone, Copy)]
pub struct MonitorDefaults {
    pub master_factor: f32,
    pub num_master: u32,
    pub layouts: [LayoutKind; 2],
    pub show_dash: bool,
}

#[derive(Debug)]
pub struct Monitor {
    /// Position in creation order; renumbered after topology changes.
    pub num: usize,
    /// Full screen area of the output.
    pub screen: Rect,
    /// Screen minus the dash strip.
    pub work: Rect,
    /// Two workspace slots; `toggle` style view switches flip between
    /// them without losing the previous selection.
    pub workspaces: [u32; 2],
    pub sel_ws: usize,
    pub layouts: [LayoutKind; 2],
    pub sel_layout: usize,
    pub master_factor: f32,
    pub num_master: u32,
    pub clients: Vec<ClientId>,
    pub stack: Vec<ClientId>,
    pub active: Option<ClientId>,
    pub show_dash: bool,
    pub dash_win: Option<u32>,
    pub layout_symbol: String,
}

impl Monitor {
    pub fn new(num: usize, screen: Rect, defaults: &MonitorDefaults) -> Self {
        Self {
            num,
            screen,
            work: screen,
            workspaces: [1, 1],
            sel_ws: 0,
            layouts: defaults.layouts,
            sel_layout: 0,
            master_factor: defaults.master_factor,
            num_master: defaults.num_master,
            clients: Vec::new(),
            stack: Vec::new(),
            active: None,
            show_dash: defaults.show_dash,
            dash_win: None,
            layout_symbol: defaults.layouts[0].symbol().to_string(),
        }
    }

    /// The workspace set currently shown on this monitor.
    pub fn active_workspaces(&self) -> u32 {
        self.workspaces[self.sel_ws]
    }

    pub fn layout(&self) -> LayoutKind {
        self.layouts[self.sel_layout]
    }
}

pub struct WmState {
    pub clients: SlotMap<ClientId, Client>,
    pub monitors: SlotMap<MonitorId, Monitor>,
    /// Monitors in creation order; index equals `Monitor::num`.
    pub mon_order: Vec<MonitorId>,
    pub selected_mon: MonitorId,
    /// Mask of usable workspace bits, from the configured name list.
    pub ws_limit: u32,
    pub running: bool,
}

impl WmState {
    pub fn new(ws_limit: u32) -> Self {
        Self {
            clients: SlotMap::with_key(),
            monitors: SlotMap::with_key(),
            mon_order: Vec::new(),
            selected_mon: MonitorId::default(),
            ws_limit,
            running: true,
        }
    }

    pub fn selected(&self) -> &Monitor {
        &self.monitors[self.selected_mon]
    }

    pub fn selected_mut(&mut self) -> &mut Monitor {
        self.monitors.get_mut(self.selected_mon).unwrap()
    }

    pub fn is_visible(&self, id: ClientId, mon: MonitorId) -> bool {
        self.clients[id].is_visible_on(self.monitors[mon].active_workspaces())
    }

    /// The monitor whose lists hold this client.
    pub fn client_mon(&self, id: ClientId) -> MonitorId {
        for &m in &self.mon_order {
            if self.monitors[m].clients.contains(&id) {
                return m;
            }
        }
        self.selected_mon
    }

    pub fn find_client(&self, win: u32) -> Option<(ClientId, MonitorId)> {
        for &m in &self.mon_order {
            for &id in &self.monitors[m].clients {
                if self.clients[id].win == win {
                    return Some((id, m));
                }
            }
        }
        None
    }

    pub fn find_monitor_by_dash(&self, win: u32) -> Option<MonitorId> {
        self.mon_order
            .iter()
            .copied()
            .find(|&m| self.monitors[m].dash_win == Some(win))
    }

    // ---- list maintenance ----

    pub fn attach(&mut self, mon: MonitorId, id: ClientId) {
        self.monitors[mon].clients.push(id);
    }

    pub fn attach_stack(&mut self, mon: MonitorId, id: ClientId) {
        self.monitors[mon].stack.insert(0, id);
    }

    pub fn detach(&mut self, mon: MonitorId, id: ClientId) {
        self.monitors[mon].clients.retain(|&c| c != id);
    }

    /// Remove from the focus stack. When the departing client was the
    /// active one, the first still-visible survivor takes its place.
    pub fn detach_stack(&mut self, mon: MonitorId, id: ClientId) {
        self.monitors[mon].stack.retain(|&c| c != id);
        if self.monitors[mon].active == Some(id) {
            let next = self.first_visible_in_stack(mon);
            self.monitors[mon].active = next;
        }
    }

    /// Promote a client to the head of the focus stack.
    pub fn raise_in_stack(&mut self, mon: MonitorId, id: ClientId) {
        self.monitors[mon].stack.retain(|&c| c != id);
        self.monitors[mon].stack.insert(0, id);
    }

    pub fn add_client(&mut self, mon: MonitorId, client: Client) -> ClientId {
        let id = self.clients.insert(client);
        self.attach(mon, id);
        self.attach_stack(mon, id);
        id
    }

    pub fn remove_client(&mut self, id: ClientId) -> Client {
        let mon = self.client_mon(id);
        self.detach(mon, id);
        self.detach_stack(mon, id);
        self.clients.remove(id).unwrap()
    }

    pub fn first_visible_in_stack(&self, mon: MonitorId) -> Option<ClientId> {
        let set = self.monitors[mon].active_workspaces();
        self.monitors[mon]
            .stack
            .iter()
            .copied()
            .find(|&c| self.clients[c].is_visible_on(set))
    }

    /// Visible non-floating clients in attach order; this is the input
    /// to every tiling layout. Fullscreen clients are floating for the
    /// duration, so they are skipped implicitly.
    pub fn tiled_visible(&self, mon: MonitorId) -> Vec<ClientId> {
        let set = self.monitors[mon].active_workspaces();
        self.monitors[mon]
            .clients
            .iter()
            .copied()
            .filter(|&c| !self.clients[c].is_floating && self.clients[c].is_visible_on(set))
            .collect()
    }

    pub fn visible_count(&self, mon: MonitorId) -> usize {
        let set = self.monitors[mon].active_workspaces();
        self.monitors[mon]
            .clients
            .iter()
            .filter(|&&c| self.clients[c].is_visible_on(set))
            .count()
    }

    /// Next (or previous) visible client in attach order relative to
    /// the active one, wrapping around. Floating clients participate.
    pub fn cycle_target(&self, mon: MonitorId, forward: bool) -> Option<ClientId> {
        let m = &self.monitors[mon];
        let set = m.active_workspaces();
        let visible: Vec<ClientId> = m
            .clients
            .iter()
            .copied()
            .filter(|&c| self.clients[c].is_visible_on(set))
            .collect();
        if visible.is_empty() {
            return None;
        }
        let pos = m.active.and_then(|a| visible.iter().position(|&c| c == a));
        let target = match pos {
            None => visible[0],
            Some(i) if forward => visible[(i + 1) % visible.len()],
            Some(i) => visible[(i + visible.len() - 1) % visible.len()],
        };
        Some(target)
    }

    /// Move the active tiled client to the head of the attach order; a
    /// client already at the head swaps with the next tiled one.
    pub fn zoom(&mut self) -> Option<ClientId> {
        let mon = self.selected_mon;
        let active = self.monitors[mon].active?;
        if self.clients[active].is_floating {
            return None;
        }
        let tiled = self.tiled_visible(mon);
        let target = if tiled.first() == Some(&active) {
            *tiled.get(1)?
        } else {
            active
        };
        self.detach(mon, target);
        self.monitors[mon].clients.insert(0, target);
        Some(target)
    }

    // ---- workspace operations ----

    /// Switch the visible workspace set. Flips to the alternate slot,
    /// so viewing the same set twice returns to the previous one.
    pub fn view(&mut self, mask: u32) -> bool {
        let mask = mask & self.ws_limit;
        let m = self.selected_mut();
        if mask == m.active_workspaces() {
            return false;
        }
        m.sel_ws ^= 1;
        if mask != 0 {
            let slot = m.sel_ws;
            m.workspaces[slot] = mask;
        }
        true
    }

    /// Replace the active client's workspace set.
    pub fn move_active_to(&mut self, mask: u32) -> bool {
        let mask = mask & self.ws_limit;
        if mask == 0 {
            return false;
        }
        let Some(active) = self.selected().active else {
            return false;
        };
        self.clients[active].workspaces = mask;
        true
    }

    /// Toggle the active client's membership of the given workspaces.
    /// Refused when it would leave the client on no workspace at all.
    pub fn duplicate_active_to(&mut self, mask: u32) -> bool {
        let mask = mask & self.ws_limit;
        let Some(active) = self.selected().active else {
            return false;
        };
        let next = self.clients[active].workspaces ^ mask;
        if next == 0 {
            return false;
        }
        self.clients[active].workspaces = next;
        true
    }

    /// Toggle workspaces in and out of the monitor's visible set.
    /// Refused when the result would show nothing.
    pub fn toggle_visible(&mut self, mask: u32) -> bool {
        let mask = mask & self.ws_limit;
        let m = self.selected_mut();
        let slot = m.sel_ws;
        let next = m.workspaces[slot] ^ mask;
        if next == 0 {
            return false;
        }
        m.workspaces[slot] = next;
        true
    }

    // ---- monitors ----

    pub fn monitor_at(&self, x: i32, y: i32) -> MonitorId {
        self.mon_order
            .iter()
            .copied()
            .find(|&m| self.monitors[m].screen.contains(x, y))
            .unwrap_or(self.selected_mon)
    }

    /// The monitor covering the largest share of a rectangle, used to
    /// re-home a window after a drag.
    pub fn monitor_for_rect(&self, r: &Rect) -> MonitorId {
        let mut best = self.selected_mon;
        let mut best_area = 0;
        for &m in &self.mon_order {
            let area = self.monitors[m].screen.intersection_area(r);
            if area > best_area {
                best_area = area;
                best = m;
            }
        }
        best
    }

    /// Nearest monitor in a direction, by Manhattan distance between
    /// screen centers; `next`/`prev` cycle in creation order.
    pub fn monitor_in_direction(&self, dir: Direction) -> Option<MonitorId> {
        if self.mon_order.len() < 2 {
            return None;
        }
        let cur = self.selected_mon;
        let pos = self.mon_order.iter().position(|&m| m == cur)?;
        match dir {
            Direction::Next => {
                return Some(self.mon_order[(pos + 1) % self.mon_order.len()]);
            }
            Direction::Prev => {
                let n = self.mon_order.len();
                return Some(self.mon_order[(pos + n - 1) % n]);
            }
            _ => {}
        }
        let from = self.monitors[cur].screen;
        let (cx, cy) = (from.center_x(), from.center_y());
        let mut best: Option<(MonitorId, i32)> = None;
        for &m in &self.mon_order {
            if m == cur {
                continue;
            }
            let r = self.monitors[m].screen;
            let (mx, my) = (r.center_x(), r.center_y());
            let matches = match dir {
                Direction::Left => mx < cx,
                Direction::Right => mx > cx,
                Direction::Up => my < cy,
                Direction::Down => my > cy,
                _ => false,
            };
            if !matches {
                continue;
            }
            let dist = (mx - cx).abs() + (my - cy).abs();
            if best.map(|(_, d)| dist < d).unwrap_or(true) {
                best = Some((m, dist));
            }
        }
        best.map(|(m, _)| m)
    }

    /// Move a client to another monitor. It adopts the target's visible
    /// workspace set and lands at the head of the target's focus stack.
    pub fn send_to_monitor(&mut self, id: ClientId, target: MonitorId) {
        let source = self.client_mon(id);
        if source == target {
            return;
        }
        self.detach(source, id);
        self.detach_stack(source, id);
        self.clients[id].workspaces = self.monitors[target].active_workspaces();
        self.attach(target, id);
        self.attach_stack(target, id);
    }

    /// Re-seed per-monitor tiling parameters from fresh defaults, as
    /// after a config reload. Runtime layout slots and dash visibility
    /// are user state and survive.
    pub fn apply_monitor_defaults(&mut self, defaults: &MonitorDefaults) {
        for mon in self.monitors.values_mut() {
            mon.master_factor = defaults.master_factor;
            mon.num_master = defaults.num_master;
        }
    }

    /// Rebuild the monitor list from a fresh set of output geometries.
    /// Existing monitors are updated in place, new ones appended, and
    /// clients of vanished monitors migrate to the first survivor.
    /// Returns whether anything changed.
    pub fn reconcile_monitors(&mut self, geoms: &[Rect], defaults: &MonitorDefaults) -> bool {
        let mut unique: Vec<Rect> = Vec::new();
        for g in geoms {
            if !unique.contains(g) {
                unique.push(*g);
            }
        }
        if unique.is_empty() {
            return false;
        }
        let mut dirty = false;

        for (i, g) in unique.iter().enumerate() {
            if let Some(&m) = self.mon_order.get(i) {
                let mon = self.monitors.get_mut(m).unwrap();
                if mon.screen != *g {
                    mon.screen = *g;
                    mon.work = *g;
                    dirty = true;
                }
            } else {
                let mon = Monitor::new(i, *g, defaults);
                let id = self.monitors.insert(mon);
                self.mon_order.push(id);
                dirty = true;
            }
        }

        while self.mon_order.len() > unique.len() {
            let doomed = self.mon_order.pop().unwrap();
            let survivor = self.mon_order[0];
            let orphans: Vec<ClientId> = self.monitors[doomed].clients.clone();
            for id in orphans {
                self.detach(doomed, id);
                self.detach_stack(doomed, id);
                self.clients[id].workspaces = self.monitors[survivor].active_workspaces();
                self.attach(survivor, id);
                self.attach_stack(survivor, id);
            }
            self.monitors.remove(doomed);
            dirty = true;
        }

        for (i, &m) in self.mon_order.iter().enumerate() {
            self.monitors.get_mut(m).unwrap().num = i;
        }
        if !self.monitors.contains_key(self.selected_mon) {
            self.selected_mon = self.mon_order[0];
        }
        dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;

    fn defaults() -> MonitorDefaults {
        MonitorDefaults {
            master_factor: 0.55,
            num_master: 1,
            layouts: [LayoutKind::Tile, LayoutKind::Floating],
            show_dash: false,
        }
    }

    fn state_with_monitors(geoms: &[Rect]) -> WmState {
        let mut state = WmState::new(crate::types::workspace_mask(9));
        state.reconcile_monitors(geoms, &defaults());
        state.selected_mon = state.mon_order[0];
        state
    }

    fn add_window(state: &mut WmState, win: u32) -> ClientId {
        let mon = state.selected_mon;
        let set = state.monitors[mon].active_workspaces();
        let mut c = Client::new(win, Rect::new(0, 0, 100, 80), 1);
        c.workspaces = set;
        let id = state.add_client(mon, c);
        state.monitors.get_mut(mon).unwrap().active = Some(id);
        state.raise_in_stack(mon, id);
        id
    }

    #[test]
    fn test_attach_order_and_stack_order_diverge() {
        let mut state = state_with_monitors(&[Rect::new(0, 0, 1920, 1080)]);
        let a = add_window(&mut state, 1);
        let b = add_window(&mut state, 2);
        let c = add_window(&mut state, 3);
        let mon = state.selected_mon;
        assert_eq!(state.monitors[mon].clients, vec![a, b, c]);
        assert_eq!(state.monitors[mon].stack, vec![c, b, a]);
    }

    #[test]
    fn test_detach_stack_rederives_active() {
        let mut state = state_with_monitors(&[Rect::new(0, 0, 1920, 1080)]);
        let a = add_window(&mut state, 1);
        let b = add_window(&mut state, 2);
        let mon = state.selected_mon;
        assert_eq!(state.monitors[mon].active, Some(b));
        state.remove_client(b);
        assert_eq!(state.monitors[mon].active, Some(a));
        state.remove_client(a);
        assert_eq!(state.monitors[mon].active, None);
    }

    #[test]
    fn test_detach_skips_invisible_survivors() {
        let mut state = state_with_monitors(&[Rect::new(0, 0, 1920, 1080)]);
        let a = add_window(&mut state, 1);
        let b = add_window(&mut state, 2);
        state.clients[a].workspaces = 1 << 3;
        let mon = state.selected_mon;
        state.remove_client(b);
        // `a` lives on a hidden workspace, so nothing becomes active.
        assert_eq!(state.monitors[mon].active, None);
    }

    #[test]
    fn test_view_flips_between_two_slots() {
        let mut state = state_with_monitors(&[Rect::new(0, 0, 1920, 1080)]);
        assert_eq!(state.selected().active_workspaces(), 1);
        assert!(state.view(1 << 2));
        assert_eq!(state.selected().active_workspaces(), 1 << 2);
        // Viewing the current set again is a no-op.
        assert!(!state.view(1 << 2));
        // A zero mask flips back to the previous slot.
        assert!(state.view(0));
        assert_eq!(state.selected().active_workspaces(), 1);
    }

    #[test]
    fn test_toggle_visible_is_an_involution() {
        let mut state = state_with_monitors(&[Rect::new(0, 0, 1920, 1080)]);
        let before = state.selected().active_workspaces();
        assert!(state.toggle_visible(1 << 4));
        assert!(state.toggle_visible(1 << 4));
        assert_eq!(state.selected().active_workspaces(), before);
    }

    #[test]
    fn test_workspace_ops_reject_empty_results() {
        let mut state = state_with_monitors(&[Rect::new(0, 0, 1920, 1080)]);
        let a = add_window(&mut state, 1);
        // Toggling away the only visible workspace is refused.
        assert!(!state.toggle_visible(1));
        assert!(!state.move_active_to(0));
        // XOR-ing the client's whole set away is refused.
        assert!(!state.duplicate_active_to(1));
        assert_eq!(state.clients[a].workspaces, 1);
        // Masks beyond the configured workspace count are dead bits.
        assert!(!state.move_active_to(1 << 20));
    }

    #[test]
    fn test_zoom_swaps_head() {
        let mut state = state_with_monitors(&[Rect::new(0, 0, 1920, 1080)]);
        let a = add_window(&mut state, 1);
        let b = add_window(&mut state, 2);
        let mon = state.selected_mon;
        // Active is b (not head): zoom moves b to the head.
        assert_eq!(state.zoom(), Some(b));
        assert_eq!(state.monitors[mon].clients, vec![b, a]);
        // Active b now is the head: zoom promotes the next tiled client.
        assert_eq!(state.zoom(), Some(a));
        assert_eq!(state.monitors[mon].clients, vec![a, b]);
    }

    #[test]
    fn test_apply_monitor_defaults_preserves_layout_slots() {
        let mut state = state_with_monitors(&[Rect::new(0, 0, 1920, 1080)]);
        let mon = state.selected_mon;
        state.monitors.get_mut(mon).unwrap().sel_layout = 1;
        let fresh = MonitorDefaults {
            master_factor: 0.7,
            num_master: 2,
            layouts: [LayoutKind::Monocle, LayoutKind::Monocle],
            show_dash: true,
        };
        state.apply_monitor_defaults(&fresh);
        let m = &state.monitors[mon];
        assert!((m.master_factor - 0.7).abs() < f32::EPSILON);
        assert_eq!(m.num_master, 2);
        // The layout toggle and dash visibility are runtime state.
        assert_eq!(m.sel_layout, 1);
        assert_eq!(m.layouts, [LayoutKind::Tile, LayoutKind::Floating]);
        assert!(!m.show_dash);
    }

    #[test]
    fn test_monitor_in_direction() {
        let state = state_with_monitors(&[
            Rect::new(0, 0, 1920, 1080),
            Rect::new(1920, 0, 1280, 1024),
        ]);
        let left = state.mon_order[0];
        let right = state.mon_order[1];
        assert_eq!(state.monitor_in_direction(Direction::Right), Some(right));
        assert_eq!(state.monitor_in_direction(Direction::Left), None);
        assert_eq!(state.monitor_in_direction(Direction::Next), Some(right));
        assert_eq!(state.monitor_in_direction(Direction::Prev), Some(right));
        let _ = left;
    }

    #[test]
    fn test_reconcile_shrink_migrates_clients() {
        let mut state = state_with_monitors(&[
            Rect::new(0, 0, 1920, 1080),
            Rect::new(1920, 0, 1280, 1024),
        ]);
        let second = state.mon_order[1];
        let mut c = Client::new(7, Rect::new(2000, 10, 100, 80), 1);
        c.workspaces = 1 << 2;
        let id = state.add_client(second, c);

        let dirty = state.reconcile_monitors(&[Rect::new(0, 0, 1920, 1080)], &defaults());
        assert!(dirty);
        assert_eq!(state.mon_order.len(), 1);
        let survivor = state.mon_order[0];
        assert!(state.monitors[survivor].clients.contains(&id));
        assert!(state.monitors[survivor].stack.contains(&id));
        // The migrant adopts the survivor's visible workspace set.
        assert_eq!(
            state.clients[id].workspaces,
            state.monitors[survivor].active_workspaces()
        );
    }

    #[test]
    fn test_reconcile_dedupes_mirrored_outputs() {
        let geom = Rect::new(0, 0, 1920, 1080);
        let state = state_with_monitors(&[geom, geom]);
        assert_eq!(state.mon_order.len(), 1);
    }

    #[test]
    fn test_send_to_monitor() {
        let mut state = state_with_monitors(&[
            Rect::new(0, 0, 1920, 1080),
            Rect::new(1920, 0, 1280, 1024),
        ]);
        let id = add_window(&mut state, 1);
        let target = state.mon_order[1];
        state.monitors.get_mut(target).unwrap().workspaces[0] = 1 << 5;
        state.send_to_monitor(id, target);
        assert!(!state.monitors[state.mon_order[0]].clients.contains(&id));
        assert_eq!(state.monitors[target].stack.first(), Some(&id));
        assert_eq!(state.clients[id].workspaces, 1 << 5);
        // The source monitor's active slot was re-derived.
        assert_eq!(state.monitors[state.mon_order[0]].active, None);
    }

    #[test]
    fn test_cycle_target_wraps_and_skips_hidden() {
        let mut state = state_with_monitors(&[Rect::new(0, 0, 1920, 1080)]);
        let a = add_window(&mut state, 1);
        let b = add_window(&mut state, 2);
        let c = add_window(&mut state, 3);
        let mon = state.selected_mon;
        state.monitors.get_mut(mon).unwrap().active = Some(c);
        assert_eq!(state.cycle_target(mon, true), Some(a));
        assert_eq!(state.cycle_target(mon, false), Some(b));
        state.clients[a].workspaces = 1 << 8;
        assert_eq!(state.cycle_target(mon, true), Some(b));
    }
}
