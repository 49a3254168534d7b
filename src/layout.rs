//! Tiling layout strategies.
//!
//! A layout is a pure function from the monitor's visible tiled clients
//! to a list of content-box placements. Floating and fullscreen clients
//! never appear in the input, and the floating layout places nothing.
//! The actual X configure traffic happens in the resize path, so all of
//! this is testable without a server.

use crate::state::{ClientId, MonitorId, WmState};
use crate::types::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Tile,
    Monocle,
    Dwindle,
    DwindleGaps,
    Floating,
}

impl LayoutKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tile" => Some(LayoutKind::Tile),
            "monocle" => Some(LayoutKind::Monocle),
            "dwindle" => Some(LayoutKind::Dwindle),
            "dwindlegaps" => Some(LayoutKind::DwindleGaps),
            "floating" => Some(LayoutKind::Floating),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            LayoutKind::Tile => "[]=",
            LayoutKind::Monocle => "[M]",
            LayoutKind::Dwindle => "[\\]",
            LayoutKind::DwindleGaps => "[o]",
            LayoutKind::Floating => "><>",
        }
    }
}

/// Arrange-time settings taken from the active configuration.
#[derive(Debug, Clone, Copy)]
pub struct LayoutParams {
    pub border_w: i32,
    pub outer_gap: i32,
    pub inner_gap: i32,
}

/// A cell placement with the border subtracted from both dimensions.
fn cell(x: i32, y: i32, w: i32, h: i32, border_w: i32) -> Rect {
    Rect::new(x, y, (w - 2 * border_w).max(1), (h - 2 * border_w).max(1))
}

/// The symbol shown on the dash; monocle reports the visible count.
pub fn symbol_for(state: &WmState, mon: MonitorId) -> String {
    let m = &state.monitors[mon];
    match m.layout() {
        LayoutKind::Monocle => format!("[{}]", state.visible_count(mon)),
        other => other.symbol().to_string(),
    }
}

/// Compute placements for every visible tiled client on the monitor.
pub fn arrange(state: &WmState, mon: MonitorId, params: &LayoutParams) -> Vec<(ClientId, Rect)> {
    let tiled = state.tiled_visible(mon);
    if tiled.is_empty() {
        return Vec::new();
    }
    let m = &state.monitors[mon];
    match m.layout() {
        LayoutKind::Floating => Vec::new(),
        LayoutKind::Monocle => monocle(&tiled, m.work, params),
        LayoutKind::Tile => tile(&tiled, m.work, m.master_factor, m.num_master, params),
        LayoutKind::Dwindle => dwindle(state, &tiled, m.work, params, false),
        LayoutKind::DwindleGaps => dwindle(state, &tiled, m.work, params, true),
    }
}

fn monocle(tiled: &[ClientId], work: Rect, p: &LayoutParams) -> Vec<(ClientId, Rect)> {
    tiled
        .iter()
        .map(|&c| (c, cell(work.x, work.y, work.w, work.h, p.border_w)))
        .collect()
}

/// Master-stack split. Row heights divide whatever is left of the
/// column evenly, so integer rounding is absorbed row by row and the
/// columns always sum exactly to the work-area height.
fn tile(
    tiled: &[ClientId],
    work: Rect,
    master_factor: f32,
    num_master: u32,
    p: &LayoutParams,
) -> Vec<(ClientId, Rect)> {
    let n = tiled.len();
    let m = num_master as usize;
    let master_w = if n > m {
        if m > 0 {
            (work.w as f32 * master_factor) as i32
        } else {
            0
        }
    } else {
        work.w
    };
    let mut placements = Vec::with_capacity(n);
    let mut master_y = 0;
    let mut stack_y = 0;
    for (i, &c) in tiled.iter().enumerate() {
        if i < m {
            let rows = n.min(m) - i;
            let h = (work.h - master_y) / rows as i32;
            placements.push((
                c,
                cell(work.x, work.y + master_y, master_w, h, p.border_w),
            ));
            master_y += h;
        } else {
            let rows = n - i;
            let h = (work.h - stack_y) / rows as i32;
            placements.push((
                c,
                cell(
                    work.x + master_w,
                    work.y + stack_y,
                    work.w - master_w,
                    h,
                    p.border_w,
                ),
            ));
            stack_y += h;
        }
    }
    placements
}

/// Spiral split: each client except the last cuts off a slice of the
/// remaining area, alternating between vertical and horizontal cuts.
/// With gaps enabled the remaining area starts inset by the outer gap,
/// every cut leaves an inner gap, and the cut position comes from the
/// client's stored split ratio instead of the midpoint.
fn dwindle(
    state: &WmState,
    tiled: &[ClientId],
    work: Rect,
    p: &LayoutParams,
    gaps: bool,
) -> Vec<(ClientId, Rect)> {
    let (outer, inner) = if gaps { (p.outer_gap, p.inner_gap) } else { (0, 0) };
    let mut x = work.x + outer;
    let mut y = work.y + outer;
    let mut w = work.w - 2 * outer;
    let mut h = work.h - 2 * outer;
    let n = tiled.len();
    let mut placements = Vec::with_capacity(n);
    for (i, &c) in tiled.iter().enumerate() {
        if i == n - 1 {
            placements.push((c, cell(x, y, w, h, p.border_w)));
            break;
        }
        if i % 2 == 0 {
            let ratio = if gaps { state.clients[c].horizontal_ratio } else { 0.5 };
            let slice = ((w - inner) as f32 * ratio) as i32;
            placements.push((c, cell(x, y, slice, h, p.border_w)));
            x += slice + inner;
            w -= slice + inner;
        } else {
            let ratio = if gaps { state.clients[c].vertical_ratio } else { 0.5 };
            let slice = ((h - inner) as f32 * ratio) as i32;
            placements.push((c, cell(x, y, w, slice, p.border_w)));
            y += slice + inner;
            h -= slice + inner;
        }
    }
    placements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::state::MonitorDefaults;

    const BW: i32 = 2;

    fn params() -> LayoutParams {
        LayoutParams {
            border_w: BW,
            outer_gap: 10,
            inner_gap: 6,
        }
    }

    fn state_with(n: usize, layout: LayoutKind, num_master: u32) -> (WmState, Vec<ClientId>) {
        let mut state = WmState::new(crate::types::workspace_mask(9));
        state.reconcile_monitors(
            &[Rect::new(0, 0, 1920, 1080)],
            &MonitorDefaults {
                master_factor: 0.55,
                num_master,
                layouts: [layout, LayoutKind::Floating],
                show_dash: false,
            },
        );
        state.selected_mon = state.mon_order[0];
        let mon = state.selected_mon;
        let mut ids = Vec::new();
        for i in 0..n {
            let mut c = Client::new(i as u32 + 1, Rect::new(0, 0, 100, 80), BW);
            c.workspaces = 1;
            ids.push(state.add_client(mon, c));
        }
        (state, ids)
    }

    fn outer(r: &Rect) -> (i32, i32) {
        (r.w + 2 * BW, r.h + 2 * BW)
    }

    #[test]
    fn test_tile_conserves_work_area() {
        for n in [1usize, 2, 3, 7] {
            for num_master in [0u32, 1, 2] {
                let (state, _) = state_with(n, LayoutKind::Tile, num_master);
                let mon = state.selected_mon;
                let work = state.monitors[mon].work;
                let placed = arrange(&state, mon, &params());
                assert_eq!(placed.len(), n);

                let m = (num_master as usize).min(n);
                let master: Vec<&Rect> = placed[..m].iter().map(|(_, r)| r).collect();
                let stack: Vec<&Rect> = placed[m..].iter().map(|(_, r)| r).collect();
                // Each column's outer heights sum exactly to the work height.
                if !master.is_empty() {
                    let sum: i32 = master.iter().map(|r| outer(r).1).sum();
                    assert_eq!(sum, work.h, "n={} m={}", n, num_master);
                }
                if !stack.is_empty() {
                    let sum: i32 = stack.iter().map(|r| outer(r).1).sum();
                    assert_eq!(sum, work.h, "n={} m={}", n, num_master);
                }
                // Master and stack columns together span the work width.
                if !master.is_empty() && !stack.is_empty() {
                    let mw = outer(master[0]).0;
                    let sw = outer(stack[0]).0;
                    assert_eq!(mw + sw, work.w);
                    assert_eq!(stack[0].x - work.x, mw);
                } else {
                    let only = if master.is_empty() { &stack } else { &master };
                    assert_eq!(outer(only[0]).0, work.w);
                }
            }
        }
    }

    #[test]
    fn test_three_clients_halve_master_and_stack() {
        let (mut state, _) = state_with(3, LayoutKind::Tile, 1);
        let mon = state.selected_mon;
        state.monitors.get_mut(mon).unwrap().master_factor = 0.5;
        let work = state.monitors[mon].work;
        let placed = arrange(&state, mon, &params());
        // Master takes the left half, the two stack clients each take
        // half the right column.
        assert_eq!(outer(&placed[0].1), (work.w / 2, work.h));
        assert_eq!(outer(&placed[1].1), (work.w / 2, work.h / 2));
        assert_eq!(outer(&placed[2].1), (work.w / 2, work.h / 2));
        assert_eq!(placed[1].1.x, work.x + work.w / 2);
        assert_eq!(placed[2].1.y, work.y + work.h / 2);
    }

    #[test]
    fn test_monocle_fills_work_area() {
        let (state, _) = state_with(3, LayoutKind::Monocle, 1);
        let mon = state.selected_mon;
        let work = state.monitors[mon].work;
        let placed = arrange(&state, mon, &params());
        for (_, r) in &placed {
            assert_eq!(outer(r), (work.w, work.h));
            assert_eq!((r.x, r.y), (work.x, work.y));
        }
        assert_eq!(symbol_for(&state, mon), "[3]");
    }

    #[test]
    fn test_dwindle_alternates_splits() {
        let (state, ids) = state_with(3, LayoutKind::Dwindle, 1);
        let mon = state.selected_mon;
        let placed = arrange(&state, mon, &params());
        let r0 = placed[0].1;
        let r1 = placed[1].1;
        let r2 = placed[2].1;
        // First cut is vertical at the midpoint.
        assert_eq!(outer(&r0).0, 1920 / 2);
        assert_eq!(outer(&r0).1, 1080);
        // Second cut is horizontal within the right half.
        assert_eq!(outer(&r1).0, 1920 - 1920 / 2);
        assert_eq!(outer(&r1).1, 1080 / 2);
        // Last client takes the remainder.
        assert_eq!(outer(&r2).0, 1920 - 1920 / 2);
        assert_eq!(outer(&r2).1, 1080 - 1080 / 2);
        assert_eq!(placed[0].0, ids[0]);
    }

    #[test]
    fn test_dwindle_gaps_conserve_inset_area() {
        let (state, _) = state_with(3, LayoutKind::DwindleGaps, 1);
        let mon = state.selected_mon;
        let work = state.monitors[mon].work;
        let p = params();
        let placed = arrange(&state, mon, &p);
        let inset_w = work.w - 2 * p.outer_gap;
        let inset_h = work.h - 2 * p.outer_gap;

        let (w0, h0) = outer(&placed[0].1);
        let (w1, h1) = outer(&placed[1].1);
        let (w2, h2) = outer(&placed[2].1);
        // First split leaves a vertical gap strip, second a horizontal one.
        assert_eq!(h0, inset_h);
        assert_eq!(w1, w2);
        assert_eq!(w0 + p.inner_gap + w1, inset_w);
        assert_eq!(h1 + p.inner_gap + h2, inset_h);
        // Placed areas plus strip areas cover the inset area exactly.
        let strips = p.inner_gap * inset_h + p.inner_gap * w1;
        let area = w0 * h0 + w1 * h1 + w2 * h2;
        assert_eq!(area + strips, inset_w * inset_h);
    }

    #[test]
    fn test_dwindle_gaps_honor_client_ratio() {
        let (mut state, ids) = state_with(2, LayoutKind::DwindleGaps, 1);
        state.clients[ids[0]].horizontal_ratio = 0.25;
        let mon = state.selected_mon;
        let p = params();
        let placed = arrange(&state, mon, &p);
        let inset_w = 1920 - 2 * p.outer_gap;
        assert_eq!(
            outer(&placed[0].1).0,
            ((inset_w - p.inner_gap) as f32 * 0.25) as i32
        );
    }

    #[test]
    fn test_floating_layout_places_nothing() {
        let (state, _) = state_with(4, LayoutKind::Floating, 1);
        let mon = state.selected_mon;
        assert!(arrange(&state, mon, &params()).is_empty());
        assert_eq!(symbol_for(&state, mon), "><>");
    }

    #[test]
    fn test_floating_clients_are_skipped() {
        let (mut state, ids) = state_with(3, LayoutKind::Tile, 1);
        state.clients[ids[1]].is_floating = true;
        let mon = state.selected_mon;
        let placed = arrange(&state, mon, &params());
        assert_eq!(placed.len(), 2);
        assert!(placed.iter().all(|(c, _)| *c != ids[1]));
    }
}
