//! Managed client records and ICCCM size-constraint handling.
//!
//! The constraint solver is a pure function so the geometry rules can be
//! tested without a server. Size hints are cached per client and only
//! re-read from the server after a WM_NORMAL_HINTS change invalidates
//! the cache.

use x11rb::properties::WmSizeHints;
use x11rb::protocol::xproto::Window;

use crate::types::Rect;

/// Parsed WM_NORMAL_HINTS, in the form the constraint solver consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SizeHints {
    pub base_w: i32,
    pub base_h: i32,
    pub inc_w: i32,
    pub inc_h: i32,
    pub min_w: i32,
    pub min_h: i32,
    pub max_w: i32,
    pub max_h: i32,
    /// Upper bound on h/w; 0.0 when unset.
    pub min_aspect: f32,
    /// Upper bound on w/h; 0.0 when unset.
    pub max_aspect: f32,
}

impl SizeHints {
    /// Base falls back to min and vice versa when only one is given.
    pub fn from_normal_hints(hints: &WmSizeHints) -> Self {
        let (base_w, base_h) = hints
            .base_size
            .or(hints.min_size)
            .unwrap_or((0, 0));
        let (min_w, min_h) = hints
            .min_size
            .or(hints.base_size)
            .unwrap_or((0, 0));
        let (inc_w, inc_h) = hints.size_increment.unwrap_or((0, 0));
        let (max_w, max_h) = hints.max_size.unwrap_or((0, 0));
        let (min_aspect, max_aspect) = match hints.aspect {
            Some((min_a, max_a)) => {
                let min_aspect = if min_a.numerator > 0 {
                    min_a.denominator as f32 / min_a.numerator as f32
                } else {
                    0.0
                };
                let max_aspect = if max_a.denominator > 0 {
                    max_a.numerator as f32 / max_a.denominator as f32
                } else {
                    0.0
                };
                (min_aspect, max_aspect)
            }
            None => (0.0, 0.0),
        };
        Self {
            base_w,
            base_h,
            inc_w,
            inc_h,
            min_w,
            min_h,
            max_w,
            max_h,
            min_aspect,
            max_aspect,
        }
    }

    /// A window whose min and max sizes coincide cannot be resized and
    /// is kept floating.
    pub fn is_fixed(&self) -> bool {
        self.max_w != 0 && self.max_h != 0 && self.max_w == self.min_w && self.max_h == self.min_h
    }
}

/// A managed top-level window.
#[derive(Debug, Clone)]
pub struct Client {
    pub win: Window,
    pub name: String,
    pub geom: Rect,
    /// Geometry before the last fullscreen or float transition.
    pub old_geom: Rect,
    pub border_w: i32,
    pub old_border_w: i32,
    /// Bitmask of the workspaces this client appears on.
    pub workspaces: u32,
    /// Split fractions used by the gapped spiral layout.
    pub horizontal_ratio: f32,
    pub vertical_ratio: f32,
    /// None means stale; refreshed lazily before the next floating resize.
    pub hints: Option<SizeHints>,
    pub is_floating: bool,
    pub is_fullscreen: bool,
    pub is_urgent: bool,
    pub never_focus: bool,
    /// Floating state saved while fullscreen.
    pub old_state: bool,
}

impl Client {
    pub fn new(win: Window, geom: Rect, border_w: i32) -> Self {
        Self {
            win,
            name: String::new(),
            geom,
            old_geom: geom,
            border_w,
            old_border_w: border_w,
            workspaces: 0,
            horizontal_ratio: 0.5,
            vertical_ratio: 0.5,
            hints: None,
            is_floating: false,
            is_fullscreen: false,
            is_urgent: false,
            never_focus: false,
            old_state: false,
        }
    }

    /// Outer width, border included.
    pub fn width(&self) -> i32 {
        self.geom.w + 2 * self.border_w
    }

    /// Outer height, border included.
    pub fn height(&self) -> i32 {
        self.geom.h + 2 * self.border_w
    }

    pub fn is_visible_on(&self, workspace_set: u32) -> bool {
        self.workspaces & workspace_set != 0
    }

    pub fn is_fixed_size(&self) -> bool {
        self.hints.map(|h| h.is_fixed()).unwrap_or(false)
    }
}

/// Constrain a requested geometry. Interactive moves may hang off any
/// screen edge as long as some part stays reachable; programmatic moves
/// are confined the same way against the monitor's work area. The hint
/// pass runs only when `hints` is given (floating clients and the
/// floating layout), in ICCCM order: base subtraction, aspect, size
/// increments, then min/max limits. Returns the constrained rectangle
/// and whether it differs from `current`.
pub fn apply_size_constraints(
    current: Rect,
    border_w: i32,
    hints: Option<&SizeHints>,
    work: Rect,
    screen_w: i32,
    screen_h: i32,
    mut x: i32,
    mut y: i32,
    mut w: i32,
    mut h: i32,
    interact: bool,
) -> (Rect, bool) {
    w = w.max(1);
    h = h.max(1);
    let bw2 = 2 * border_w;
    if interact {
        if x > screen_w {
            x = screen_w - (w + bw2);
        }
        if y > screen_h {
            y = screen_h - (h + bw2);
        }
        if x + w + bw2 < 0 {
            x = 0;
        }
        if y + h + bw2 < 0 {
            y = 0;
        }
    } else {
        if x >= work.x + work.w {
            x = work.x + work.w - (w + bw2);
        }
        if y >= work.y + work.h {
            y = work.y + work.h - (h + bw2);
        }
        if x + w + bw2 <= work.x {
            x = work.x;
        }
        if y + h + bw2 <= work.y {
            y = work.y;
        }
    }
    if let Some(sh) = hints {
        // When base and min coincide, base is only subtracted for the
        // aspect computation, per ICCCM.
        let base_is_min = sh.base_w == sh.min_w && sh.base_h == sh.min_h;
        if !base_is_min {
            w -= sh.base_w;
            h -= sh.base_h;
        }
        if sh.min_aspect > 0.0 && sh.max_aspect > 0.0 {
            if sh.max_aspect < w as f32 / h as f32 {
                w = (h as f32 * sh.max_aspect + 0.5) as i32;
            } else if sh.min_aspect < h as f32 / w as f32 {
                h = (w as f32 * sh.min_aspect + 0.5) as i32;
            }
        }
        if base_is_min {
            w -= sh.base_w;
            h -= sh.base_h;
        }
        if sh.inc_w > 0 {
            w -= w % sh.inc_w;
        }
        if sh.inc_h > 0 {
            h -= h % sh.inc_h;
        }
        w = (w + sh.base_w).max(sh.min_w);
        h = (h + sh.base_h).max(sh.min_h);
        if sh.max_w > 0 {
            w = w.min(sh.max_w);
        }
        if sh.max_h > 0 {
            h = h.min(sh.max_h);
        }
    }
    let constrained = Rect::new(x, y, w, h);
    (constrained, constrained != current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work() -> Rect {
        Rect::new(0, 20, 1920, 1060)
    }

    #[test]
    fn test_minimum_size_is_one_pixel() {
        let cur = Rect::new(0, 0, 0, 0);
        let (r, changed) =
            apply_size_constraints(cur, 2, None, work(), 1920, 1080, 10, 30, 0, -5, false);
        assert_eq!((r.w, r.h), (1, 1));
        assert!(changed);
    }

    #[test]
    fn test_programmatic_move_clamps_to_work_area() {
        let cur = Rect::new(0, 0, 200, 100);
        // Entirely right of the work area: pulled back so the outer
        // edge lands on the boundary.
        let (r, _) =
            apply_size_constraints(cur, 1, None, work(), 1920, 1080, 3000, 30, 200, 100, false);
        assert_eq!(r.x, 1920 - (200 + 2));
        // Entirely above: snapped to the top of the work area.
        let (r, _) =
            apply_size_constraints(cur, 1, None, work(), 1920, 1080, 50, -500, 200, 100, false);
        assert_eq!(r.y, 20);
    }

    #[test]
    fn test_interactive_move_clamps_to_screen() {
        let cur = Rect::new(0, 0, 200, 100);
        let (r, _) =
            apply_size_constraints(cur, 1, None, work(), 1920, 1080, 2500, 30, 200, 100, true);
        assert_eq!(r.x, 1920 - 202);
        let (r, _) =
            apply_size_constraints(cur, 1, None, work(), 1920, 1080, -900, 30, 200, 100, true);
        assert_eq!(r.x, 0);
    }

    #[test]
    fn test_increment_snap_and_min() {
        let hints = SizeHints {
            inc_w: 10,
            inc_h: 7,
            min_w: 50,
            min_h: 40,
            ..Default::default()
        };
        let cur = Rect::new(0, 20, 1, 1);
        let (r, _) = apply_size_constraints(
            cur, 1, Some(&hints), work(), 1920, 1080, 0, 20, 207, 99, false,
        );
        assert_eq!((r.w, r.h), (200, 98));
        // Requests below the minimum come back at the minimum.
        let (r, _) = apply_size_constraints(
            cur, 1, Some(&hints), work(), 1920, 1080, 0, 20, 12, 12, false,
        );
        assert_eq!((r.w, r.h), (50, 40));
    }

    #[test]
    fn test_aspect_ratio_limits() {
        let hints = SizeHints {
            min_aspect: 0.5, // h <= w/2
            max_aspect: 2.0, // w <= 2h
            ..Default::default()
        };
        let cur = Rect::new(0, 20, 1, 1);
        // Too wide: width is pulled down to 2x the height.
        let (r, _) = apply_size_constraints(
            cur, 1, Some(&hints), work(), 1920, 1080, 0, 20, 300, 100, false,
        );
        assert_eq!((r.w, r.h), (200, 100));
        // Too tall: height is pulled down to half the width.
        let (r, _) = apply_size_constraints(
            cur, 1, Some(&hints), work(), 1920, 1080, 0, 20, 100, 300, false,
        );
        assert_eq!((r.w, r.h), (100, 50));
    }

    #[test]
    fn test_max_size_caps() {
        let hints = SizeHints {
            max_w: 400,
            max_h: 300,
            ..Default::default()
        };
        let cur = Rect::new(0, 20, 1, 1);
        let (r, _) = apply_size_constraints(
            cur, 1, Some(&hints), work(), 1920, 1080, 0, 20, 800, 600, false,
        );
        assert_eq!((r.w, r.h), (400, 300));
    }

    #[test]
    fn test_solver_is_idempotent() {
        let hints = SizeHints {
            base_w: 4,
            base_h: 4,
            inc_w: 8,
            inc_h: 8,
            min_w: 60,
            min_h: 40,
            max_w: 1000,
            max_h: 800,
            min_aspect: 0.4,
            max_aspect: 3.0,
        };
        let cur = Rect::new(0, 20, 1, 1);
        let (first, _) = apply_size_constraints(
            cur, 2, Some(&hints), work(), 1920, 1080, 37, 91, 333, 217, false,
        );
        let (second, changed) = apply_size_constraints(
            first,
            2,
            Some(&hints),
            work(),
            1920,
            1080,
            first.x,
            first.y,
            first.w,
            first.h,
            false,
        );
        assert_eq!(first, second);
        assert!(!changed);
    }

    #[test]
    fn test_fixed_size_detection() {
        let fixed = SizeHints {
            min_w: 300,
            min_h: 200,
            max_w: 300,
            max_h: 200,
            ..Default::default()
        };
        assert!(fixed.is_fixed());
        let free = SizeHints {
            min_w: 300,
            min_h: 200,
            ..Default::default()
        };
        assert!(!free.is_fixed());
    }
}
