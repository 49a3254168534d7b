//! Shared geometry and direction types.

/// A rectangle in root-window coordinates. Width and height are signed
/// because layout arithmetic produces intermediate differences; placed
/// geometry is always clamped to at least 1x1 before it reaches X.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Center X coordinate
    pub fn center_x(&self) -> i32 {
        self.x + self.w / 2
    }

    /// Center Y coordinate
    pub fn center_y(&self) -> i32 {
        self.y + self.h / 2
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.x + self.w && y >= self.y && y < self.y + self.h
    }

    /// Area of the intersection with another rectangle.
    pub fn intersection_area(&self, other: &Rect) -> i32 {
        let w = (self.x + self.w).min(other.x + other.w) - self.x.max(other.x);
        let h = (self.y + self.h).min(other.y + other.h) - self.y.max(other.y);
        w.max(0) * h.max(0)
    }
}

/// Direction arguments for monitor-targeting actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
    Next,
    Prev,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            "next" => Some(Direction::Next),
            "prev" | "previous" => Some(Direction::Prev),
            _ => None,
        }
    }
}

/// Workspace sets are bitmasks. The low 31 bits are usable; bit 31 is
/// reserved so mask arithmetic never collides with sign handling in
/// clients that treat desktops as signed.
pub const MAX_WORKSPACES: usize = 31;

pub fn workspace_mask(count: usize) -> u32 {
    debug_assert!(count <= MAX_WORKSPACES);
    (1u32 << count) - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_center() {
        let rect = Rect::new(0, 0, 100, 100);
        assert_eq!(rect.center_x(), 50);
        assert_eq!(rect.center_y(), 50);

        let rect = Rect::new(10, 20, 100, 200);
        assert_eq!(rect.center_x(), 60);
        assert_eq!(rect.center_y(), 120);
    }

    #[test]
    fn test_rect_contains() {
        let rect = Rect::new(10, 10, 20, 20);
        assert!(rect.contains(10, 10));
        assert!(rect.contains(29, 29));
        assert!(!rect.contains(30, 30));
        assert!(!rect.contains(9, 15));
    }

    #[test]
    fn test_intersection_area() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersection_area(&b), 25);
        let c = Rect::new(20, 20, 5, 5);
        assert_eq!(a.intersection_area(&c), 0);
    }

    #[test]
    fn test_workspace_mask() {
        assert_eq!(workspace_mask(1), 0b1);
        assert_eq!(workspace_mask(9), 0x1ff);
        assert_eq!(workspace_mask(31), 0x7fff_ffff);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(Direction::parse("left"), Some(Direction::Left));
        assert_eq!(Direction::parse("previous"), Some(Direction::Prev));
        assert_eq!(Direction::parse("sideways"), None);
    }
}
