//! Integer area primitives.
//!
//! Coordinates follow image conventions: `v` grows downward, `h` grows to the
//! right, and rectangles are half-open (`top..bottom`, `left..right`). A
//! rectangle whose `bottom == top` or `right == left` is empty but legal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 2-D size or offset: `v` rows by `h` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub v: i32,
    pub h: i32,
}

impl Point {
    pub const fn new(v: i32, h: i32) -> Self {
        Self { v, h }
    }

    /// Clamp both components to at least 1, for use as a divisor.
    pub fn at_least_one(self) -> Self {
        Self {
            v: self.v.max(1),
            h: self.h.max(1),
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.v, self.h)
    }
}

/// Half-open integer rectangle.
///
/// Deserialized rectangles go through [`Rect::new`], so inverted bounds
/// read from a file collapse the same way constructed ones do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "RectBounds")]
pub struct Rect {
    pub top: i32,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
}

#[derive(Deserialize)]
struct RectBounds {
    top: i32,
    left: i32,
    bottom: i32,
    right: i32,
}

impl From<RectBounds> for Rect {
    fn from(b: RectBounds) -> Self {
        Rect::new(b.top, b.left, b.bottom, b.right)
    }
}

impl Rect {
    /// Build a rectangle. Inverted bounds collapse to an empty rectangle
    /// anchored at `(top, left)`.
    pub fn new(top: i32, left: i32, bottom: i32, right: i32) -> Self {
        Self {
            top,
            left,
            bottom: bottom.max(top),
            right: right.max(left),
        }
    }

    /// Rectangle anchored at the origin with the given size.
    pub fn from_size(height: i32, width: i32) -> Self {
        Self::new(0, 0, height, width)
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    /// Pixel count, widened so large images cannot overflow.
    pub fn area(&self) -> i64 {
        self.height() as i64 * self.width() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.bottom <= self.top || self.right <= self.left
    }

    pub fn contains_point(&self, v: i32, h: i32) -> bool {
        v >= self.top && v < self.bottom && h >= self.left && h < self.right
    }

    /// Whether `other` lies entirely inside `self`. Empty rectangles are
    /// contained everywhere.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.is_empty()
            || (other.top >= self.top
                && other.left >= self.left
                && other.bottom <= self.bottom
                && other.right <= self.right)
    }

    /// Intersection of two rectangles; empty when they do not meet.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let top = self.top.max(other.top);
        let left = self.left.max(other.left);
        let bottom = self.bottom.min(other.bottom);
        let right = self.right.min(other.right);
        if bottom <= top || right <= left {
            Rect::new(top, left, top, left)
        } else {
            Rect::new(top, left, bottom, right)
        }
    }

    /// Whether the two rectangles share at least one pixel.
    pub fn overlaps(&self, other: &Rect) -> bool {
        !self.intersect(other).is_empty()
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.top, self.left, self.bottom, self.right
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Rect construction
    // =========================================================================

    #[test]
    fn new_keeps_ordered_bounds() {
        let r = Rect::new(2, 3, 10, 20);
        assert_eq!(r.height(), 8);
        assert_eq!(r.width(), 17);
        assert_eq!(r.area(), 136);
    }

    #[test]
    fn new_collapses_inverted_bounds() {
        let r = Rect::new(10, 10, 5, 5);
        assert!(r.is_empty());
        assert_eq!(r.height(), 0);
        assert_eq!(r.width(), 0);
    }

    #[test]
    fn deserialized_inverted_bounds_collapse() {
        let r: Rect = serde_json::from_str(r#"{"top": 10, "left": 4, "bottom": 2, "right": 9}"#).unwrap();
        assert_eq!(r, Rect::new(10, 4, 10, 9));
        assert!(r.is_empty());
        assert_eq!(r.height(), 0);
    }

    #[test]
    fn serialized_rect_reads_back() {
        let r = Rect::new(-3, 5, 40, 60);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(serde_json::from_str::<Rect>(&json).unwrap(), r);
    }

    #[test]
    fn zero_height_rect_is_empty() {
        assert!(Rect::new(4, 0, 4, 100).is_empty());
        assert!(!Rect::from_size(1, 1).is_empty());
    }

    #[test]
    fn area_does_not_overflow() {
        let r = Rect::from_size(65_000, 65_000);
        assert_eq!(r.area(), 4_225_000_000);
    }

    // =========================================================================
    // Containment and intersection
    // =========================================================================

    #[test]
    fn contains_point_is_half_open() {
        let r = Rect::from_size(10, 10);
        assert!(r.contains_point(0, 0));
        assert!(r.contains_point(9, 9));
        assert!(!r.contains_point(10, 0));
        assert!(!r.contains_point(0, 10));
    }

    #[test]
    fn contains_rect_includes_edges() {
        let outer = Rect::new(0, 0, 100, 100);
        assert!(outer.contains_rect(&Rect::new(0, 0, 100, 100)));
        assert!(outer.contains_rect(&Rect::new(10, 10, 20, 20)));
        assert!(!outer.contains_rect(&Rect::new(90, 90, 101, 100)));
    }

    #[test]
    fn empty_rect_is_contained_anywhere() {
        let outer = Rect::new(0, 0, 10, 10);
        assert!(outer.contains_rect(&Rect::new(500, 500, 500, 500)));
    }

    #[test]
    fn intersect_overlapping() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 15, 15);
        assert_eq!(a.intersect(&b), Rect::new(5, 5, 10, 10));
        assert!(a.overlaps(&b));
    }

    #[test]
    fn adjacent_rects_do_not_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(0, 10, 10, 20);
        assert!(a.intersect(&b).is_empty());
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn display_formats() {
        assert_eq!(Rect::new(1, 2, 3, 4).to_string(), "[1, 2, 3, 4]");
        assert_eq!(Point::new(16, 32).to_string(), "16x32");
    }

    #[test]
    fn point_at_least_one() {
        assert_eq!(Point::new(0, -3).at_least_one(), Point::new(1, 1));
        assert_eq!(Point::new(8, 2).at_least_one(), Point::new(8, 2));
    }
}
