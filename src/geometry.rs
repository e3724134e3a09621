//! Planar geometry shared by the tiling and the image sources.
//!
//! Scene and data rectangles are [`kurbo::Rect`]s. A rectangle with
//! infinite or NaN coordinates, or with non-positive area, stands for "the
//! whole plane" wherever a dirty region is expected. Integer pixel windows
//! into 2-D data are [`IntRect`]s.

use std::fmt;

pub use kurbo::{Affine, Point, Rect};

use crate::data::AxisRange;

/// An integer-aligned pixel window `[x, x + width) x [y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IntRect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl IntRect {
    pub const fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest integer rectangle containing `rect`.
    pub fn enclosing(rect: Rect) -> Self {
        let x0 = rect.x0.floor() as i64;
        let y0 = rect.y0.floor() as i64;
        let x1 = rect.x1.ceil() as i64;
        let y1 = rect.y1.ceil() as i64;
        Self::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }

    pub fn right(&self) -> i64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Intersection, or an empty rectangle when disjoint.
    pub fn intersect(&self, other: &IntRect) -> IntRect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        IntRect::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(
            self.x as f64,
            self.y as f64,
            self.right() as f64,
            self.bottom() as f64,
        )
    }
}

impl fmt::Display for IntRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Whether `rect` denotes a real, bounded region.
///
/// Unbounded or degenerate rectangles are read as "everything".
pub fn is_bounded(rect: &Rect) -> bool {
    rect.is_finite() && rect.x1 > rect.x0 && rect.y1 > rect.y0
}

/// The rectangle that stands for the whole plane.
pub fn unbounded_rect() -> Rect {
    Rect::new(
        f64::NEG_INFINITY,
        f64::NEG_INFINITY,
        f64::INFINITY,
        f64::INFINITY,
    )
}

/// Convert a 2-D slicing `[x_range, y_range]` into a rectangle.
///
/// Open range ends become infinite rectangle edges.
pub fn slicing2rect(x: &AxisRange, y: &AxisRange) -> Rect {
    let lo = |v: Option<usize>| v.map_or(f64::NEG_INFINITY, |v| v as f64);
    let hi = |v: Option<usize>| v.map_or(f64::INFINITY, |v| v as f64);
    Rect::new(lo(x.start), lo(y.start), hi(x.stop), hi(y.stop))
}

/// Convert a rectangle into a 2-D slicing `[x_range, y_range]`.
///
/// Edges are rounded outward and clamped at zero; infinite edges become
/// open range ends. For integer-aligned, non-negative rectangles this is
/// the exact inverse of [`slicing2rect`].
pub fn rect2slicing(rect: &Rect) -> [AxisRange; 2] {
    let lo = |v: f64| {
        if v.is_finite() {
            Some(v.floor().max(0.0) as usize)
        } else {
            None
        }
    };
    let hi = |v: f64| {
        if v.is_finite() {
            Some(v.ceil().max(0.0) as usize)
        } else {
            None
        }
    };
    [
        AxisRange {
            start: lo(rect.x0),
            stop: hi(rect.x1),
        },
        AxisRange {
            start: lo(rect.y0),
            stop: hi(rect.y1),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slicing_rect_round_trip() {
        for (x0, y0, x1, y1) in [(0, 0, 10, 20), (3, 7, 4, 8), (100, 0, 900, 400)] {
            let rect = Rect::new(x0 as f64, y0 as f64, x1 as f64, y1 as f64);
            let [xs, ys] = rect2slicing(&rect);
            assert_eq!(slicing2rect(&xs, &ys), rect);
            assert_eq!(rect2slicing(&slicing2rect(&xs, &ys)), [xs, ys]);
        }
    }

    #[test]
    fn test_open_ranges_are_unbounded() {
        let rect = slicing2rect(&AxisRange::all(), &AxisRange::new(2, 5));
        assert!(!is_bounded(&rect));
        assert_eq!(rect.y0, 2.0);
        assert_eq!(rect.y1, 5.0);

        let [xs, _] = rect2slicing(&rect);
        assert_eq!(xs, AxisRange::all());
    }

    #[test]
    fn test_enclosing_rounds_outward() {
        let r = IntRect::enclosing(Rect::new(0.5, 1.2, 9.1, 9.0));
        assert_eq!(r, IntRect::new(0, 1, 10, 8));
    }

    #[test]
    fn test_int_rect_intersect() {
        let a = IntRect::new(0, 0, 10, 10);
        let b = IntRect::new(5, 8, 10, 10);
        assert_eq!(a.intersect(&b), IntRect::new(5, 8, 5, 2));
        assert!(a.intersect(&IntRect::new(20, 20, 1, 1)).is_empty());
    }

    #[test]
    fn test_degenerate_rect_is_unbounded() {
        assert!(!is_bounded(&Rect::new(5.0, 5.0, 5.0, 10.0)));
        assert!(!is_bounded(&Rect::new(5.0, 5.0, 1.0, 10.0)));
        assert!(!is_bounded(&unbounded_rect()));
        assert!(is_bounded(&Rect::new(0.0, 0.0, 1.0, 1.0)));
    }
}
