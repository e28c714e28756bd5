/*! Geometry types for desktop coordinates. */

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A 2D point in desktop coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, TS)]
#[ts(export)]
pub struct Point {
  pub x: f64,
  pub y: f64,
}

impl Point {
  pub const fn new(x: f64, y: f64) -> Self {
    Self { x, y }
  }

  /// Check if this point moved at least `threshold` from another on either axis.
  pub fn moved_from(&self, other: Point, threshold: f64) -> bool {
    (self.x - other.x).abs() >= threshold || (self.y - other.y).abs() >= threshold
  }

  /// Component-wise difference `self - other`.
  pub fn minus(&self, other: Point) -> Point {
    Point::new(self.x - other.x, self.y - other.y)
  }
}

/// Where a window or icon sits on the desktop.
///
/// Absolute positions are measured from the top-left corner of the desktop.
/// Anchored positions are measured from the bottom-right corner, so they
/// survive desktop resizes without drifting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export)]
pub enum Position {
  Absolute { x: f64, y: f64 },
  Anchored { right: f64, bottom: f64 },
}

impl Position {
  pub const fn absolute(x: f64, y: f64) -> Self {
    Self::Absolute { x, y }
  }

  pub const fn anchored(right: f64, bottom: f64) -> Self {
    Self::Anchored { right, bottom }
  }

  pub const fn is_anchored(&self) -> bool {
    matches!(self, Self::Anchored { .. })
  }

  /// Move by `delta` in desktop space. Anchored offsets shrink as the
  /// element moves toward the bottom-right corner.
  pub fn translated(&self, delta: Point) -> Self {
    match *self {
      Self::Absolute { x, y } => Self::Absolute {
        x: x + delta.x,
        y: y + delta.y,
      },
      Self::Anchored { right, bottom } => Self::Anchored {
        right: right - delta.x,
        bottom: bottom - delta.y,
      },
    }
  }

  /// Top-left point for absolute positions.
  pub const fn as_point(&self) -> Option<Point> {
    match self {
      Self::Absolute { x, y } => Some(Point::new(*x, *y)),
      Self::Anchored { .. } => None,
    }
  }
}

impl Default for Position {
  fn default() -> Self {
    Self::Absolute { x: 0.0, y: 0.0 }
  }
}

impl From<Point> for Position {
  fn from(p: Point) -> Self {
    Self::Absolute { x: p.x, y: p.y }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  mod point_moved_from {
    use super::*;

    #[test]
    fn no_movement() {
      let p = Point::new(10.0, 20.0);
      assert!(
        !p.moved_from(p, 5.0),
        "same point should not register as moved"
      );
    }

    #[test]
    fn movement_below_threshold() {
      let a = Point::new(12.0, 11.0);
      let b = Point::new(10.0, 10.0);
      assert!(!a.moved_from(b, 5.0), "movement below threshold");
    }

    #[test]
    fn movement_at_threshold() {
      let a = Point::new(15.0, 10.0);
      let b = Point::new(10.0, 10.0);
      assert!(a.moved_from(b, 5.0), "movement exactly at threshold");
    }

    #[test]
    fn movement_in_y_only() {
      let a = Point::new(10.0, 10.0);
      let b = Point::new(10.0, 40.0);
      assert!(a.moved_from(b, 5.0), "y-only movement");
    }

    #[test]
    fn diagonal_movement_below_threshold_on_both_axes() {
      let a = Point::new(0.0, 0.0);
      let b = Point::new(4.0, 4.0);
      assert!(
        !a.moved_from(b, 5.0),
        "diagonal movement below threshold in both axes"
      );
    }
  }

  mod position {
    use super::*;

    #[test]
    fn absolute_exposes_point() {
      let p = Position::absolute(10.0, 20.0);
      assert_eq!(p.as_point(), Some(Point::new(10.0, 20.0)));
      assert!(!p.is_anchored());
    }

    #[test]
    fn anchored_has_no_point() {
      let p = Position::anchored(16.0, 16.0);
      assert_eq!(p.as_point(), None);
      assert!(p.is_anchored());
    }

    #[test]
    fn serializes_with_kind_tag() {
      let json = serde_json::to_value(Position::anchored(1.0, 2.0)).unwrap();
      assert_eq!(json["kind"], "anchored");
      assert_eq!(json["right"], 1.0);
      assert_eq!(json["bottom"], 2.0);
    }

    #[test]
    fn translation_follows_the_pointer() {
      let delta = Point::new(30.0, -10.0);
      assert_eq!(
        Position::absolute(100.0, 100.0).translated(delta),
        Position::absolute(130.0, 90.0)
      );
      assert_eq!(
        Position::anchored(20.0, 20.0).translated(delta),
        Position::anchored(-10.0, 30.0)
      );
    }
  }
}
