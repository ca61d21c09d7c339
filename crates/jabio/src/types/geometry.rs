/*! Screen geometry as the bridge reports it (integer pixels). */

use serde::{Deserialize, Serialize};

/// Rectangle bounds in screen coordinates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bounds {
  pub x: i32,
  pub y: i32,
  pub w: i32,
  pub h: i32,
}

impl Bounds {
  pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
    Self { x, y, w, h }
  }

  /// The bridge reports `-1` sizes for components that are not showing.
  pub const fn is_empty(&self) -> bool {
    self.w <= 0 || self.h <= 0
  }

  /// Check if a point is contained within these bounds (edges inclusive).
  pub fn contains(&self, point: Point) -> bool {
    !self.is_empty()
      && i64::from(point.x) >= i64::from(self.x)
      && i64::from(point.x) <= i64::from(self.x) + i64::from(self.w)
      && i64::from(point.y) >= i64::from(self.y)
      && i64::from(point.y) <= i64::from(self.y) + i64::from(self.h)
  }
}

/// A 2D point in screen coordinates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Point {
  pub x: i32,
  pub y: i32,
}

impl Point {
  pub const fn new(x: i32, y: i32) -> Self {
    Self { x, y }
  }
}
