//! World points and grid coordinates.
//!
//! World frame: meters, `x` grows east, `y` grows south (floorplan rows read
//! top to bottom). Headings are degrees clockwise from north, so heading 0
//! moves toward negative `y` and heading 90 toward positive `x`.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// A position in world coordinates (meters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Heading from this point toward `other`, degrees clockwise from north.
    pub fn heading_to(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dy.atan2(dx).to_degrees() + 90.0).rem_euclid(360.0)
    }

    /// Position after moving along `heading` at `speed` m/s for `duration` s.
    ///
    /// Coordinates are rounded to 3 decimals, the resolution all position
    /// estimates are exchanged at.
    pub fn advanced(&self, heading_deg: f64, speed: f64, duration: f64) -> Point {
        let rad = (heading_deg - 90.0).to_radians();
        Point {
            x: round3(self.x + duration * rad.cos() * speed),
            y: round3(self.y + duration * rad.sin() * speed),
        }
    }

    /// Millimeter-quantized key, the canonical identity for map features.
    #[inline]
    pub fn to_mm(&self) -> (i64, i64) {
        (mm(self.x), mm(self.y))
    }
}

impl Add for Point {
    type Output = Point;
    #[inline]
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    #[inline]
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Round a world coordinate to 3 decimals (millimeter resolution).
#[inline]
pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Quantize a world coordinate to integer millimeters.
#[inline]
pub fn mm(v: f64) -> i64 {
    (v * 1000.0).round() as i64
}

/// A cell on the half-step occupancy grid, in signed steps from the start
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
}

impl GridCoord {
    #[inline]
    pub fn new(x: i32, y: i32) -> Self {
        GridCoord { x, y }
    }

    /// The 8 surrounding cells.
    pub fn neighbors_8(&self) -> [GridCoord; 8] {
        [
            GridCoord::new(self.x - 1, self.y - 1),
            GridCoord::new(self.x, self.y - 1),
            GridCoord::new(self.x + 1, self.y - 1),
            GridCoord::new(self.x - 1, self.y),
            GridCoord::new(self.x + 1, self.y),
            GridCoord::new(self.x - 1, self.y + 1),
            GridCoord::new(self.x, self.y + 1),
            GridCoord::new(self.x + 1, self.y + 1),
        ]
    }

    #[inline]
    pub fn chebyshev(&self, other: &GridCoord) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    /// Euclidean distance in cell units.
    #[inline]
    pub fn euclidean(&self, other: &GridCoord) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}
