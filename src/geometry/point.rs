use geo::Coord;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// A signed 64-bit integer count of micrometres (spec §3).
pub type Micrometre = i64;

/// A 2D fixed-point point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: Micrometre,
    pub y: Micrometre,
}

impl Point {
    pub const ZERO: Point = Point { x: 0, y: 0 };

    pub fn new(x: Micrometre, y: Micrometre) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(self, other: Point) -> i64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        // widen before squaring: micrometre deltas for large parts can exceed i32 range
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.distance_squared(other) as f64).sqrt()
    }

    pub fn lerp(self, other: Point, t: f64) -> Point {
        Point::new(
            self.x + ((other.x - self.x) as f64 * t).round() as i64,
            self.y + ((other.y - self.y) as f64 * t).round() as i64,
        )
    }

    pub fn as_f64(self) -> (f64, f64) {
        (self.x as f64, self.y as f64)
    }

    pub fn to_coord(self) -> Coord<f64> {
        Coord {
            x: self.x as f64,
            y: self.y as f64,
        }
    }

    pub fn from_coord(c: Coord<f64>) -> Self {
        Self::new(c.x.round() as i64, c.y.round() as i64)
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, rhs: f64) -> Point {
        Point::new((self.x as f64 * rhs).round() as i64, (self.y as f64 * rhs).round() as i64)
    }
}

/// A 3D fixed-point point; the `z` coordinate shares the same micrometre unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Point3 {
    pub x: Micrometre,
    pub y: Micrometre,
    pub z: Micrometre,
}

impl Point3 {
    pub fn new(x: Micrometre, y: Micrometre, z: Micrometre) -> Self {
        Self { x, y, z }
    }

    pub fn xy(self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn with_z(point: Point, z: Micrometre) -> Self {
        Self::new(point.x, point.y, z)
    }
}
