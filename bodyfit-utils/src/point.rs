use std::ops::{Add, Mul, Sub};

/// Single 2D point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean length when treated as a vector.
    pub fn hypot(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Distance to another point.
    pub fn distance(self, other: Point) -> f64 {
        (other - self).hypot()
    }

    /// Midpoint between two points.
    pub fn midpoint(self, other: Point) -> Point {
        (self + other) * 0.5
    }

    /// Direction of the vector in degrees, `atan2(y, x)`.
    pub fn angle_deg(self) -> f64 {
        self.y.atan2(self.x).to_degrees()
    }

    /// Angle at `self` between rays to `a` and `c`, in degrees.
    pub fn angle_between(self, a: Point, c: Point) -> f64 {
        let ba = a - self;
        let bc = c - self;
        let nba = ba * (1.0 / (ba.hypot() + 1e-6));
        let nbc = bc * (1.0 / (bc.hypot() + 1e-6));
        (nba * nbc).clamp(-1.0, 1.0).acos().to_degrees()
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, other: f64) -> Point {
        Point::new(self.x * other, self.y * other)
    }
}

/// Dot product.
impl Mul<Point> for Point {
    type Output = f64;

    fn mul(self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn right_angle_is_ninety_degrees() {
        let b = Point::new(0.0, 0.0);
        let angle = b.angle_between(Point::new(1.0, 0.0), Point::new(0.0, 1.0));
        assert!((angle - 90.0).abs() < 1e-3);
    }

    #[test]
    fn straight_line_is_one_eighty() {
        let b = Point::new(1.0, 1.0);
        let angle = b.angle_between(Point::new(0.0, 1.0), Point::new(2.0, 1.0));
        assert!((angle - 180.0).abs() < 1e-3);
    }

    #[test]
    fn distance_and_midpoint() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance(b), 5.0);
        assert_eq!(a.midpoint(b), Point::new(1.5, 2.0));
        assert!((Point::new(-1.0, 0.0).angle_deg() - 180.0).abs() < 1e-9);
    }
}
