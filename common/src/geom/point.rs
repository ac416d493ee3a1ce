use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// Absolute tolerance for coordinate comparisons, in design units.
pub const EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point<T> {
    pub x: T,
    pub y: T,
}

impl<T> Point<T> {
    pub const fn new(x: T, y: T) -> Self {
        Self { x, y }
    }
}

impl<T: Add<Output = T>> Add for Point<T> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl<T: AddAssign> AddAssign for Point<T> {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl<T: Sub<Output = T>> Sub for Point<T> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl<T: Neg<Output = T>> Neg for Point<T> {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl Mul<f64> for Point<f64> {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl fmt::Display for Point<f64> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.x, self.y)
    }
}

impl Point<f64> {
    pub const UNIT_X: Self = Self::new(1.0, 0.0);
    pub const UNIT_Y: Self = Self::new(0.0, 1.0);

    #[inline]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// z component of the 3D cross product.
    #[inline]
    pub fn cross(self, other: Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    #[inline]
    pub fn norm(self) -> f64 {
        self.x.hypot(self.y)
    }

    #[inline]
    pub fn distance(self, other: Self) -> f64 {
        (other - self).norm()
    }

    #[inline]
    pub fn manhattan(self, other: Self) -> f64 {
        (other.x - self.x).abs() + (other.y - self.y).abs()
    }

    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if n < EPSILON {
            None
        } else {
            Some(Self::new(self.x / n, self.y / n))
        }
    }

    /// Counter-clockwise rotation by `angle` radians.
    pub fn rotate(self, angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }

    /// Counter-clockwise quarter turn, exact (no trigonometry).
    #[inline]
    pub fn perp(self) -> Self {
        Self::new(-self.y, self.x)
    }

    #[inline]
    pub fn approx_eq(self, other: Self) -> bool {
        (self.x - other.x).abs() <= EPSILON && (self.y - other.y).abs() <= EPSILON
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Snaps a direction to the closest axis (ties go to x).
    pub fn snap_to_axis(self) -> Self {
        if self.x.abs() >= self.y.abs() {
            Self::new(self.x.signum(), 0.0)
        } else {
            Self::new(0.0, self.y.signum())
        }
    }

    /// Returns true when `self` lies on the sideways (left, counter-clockwise)
    /// side of the directed line a→b.
    pub fn is_sideways(self, a: Self, b: Self) -> bool {
        (self - a).cross(b - a) < 0.0
    }
}

impl From<[f64; 2]> for Point<f64> {
    fn from(v: [f64; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<Point<f64>> for [f64; 2] {
    fn from(p: Point<f64>) -> Self {
        [p.x, p.y]
    }
}
