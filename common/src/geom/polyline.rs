use super::point::{EPSILON, Point};
use super::segment::{Intersection, Segment};
use thiserror::Error;

/// Sine of the largest turn angle still treated as "straight" (or as a full
/// reversal) by colinear reduction.
pub const COLINEAR_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("polyline needs at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("polyline has repeated consecutive point {point} at index {index}")]
    RepeatedPoint { index: usize, point: Point<f64> },
    #[error("non-finite coordinate at index {0}")]
    NonFinite(usize),
}

/// Ordered trace centre line: at least two points, no consecutive duplicates.
#[derive(Clone, Debug, PartialEq)]
pub struct Polyline {
    points: Vec<Point<f64>>,
}

impl Polyline {
    pub fn new(points: Vec<Point<f64>>) -> Result<Self, GeometryError> {
        if points.len() < 2 {
            return Err(GeometryError::TooFewPoints(points.len()));
        }
        for (i, p) in points.iter().enumerate() {
            if !p.is_finite() {
                return Err(GeometryError::NonFinite(i));
            }
        }
        if let Some(i) = points.windows(2).position(|w| w[0].approx_eq(w[1])) {
            return Err(GeometryError::RepeatedPoint {
                index: i + 1,
                point: points[i + 1],
            });
        }
        Ok(Self { points })
    }

    /// Drops duplicates and colinear points before validating.
    pub fn reduced(points: &[Point<f64>]) -> Result<Self, GeometryError> {
        Self::new(del_colinear_points(points))
    }

    pub fn points(&self) -> &[Point<f64>] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Point<f64>> {
        self.points
    }

    pub fn start(&self) -> Point<f64> {
        self.points[0]
    }

    pub fn end(&self) -> Point<f64> {
        self.points[self.points.len() - 1]
    }

    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        self.points.windows(2).map(|w| Segment::new(w[0], w[1]))
    }

    /// Sum of segment lengths, no corner rounding.
    pub fn raw_length(&self) -> f64 {
        raw_length(&self.points)
    }

    /// Direction of travel entering the last point.
    pub fn end_direction(&self) -> Option<Point<f64>> {
        let n = self.points.len();
        (self.points[n - 1] - self.points[n - 2]).normalized()
    }

    pub fn is_colinear_reduced(&self) -> bool {
        self.points
            .windows(3)
            .all(|w| !aligned(w[0], w[1], w[2]))
    }

    /// Any two non-adjacent segments touching, or adjacent ones folding back.
    pub fn self_intersects(&self) -> bool {
        let segs: Vec<Segment> = self.segments().collect();
        for i in 0..segs.len() {
            for j in (i + 1)..segs.len() {
                if j == i + 1 {
                    if let Intersection::Overlap(..) = segs[i].intersection(&segs[j]) {
                        return true;
                    }
                    continue;
                }
                if segs[i].intersection(&segs[j]) != Intersection::None {
                    return true;
                }
            }
        }
        false
    }
}

pub fn raw_length(points: &[Point<f64>]) -> f64 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Three points lie on one line: the turn at `b` is within tolerance of 0 or
/// 180 degrees.
pub fn aligned(a: Point<f64>, b: Point<f64>, c: Point<f64>) -> bool {
    let u = b - a;
    let v = c - b;
    let scale = u.norm() * v.norm();
    if scale < EPSILON * EPSILON {
        return true;
    }
    u.cross(v).abs() <= COLINEAR_TOLERANCE * scale
}

/// Removes repeated and colinear points. First and last points are kept
/// exactly; running it twice gives the same result as running it once.
pub fn del_colinear_points(points: &[Point<f64>]) -> Vec<Point<f64>> {
    let mut out: Vec<Point<f64>> = Vec::with_capacity(points.len());
    let last_idx = points.len().saturating_sub(1);
    for (idx, &p) in points.iter().enumerate() {
        if merge_repeated(&mut out, p, idx == last_idx) {
            continue;
        }
        while out.len() >= 2 && aligned(out[out.len() - 2], out[out.len() - 1], p) {
            out.pop();
        }
        // a fold-back may leave `p` on top of the new last point
        if merge_repeated(&mut out, p, idx == last_idx) {
            continue;
        }
        out.push(p);
    }
    out
}

/// True when `p` repeats the last kept point. The final input point replaces
/// it so the end stays exact; the first point is never replaced.
fn merge_repeated(out: &mut [Point<f64>], p: Point<f64>, is_end: bool) -> bool {
    let n = out.len();
    if n == 0 || !out[n - 1].approx_eq(p) {
        return false;
    }
    if is_end && n > 1 {
        out[n - 1] = p;
    }
    true
}
