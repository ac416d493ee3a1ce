use super::point::{EPSILON, Point};
use super::rect::Rect;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub a: Point<f64>,
    pub b: Point<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Intersection {
    None,
    Point(Point<f64>),
    /// Colinear overlap of positive length.
    Overlap(Point<f64>, Point<f64>),
}

impl Segment {
    pub fn new(a: Point<f64>, b: Point<f64>) -> Self {
        Self { a, b }
    }

    pub fn length(&self) -> f64 {
        self.a.distance(self.b)
    }

    pub fn envelope(&self) -> Rect {
        Rect::from_corners(self.a, self.b)
    }

    pub fn point_at(&self, t: f64) -> Point<f64> {
        self.a + (self.b - self.a) * t
    }

    pub fn has_endpoint(&self, p: Point<f64>) -> bool {
        self.a.approx_eq(p) || self.b.approx_eq(p)
    }

    /// Distance from `p` to the closed segment.
    pub fn distance_to(&self, p: Point<f64>) -> f64 {
        let d = self.b - self.a;
        let len2 = d.dot(d);
        if len2 < EPSILON * EPSILON {
            return self.a.distance(p);
        }
        let t = ((p - self.a).dot(d) / len2).clamp(0.0, 1.0);
        self.point_at(t).distance(p)
    }

    /// Parameters along `self` at which `other` meets it. Colinear overlaps
    /// contribute both overlap ends.
    pub fn crossing_params(&self, other: &Segment) -> Vec<f64> {
        let r = self.b - self.a;
        let s = other.b - other.a;
        let denom = r.cross(s);
        let qp = other.a - self.a;
        let rr = r.dot(r);
        let mut out = Vec::new();
        if rr < EPSILON * EPSILON {
            return out;
        }
        let scale = r.norm() * s.norm().max(EPSILON);
        if denom.abs() <= EPSILON * scale {
            // Parallel: only colinear pieces matter.
            if qp.cross(r).abs() > EPSILON * r.norm() {
                return out;
            }
            for p in [other.a, other.b] {
                let t = (p - self.a).dot(r) / rr;
                if (-EPSILON..=1.0 + EPSILON).contains(&t) {
                    out.push(t.clamp(0.0, 1.0));
                }
            }
            return out;
        }
        let t = qp.cross(s) / denom;
        let u = qp.cross(r) / denom;
        let tol_t = EPSILON / r.norm();
        let tol_u = EPSILON / s.norm().max(EPSILON);
        if t >= -tol_t && t <= 1.0 + tol_t && u >= -tol_u && u <= 1.0 + tol_u {
            out.push(t.clamp(0.0, 1.0));
        }
        out
    }

    pub fn intersection(&self, other: &Segment) -> Intersection {
        if !self.envelope().expanded(EPSILON).touches(&other.envelope()) {
            return Intersection::None;
        }
        let r = self.b - self.a;
        let s = other.b - other.a;
        if r.norm() < EPSILON || s.norm() < EPSILON {
            let (p, seg) = if r.norm() < EPSILON { (self.a, other) } else { (other.a, self) };
            return if seg.distance_to(p) <= EPSILON {
                Intersection::Point(p)
            } else {
                Intersection::None
            };
        }
        let colinear = r.cross(s).abs() <= EPSILON * r.norm() * s.norm()
            && (other.a - self.a).cross(r).abs() <= EPSILON * r.norm();
        let mut ts = self.crossing_params(other);
        if colinear {
            for (t, p) in [(0.0, self.a), (1.0, self.b)] {
                if other.distance_to(p) <= EPSILON {
                    ts.push(t);
                }
            }
        }
        if ts.is_empty() {
            return Intersection::None;
        }
        ts.sort_by(|a, b| a.total_cmp(b));
        let lo = self.point_at(ts[0]);
        let hi = self.point_at(ts[ts.len() - 1]);
        if colinear && lo.distance(hi) > EPSILON {
            Intersection::Overlap(lo, hi)
        } else {
            Intersection::Point(lo)
        }
    }

    /// True unless the two segments are disjoint or meet only at an endpoint
    /// shared by both.
    pub fn conflicts_with(&self, other: &Segment) -> bool {
        match self.intersection(other) {
            Intersection::None => false,
            Intersection::Point(p) => !(self.has_endpoint(p) && other.has_endpoint(p)),
            Intersection::Overlap(..) => true,
        }
    }
}
