use super::point::{EPSILON, Point};
use super::rect::Rect;
use super::segment::Segment;

/// Simple closed polygon; the last vertex connects back to the first.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    vertices: Vec<Point<f64>>,
    envelope: Rect,
}

impl Polygon {
    pub fn new(mut vertices: Vec<Point<f64>>) -> Option<Self> {
        if vertices.len() > 1 && vertices[0].approx_eq(vertices[vertices.len() - 1]) {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return None;
        }
        let envelope = Rect::bounding(&vertices)?;
        Some(Self { vertices, envelope })
    }

    pub fn rect(min: Point<f64>, max: Point<f64>) -> Self {
        let r = Rect::from_corners(min, max);
        Self {
            vertices: r.corners().to_vec(),
            envelope: r,
        }
    }

    pub fn vertices(&self) -> &[Point<f64>] {
        &self.vertices
    }

    pub fn envelope(&self) -> Rect {
        self.envelope
    }

    pub fn edges(&self) -> impl Iterator<Item = Segment> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| Segment::new(self.vertices[i], self.vertices[(i + 1) % n]))
    }

    pub fn on_boundary(&self, p: Point<f64>) -> bool {
        self.edges().any(|e| e.distance_to(p) <= EPSILON)
    }

    /// Strictly inside; points on the boundary are outside.
    pub fn contains_strict(&self, p: Point<f64>) -> bool {
        if !self.envelope.contains(p) || self.on_boundary(p) {
            return false;
        }
        let mut inside = false;
        let n = self.vertices.len();
        let mut j = n - 1;
        for i in 0..n {
            let vi = self.vertices[i];
            let vj = self.vertices[j];
            if (vi.y > p.y) != (vj.y > p.y) {
                let x_cross = vj.x + (p.y - vj.y) * (vi.x - vj.x) / (vi.y - vj.y);
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Whether any part of the segment a→b lies strictly inside the polygon.
    /// Running along an edge or touching a vertex is allowed.
    pub fn segment_enters_interior(&self, a: Point<f64>, b: Point<f64>) -> bool {
        let seg = Segment::new(a, b);
        if !seg.envelope().touches(&self.envelope) {
            return false;
        }
        if seg.length() < EPSILON {
            return self.contains_strict(a);
        }
        let mut ts = vec![0.0, 1.0];
        for edge in self.edges() {
            ts.extend(seg.crossing_params(&edge));
        }
        ts.sort_by(|x, y| x.total_cmp(y));
        ts.dedup_by(|x, y| (*x - *y).abs() < 1e-12);
        ts.windows(2)
            .any(|w| self.contains_strict(seg.point_at((w[0] + w[1]) / 2.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn block() -> Polygon {
        Polygon::rect(Point::new(2.0, -1.0), Point::new(3.0, 1.0))
    }

    #[rstest]
    #[case(Point::new(2.5, 0.0), true)]
    #[case(Point::new(2.0, 0.0), false)]
    #[case(Point::new(3.0, 1.0), false)]
    #[case(Point::new(5.0, 0.0), false)]
    fn strict_containment(#[case] p: Point<f64>, #[case] inside: bool) {
        assert_eq!(block().contains_strict(p), inside);
    }

    #[rstest]
    #[case((0.0, 0.0), (5.0, 0.0), true)]
    #[case((2.0, -3.0), (2.0, 3.0), false)]
    #[case((0.0, 1.0), (5.0, 1.0), false)]
    #[case((0.0, 0.0), (2.0, 0.0), false)]
    #[case((2.5, 5.0), (2.5, 0.5), true)]
    fn segment_interior(#[case] a: (f64, f64), #[case] b: (f64, f64), #[case] blocked: bool) {
        let a = Point::new(a.0, a.1);
        let b = Point::new(b.0, b.1);
        assert_eq!(block().segment_enters_interior(a, b), blocked);
    }

    #[test]
    fn concave_notch_is_outside() {
        // U shape open to +y
        let u = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(3.0, 0.0),
            Point::new(3.0, 3.0),
            Point::new(2.0, 3.0),
            Point::new(2.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(1.0, 3.0),
            Point::new(0.0, 3.0),
        ])
        .unwrap();
        assert!(!u.contains_strict(Point::new(1.5, 2.0)));
        assert!(u.contains_strict(Point::new(0.5, 2.0)));
        assert!(!u.segment_enters_interior(Point::new(1.5, 5.0), Point::new(1.5, 1.0)));
        assert!(u.segment_enters_interior(Point::new(-1.0, 2.0), Point::new(1.5, 2.0)));
    }
}
