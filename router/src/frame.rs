use crate::obstacles::ObstacleQuery;
use crate::spec::FrameSpec;
use qroute_common::geom::oriented::OrientedPoint;
use qroute_common::geom::point::{EPSILON, Point};
use qroute_common::geom::polyline::{Polyline, del_colinear_points, raw_length};
use qroute_common::geom::rect::Rect;

/// Connects two oriented points with a frame of at most three axis-aligned
/// segments.
///
/// Three-segment frames put their middle leg either on the midline of the
/// gap between the two component boxes or `keepout` outside both of them.
/// The shortest clear candidate wins, fewer corners on ties.
pub fn connect_frame<O: ObstacleQuery + ?Sized>(
    start: &OrientedPoint,
    end: &OrientedPoint,
    frame: &FrameSpec,
    obstacles: &O,
) -> Option<Polyline> {
    let s = start.position;
    let e = end.position;
    let [a, b] = frame
        .bounds
        .unwrap_or_else(|| [Rect::new(s, s), Rect::new(e, e)]);
    let outer = a.union(&b).including(s).including(e).expanded(frame.keepout);

    let mut xs = vec![outer.min.x, outer.max.x];
    let mut ys = vec![outer.min.y, outer.max.y];
    if let Some(x) = gap_midline(a.min.x, a.max.x, b.min.x, b.max.x) {
        xs.push(x);
    }
    if let Some(y) = gap_midline(a.min.y, a.max.y, b.min.y, b.max.y) {
        ys.push(y);
    }

    let mut candidates = vec![
        vec![s, e],
        vec![s, Point::new(s.x, e.y), e],
        vec![s, Point::new(e.x, s.y), e],
    ];
    candidates.extend(xs.iter().map(|&x| vec![s, Point::new(x, s.y), Point::new(x, e.y), e]));
    candidates.extend(ys.iter().map(|&y| vec![s, Point::new(s.x, y), Point::new(e.x, y), e]));

    let best = candidates
        .into_iter()
        .filter(|pts| follows_directions(pts, start, end))
        .filter_map(|pts| Polyline::new(del_colinear_points(&pts)).ok())
        .filter(|line| !line.self_intersects() && obstacles.polyline_is_clear(line.points()))
        .min_by(|l1, l2| {
            let (r1, r2) = (raw_length(l1.points()), raw_length(l2.points()));
            if (r1 - r2).abs() <= EPSILON {
                l1.points().len().cmp(&l2.points().len())
            } else {
                r1.total_cmp(&r2)
            }
        });
    if best.is_none() {
        log::debug!("No clear frame from {} to {}", s, e);
    }
    best
}

fn gap_midline(a_min: f64, a_max: f64, b_min: f64, b_max: f64) -> Option<f64> {
    if a_max < b_min {
        Some((a_max + b_min) / 2.0)
    } else if b_max < a_min {
        Some((b_max + a_min) / 2.0)
    } else {
        None
    }
}

/// Axis-aligned legs, no U-turns, leaving along the start direction and
/// arriving against the end normal.
fn follows_directions(pts: &[Point<f64>], start: &OrientedPoint, end: &OrientedPoint) -> bool {
    let legs: Vec<Point<f64>> = pts
        .windows(2)
        .filter_map(|w| (w[1] - w[0]).normalized())
        .collect();
    let (Some(&first), Some(&last)) = (legs.first(), legs.last()) else {
        return false;
    };
    if legs.iter().any(|d| d.x.abs() > EPSILON && d.y.abs() > EPSILON) {
        return false;
    }
    if legs.windows(2).any(|w| w[0].dot(w[1]) < -1.0 + EPSILON) {
        return false;
    }
    let leaves = start.direction.is_none_or(|d| first.dot(d) >= -EPSILON);
    let arrives = end.direction.is_none_or(|d| last.dot(d) <= EPSILON);
    leaves && arrives
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obstacles::{NoObstacles, ObstacleSet};
    use qroute_common::geom::polygon::Polygon;

    fn p(x: f64, y: f64) -> Point<f64> {
        Point::new(x, y)
    }

    fn op(x: f64, y: f64, dx: f64, dy: f64) -> OrientedPoint {
        OrientedPoint::new(p(x, y), p(dx, dy))
    }

    fn frame(bounds: Option<[Rect; 2]>) -> FrameSpec {
        FrameSpec {
            keepout: 0.2,
            bounds,
        }
    }

    fn boxes() -> [Rect; 2] {
        [
            Rect::new(p(-1.0, -1.0), p(0.0, 1.0)),
            Rect::new(p(3.0, -1.0), p(4.0, 1.0)),
        ]
    }

    fn set(bounds: &[Rect; 2]) -> ObstacleSet {
        let mut set = ObstacleSet::new();
        for r in bounds {
            set.add_region(Polygon::rect(r.min, r.max));
        }
        set
    }

    #[test]
    fn facing_pins_take_one_segment() {
        let line = connect_frame(
            &op(0.0, 0.0, 1.0, 0.0),
            &op(3.0, 0.0, -1.0, 0.0),
            &frame(Some(boxes())),
            &NoObstacles,
        )
        .unwrap();
        assert_eq!(line.points(), &[p(0.0, 0.0), p(3.0, 0.0)]);
    }

    #[test]
    fn blocked_corners_fall_back_to_the_gap_midline() {
        let bounds = boxes();
        let mut obstacles = set(&bounds);
        obstacles.add_region(Polygon::rect(p(0.1, -0.3), p(0.5, -0.1)));
        obstacles.add_region(Polygon::rect(p(2.5, 0.1), p(2.9, 0.3)));
        let line = connect_frame(
            &op(0.3, 0.5, 1.0, 0.0),
            &op(2.7, -0.5, -1.0, 0.0),
            &frame(Some(bounds)),
            &obstacles,
        )
        .unwrap();
        assert_eq!(
            line.points(),
            &[p(0.3, 0.5), p(1.5, 0.5), p(1.5, -0.5), p(2.7, -0.5)]
        );
    }

    #[test]
    fn pins_facing_away_wrap_outside_with_keepout() {
        // lead tips on the far sides of both components
        let bounds = boxes();
        let line = connect_frame(
            &op(-1.2, 0.0, -1.0, 0.0),
            &op(4.2, 0.0, 1.0, 0.0),
            &frame(Some(bounds)),
            &set(&bounds),
        )
        .unwrap();
        assert_eq!(
            line.points(),
            &[p(-1.2, 0.0), p(-1.2, -1.2), p(4.2, -1.2), p(4.2, 0.0)]
        );
    }

    #[test]
    fn blocked_side_picks_the_other_frame() {
        let bounds = boxes();
        let mut obstacles = set(&bounds);
        obstacles.add_region(Polygon::rect(p(-3.0, -3.0), p(6.0, -1.1)));
        let line = connect_frame(
            &op(-1.2, 0.0, -1.0, 0.0),
            &op(4.2, 0.0, 1.0, 0.0),
            &frame(Some(bounds)),
            &obstacles,
        )
        .unwrap();
        assert_eq!(
            line.points(),
            &[p(-1.2, 0.0), p(-1.2, 1.2), p(4.2, 1.2), p(4.2, 0.0)]
        );
        assert!(obstacles.polyline_is_clear(line.points()));
    }

    #[test]
    fn enclosed_pins_have_no_frame() {
        let mut obstacles = ObstacleSet::new();
        obstacles.add_region(Polygon::rect(p(1.0, -5.0), p(2.0, 5.0)));
        let result = connect_frame(
            &op(0.0, 0.0, 1.0, 0.0),
            &op(3.0, 0.0, -1.0, 0.0),
            &frame(None),
            &obstacles,
        );
        assert_eq!(result, None);
    }
}
