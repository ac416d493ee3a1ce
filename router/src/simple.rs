use crate::obstacles::ObstacleQuery;
use qroute_common::geom::oriented::OrientedPoint;
use qroute_common::geom::point::{EPSILON, Point};
use qroute_common::geom::polyline::Polyline;

/// Closed-form connection with a straight line, an elbow or an S-shape.
///
/// `start.direction` is the exit direction, `end.direction` the outward
/// direction at the end (pointing back toward the arriving route). Candidates
/// are tried from "perfect" (strictly forward at both ends) to relaxed
/// (perpendicular allowed). Returns the full polyline including both ends, or
/// `None` when no candidate is clear.
pub fn connect_simple<O: ObstacleQuery + ?Sized>(
    start: &OrientedPoint,
    end: &OrientedPoint,
    obstacles: &O,
) -> Option<Polyline> {
    let s = start.position;
    let e = end.position;
    if s.approx_eq(e) {
        return None;
    }
    // an undirected start accepts every relaxed candidate and no perfect one
    let sd = start.direction.unwrap_or_default();
    let stop = end.assigned_direction(s);
    let in_front_of_end = |p: Point<f64>, strict: bool| match end.direction {
        None => true,
        Some(ed) if strict => ed.dot(p - e) > 0.0,
        Some(ed) => ed.dot(p - e) >= 0.0,
    };
    let clear = |pts: &[Point<f64>]| obstacles.polyline_is_clear(pts);
    let build = |pts: Vec<Point<f64>>| Polyline::new(pts).ok();

    if (s.x - e.x).abs() <= EPSILON || (s.y - e.y).abs() <= EPSILON {
        let along = e - s;
        let forward = sd.dot(along) >= 0.0;
        let not_from_behind = end.direction.is_none_or(|ed| along.dot(ed) <= 0.0);
        if forward && not_from_behind && clear(&[s, e]) {
            return build(vec![s, e]);
        }
        return None;
    }

    let corner1 = Point::new(s.x, e.y);
    let corner2 = Point::new(e.x, s.y);
    let elbow1 = [s, corner1, e];
    let elbow2 = [s, corner2, e];

    // Perfect elbow. As soon as a clear corner is in front of the start the
    // other corner is not considered at this tier.
    if sd.dot(corner1 - s) > 0.0 && clear(&elbow1) {
        if in_front_of_end(corner1, false) {
            return build(elbow1.to_vec());
        }
    } else if sd.dot(corner2 - s) > 0.0 && clear(&elbow2) {
        if in_front_of_end(corner2, false) {
            return build(elbow2.to_vec());
        }
    }

    let mid = Point::new((s.x + e.x) / 2.0, (s.y + e.y) / 2.0);
    let (c3, c4, c5, c6) = if stop.x != 0.0 {
        // wide: vertical middle segment
        (
            Point::new(mid.x, s.y),
            Point::new(mid.x, e.y),
            Point::new(s.x, mid.y),
            Point::new(e.x, mid.y),
        )
    } else {
        (
            Point::new(s.x, mid.y),
            Point::new(e.x, mid.y),
            Point::new(mid.x, s.y),
            Point::new(mid.x, e.y),
        )
    };
    let s34 = [s, c3, c4, e];
    let s56 = [s, c5, c6, e];

    if sd.dot(stop) < 0.0 && sd.dot(c3 - s) > 0.0 && in_front_of_end(c4, true) && clear(&s34) {
        return build(s34.to_vec());
    }

    // relaxed tier: zero dot products allowed
    if sd.dot(corner1 - s) >= 0.0 && in_front_of_end(corner1, false) && clear(&elbow1) {
        return build(elbow1.to_vec());
    }
    if sd.dot(corner2 - s) >= 0.0 && in_front_of_end(corner2, false) && clear(&elbow2) {
        return build(elbow2.to_vec());
    }
    if sd.dot(c3 - s) >= 0.0 && in_front_of_end(c4, false) && clear(&s34) {
        return build(s34.to_vec());
    }
    if sd.dot(c5 - s) >= 0.0 && in_front_of_end(c6, false) && clear(&s56) {
        return build(s56.to_vec());
    }
    None
}
