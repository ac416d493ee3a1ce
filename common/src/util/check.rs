use crate::db::core::{ChipDesign, RoutedTrace};
use crate::db::indices::RouteId;
use crate::geom::polyline::Polyline;
use crate::geom::rtree::SpatialIndex;
use crate::geom::segment::{Intersection, Segment};
use rayon::prelude::*;

const CHECK_TOLERANCE: f64 = 1e-6;

/// Verifies a routed design. Each failing check is logged and the messages
/// are joined into the error.
pub fn run(db: &ChipDesign, length_tolerance: f64) -> Result<(), String> {
    log::info!("Starting Route Verification");

    let ((opens, shape), (obstacles, (crossings, lengths))) = rayon::join(
        || rayon::join(|| check_unrouted(db), || check_well_formed(db)),
        || {
            rayon::join(
                || check_obstacles(db),
                || rayon::join(|| check_crossings(db), || check_lengths(db, length_tolerance)),
            )
        },
    );

    let mut msgs = Vec::new();
    for (result, pass, fail) in [
        (opens, "All routes have a trace.", "Unrouted / Failed Routes"),
        (shape, "Traces are well formed.", "Malformed Traces"),
        (obstacles, "No trace enters a component.", "Component Collisions"),
        (crossings, "No crossings or self-intersections.", "Trace Crossings"),
        (lengths, "Target lengths met.", "Length Mismatch"),
    ] {
        match result {
            Ok(()) => log::info!("\x1b[32mPASS\x1b[0m: {}", pass),
            Err(e) => {
                log::error!("\x1b[31mFAIL\x1b[0m: {}", fail);
                log::error!("{}", e);
                msgs.push(e);
            }
        }
    }

    if msgs.is_empty() {
        log::info!("\x1b[32mSUCCESS\x1b[0m: VALID ROUTING");
        Ok(())
    } else {
        log::error!(
            "\x1b[31mFAILURE\x1b[0m: INVALID ROUTING ({} Errors)",
            msgs.len()
        );
        Err(msgs.join("; "))
    }
}

fn traces(db: &ChipDesign) -> impl ParallelIterator<Item = (RouteId, &RoutedTrace)> {
    db.routed
        .par_iter()
        .enumerate()
        .filter_map(|(i, t)| t.as_ref().filter(|t| !t.failed).map(|t| (RouteId::new(i), t)))
}

fn first_error(errors: Vec<String>) -> Result<(), String> {
    match errors.as_slice() {
        [] => Ok(()),
        [only] => Err(only.clone()),
        [first, rest @ ..] => Err(format!("{} (+{} more)", first, rest.len())),
    }
}

fn check_unrouted(db: &ChipDesign) -> Result<(), String> {
    let errors: Vec<String> = db
        .routes
        .par_iter()
        .zip(db.routed.par_iter())
        .filter_map(|(req, trace)| match trace {
            None => Some(format!("Route '{}': unrouted", req.name)),
            Some(t) if t.failed => Some(format!("Route '{}': {}", req.name, t.status)),
            Some(_) => None,
        })
        .collect();
    first_error(errors)
}

fn check_well_formed(db: &ChipDesign) -> Result<(), String> {
    let errors: Vec<String> = traces(db)
        .filter_map(|(id, t)| {
            let req = &db.routes[id.index()];
            if let Err(e) = Polyline::new(t.points.clone()) {
                return Some(format!("Route '{}': {}", req.name, e));
            }
            let start = db.pin(req.start).point.position;
            let end = db.pin(req.end).point.position;
            let first = t.points[0];
            let last = t.points[t.points.len() - 1];
            if first.distance(start) > CHECK_TOLERANCE || last.distance(end) > CHECK_TOLERANCE {
                return Some(format!(
                    "Route '{}': trace {} -> {} does not join pins {} -> {}",
                    req.name, first, last, start, end
                ));
            }
            None
        })
        .collect();
    first_error(errors)
}

fn check_obstacles(db: &ChipDesign) -> Result<(), String> {
    let index = SpatialIndex::bulk(
        db.components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.outline.envelope(), i)),
    );

    let errors: Vec<String> = traces(db)
        .flat_map_iter(|(id, t)| {
            let name = &db.routes[id.index()].name;
            let index = &index;
            t.points.windows(2).filter_map(move |w| {
                let seg = Segment::new(w[0], w[1]);
                index.query(seg.envelope()).into_iter().find_map(|ci| {
                    let comp = &db.components[ci];
                    let hit = comp.outline.contains_strict(w[0])
                        || comp.outline.contains_strict(w[1])
                        || comp.outline.segment_enters_interior(w[0], w[1]);
                    hit.then(|| {
                        format!(
                            "Route '{}': segment {} -> {} enters component '{}'",
                            name, w[0], w[1], comp.name
                        )
                    })
                })
            })
        })
        .collect();
    first_error(errors)
}

fn check_crossings(db: &ChipDesign) -> Result<(), String> {
    let segments: Vec<(RouteId, usize, Segment)> = db
        .routed
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.as_ref().filter(|t| !t.failed).map(|t| (i, t)))
        .flat_map(|(i, t)| {
            t.points
                .windows(2)
                .enumerate()
                .map(move |(k, w)| (RouteId::new(i), k, Segment::new(w[0], w[1])))
        })
        .collect();
    let index = SpatialIndex::bulk(
        segments
            .iter()
            .enumerate()
            .map(|(n, (_, _, s))| (s.envelope(), n)),
    );

    let errors: Vec<String> = segments
        .par_iter()
        .enumerate()
        .filter_map(|(n, &(route, k, seg))| {
            index.query(seg.envelope()).into_iter().find_map(|m| {
                if m <= n {
                    return None;
                }
                let (other_route, other_k, other) = segments[m];
                let same_route = other_route == route;
                let hit = match seg.intersection(&other) {
                    Intersection::None => false,
                    // consecutive segments of one trace share their joint
                    Intersection::Point(_) => !(same_route && other_k == k + 1),
                    Intersection::Overlap(..) => true,
                };
                if !hit {
                    return None;
                }
                let a = &db.routes[route.index()].name;
                if same_route {
                    Some(format!("Route '{}' intersects itself near {}", a, seg.a))
                } else {
                    let b = &db.routes[other_route.index()].name;
                    Some(format!("SHORT: '{}' vs '{}' near {}", a, b, seg.a))
                }
            })
        })
        .collect();
    first_error(errors)
}

fn check_lengths(db: &ChipDesign, tolerance: f64) -> Result<(), String> {
    let errors: Vec<String> = traces(db)
        .filter_map(|(id, t)| {
            let target = t.target_length?;
            let name = &db.routes[id.index()].name;
            ((t.length - target).abs() > tolerance).then(|| {
                format!(
                    "Route '{}': length {:.6} vs target {:.6}",
                    name, t.length, target
                )
            })
        })
        .collect();
    first_error(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::core::{RouteKind, RouteOptions, RouteRequest};
    use crate::geom::oriented::OrientedPoint;
    use crate::geom::point::Point;
    use crate::geom::polygon::Polygon;
    use crate::geom::polyline::raw_length;

    fn design() -> ChipDesign {
        let mut db = ChipDesign::new("mm");
        let a = db.add_component(
            "A".to_string(),
            Polygon::rect(Point::new(-1.0, -1.0), Point::new(0.0, 1.0)),
        );
        let b = db.add_component(
            "B".to_string(),
            Polygon::rect(Point::new(5.0, -1.0), Point::new(6.0, 1.0)),
        );
        db.add_component(
            "C".to_string(),
            Polygon::rect(Point::new(2.0, 2.0), Point::new(3.0, 3.0)),
        );
        let pa = db.add_pin(
            a,
            "p".to_string(),
            OrientedPoint::new(Point::new(0.0, 0.0), Point::UNIT_X),
        );
        let pb = db.add_pin(
            b,
            "p".to_string(),
            OrientedPoint::new(Point::new(5.0, 0.0), -Point::UNIT_X),
        );
        db.add_route(RouteRequest {
            name: "r".to_string(),
            start: pa,
            end: pb,
            anchors: Vec::new(),
            kind: RouteKind::Simple,
            options: RouteOptions::default(),
        });
        db
    }

    fn trace(points: &[(f64, f64)], target: Option<f64>) -> RoutedTrace {
        let points: Vec<Point<f64>> = points.iter().map(|&(x, y)| Point::new(x, y)).collect();
        RoutedTrace {
            length: raw_length(&points),
            points,
            target_length: target,
            status: "routed".to_string(),
            failed: false,
        }
    }

    #[test]
    fn clean_route_passes() {
        let mut db = design();
        db.set_routed(RouteId::new(0), trace(&[(0.0, 0.0), (5.0, 0.0)], Some(5.0)));
        assert!(run(&db, 1e-3).is_ok());
    }

    #[test]
    fn unrouted_route_fails() {
        let db = design();
        assert!(run(&db, 1e-3).unwrap_err().contains("unrouted"));
    }

    #[test]
    fn route_through_component_fails() {
        let mut db = design();
        db.set_routed(
            RouteId::new(0),
            trace(
                &[(0.0, 0.0), (2.5, 0.0), (2.5, 2.5), (4.0, 2.5), (4.0, 0.0), (5.0, 0.0)],
                None,
            ),
        );
        let err = run(&db, 1e-3).unwrap_err();
        assert!(err.contains("component 'C'"), "{err}");
    }

    #[test]
    fn length_mismatch_fails() {
        let mut db = design();
        db.set_routed(RouteId::new(0), trace(&[(0.0, 0.0), (5.0, 0.0)], Some(7.0)));
        assert!(run(&db, 1e-3).unwrap_err().contains("target"));
    }

    #[test]
    fn self_crossing_fails() {
        let mut db = design();
        db.set_routed(
            RouteId::new(0),
            trace(
                &[(0.0, 0.0), (3.0, 0.0), (3.0, -0.5), (1.0, -0.5), (1.0, 0.5), (5.0, 0.5), (5.0, 0.0)],
                None,
            ),
        );
        assert!(run(&db, 1e-3).unwrap_err().contains("intersects itself"));
    }
}
