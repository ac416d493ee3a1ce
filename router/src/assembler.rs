use crate::error::{InvalidAnchorOrderError, RoutingError};
use crate::frame;
use crate::lead::Lead;
use crate::length::total_length;
use crate::meander;
use crate::obstacles::{NoObstacles, ObstacleQuery, RouteObstacles};
use crate::result::{RouteResult, RouteStatus};
use crate::router::Router;
use crate::spec::{RouteSpec, SegmentStrategy};
use qroute_common::geom::oriented::{Anchor, OrientedPoint};
use qroute_common::geom::point::Point;
use qroute_common::geom::polyline::{Polyline, raw_length};

/// Pins need a direction and no two consecutive waypoints may coincide.
pub fn validate(
    start: &OrientedPoint,
    anchors: &[Anchor],
    end: &OrientedPoint,
) -> Result<(), InvalidAnchorOrderError> {
    if start.direction.is_none() {
        return Err(InvalidAnchorOrderError::UnorientedPin("start"));
    }
    if end.direction.is_none() {
        return Err(InvalidAnchorOrderError::UnorientedPin("end"));
    }
    let waypoints: Vec<Point<f64>> = std::iter::once(start.position)
        .chain(anchors.iter().map(|a| a.position))
        .chain(std::iter::once(end.position))
        .collect();
    if let Some(i) = waypoints.windows(2).position(|w| w[0].approx_eq(w[1])) {
        return Err(InvalidAnchorOrderError::CoincidentWaypoints {
            first: i,
            second: i + 1,
            point: waypoints[i],
        });
    }
    Ok(())
}

impl Router {
    /// Routes `start -> anchors -> end` segment by segment.
    ///
    /// Leads are grown out of both pins first. Each segment tries the closed
    /// form connection, then the frame for framed routes, and falls back to
    /// the pathfinder when its strategy allows; accepted segments become obstacles for the following ones.
    /// Segments marked for meandering are length matched afterwards.
    pub fn assemble(
        &mut self,
        start: &OrientedPoint,
        anchors: &[Anchor],
        end: &OrientedPoint,
        spec: &RouteSpec,
        obstacles: &dyn ObstacleQuery,
    ) -> Result<RouteResult, InvalidAnchorOrderError> {
        validate(start, anchors, end)?;
        let head = Lead::build(start, spec.lead.start_straight, &spec.lead.start_jogs)
            .ok_or(InvalidAnchorOrderError::UnorientedPin("start"))?;
        let tail = Lead::build(end, spec.lead.end_straight, &spec.lead.end_jogs)
            .ok_or(InvalidAnchorOrderError::UnorientedPin("end"))?;

        let base: &dyn ObstacleQuery = if spec.avoid_collision {
            obstacles
        } else {
            &NoObstacles
        };
        let mut view = RouteObstacles::new(base);
        view.add_own(head.points());
        view.add_own(tail.points());

        let mut points = head.points().to_vec();
        let mut meander_ranges = Vec::new();
        let mut from = head.tip();
        for i in 0..=anchors.len() {
            let (target, tangent) = match anchors.get(i) {
                Some(a) => (a.as_target(), a.tangent),
                None => (tail.tip(), None),
            };
            let strategy = spec.segment_strategy(i);
            let seg_start = raw_length(&points);

            if !from.position.approx_eq(target.position) {
                let Some(segment) = self.connect_segment(&from, &target, strategy, spec, &view) else {
                    log::debug!(
                        "Segment {} ({:?}) failed: {} -> {}",
                        i,
                        strategy,
                        from.position,
                        target.position
                    );
                    return Ok(RouteResult::failed(RoutingError::NoPathFound {
                        from: from.position,
                        to: target.position,
                    }));
                };
                view.add_own(segment.points());
                points.extend_from_slice(&segment.points()[1..]);
                from = OrientedPoint {
                    position: target.position,
                    direction: tangent.or(segment.end_direction()),
                };
            } else {
                from.direction = tangent.or(from.direction);
            }

            if strategy == SegmentStrategy::Meander {
                meander_ranges.push((seg_start, raw_length(&points)));
            }
        }
        points.extend(tail.points().iter().rev().skip(1));

        let Ok(line) = Polyline::reduced(&points) else {
            return Ok(RouteResult::failed(RoutingError::NoPathFound {
                from: start.position,
                to: end.position,
            }));
        };

        if spec.has_meander_segments() {
            return Ok(meander::match_length(&line, &meander_ranges, spec, base));
        }
        let length = total_length(line.points(), spec.fillet);
        Ok(RouteResult::new(line, length, RouteStatus::Routed))
    }

    fn connect_segment(
        &mut self,
        from: &OrientedPoint,
        to: &OrientedPoint,
        strategy: SegmentStrategy,
        spec: &RouteSpec,
        obstacles: &dyn ObstacleQuery,
    ) -> Option<Polyline> {
        if let Some(line) = self.connect_simple(from, to, obstacles) {
            return Some(line);
        }
        if let Some(line) = spec
            .frame
            .as_ref()
            .and_then(|f| frame::connect_frame(from, to, f, obstacles))
        {
            return Some(line);
        }
        if strategy == SegmentStrategy::Simple {
            return None;
        }
        self.find_path(from, to, spec.step_size, obstacles)
    }
}
