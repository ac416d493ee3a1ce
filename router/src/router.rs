use crate::algo::astar::Pathfinder;
use crate::error::InvalidAnchorOrderError;
use crate::meander;
use crate::obstacles::{NoObstacles, ObstacleQuery};
use crate::result::RouteResult;
use crate::simple;
use crate::spec::RouteSpec;
use qroute_common::geom::oriented::{Anchor, OrientedPoint};
use qroute_common::geom::polyline::Polyline;
use qroute_common::util::config::Config;

/// Limits of the A* search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchSettings {
    pub search_margin: u32,
    pub max_expansions: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            search_margin: 40,
            max_expansions: 200_000,
        }
    }
}

/// Routing strategies bundled with one set of search buffers. Route kinds
/// are combinations of `RouteSpec` flags; keep one `Router` per thread.
#[derive(Clone, Default)]
pub struct Router {
    pub settings: SearchSettings,
    pathfinder: Pathfinder,
}

impl Router {
    pub fn new(settings: SearchSettings) -> Self {
        Self {
            settings,
            pathfinder: Pathfinder::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(SearchSettings {
            search_margin: config.routing.search_margin,
            max_expansions: config.routing.max_expansions,
        })
    }

    pub fn connect_simple(
        &self,
        start: &OrientedPoint,
        end: &OrientedPoint,
        obstacles: &dyn ObstacleQuery,
    ) -> Option<Polyline> {
        simple::connect_simple(start, end, obstacles)
    }

    pub fn find_path(
        &mut self,
        start: &OrientedPoint,
        end: &OrientedPoint,
        step: f64,
        obstacles: &dyn ObstacleQuery,
    ) -> Option<Polyline> {
        self.pathfinder.find_path(
            start,
            end,
            step,
            self.settings.search_margin,
            self.settings.max_expansions,
            obstacles,
        )
    }

    pub fn connect_meandered(
        &self,
        base: &Polyline,
        spec: &RouteSpec,
        obstacles: &dyn ObstacleQuery,
    ) -> RouteResult {
        meander::connect_meandered(base, spec, obstacles)
    }

    /// Assembles the route and, when a target length is set for the whole
    /// route, lengthens it with serpentines.
    pub fn route(
        &mut self,
        start: &OrientedPoint,
        anchors: &[Anchor],
        end: &OrientedPoint,
        spec: &RouteSpec,
        obstacles: &dyn ObstacleQuery,
    ) -> Result<RouteResult, InvalidAnchorOrderError> {
        let assembled = self.assemble(start, anchors, end, spec, obstacles)?;
        if spec.target_length.is_none() || spec.has_meander_segments() || assembled.status.is_failed() {
            return Ok(assembled);
        }
        let Some(base) = assembled.polyline.as_ref() else {
            return Ok(assembled);
        };
        let obstacles: &dyn ObstacleQuery = if spec.avoid_collision {
            obstacles
        } else {
            &NoObstacles
        };
        Ok(self.connect_meandered(base, spec, obstacles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoutingError;
    use crate::obstacles::ObstacleSet;
    use crate::result::RouteStatus;
    use qroute_common::geom::point::Point;
    use qroute_common::geom::polygon::Polygon;
    use qroute_common::geom::polyline::{del_colinear_points, raw_length};

    fn p(x: f64, y: f64) -> Point<f64> {
        Point::new(x, y)
    }

    fn pin(x: f64, y: f64, dx: f64, dy: f64) -> OrientedPoint {
        OrientedPoint::new(p(x, y), p(dx, dy))
    }

    fn block() -> (ObstacleSet, Polygon) {
        let region = Polygon::rect(p(2.0, -1.0), p(3.0, 1.0));
        let mut set = ObstacleSet::new();
        set.add_region(region.clone());
        (set, region)
    }

    #[test]
    fn facing_pins_are_joined_straight() {
        let mut router = Router::default();
        let result = router
            .route(&pin(0.0, 0.0, 1.0, 0.0), &[], &pin(5.0, 0.0, -1.0, 0.0), &RouteSpec::default(), &NoObstacles)
            .unwrap();
        assert_eq!(result.status, RouteStatus::Routed);
        assert_eq!(result.polyline.unwrap().points(), &[p(0.0, 0.0), p(5.0, 0.0)]);
        assert!((result.length - 5.0).abs() < 1e-12);
    }

    #[test]
    fn corner_pins_get_one_elbow() {
        let mut router = Router::default();
        let result = router
            .route(&pin(0.0, 0.0, 1.0, 0.0), &[], &pin(5.0, 5.0, 0.0, -1.0), &RouteSpec::default(), &NoObstacles)
            .unwrap();
        assert_eq!(
            result.polyline.unwrap().points(),
            &[p(0.0, 0.0), p(5.0, 0.0), p(5.0, 5.0)]
        );
        assert!((result.length - 10.0).abs() < 1e-12);
    }

    #[test]
    fn blocked_route_detours_without_entering_obstacle() {
        let (set, region) = block();
        let mut router = Router::default();
        let result = router
            .route(&pin(0.0, 0.0, 1.0, 0.0), &[], &pin(5.0, 0.0, -1.0, 0.0), &RouteSpec::default(), &set)
            .unwrap();
        assert_eq!(result.status, RouteStatus::Routed);
        let line = result.polyline.unwrap();
        assert!((result.length - 7.0).abs() < 1e-9);
        for q in line.points() {
            assert!(!region.contains_strict(*q), "{q} is inside the block");
        }
        for w in line.points().windows(2) {
            assert!(!region.segment_enters_interior(w[0], w[1]));
        }
        assert_eq!(del_colinear_points(line.points()), line.points());
    }

    #[test]
    fn short_route_is_meandered_to_target() {
        let mut spec = RouteSpec {
            target_length: Some(10.0),
            ..RouteSpec::default()
        };
        spec.meander.spacing = 1.0;
        let mut router = Router::default();
        let result = router
            .route(&pin(0.0, 0.0, 1.0, 0.0), &[], &pin(3.0, 0.0, -1.0, 0.0), &spec, &NoObstacles)
            .unwrap();
        assert_eq!(result.status, RouteStatus::LengthMatched);
        assert!((result.length - 10.0).abs() < 0.01);
        let line = result.polyline.unwrap();
        assert_eq!(line.start(), p(0.0, 0.0));
        assert_eq!(line.end(), p(3.0, 0.0));
        assert!(!line.self_intersects());
    }

    #[test]
    fn duplicate_anchors_are_rejected() {
        let anchors = [Anchor::new(p(2.0, 2.0)), Anchor::new(p(2.0, 2.0))];
        let mut router = Router::default();
        let err = router
            .route(&pin(0.0, 0.0, 1.0, 0.0), &anchors, &pin(5.0, 0.0, -1.0, 0.0), &RouteSpec::default(), &NoObstacles)
            .unwrap_err();
        assert!(matches!(err, InvalidAnchorOrderError::CoincidentWaypoints { first: 1, second: 2, .. }));
    }

    #[test]
    fn failed_assembly_is_not_meandered() {
        let (set, _) = block();
        let spec = RouteSpec {
            target_length: Some(12.0),
            allow_pathfinder: false,
            ..RouteSpec::default()
        };
        let mut router = Router::default();
        let result = router
            .route(&pin(0.0, 0.0, 1.0, 0.0), &[], &pin(5.0, 0.0, -1.0, 0.0), &spec, &set)
            .unwrap();
        assert!(matches!(result.status, RouteStatus::Failed(RoutingError::NoPathFound { .. })));
    }

    #[test]
    fn router_reuses_buffers_across_routes() {
        let (set, _) = block();
        let mut router = Router::new(SearchSettings {
            search_margin: 20,
            max_expansions: 50_000,
        });
        let first = router
            .route(&pin(0.0, 0.0, 1.0, 0.0), &[], &pin(5.0, 0.0, -1.0, 0.0), &RouteSpec::default(), &set)
            .unwrap();
        let second = router
            .route(&pin(0.0, 0.0, 1.0, 0.0), &[], &pin(5.0, 0.0, -1.0, 0.0), &RouteSpec::default(), &set)
            .unwrap();
        assert_eq!(first, second);
        assert!((raw_length(first.polyline.unwrap().points()) - 7.0).abs() < 1e-9);
    }
}
