use qroute_common::db::core::ChipDesign;
use qroute_common::geom::point::Point;
use qroute_common::geom::polygon::Polygon;
use qroute_common::geom::rect::Rect;
use qroute_common::geom::rtree::SpatialIndex;
use qroute_common::geom::segment::Segment;

/// Read access to whatever a candidate trace must not run into.
pub trait ObstacleQuery {
    fn segment_is_clear(&self, a: Point<f64>, b: Point<f64>) -> bool;

    fn point_is_clear(&self, p: Point<f64>) -> bool;

    fn polyline_is_clear(&self, points: &[Point<f64>]) -> bool {
        points.iter().all(|&p| self.point_is_clear(p))
            && points.windows(2).all(|w| self.segment_is_clear(w[0], w[1]))
    }
}

/// Everything is clear; used when collision avoidance is switched off.
pub struct NoObstacles;

impl ObstacleQuery for NoObstacles {
    fn segment_is_clear(&self, _a: Point<f64>, _b: Point<f64>) -> bool {
        true
    }

    fn point_is_clear(&self, _p: Point<f64>) -> bool {
        true
    }
}

/// Snapshot of component regions and traces of other routes.
#[derive(Default)]
pub struct ObstacleSet {
    regions: Vec<Polygon>,
    region_index: SpatialIndex,
    traces: TraceSet,
}

impl ObstacleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Component outlines of the design plus every trace already routed.
    pub fn from_design(db: &ChipDesign) -> Self {
        let regions: Vec<Polygon> = db.components.iter().map(|c| c.outline.clone()).collect();
        let region_index = SpatialIndex::bulk(
            regions
                .iter()
                .enumerate()
                .map(|(i, r)| (r.envelope(), i)),
        );
        let mut set = Self {
            regions,
            region_index,
            traces: TraceSet::default(),
        };
        for trace in db.routed.iter().flatten().filter(|t| !t.failed) {
            set.add_trace(&trace.points);
        }
        log::debug!(
            "Obstacle snapshot: {} regions, {} trace segments",
            set.num_regions(),
            set.num_trace_segments()
        );
        set
    }

    pub fn add_region(&mut self, region: Polygon) {
        self.region_index.insert(region.envelope(), self.regions.len());
        self.regions.push(region);
    }

    pub fn add_trace(&mut self, points: &[Point<f64>]) {
        self.traces.add(points);
    }

    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn num_trace_segments(&self) -> usize {
        self.traces.segments.len()
    }

    fn regions_near(&self, rect: Rect) -> impl Iterator<Item = &Polygon> + '_ {
        self.region_index
            .query(rect)
            .into_iter()
            .map(|i| &self.regions[i])
    }
}

impl ObstacleQuery for ObstacleSet {
    fn segment_is_clear(&self, a: Point<f64>, b: Point<f64>) -> bool {
        if a.approx_eq(b) {
            return self.point_is_clear(a);
        }
        let env = Rect::from_corners(a, b);
        self.regions_near(env)
            .all(|r| !r.segment_enters_interior(a, b))
            && self.traces.segment_is_clear(a, b)
    }

    fn point_is_clear(&self, p: Point<f64>) -> bool {
        self.regions_near(Rect::new(p, p))
            .all(|r| !r.contains_strict(p))
    }
}

/// Accepted segments of one or more traces. A new segment may only meet them
/// at an endpoint shared by both.
#[derive(Default)]
struct TraceSet {
    segments: Vec<Segment>,
    index: SpatialIndex,
}

impl TraceSet {
    fn add(&mut self, points: &[Point<f64>]) {
        for w in points.windows(2) {
            if w[0].approx_eq(w[1]) {
                continue;
            }
            let seg = Segment::new(w[0], w[1]);
            self.index.insert(seg.envelope(), self.segments.len());
            self.segments.push(seg);
        }
    }

    fn segment_is_clear(&self, a: Point<f64>, b: Point<f64>) -> bool {
        let candidate = Segment::new(a, b);
        self.index
            .query(candidate.envelope())
            .into_iter()
            .all(|i| !candidate.conflicts_with(&self.segments[i]))
    }
}

/// Per-route view: a shared snapshot plus the route's own accepted traces,
/// which only grow while the route is assembled.
pub struct RouteObstacles<'a> {
    base: &'a dyn ObstacleQuery,
    own: TraceSet,
}

impl<'a> RouteObstacles<'a> {
    pub fn new(base: &'a dyn ObstacleQuery) -> Self {
        Self {
            base,
            own: TraceSet::default(),
        }
    }

    pub fn add_own(&mut self, points: &[Point<f64>]) {
        self.own.add(points);
    }

    pub fn num_own_segments(&self) -> usize {
        self.own.segments.len()
    }
}

impl ObstacleQuery for RouteObstacles<'_> {
    fn segment_is_clear(&self, a: Point<f64>, b: Point<f64>) -> bool {
        self.base.segment_is_clear(a, b) && self.own.segment_is_clear(a, b)
    }

    fn point_is_clear(&self, p: Point<f64>) -> bool {
        self.base.point_is_clear(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point<f64> {
        Point::new(x, y)
    }

    fn blocked_square() -> ObstacleSet {
        let mut set = ObstacleSet::new();
        set.add_region(Polygon::rect(p(2.0, -1.0), p(3.0, 1.0)));
        set
    }

    #[test]
    fn regions_block_interior_but_not_boundary() {
        let set = blocked_square();
        assert!(!set.segment_is_clear(p(0.0, 0.0), p(5.0, 0.0)));
        assert!(set.segment_is_clear(p(0.0, 1.0), p(5.0, 1.0)));
        assert!(set.segment_is_clear(p(0.0, 2.0), p(5.0, 2.0)));
        assert!(!set.point_is_clear(p(2.5, 0.0)));
        assert!(set.point_is_clear(p(2.0, 0.0)));
    }

    #[test]
    fn foreign_traces_block_crossings() {
        let mut set = ObstacleSet::new();
        set.add_trace(&[p(1.0, -1.0), p(1.0, 1.0)]);
        assert!(!set.segment_is_clear(p(0.0, 0.0), p(2.0, 0.0)));
        // T-contact on the trace interior
        assert!(!set.segment_is_clear(p(0.0, 0.0), p(1.0, 0.0)));
        assert!(set.segment_is_clear(p(0.0, 2.0), p(2.0, 2.0)));
        assert_eq!(set.num_trace_segments(), 1);
    }

    #[test]
    fn own_traces_allow_shared_endpoints_only() {
        let base = NoObstacles;
        let mut view = RouteObstacles::new(&base);
        view.add_own(&[p(0.0, 0.0), p(1.0, 0.0)]);
        assert!(view.segment_is_clear(p(1.0, 0.0), p(1.0, 1.0)));
        assert!(view.segment_is_clear(p(1.0, 0.0), p(2.0, 0.0)));
        // doubling back over the accepted segment
        assert!(!view.segment_is_clear(p(1.0, 0.0), p(0.5, 0.0)));
        assert!(!view.segment_is_clear(p(0.5, -1.0), p(0.5, 1.0)));
        // zero-length pieces are not recorded
        view.add_own(&[p(1.0, 0.0), p(1.0, 0.0), p(1.0, 2.0)]);
        assert_eq!(view.num_own_segments(), 2);
    }

    #[test]
    fn snapshot_holds_components_and_live_traces() {
        let mut db = ChipDesign::new("mm");
        db.add_component("A".to_string(), Polygon::rect(p(0.0, 0.0), p(1.0, 1.0)));
        db.add_component("B".to_string(), Polygon::rect(p(3.0, 0.0), p(4.0, 1.0)));
        let set = ObstacleSet::from_design(&db);
        assert_eq!(set.num_regions(), 2);
        assert_eq!(set.num_trace_segments(), 0);
        assert!(!set.point_is_clear(p(3.5, 0.5)));
    }

    #[test]
    fn no_obstacles_is_always_clear() {
        assert!(NoObstacles.polyline_is_clear(&[p(0.0, 0.0), p(9.0, 9.0)]));
    }
}
