use crate::obstacles::ObstacleQuery;
use crate::simple::connect_simple;
use crate::utils::conversion::LatticeConverter;
use qroute_common::geom::coord::LatticeCoord;
use qroute_common::geom::oriented::OrientedPoint;
use qroute_common::geom::point::Point;
use qroute_common::geom::polyline::Polyline;
use qroute_common::geom::segment::Segment;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Integer score units per lattice step.
const SCALE: i64 = 1000;
/// Distance at which a lattice node counts as the end itself.
const LANDING_TOLERANCE: f64 = 1e-8;
/// Refuse windows whose state count would not fit the scratch buffers sensibly.
const MAX_WINDOW_STATES: usize = 50_000_000;

/// Heading planes: +x, +y, -x, -y, and the start node before its first move.
const HEADINGS: [(i32, i32); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];
const SEED_PLANE: u32 = 4;
const PLANES: u32 = 5;

#[derive(Copy, Clone, Eq, PartialEq)]
struct State {
    f_score: i64,
    turns: u32,
    g_score: i64,
    index: u32,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.turns.cmp(&self.turns))
            .then_with(|| self.g_score.cmp(&other.g_score))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lattice box searched for one connection, one plane per heading.
#[derive(Clone, Copy)]
struct SearchWindow {
    min_i: i32,
    max_i: i32,
    min_j: i32,
    max_j: i32,
    width: u32,
    height: u32,
}

impl SearchWindow {
    fn new(a: LatticeCoord, b: LatticeCoord, margin: u32) -> Self {
        let margin = margin.min(i32::MAX as u32 / 4) as i32;
        let min_i = a.i.min(b.i).saturating_sub(margin);
        let max_i = a.i.max(b.i).saturating_add(margin);
        let min_j = a.j.min(b.j).saturating_sub(margin);
        let max_j = a.j.max(b.j).saturating_add(margin);
        Self {
            min_i,
            max_i,
            min_j,
            max_j,
            width: (max_i as i64 - min_i as i64 + 1) as u32,
            height: (max_j as i64 - min_j as i64 + 1) as u32,
        }
    }

    fn num_states(&self) -> usize {
        self.width as usize * self.height as usize * PLANES as usize
    }

    #[inline(always)]
    fn contains(&self, c: LatticeCoord) -> bool {
        c.i >= self.min_i && c.i <= self.max_i && c.j >= self.min_j && c.j <= self.max_j
    }

    #[inline(always)]
    fn get_local_idx(&self, c: LatticeCoord, plane: u32) -> usize {
        let lx = (c.i - self.min_i) as usize;
        let ly = (c.j - self.min_j) as usize;
        let w = self.width as usize;
        plane as usize * w * self.height as usize + ly * w + lx
    }

    #[inline(always)]
    fn get_coord(&self, idx: u32) -> (LatticeCoord, u32) {
        let plane_size = self.width * self.height;
        let plane = idx / plane_size;
        let rem = idx % plane_size;
        let j = (rem / self.width) as i32 + self.min_j;
        let i = (rem % self.width) as i32 + self.min_i;
        (LatticeCoord::new(i, j), plane)
    }
}

/// A* over an implicit lattice seeded at the start point. Owns its scratch
/// buffers so repeated searches on one thread do not reallocate.
#[derive(Clone)]
pub struct Pathfinder {
    parents: Vec<u32>,
    g_score: Vec<i64>,
    turns: Vec<u32>,
    visited_tag: Vec<u32>,
    closed_tag: Vec<u32>,
    current_tag: u32,
    capacity: usize,
}

impl Default for Pathfinder {
    fn default() -> Self {
        Self::new()
    }
}

impl Pathfinder {
    pub fn new() -> Self {
        let cap = 100_000;
        Self {
            parents: vec![u32::MAX; cap],
            g_score: vec![i64::MAX; cap],
            turns: vec![0; cap],
            visited_tag: vec![0; cap],
            closed_tag: vec![0; cap],
            current_tag: 1,
            capacity: cap,
        }
    }

    fn ensure_capacity(&mut self, size: usize) {
        if size > self.capacity {
            self.capacity = size.max(self.capacity * 2);
            self.parents.resize(self.capacity, u32::MAX);
            self.g_score.resize(self.capacity, i64::MAX);
            self.turns.resize(self.capacity, 0);
            self.visited_tag.resize(self.capacity, 0);
            self.closed_tag.resize(self.capacity, 0);
        }
    }

    fn reset_window(&mut self) {
        self.current_tag = self.current_tag.wrapping_add(1);
        if self.current_tag == 0 {
            self.visited_tag.fill(0);
            self.closed_tag.fill(0);
            self.current_tag = 1;
        }
    }

    /// Searches a rectilinear path from `start` to `end`.
    ///
    /// Every popped node first tries a closed-form connection to the end; the
    /// search stops at the first one that does not touch the partial path.
    /// Returns a colinear-reduced polyline, or `None` when the window, the
    /// expansion cap or the open set runs out.
    pub fn find_path<O: ObstacleQuery + ?Sized>(
        &mut self,
        start: &OrientedPoint,
        end: &OrientedPoint,
        step: f64,
        margin: u32,
        max_expansions: u32,
        obstacles: &O,
    ) -> Option<Polyline> {
        if step.is_nan() || step <= 0.0 || start.position.approx_eq(end.position) {
            return None;
        }
        let conv = LatticeConverter::new(start.position, step);
        let origin = LatticeCoord::new(0, 0);
        let end_cell = conv.to_lattice(end.position);
        let window = SearchWindow::new(origin, end_cell, margin);
        let states = window.num_states();
        if states > MAX_WINDOW_STATES || states > u32::MAX as usize {
            log::debug!(
                "Search window of {} states for {} -> {} is too large",
                states,
                start.position,
                end.position
            );
            return None;
        }
        self.ensure_capacity(states);
        self.reset_window();

        let seed = window.get_local_idx(origin, SEED_PLANE);
        self.g_score[seed] = 0;
        self.turns[seed] = 0;
        self.parents[seed] = u32::MAX;
        self.visited_tag[seed] = self.current_tag;

        let heuristic = |p: Point<f64>| ((p.manhattan(end.position) / step) * SCALE as f64).round() as i64;
        let mut heap = BinaryHeap::new();
        heap.push(State {
            f_score: heuristic(start.position),
            turns: 0,
            g_score: 0,
            index: seed as u32,
        });

        let mut expansions = 0u32;
        while let Some(State { index, g_score, .. }) = heap.pop() {
            let curr_local = index as usize;
            if self.closed_tag[curr_local] == self.current_tag || g_score > self.g_score[curr_local] {
                continue;
            }
            self.closed_tag[curr_local] = self.current_tag;

            expansions += 1;
            if expansions > max_expansions {
                log::debug!(
                    "Expansion cap {} hit for {} -> {}",
                    max_expansions,
                    start.position,
                    end.position
                );
                return None;
            }

            let (cell, plane) = window.get_coord(index);
            let position = conv.to_world(cell);
            let heading = heading_vector(plane);

            if curr_local != seed && position.distance(end.position) < LANDING_TOLERANCE {
                let arrives_ok = match (heading, end.direction) {
                    (Some(h), Some(ed)) => h.dot(ed) <= 0.0,
                    _ => true,
                };
                if arrives_ok {
                    let mut path = self.reconstruct_path(curr_local, &window, &conv);
                    if let Some(last) = path.last_mut() {
                        *last = end.position;
                    }
                    return Polyline::reduced(&path).ok();
                }
                continue;
            }

            let node = OrientedPoint {
                position,
                direction: heading.or(start.direction),
            };
            if let Some(splice) = connect_simple(&node, end, obstacles) {
                let mut path = self.reconstruct_path(curr_local, &window, &conv);
                if !splice_touches_path(&path, splice.points()) {
                    path.extend_from_slice(&splice.points()[1..]);
                    return Polyline::reduced(&path).ok();
                }
            }

            let current_g = self.g_score[curr_local];
            let current_turns = self.turns[curr_local];
            for (k, &(di, dj)) in HEADINGS.iter().enumerate() {
                let k = k as u32;
                let step_dir = Point::new(di as f64, dj as f64);
                let allowed = if plane == SEED_PLANE {
                    start.direction.is_none_or(|sd| sd.dot(step_dir) >= 0.0)
                } else {
                    k != (plane + 2) % 4
                };
                if !allowed {
                    continue;
                }
                let neighbor = cell.offset(di, dj);
                if !window.contains(neighbor) {
                    continue;
                }
                let neighbor_local = window.get_local_idx(neighbor, k);
                if self.closed_tag[neighbor_local] == self.current_tag {
                    continue;
                }
                let next = conv.to_world(neighbor);
                if !obstacles.segment_is_clear(position, next) {
                    continue;
                }
                if self.path_visits(curr_local, neighbor, &window) {
                    continue;
                }

                let tentative_g = current_g + SCALE;
                let tentative_turns =
                    current_turns + u32::from(plane != SEED_PLANE && plane != k);
                let better = self.visited_tag[neighbor_local] != self.current_tag
                    || tentative_g < self.g_score[neighbor_local]
                    || (tentative_g == self.g_score[neighbor_local]
                        && tentative_turns < self.turns[neighbor_local]);
                if better {
                    self.parents[neighbor_local] = curr_local as u32;
                    self.g_score[neighbor_local] = tentative_g;
                    self.turns[neighbor_local] = tentative_turns;
                    self.visited_tag[neighbor_local] = self.current_tag;
                    heap.push(State {
                        f_score: tentative_g + heuristic(next),
                        turns: tentative_turns,
                        g_score: tentative_g,
                        index: neighbor_local as u32,
                    });
                }
            }
        }
        log::debug!(
            "Open set exhausted after {} expansions for {} -> {}",
            expansions,
            start.position,
            end.position
        );
        None
    }

    /// Whether the chain ending at `from` already passes through `cell`.
    fn path_visits(&self, from: usize, cell: LatticeCoord, window: &SearchWindow) -> bool {
        let mut curr = from;
        loop {
            if window.get_coord(curr as u32).0 == cell {
                return true;
            }
            let parent = self.parents[curr];
            if parent == u32::MAX {
                return false;
            }
            curr = parent as usize;
        }
    }

    fn reconstruct_path(
        &self,
        from: usize,
        window: &SearchWindow,
        conv: &LatticeConverter,
    ) -> Vec<Point<f64>> {
        let mut path = Vec::new();
        let mut curr_local = from;
        loop {
            path.push(conv.to_world(window.get_coord(curr_local as u32).0));
            let parent = self.parents[curr_local];
            if parent == u32::MAX {
                break;
            }
            curr_local = parent as usize;
        }
        path.reverse();
        path
    }
}

fn heading_vector(plane: u32) -> Option<Point<f64>> {
    HEADINGS
        .get(plane as usize)
        .map(|&(di, dj)| Point::new(di as f64, dj as f64))
}

/// The splice starts at the last path point; any other contact with the path
/// would make the route cross itself.
fn splice_touches_path(path: &[Point<f64>], splice: &[Point<f64>]) -> bool {
    path.windows(2).any(|p| {
        let ps = Segment::new(p[0], p[1]);
        splice
            .windows(2)
            .any(|s| Segment::new(s[0], s[1]).conflicts_with(&ps))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obstacles::{NoObstacles, ObstacleSet};
    use qroute_common::geom::polygon::Polygon;
    use qroute_common::geom::polyline::raw_length;

    fn op(x: f64, y: f64, dx: f64, dy: f64) -> OrientedPoint {
        OrientedPoint::new(Point::new(x, y), Point::new(dx, dy))
    }

    fn blocked() -> ObstacleSet {
        let mut set = ObstacleSet::new();
        set.add_region(Polygon::rect(Point::new(2.0, -1.0), Point::new(3.0, 1.0)));
        set
    }

    #[test]
    fn detours_around_obstacle() {
        let set = blocked();
        let mut pf = Pathfinder::new();
        let path = pf
            .find_path(&op(0.0, 0.0, 1.0, 0.0), &op(5.0, 0.0, -1.0, 0.0), 0.25, 40, 200_000, &set)
            .unwrap();
        assert_eq!(path.start(), Point::new(0.0, 0.0));
        assert_eq!(path.end(), Point::new(5.0, 0.0));
        assert!((raw_length(path.points()) - 7.0).abs() < 1e-9);
        assert!(set.polyline_is_clear(path.points()));
        assert!(path.is_colinear_reduced());
        assert!(!path.self_intersects());
    }

    #[test]
    fn unobstructed_search_returns_simple_connection() {
        let mut pf = Pathfinder::new();
        let path = pf
            .find_path(&op(0.0, 0.0, 1.0, 0.0), &op(5.0, 0.0, -1.0, 0.0), 0.25, 40, 1000, &NoObstacles)
            .unwrap();
        assert_eq!(path.points(), &[Point::new(0.0, 0.0), Point::new(5.0, 0.0)]);
    }

    #[test]
    fn exits_along_start_direction() {
        // end lies behind the start: the route has to turn around
        let mut pf = Pathfinder::new();
        let path = pf
            .find_path(&op(0.0, 0.0, 1.0, 0.0), &op(-3.0, 0.0, 1.0, 0.0), 0.25, 40, 200_000, &NoObstacles)
            .unwrap();
        let first = path.points()[1] - path.points()[0];
        assert!(first.dot(Point::UNIT_X) >= 0.0);
        assert_eq!(path.end(), Point::new(-3.0, 0.0));
        assert!(!path.self_intersects());
    }

    #[test]
    fn enclosed_end_is_unreachable() {
        let mut set = ObstacleSet::new();
        set.add_region(Polygon::rect(Point::new(3.0, -2.5), Point::new(3.5, 2.5)));
        set.add_region(Polygon::rect(Point::new(6.5, -2.5), Point::new(7.0, 2.5)));
        set.add_region(Polygon::rect(Point::new(3.0, 2.0), Point::new(7.0, 2.5)));
        set.add_region(Polygon::rect(Point::new(3.0, -2.5), Point::new(7.0, -2.0)));
        let mut pf = Pathfinder::new();
        assert!(
            pf.find_path(&op(0.0, 0.0, 1.0, 0.0), &op(5.0, 0.0, -1.0, 0.0), 0.25, 8, 200_000, &set)
                .is_none()
        );
    }

    #[test]
    fn expansion_cap_is_respected() {
        let set = blocked();
        let mut pf = Pathfinder::new();
        assert!(
            pf.find_path(&op(0.0, 0.0, 1.0, 0.0), &op(5.0, 0.0, -1.0, 0.0), 0.25, 40, 3, &set)
                .is_none()
        );
    }

    #[test]
    fn scratch_buffers_are_reused() {
        let set = blocked();
        let mut pf = Pathfinder::new();
        let a = pf.find_path(&op(0.0, 0.0, 1.0, 0.0), &op(5.0, 0.0, -1.0, 0.0), 0.25, 40, 200_000, &set);
        let b = pf.find_path(&op(0.0, 0.0, 1.0, 0.0), &op(5.0, 0.0, -1.0, 0.0), 0.25, 40, 200_000, &set);
        assert_eq!(a, b);
    }
}
