use crate::error::{MeanderToleranceWarning, RoutingError};
use crate::length::{corner_excess, total_length};
use crate::obstacles::ObstacleQuery;
use crate::result::{RouteResult, RouteStatus};
use crate::spec::{MeanderSide, RouteSpec};
use qroute_common::geom::point::Point;
use qroute_common::geom::polyline::{Polyline, del_colinear_points};
use std::f64::consts::FRAC_PI_2;

/// Smallest clearance between a tooth and the base line.
const MIN_TOOTH: f64 = 1e-6;

/// Straight stretch of a route that may hold a serpentine. `offset` is
/// measured from the first point of the base segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Run {
    pub segment: usize,
    pub offset: f64,
    pub width: f64,
    pub origin: Point<f64>,
    pub forward: Point<f64>,
}

/// Rectangular serpentine laid over one run.
///
/// In local coordinates (x along the run, y toward `normal`) the teeth sit
/// at `x0 + t * pitch` with levels `asymmetry ± amplitude`, the first tooth
/// going toward `normal`.
#[derive(Debug, Clone, PartialEq)]
pub struct Meander {
    run: Run,
    normal: Point<f64>,
    pitch: f64,
    count: usize,
    amplitude: f64,
    asymmetry: f64,
    radius: f64,
}

impl Meander {
    /// Picks the largest tooth count whose amplitude still fits the fillet,
    /// and the amplitude that adds `excess` to the rounded length. Returns
    /// `None` when the run cannot hold a single tooth. When even one tooth
    /// would overshoot, the smallest legal one is used and the caller decides
    /// whether the overshoot is acceptable.
    pub fn solve(
        run: Run,
        normal: Point<f64>,
        excess: f64,
        spacing: f64,
        radius: f64,
        asymmetry: f64,
    ) -> Option<Self> {
        let pitch = spacing.max(2.0 * radius);
        let margin = (2.0 * radius).max(pitch / 2.0);
        let usable = run.width - 2.0 * margin;
        if usable < pitch - 1e-12 {
            return None;
        }
        let max_count = ((usable / pitch) + 1e-9).floor() as usize;
        let mut meander = Self {
            run,
            normal,
            pitch,
            count: 1,
            amplitude: 0.0,
            asymmetry,
            radius,
        };
        for count in (1..=max_count).rev() {
            meander.count = count;
            meander.amplitude = meander.amplitude_for(excess);
            if meander.amplitude >= meander.min_amplitude() {
                return Some(meander);
            }
        }
        meander.count = 1;
        meander.amplitude = meander.min_amplitude();
        Some(meander)
    }

    /// +1 when the last tooth goes toward `normal`.
    fn last_sign(&self) -> f64 {
        if self.count % 2 == 1 { 1.0 } else { -1.0 }
    }

    fn amplitude_for(&self, excess: f64) -> f64 {
        let n = self.count as f64;
        let c = corner_excess(FRAC_PI_2, self.radius);
        (excess + (2.0 * n + 2.0) * c - (1.0 + self.last_sign()) * self.asymmetry) / (2.0 * n)
    }

    /// Every leg must hold two fillets and the teeth may not swap sides.
    pub fn min_amplitude(&self) -> f64 {
        let r = self.radius;
        let d = self.asymmetry;
        r.max(2.0 * r - d)
            .max(2.0 * r - self.last_sign() * d)
            .max(d.abs() + MIN_TOOTH)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    /// Rounded length the serpentine adds over the straight run it replaces.
    pub fn extra_length(&self) -> f64 {
        let n = self.count as f64;
        let c = corner_excess(FRAC_PI_2, self.radius);
        2.0 * n * self.amplitude + (1.0 + self.last_sign()) * self.asymmetry - (2.0 * n + 2.0) * c
    }

    /// Shifts the teeth sideways to add `delta` of length. The amplitude
    /// never drops below its minimum; returns the change actually applied.
    pub fn adjust_length(&mut self, delta: f64) -> f64 {
        let n = self.count as f64;
        let before = self.amplitude;
        self.amplitude = (before + delta / (2.0 * n)).max(self.min_amplitude());
        (self.amplitude - before) * 2.0 * n
    }

    pub fn mirrored(&self) -> Self {
        Self {
            normal: -self.normal,
            ..self.clone()
        }
    }

    /// Serpentine vertices in design coordinates, run ends excluded.
    pub fn points(&self) -> Vec<Point<f64>> {
        let run = &self.run;
        let at = |x: f64, y: f64| run.origin + run.forward * x + self.normal * y;
        let x0 = (run.width - self.count as f64 * self.pitch) / 2.0;
        let mut pts = Vec::with_capacity(2 * self.count + 2);
        pts.push(at(x0, 0.0));
        for t in 0..self.count {
            let sign = if t % 2 == 0 { 1.0 } else { -1.0 };
            let y = self.asymmetry + sign * self.amplitude;
            pts.push(at(x0 + t as f64 * self.pitch, y));
            pts.push(at(x0 + (t + 1) as f64 * self.pitch, y));
        }
        pts.push(at(x0 + self.count as f64 * self.pitch, 0.0));
        pts
    }
}

/// Serpentines placed on a base route.
#[derive(Debug, Clone)]
pub struct MeanderPlan {
    base: Vec<Point<f64>>,
    meanders: Vec<Meander>,
}

impl MeanderPlan {
    pub fn new(base: &[Point<f64>]) -> Self {
        Self {
            base: base.to_vec(),
            meanders: Vec::new(),
        }
    }

    pub fn meanders(&self) -> &[Meander] {
        &self.meanders
    }

    fn push(&mut self, meander: Meander) {
        self.meanders.push(meander);
        self.meanders.sort_by(|a, b| {
            (a.run.segment, a.run.offset)
                .partial_cmp(&(b.run.segment, b.run.offset))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Base route with every serpentine spliced in, colinear points removed.
    pub fn render(&self) -> Vec<Point<f64>> {
        let mut out = Vec::with_capacity(self.base.len() + self.meanders.len() * 8);
        let mut next = self.meanders.iter().peekable();
        for (k, &p) in self.base.iter().enumerate() {
            out.push(p);
            while let Some(m) = next.next_if(|m| m.run.segment == k) {
                out.extend(m.points());
            }
        }
        del_colinear_points(&out)
    }

    /// Spreads `delta` evenly over the serpentines; returns the applied total.
    pub fn adjust_length(&mut self, delta: f64) -> f64 {
        if self.meanders.is_empty() {
            return 0.0;
        }
        let share = delta / self.meanders.len() as f64;
        self.meanders
            .iter_mut()
            .map(|m| m.adjust_length(share))
            .sum()
    }

    fn is_acceptable<O: ObstacleQuery + ?Sized>(&self, obstacles: &O) -> bool {
        let points = self.render();
        match Polyline::new(points) {
            Ok(line) => !line.self_intersects() && obstacles.polyline_is_clear(line.points()),
            Err(_) => false,
        }
    }

    /// Places serpentines adding `excess` inside the given arc-length ranges
    /// of the base route, one equal share per range.
    ///
    /// Within a range the share goes to the longest run first; if that is
    /// blocked it is spread over the two longest, and so on.
    pub fn place<O: ObstacleQuery + ?Sized>(
        base: &[Point<f64>],
        ranges: &[(f64, f64)],
        excess: f64,
        spec: &RouteSpec,
        obstacles: &O,
    ) -> Result<Self, RoutingError> {
        let mut plan = Self::new(base);
        if ranges.is_empty() {
            return Err(RoutingError::InsufficientLengthBudget { excess });
        }
        let share = excess / ranges.len() as f64;
        let radius = spec.fillet;
        let spacing = spec.meander.spacing;
        let asymmetry = spec.meander.asymmetry;

        for &(lo, hi) in ranges {
            let mut runs: Vec<Run> = find_runs(base, lo, hi)
                .into_iter()
                .filter(|r| Meander::solve(*r, r.forward.perp(), share, spacing, radius, asymmetry).is_some())
                .collect();
            if runs.is_empty() {
                return Err(RoutingError::InsufficientLengthBudget { excess });
            }
            runs.sort_by(|a, b| b.width.total_cmp(&a.width));

            let mut placed = false;
            'spread: for k in 1..=runs.len() {
                let chosen = &runs[..k];
                let total_width: f64 = chosen.iter().map(|r| r.width).sum();
                let mut candidate = Vec::with_capacity(k);
                for run in chosen {
                    let normal = match preferred_side(base, run, spec.meander.side) {
                        MeanderSide::Right => -run.forward.perp(),
                        _ => run.forward.perp(),
                    };
                    let part = share * run.width / total_width;
                    if let Some(m) = Meander::solve(*run, normal, part, spacing, radius, asymmetry) {
                        candidate.push(m);
                    }
                }
                let mut options = vec![candidate.clone()];
                if spec.meander.side == MeanderSide::Auto {
                    options.push(candidate.iter().map(Meander::mirrored).collect());
                }
                for option in options {
                    let mut trial = plan.clone();
                    for m in option {
                        trial.push(m);
                    }
                    if trial.is_acceptable(obstacles) {
                        plan = trial;
                        placed = true;
                        break 'spread;
                    }
                }
            }
            if !placed {
                return Err(RoutingError::MeanderObstructed);
            }
        }
        Ok(plan)
    }
}

/// Straight pieces of `base` between arc lengths `lo` and `hi`.
pub fn find_runs(base: &[Point<f64>], lo: f64, hi: f64) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut travelled = 0.0;
    for (k, w) in base.windows(2).enumerate() {
        let len = w[0].distance(w[1]);
        let (s0, s1) = (travelled, travelled + len);
        travelled = s1;
        let Some(forward) = (w[1] - w[0]).normalized() else {
            continue;
        };
        let start = s0.max(lo);
        let end = s1.min(hi);
        if end - start <= 0.0 {
            continue;
        }
        let offset = start - s0;
        runs.push(Run {
            segment: k,
            offset,
            width: end - start,
            origin: w[0] + forward * offset,
            forward,
        });
    }
    runs
}

/// Auto picks the side of the run holding fewer route vertices.
fn preferred_side(base: &[Point<f64>], run: &Run, side: MeanderSide) -> MeanderSide {
    if side != MeanderSide::Auto {
        return side;
    }
    let a = run.origin;
    let b = run.origin + run.forward;
    let left = base.iter().filter(|p| p.is_sideways(a, b)).count();
    let right = base
        .iter()
        .filter(|&&p| (p - a).cross(b - a) > 0.0)
        .count();
    if left <= right {
        MeanderSide::Left
    } else {
        MeanderSide::Right
    }
}

/// Lengthens `base` to the target with serpentines outside the protected
/// leads, refining the amplitudes until the rounded length is within
/// tolerance. Failures keep the base polyline in the result.
pub fn connect_meandered<O: ObstacleQuery + ?Sized>(
    base: &Polyline,
    spec: &RouteSpec,
    obstacles: &O,
) -> RouteResult {
    let raw = base.raw_length();
    let range = (spec.lead.start_length(), raw - spec.lead.end_length());
    match_length(base, &[range], spec, obstacles)
}

/// Length matching restricted to arc-length ranges of `base`.
pub fn match_length<O: ObstacleQuery + ?Sized>(
    base: &Polyline,
    ranges: &[(f64, f64)],
    spec: &RouteSpec,
    obstacles: &O,
) -> RouteResult {
    let r = spec.fillet;
    let base_length = total_length(base.points(), r);
    let Some(target) = spec.target_length else {
        return RouteResult::new(base.clone(), base_length, RouteStatus::NoAdjustmentNeeded);
    };
    let excess = target - base_length;
    if excess <= spec.length_tolerance {
        log::debug!(
            "Base length {:.6} already covers target {:.6}",
            base_length,
            target
        );
        return RouteResult::new(base.clone(), base_length, RouteStatus::NoAdjustmentNeeded);
    }

    let mut plan = match MeanderPlan::place(base.points(), ranges, excess, spec, obstacles) {
        Ok(plan) => plan,
        Err(e) => {
            log::debug!("Meander placement failed: {}", e);
            return RouteResult::new(base.clone(), base_length, RouteStatus::Failed(e));
        }
    };

    let mut best: Option<(Polyline, f64)> = None;
    let mut iterations = 0;
    while iterations < spec.meander.max_iterations.max(1) {
        iterations += 1;
        let Ok(line) = Polyline::new(plan.render()) else {
            break;
        };
        let achieved = total_length(line.points(), r);
        let diff = target - achieved;
        if diff.abs() <= spec.length_tolerance {
            return RouteResult::new(line, achieved, RouteStatus::LengthMatched);
        }
        if best
            .as_ref()
            .is_none_or(|(_, l)| (target - l).abs() > diff.abs())
        {
            best = Some((line, achieved));
        }
        let applied = plan.adjust_length(diff);
        if applied.abs() < 1e-12 {
            break;
        }
        if !plan.is_acceptable(obstacles) {
            plan.adjust_length(-applied);
            break;
        }
    }

    let Some((line, achieved)) = best else {
        return RouteResult::new(
            base.clone(),
            base_length,
            RouteStatus::Failed(RoutingError::MeanderObstructed),
        );
    };
    // no better than leaving the base alone, e.g. the smallest legal
    // serpentine adds far more than the missing length
    if (target - achieved).abs() >= excess {
        log::debug!(
            "Smallest meander reaches {:.6} for target {:.6}, keeping base",
            achieved,
            target
        );
        return RouteResult::new(
            base.clone(),
            base_length,
            RouteStatus::Failed(RoutingError::InsufficientLengthBudget { excess }),
        );
    }
    let warning = MeanderToleranceWarning {
        target,
        achieved,
        iterations,
    };
    log::warn!("{}", warning);
    RouteResult::new(line, achieved, RouteStatus::ToleranceWarning(warning))
}
