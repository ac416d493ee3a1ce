use crate::obstacles::{ObstacleQuery, ObstacleSet};
use crate::result::{RouteResult, RouteStatus};
use crate::router::Router;
use crate::spec::RouteSpec;
use qroute_common::db::core::{ChipDesign, RoutedTrace};
use qroute_common::db::indices::{ComponentId, RouteId};
use qroute_common::geom::rect::Rect;
use qroute_common::util::config::Config;
use qroute_common::util::profiler::ScopedTimer;
use rayon::prelude::*;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutingSummary {
    pub routed: usize,
    pub warnings: usize,
    pub failed: usize,
}

/// Outcome of one route before it is written back to the design.
enum Outcome {
    Done(RouteResult),
    Invalid(String),
}

struct Job {
    route: RouteId,
    spec: RouteSpec,
    bbox: Rect,
}

/// Routes every request of the design.
///
/// Requests whose boxes do not overlap are routed in parallel against the
/// current snapshot, one `Router` per worker. Results are committed serially;
/// a result that runs into a trace committed earlier in the same batch is
/// routed again on its own. In sequential mode every batch holds one route.
pub fn run(db: &mut ChipDesign, config: &Config) -> Result<RoutingSummary, String> {
    let _timer = ScopedTimer::new("Routing");
    log::info!("Starting Routing ({} routes)...", db.num_routes());

    let mut summary = RoutingSummary::default();
    let mut jobs = Vec::with_capacity(db.num_routes());
    let mut invalid = Vec::new();
    for (i, route) in db.routes.iter().enumerate() {
        match RouteSpec::resolve(route.kind, &route.options, &db.units, config) {
            Ok(mut spec) => {
                let start = db.pin(route.start).point.position;
                let end = db.pin(route.end).point.position;
                let mut bbox = Rect::from_corners(start, end);
                for a in &route.anchors {
                    bbox = bbox.including(a.position);
                }
                if let Some(frame) = spec.frame.as_mut() {
                    let envelope = |c: ComponentId| db.components[c.index()].outline.envelope();
                    let bounds = [
                        envelope(db.pin(route.start).component),
                        envelope(db.pin(route.end).component),
                    ];
                    bbox = bbox.union(&bounds[0].union(&bounds[1]).expanded(frame.keepout));
                    frame.bounds = Some(bounds);
                }
                let slack = spec
                    .target_length
                    .map(|t| (t - start.manhattan(end)).max(0.0) / 2.0)
                    .unwrap_or(0.0);
                let reach = spec.lead.start_length().max(spec.lead.end_length());
                let bbox = bbox.expanded(slack + reach + spec.step_size * 2.0);
                jobs.push(Job {
                    route: RouteId::new(i),
                    spec,
                    bbox,
                });
            }
            Err(e) => {
                log::error!("Route '{}': {}", route.name, e);
                invalid.push((RouteId::new(i), format!("invalid options: {}", e)));
            }
        }
    }
    summary.failed += invalid.len();
    for (id, msg) in invalid {
        db.set_routed(id, invalid_trace(msg));
    }

    // short routes first, they have the least room to detour
    jobs.sort_by(|a, b| {
        let span = |j: &Job| j.bbox.width() + j.bbox.height();
        span(a).total_cmp(&span(b))
    });

    let mut snapshot = ObstacleSet::from_design(db);
    let total = jobs.len();
    let progress = AtomicUsize::new(0);
    let mut pending: Vec<Job> = jobs;

    while !pending.is_empty() {
        let (batch, rest) = next_batch(pending, config.routing.sequential);
        pending = rest;

        let results: Vec<(usize, Outcome)> = {
            let db_ref: &ChipDesign = db;
            let snapshot_ref = &snapshot;
            batch
                .par_iter()
                .enumerate()
                .map_with(Router::from_config(config), |router, (k, job)| {
                    let outcome = route_one(router, db_ref, job, snapshot_ref);
                    let p = progress.fetch_add(1, Ordering::Relaxed) + 1;
                    if p.is_multiple_of(10) || p == total {
                        eprint!("\r\x1b[36m[Route] {}/{}\x1b[0m\x1b[K", p, total);
                        let _ = std::io::stderr().flush();
                    }
                    (k, outcome)
                })
                .collect()
        };

        let mut batch_traces = ObstacleSet::new();
        let mut retry = Vec::new();
        for (k, outcome) in results {
            let job = &batch[k];
            if let Outcome::Done(result) = &outcome {
                let conflicts = !result.status.is_failed()
                    && result
                        .polyline
                        .as_ref()
                        .is_some_and(|line| !batch_traces.polyline_is_clear(line.points()));
                if conflicts {
                    retry.push(k);
                    continue;
                }
                if let Some(line) = result.polyline.as_ref().filter(|_| !result.status.is_failed()) {
                    batch_traces.add_trace(line.points());
                }
            }
            commit(db, &mut snapshot, &mut summary, job, outcome);
        }

        if !retry.is_empty() {
            log::debug!("Re-routing {} conflicting routes of the batch", retry.len());
        }
        let mut router = Router::from_config(config);
        for k in retry {
            let job = &batch[k];
            let outcome = route_one(&mut router, db, job, &snapshot);
            commit(db, &mut snapshot, &mut summary, job, outcome);
        }
    }
    if total > 0 {
        eprint!("\r\x1b[K");
    }

    log::info!(
        "Routing finished: {} routed, {} with length warnings, {} failed",
        summary.routed,
        summary.warnings,
        summary.failed
    );
    Ok(summary)
}

/// Greedy batch of jobs with pairwise disjoint boxes, in order.
fn next_batch(pending: Vec<Job>, sequential: bool) -> (Vec<Job>, Vec<Job>) {
    let mut batch: Vec<Job> = Vec::new();
    let mut rest = Vec::new();
    for job in pending {
        let fits = if sequential {
            batch.is_empty()
        } else {
            batch.iter().all(|b| !b.bbox.overlaps(&job.bbox))
        };
        if fits {
            batch.push(job);
        } else {
            rest.push(job);
        }
    }
    (batch, rest)
}

fn route_one(router: &mut Router, db: &ChipDesign, job: &Job, snapshot: &ObstacleSet) -> Outcome {
    let route = &db.routes[job.route.index()];
    let start = db.pin(route.start).point;
    let end = db.pin(route.end).point;
    match router.route(&start, &route.anchors, &end, &job.spec, snapshot) {
        Ok(result) => Outcome::Done(result),
        Err(e) => Outcome::Invalid(e.to_string()),
    }
}

fn commit(
    db: &mut ChipDesign,
    snapshot: &mut ObstacleSet,
    summary: &mut RoutingSummary,
    job: &Job,
    outcome: Outcome,
) {
    let name = db.routes[job.route.index()].name.clone();
    let trace = match outcome {
        Outcome::Invalid(msg) => {
            log::error!("Route '{}': {}", name, msg);
            summary.failed += 1;
            invalid_trace(msg)
        }
        Outcome::Done(result) => {
            match &result.status {
                RouteStatus::Failed(e) => {
                    log::warn!("Route '{}' failed: {}", name, e);
                    summary.failed += 1;
                }
                RouteStatus::ToleranceWarning(_) => summary.warnings += 1,
                _ => summary.routed += 1,
            }
            let matched = matches!(
                result.status,
                RouteStatus::LengthMatched | RouteStatus::ToleranceWarning(_)
            );
            let failed = result.status.is_failed();
            let points = result
                .polyline
                .map(|line| line.into_points())
                .unwrap_or_default();
            if !failed {
                snapshot.add_trace(&points);
            }
            RoutedTrace {
                points,
                length: result.length,
                target_length: job.spec.target_length.filter(|_| matched),
                status: result.status.to_string(),
                failed,
            }
        }
    };
    db.set_routed(job.route, trace);
}

fn invalid_trace(status: String) -> RoutedTrace {
    RoutedTrace {
        points: Vec::new(),
        length: 0.0,
        target_length: None,
        status,
        failed: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qroute_common::db::parser::design;
    use qroute_common::util::check;

    const DESIGN: &str = r#"
units = "mm"

[[components]]
name = "Q0"
outline = [[-1.0, -0.5], [0.0, -0.5], [0.0, 0.5], [-1.0, 0.5]]
pins = [{ name = "a", position = [0.0, 0.0], normal = [1.0, 0.0] },
        { name = "b", position = [-0.5, 0.5], normal = [0.0, 1.0] }]

[[components]]
name = "Q1"
outline = [[5.0, -0.5], [6.0, -0.5], [6.0, 0.5], [5.0, 0.5]]
pins = [{ name = "a", position = [5.0, 0.0], normal = [-1.0, 0.0] },
        { name = "b", position = [5.5, 0.5], normal = [0.0, 1.0] }]

[[components]]
name = "BLOCK"
outline = [[2.0, -1.0], [3.0, -1.0], [3.0, 1.0], [2.0, 1.0]]
pins = []

[[routes]]
name = "bus"
start = { component = "Q0", pin = "a" }
end = { component = "Q1", pin = "a" }
kind = "pathfinder"

[[routes]]
name = "tuned"
start = { component = "Q0", pin = "b" }
end = { component = "Q1", pin = "b" }
kind = "meander"
[routes.options]
total_length = "12mm"
meander = { spacing = "0.5mm" }
lead = { start_straight = "1mm", end_straight = "1mm" }
"#;

    #[test]
    fn routes_design_and_passes_check() {
        let mut db = design::parse_str(DESIGN).unwrap();
        let summary = run(&mut db, &Config::default()).unwrap();
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.routed, 2);
        let tuned = db.routed(RouteId::new(1)).unwrap();
        assert_eq!(tuned.status, "length matched");
        assert!(check::run(&db, 1e-3).is_ok());
    }

    #[test]
    fn sequential_mode_gives_same_routes() {
        let mut parallel = design::parse_str(DESIGN).unwrap();
        let mut sequential = design::parse_str(DESIGN).unwrap();
        let mut config = Config::default();
        run(&mut parallel, &config).unwrap();
        config.routing.sequential = true;
        run(&mut sequential, &config).unwrap();
        for i in 0..2 {
            assert_eq!(
                parallel.routed(RouteId::new(i)).unwrap().failed,
                sequential.routed(RouteId::new(i)).unwrap().failed
            );
        }
    }

    #[test]
    fn framed_route_goes_around_its_components() {
        let text = r#"
units = "mm"

[[components]]
name = "A"
outline = [[-1.0, -1.0], [0.0, -1.0], [0.0, 1.0], [-1.0, 1.0]]
pins = [{ name = "w", position = [-1.0, 0.0], normal = [-1.0, 0.0] }]

[[components]]
name = "B"
outline = [[3.0, -1.0], [4.0, -1.0], [4.0, 1.0], [3.0, 1.0]]
pins = [{ name = "e", position = [4.0, 0.0], normal = [1.0, 0.0] }]

[[routes]]
name = "wrap"
start = { component = "A", pin = "w" }
end = { component = "B", pin = "e" }
kind = "framed"
[routes.options]
keepout = "0.2mm"
lead = { start_straight = "0.2mm", end_straight = "0.2mm" }
"#;
        let mut db = design::parse_str(text).unwrap();
        let summary = run(&mut db, &Config::default()).unwrap();
        assert_eq!(summary.routed, 1);
        let wrap = db.routed(RouteId::new(0)).unwrap();
        assert!(!wrap.failed);
        for q in &wrap.points {
            assert!(q.y <= 0.0);
        }
        assert!(wrap.points.iter().any(|q| (q.y + 1.2).abs() < 1e-9));
        assert!((wrap.length - 8.2).abs() < 1e-9);
        assert!(check::run(&db, 1e-3).is_ok());
    }

    #[test]
    fn bad_options_are_recorded() {
        let text = DESIGN.replace("total_length = \"12mm\"", "total_length = \"12 parsecs\"");
        let mut db = design::parse_str(&text).unwrap();
        let summary = run(&mut db, &Config::default()).unwrap();
        assert_eq!(summary.failed, 1);
        let tuned = db.routed(RouteId::new(1)).unwrap();
        assert!(tuned.failed);
        assert!(tuned.status.starts_with("invalid options"));
    }
}
