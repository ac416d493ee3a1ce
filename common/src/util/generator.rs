use crate::db::core::{MeanderOptions, RouteKind, RouteOptions};
use crate::db::parser::design::{ComponentEntry, DesignFile, PinEntry, PinRef, RouteEntry};
use anyhow::{Context, Result};
use rand::Rng;
use rand::seq::SliceRandom;
use std::fs;

const PITCH: f64 = 3.0;
const MIN_SIZE: f64 = 0.6;
const MAX_SIZE: f64 = 1.2;

/// Writes a random benchmark design (units mm): rectangular components on a
/// jittered grid with one pin per edge midpoint, and pathfinder or meander
/// routes between pins of distinct components. No pin is used twice.
pub fn generate_random_design(filename: &str, num_components: usize, num_routes: usize) -> Result<()> {
    let mut rng = rand::thread_rng();
    let cols = (num_components as f64).sqrt().ceil().max(1.0) as usize;

    log::info!(
        "Generating Benchmark: {} components on a {}-column grid, {} routes",
        num_components,
        cols,
        num_routes
    );

    let mut components = Vec::with_capacity(num_components);
    for i in 0..num_components {
        let (col, row) = (i % cols, i / cols);
        let w = rng.gen_range(MIN_SIZE..MAX_SIZE);
        let h = rng.gen_range(MIN_SIZE..MAX_SIZE);
        // leave at least PITCH - MAX_SIZE of free channel on every side
        let slack = (PITCH - MAX_SIZE) / 2.0;
        let x0 = col as f64 * PITCH + slack + rng.gen_range(0.0..(MAX_SIZE - w + 1e-9));
        let y0 = row as f64 * PITCH + slack + rng.gen_range(0.0..(MAX_SIZE - h + 1e-9));
        let (x1, y1) = (x0 + w, y0 + h);
        let (cx, cy) = (x0 + w / 2.0, y0 + h / 2.0);

        components.push(ComponentEntry {
            name: format!("Q{}", i),
            outline: vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]],
            pins: vec![
                pin("e", [x1, cy], [1.0, 0.0]),
                pin("n", [cx, y1], [0.0, 1.0]),
                pin("w", [x0, cy], [-1.0, 0.0]),
                pin("s", [cx, y0], [0.0, -1.0]),
            ],
        });
    }

    let mut free: Vec<(usize, usize)> = (0..num_components)
        .flat_map(|c| (0..4).map(move |p| (c, p)))
        .collect();
    free.shuffle(&mut rng);

    let mut routes = Vec::with_capacity(num_routes);
    while routes.len() < num_routes {
        let Some(a) = free.pop() else { break };
        let Some(pos) = free.iter().rposition(|&(c, _)| c != a.0) else {
            break;
        };
        let b = free.swap_remove(pos);

        let pa = &components[a.0].pins[a.1];
        let pb = &components[b.0].pins[b.1];
        let manhattan =
            (pa.position[0] - pb.position[0]).abs() + (pa.position[1] - pb.position[1]).abs();

        let meander = rng.gen_bool(0.3);
        let mut options = RouteOptions {
            fillet: Some("50um".to_string()),
            ..RouteOptions::default()
        };
        options.lead.start_straight = Some("0.1mm".to_string());
        options.lead.end_straight = Some("0.1mm".to_string());
        if meander {
            options.total_length = Some(format!("{:.3}mm", manhattan * rng.gen_range(1.3..1.8)));
            options.meander = MeanderOptions {
                spacing: Some("200um".to_string()),
                ..MeanderOptions::default()
            };
        }

        routes.push(RouteEntry {
            name: format!("cpw{}", routes.len()),
            start: PinRef {
                component: components[a.0].name.clone(),
                pin: pa.name.clone(),
            },
            end: PinRef {
                component: components[b.0].name.clone(),
                pin: pb.name.clone(),
            },
            anchors: Vec::new(),
            kind: if meander {
                RouteKind::Meander
            } else {
                RouteKind::Pathfinder
            },
            options,
        });
    }
    if routes.len() < num_routes {
        log::warn!("Only {} routes fit on the available pins", routes.len());
    }

    let design = DesignFile {
        units: "mm".to_string(),
        components,
        routes,
    };
    let text = toml::to_string(&design).context("serialising generated design")?;
    fs::write(filename, text).with_context(|| format!("writing {}", filename))?;
    Ok(())
}

fn pin(name: &str, position: [f64; 2], normal: [f64; 2]) -> PinEntry {
    PinEntry {
        name: name.to_string(),
        position,
        normal,
    }
}
