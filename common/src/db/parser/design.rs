use crate::db::core::{ChipDesign, RouteKind, RouteOptions, RouteRequest, RoutedTrace};
use crate::db::indices::RouteId;
use crate::geom::oriented::{Anchor, OrientedPoint};
use crate::geom::point::Point;
use crate::geom::polygon::Polygon;
use crate::util::units::unit_scale;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DesignError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed design file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("cannot serialise routed design: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("unknown design units '{0}'")]
    UnknownUnits(String),
    #[error("routed file uses '{found}' but the design uses '{expected}'")]
    UnitsMismatch { expected: String, found: String },
    #[error("duplicate name '{0}'")]
    DuplicateName(String),
    #[error("component '{0}' needs an outline of at least 3 distinct points")]
    BadOutline(String),
    #[error("pin '{component}.{pin}' has a zero normal")]
    ZeroNormal { component: String, pin: String },
    #[error("route '{route}' references unknown pin '{component}.{pin}'")]
    UnknownPin {
        route: String,
        component: String,
        pin: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DesignFile {
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default)]
    pub components: Vec<ComponentEntry>,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

fn default_units() -> String {
    "mm".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentEntry {
    pub name: String,
    pub outline: Vec<[f64; 2]>,
    #[serde(default)]
    pub pins: Vec<PinEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PinEntry {
    pub name: String,
    pub position: [f64; 2],
    /// Outward normal, need not be unit length.
    pub normal: [f64; 2],
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PinRef {
    pub component: String,
    pub pin: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnchorEntry {
    pub position: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<[f64; 2]>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteEntry {
    pub name: String,
    pub start: PinRef,
    pub end: PinRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anchors: Vec<AnchorEntry>,
    #[serde(default)]
    pub kind: RouteKind,
    #[serde(default)]
    pub options: RouteOptions,
}

pub fn parse(filename: &str) -> Result<ChipDesign, DesignError> {
    let text = fs::read_to_string(filename).map_err(|source| DesignError::Io {
        path: PathBuf::from(filename),
        source,
    })?;
    let db = parse_str(&text)?;
    log::info!(
        "Loaded design '{}': {} components, {} pins, {} routes ({})",
        filename,
        db.num_components(),
        db.pins.len(),
        db.num_routes(),
        db.units
    );
    Ok(db)
}

pub fn parse_str(text: &str) -> Result<ChipDesign, DesignError> {
    let file: DesignFile = toml::from_str(text)?;
    build(file)
}

pub fn build(file: DesignFile) -> Result<ChipDesign, DesignError> {
    if unit_scale(&file.units).is_none() {
        return Err(DesignError::UnknownUnits(file.units));
    }
    let mut db = ChipDesign::new(file.units);

    for comp in file.components {
        if db.component_name_map.contains_key(&comp.name) {
            return Err(DesignError::DuplicateName(comp.name));
        }
        let outline = comp.outline.iter().map(|&p| Point::from(p)).collect();
        let outline = Polygon::new(outline).ok_or_else(|| DesignError::BadOutline(comp.name.clone()))?;
        let cid = db.add_component(comp.name.clone(), outline);

        for pin in comp.pins {
            let normal = Point::from(pin.normal);
            if normal.normalized().is_none() {
                return Err(DesignError::ZeroNormal {
                    component: comp.name.clone(),
                    pin: pin.name,
                });
            }
            if db.find_pin(&comp.name, &pin.name).is_some() {
                return Err(DesignError::DuplicateName(format!("{}.{}", comp.name, pin.name)));
            }
            db.add_pin(cid, pin.name, OrientedPoint::new(Point::from(pin.position), normal));
        }
    }

    for route in file.routes {
        if db.route_name_map.contains_key(&route.name) {
            return Err(DesignError::DuplicateName(route.name));
        }
        let start = resolve_pin(&db, &route.name, &route.start)?;
        let end = resolve_pin(&db, &route.name, &route.end)?;
        let anchors = route
            .anchors
            .iter()
            .map(|a| match a.direction {
                Some(d) => Anchor::with_tangent(Point::from(a.position), Point::from(d)),
                None => Anchor::new(Point::from(a.position)),
            })
            .collect();
        db.add_route(RouteRequest {
            name: route.name,
            start,
            end,
            anchors,
            kind: route.kind,
            options: route.options,
        });
    }

    Ok(db)
}

fn resolve_pin(
    db: &ChipDesign,
    route: &str,
    pin_ref: &PinRef,
) -> Result<crate::db::indices::PinId, DesignError> {
    db.find_pin(&pin_ref.component, &pin_ref.pin)
        .ok_or_else(|| DesignError::UnknownPin {
            route: route.to_string(),
            component: pin_ref.component.clone(),
            pin: pin_ref.pin.clone(),
        })
}

#[derive(Debug, Serialize, Deserialize)]
struct RoutedFile {
    units: String,
    routes: Vec<RoutedEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RoutedEntry {
    name: String,
    status: String,
    length: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_length: Option<f64>,
    points: Vec<[f64; 2]>,
}

/// Writes every routed trace as `[[routes]]` tables. Unrouted requests are
/// listed with status `unrouted` and no points.
pub fn write_routed(db: &ChipDesign, filename: &str) -> Result<(), DesignError> {
    let routes = db
        .routes
        .iter()
        .zip(&db.routed)
        .map(|(req, trace)| match trace {
            Some(t) => RoutedEntry {
                name: req.name.clone(),
                status: t.status.clone(),
                length: t.length,
                target_length: t.target_length,
                points: t.points.iter().map(|&p| p.into()).collect(),
            },
            None => RoutedEntry {
                name: req.name.clone(),
                status: "unrouted".to_string(),
                length: 0.0,
                target_length: None,
                points: Vec::new(),
            },
        })
        .collect();
    let text = toml::to_string(&RoutedFile {
        units: db.units.clone(),
        routes,
    })?;

    let path = Path::new(filename);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| DesignError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, text).map_err(|source| DesignError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("Wrote {} routes to {}", db.num_routes(), filename);
    Ok(())
}

/// Attaches the traces of a file written by `write_routed` to the matching
/// requests of `db`. Entries naming no request are ignored.
pub fn read_routed(db: &mut ChipDesign, filename: &str) -> Result<usize, DesignError> {
    let text = fs::read_to_string(filename).map_err(|source| DesignError::Io {
        path: PathBuf::from(filename),
        source,
    })?;
    let file: RoutedFile = toml::from_str(&text)?;
    if file.units != db.units {
        return Err(DesignError::UnitsMismatch {
            expected: db.units.clone(),
            found: file.units,
        });
    }

    let mut attached = 0;
    for entry in file.routes {
        let Some(i) = db.routes.iter().position(|r| r.name == entry.name) else {
            log::warn!("Routed file names unknown route '{}'", entry.name);
            continue;
        };
        if entry.status == "unrouted" {
            continue;
        }
        let failed = entry.status.starts_with("failed") || entry.status.starts_with("invalid");
        db.set_routed(
            RouteId::new(i),
            RoutedTrace {
                points: entry.points.into_iter().map(Point::from).collect(),
                length: entry.length,
                target_length: entry.target_length,
                status: entry.status,
                failed,
            },
        );
        attached += 1;
    }
    Ok(attached)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESIGN: &str = r#"
units = "mm"

[[components]]
name = "Q1"
outline = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
pins = [{ name = "bus", position = [1.0, 0.5], normal = [1.0, 0.0] }]

[[components]]
name = "Q2"
outline = [[4.0, 0.0], [5.0, 0.0], [5.0, 1.0], [4.0, 1.0]]
pins = [{ name = "bus", position = [4.0, 0.5], normal = [-2.0, 0.0] }]

[[routes]]
name = "cpw1"
start = { component = "Q1", pin = "bus" }
end = { component = "Q2", pin = "bus" }
kind = "meander"
anchors = [{ position = [2.5, 1.5] }]

[routes.options]
total_length = "6 mm"
fillet = "90um"
lead = { start_straight = "0.1mm", start_jogged_extension = [["R", "200um"]] }
meander = { spacing = "200um" }
"#;

    #[test]
    fn parses_components_pins_and_routes() {
        let db = parse_str(DESIGN).unwrap();
        assert_eq!(db.num_components(), 2);
        assert_eq!(db.num_routes(), 1);

        let route = &db.routes[0];
        assert_eq!(route.kind, RouteKind::Meander);
        assert_eq!(route.anchors.len(), 1);
        assert_eq!(route.options.total_length.as_deref(), Some("6 mm"));
        assert_eq!(
            route.options.lead.start_jogged_extension,
            vec![("R".to_string(), "200um".to_string())]
        );

        let end = db.pin(route.end);
        assert_eq!(end.point.direction, Some(Point::new(-1.0, 0.0)));
    }

    #[test]
    fn unknown_pin_is_reported() {
        let text = DESIGN.replace("pin = \"bus\" }\nkind", "pin = \"xy\" }\nkind");
        match parse_str(&text) {
            Err(DesignError::UnknownPin { pin, .. }) => assert_eq!(pin, "xy"),
            other => panic!("expected UnknownPin, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn bad_units_are_rejected() {
        let text = DESIGN.replace("units = \"mm\"", "units = \"parsec\"");
        assert!(matches!(parse_str(&text), Err(DesignError::UnknownUnits(_))));
    }

    #[test]
    fn routed_output_round_trips_through_toml() {
        let mut db = parse_str(DESIGN).unwrap();
        db.set_routed(
            RouteId::new(0),
            RoutedTrace {
                points: vec![Point::new(1.0, 0.5), Point::new(4.0, 0.5)],
                length: 3.0,
                target_length: Some(6.0),
                status: "routed".to_string(),
                failed: false,
            },
        );
        let path = std::env::temp_dir().join(format!("qroute_routed_{}.toml", std::process::id()));
        let path_str = path.to_string_lossy().to_string();
        write_routed(&db, &path_str).unwrap();

        let value: toml::Value = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let first = &value["routes"][0];
        assert_eq!(first["name"].as_str(), Some("cpw1"));
        assert_eq!(first["points"].as_array().map(|a| a.len()), Some(2));

        let mut fresh = parse_str(DESIGN).unwrap();
        assert_eq!(read_routed(&mut fresh, &path_str).unwrap(), 1);
        let trace = fresh.routed(RouteId::new(0)).unwrap();
        assert_eq!(trace.points, vec![Point::new(1.0, 0.5), Point::new(4.0, 0.5)]);
        assert_eq!(trace.target_length, Some(6.0));
        assert!(!trace.failed);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn routed_file_in_other_units_is_rejected() {
        let path = std::env::temp_dir().join(format!("qroute_units_{}.toml", std::process::id()));
        fs::write(&path, "units = \"um\"\nroutes = []\n").unwrap();
        let mut db = parse_str(DESIGN).unwrap();
        let err = read_routed(&mut db, &path.to_string_lossy()).unwrap_err();
        let _ = fs::remove_file(&path);
        assert!(matches!(err, DesignError::UnitsMismatch { ref found, .. } if found == "um"));
    }
}
