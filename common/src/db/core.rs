use crate::db::indices::*;
use crate::geom::oriented::{Anchor, OrientedPoint};
use crate::geom::point::Point;
use crate::geom::polygon::Polygon;
use crate::geom::rect::Rect;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Debug)]
pub struct ComponentData {
    pub name: String,
    pub outline: Polygon,
    pub pins: Vec<PinId>,
}

/// Pin on a component edge. `point.direction` is the outward normal.
#[derive(Clone, Debug)]
pub struct PinData {
    pub name: String,
    pub component: ComponentId,
    pub point: OrientedPoint,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    /// Simple connector only.
    Simple,
    /// Simple connector with A* fallback.
    #[default]
    Pathfinder,
    /// Pathfinder route lengthened to `total_length`.
    Meander,
    /// Per-segment strategies from `between_anchors`.
    Mixed,
    /// Simple connector, then a 1-3 segment frame around both components.
    Framed,
}

/// Lengths stay as written in the design file (`"0.3 mm"`, `"200um"`)
/// until the router resolves them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fillet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_length: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_tolerance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avoid_collision: Option<bool>,
    /// Clearance of framed routes passing outside both components.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepout: Option<String>,
    pub lead: LeadOptions,
    pub meander: MeanderOptions,
    /// Segment index (0 = pin to first anchor) to `S`, `PF` or `M`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub between_anchors: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_straight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_straight: Option<String>,
    /// `[turn, length]` pairs, e.g. `["R", "200um"]` or `["A,45", "0.1mm"]`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub start_jogged_extension: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub end_jogged_extension: Vec<(String, String)>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanderOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spacing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asymmetry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RouteRequest {
    pub name: String,
    pub start: PinId,
    pub end: PinId,
    pub anchors: Vec<Anchor>,
    pub kind: RouteKind,
    pub options: RouteOptions,
}

/// Outcome of routing one request, as stored back into the design.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutedTrace {
    pub points: Vec<Point<f64>>,
    pub length: f64,
    pub target_length: Option<f64>,
    pub status: String,
    pub failed: bool,
}

pub struct ChipDesign {
    pub units: String,
    pub components: Vec<ComponentData>,
    pub pins: Vec<PinData>,
    pub routes: Vec<RouteRequest>,
    pub routed: Vec<Option<RoutedTrace>>,

    pub component_name_map: HashMap<String, ComponentId>,
    pub route_name_map: HashMap<String, RouteId>,
}

impl ChipDesign {
    pub fn new(units: impl Into<String>) -> Self {
        Self {
            units: units.into(),
            components: Vec::new(),
            pins: Vec::new(),
            routes: Vec::new(),
            routed: Vec::new(),
            component_name_map: HashMap::new(),
            route_name_map: HashMap::new(),
        }
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }
    pub fn num_routes(&self) -> usize {
        self.routes.len()
    }

    pub fn add_component(&mut self, name: String, outline: Polygon) -> ComponentId {
        let id = ComponentId::new(self.components.len());
        self.component_name_map.insert(name.clone(), id);
        self.components.push(ComponentData {
            name,
            outline,
            pins: Vec::new(),
        });
        id
    }

    pub fn add_pin(&mut self, component: ComponentId, name: String, point: OrientedPoint) -> PinId {
        let pid = PinId::new(self.pins.len());
        self.pins.push(PinData {
            name,
            component,
            point,
        });
        self.components[component.index()].pins.push(pid);
        pid
    }

    pub fn add_route(&mut self, request: RouteRequest) -> RouteId {
        let id = RouteId::new(self.routes.len());
        self.route_name_map.insert(request.name.clone(), id);
        self.routes.push(request);
        self.routed.push(None);
        id
    }

    #[inline]
    pub fn pin(&self, pin: PinId) -> &PinData {
        &self.pins[pin.index()]
    }

    pub fn find_pin(&self, component: &str, pin: &str) -> Option<PinId> {
        let cid = self.component_name_map.get(component)?;
        self.components[cid.index()]
            .pins
            .iter()
            .copied()
            .find(|&p| self.pins[p.index()].name == pin)
    }

    pub fn set_routed(&mut self, route: RouteId, trace: RoutedTrace) {
        self.routed[route.index()] = Some(trace);
    }

    pub fn routed(&self, route: RouteId) -> Option<&RoutedTrace> {
        self.routed[route.index()].as_ref()
    }

    /// Box around every outline, pin and routed point.
    pub fn extent(&self) -> Option<Rect> {
        let outline_points = self
            .components
            .iter()
            .flat_map(|c| c.outline.vertices().iter().copied());
        let pin_points = self.pins.iter().map(|p| p.point.position);
        let trace_points = self
            .routed
            .iter()
            .flatten()
            .flat_map(|t| t.points.iter().copied());
        let all: Vec<Point<f64>> = outline_points.chain(pin_points).chain(trace_points).collect();
        Rect::bounding(&all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pins_are_found_by_component_and_name() {
        let mut db = ChipDesign::new("mm");
        let q = db.add_component(
            "Q1".to_string(),
            Polygon::rect(Point::new(0.0, 0.0), Point::new(1.0, 1.0)),
        );
        let pin = db.add_pin(
            q,
            "bus".to_string(),
            OrientedPoint::new(Point::new(1.0, 0.5), Point::new(1.0, 0.0)),
        );
        assert_eq!(db.find_pin("Q1", "bus"), Some(pin));
        assert_eq!(db.find_pin("Q1", "readout"), None);
        assert_eq!(db.find_pin("Q2", "bus"), None);
        assert_eq!(db.pin(pin).component, q);

        let extent = db.extent().unwrap();
        assert_eq!(extent.max, Point::new(1.0, 1.0));
    }
}
