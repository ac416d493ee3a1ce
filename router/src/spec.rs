use crate::error::SpecError;
use qroute_common::db::core::{RouteKind, RouteOptions};
use qroute_common::geom::rect::Rect;
use qroute_common::util::config::Config;
use qroute_common::util::units::parse_length;
use std::collections::BTreeMap;

/// One step of a jogged lead: turn by `angle` degrees (positive turns left),
/// then advance `length`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jog {
    pub angle: f64,
    pub length: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadSpec {
    pub start_straight: f64,
    pub end_straight: f64,
    pub start_jogs: Vec<Jog>,
    pub end_jogs: Vec<Jog>,
}

impl LeadSpec {
    /// Path length of the start lead, kept free of meanders.
    pub fn start_length(&self) -> f64 {
        self.start_straight + self.start_jogs.iter().map(|j| j.length).sum::<f64>()
    }

    pub fn end_length(&self) -> f64 {
        self.end_straight + self.end_jogs.iter().map(|j| j.length).sum::<f64>()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MeanderSide {
    /// Side with fewer route vertices, mirrored if blocked.
    #[default]
    Auto,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeanderSpec {
    pub spacing: f64,
    pub asymmetry: f64,
    pub side: MeanderSide,
    pub max_iterations: usize,
}

/// Frame fallback of framed routes. `bounds` holds the outlines of the
/// start and end components; without them the frame is taken around the
/// segment end points.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSpec {
    pub keepout: f64,
    pub bounds: Option<[Rect; 2]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStrategy {
    Simple,
    Pathfinder,
    Meander,
}

/// Fully resolved routing options, all lengths in design units.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSpec {
    pub target_length: Option<f64>,
    pub lead: LeadSpec,
    pub fillet: f64,
    pub meander: MeanderSpec,
    pub length_tolerance: f64,
    pub allow_pathfinder: bool,
    pub avoid_collision: bool,
    pub step_size: f64,
    pub segments: BTreeMap<usize, SegmentStrategy>,
    pub frame: Option<FrameSpec>,
}

impl Default for RouteSpec {
    fn default() -> Self {
        Self {
            target_length: None,
            lead: LeadSpec::default(),
            fillet: 0.0,
            meander: MeanderSpec {
                spacing: 0.2,
                asymmetry: 0.0,
                side: MeanderSide::Auto,
                max_iterations: 20,
            },
            length_tolerance: 1e-3,
            allow_pathfinder: true,
            avoid_collision: true,
            step_size: 0.25,
            segments: BTreeMap::new(),
            frame: None,
        }
    }
}

impl RouteSpec {
    /// Parses the raw design options once. Defaults come from `config`; the
    /// meander spacing defaults to 200um.
    pub fn resolve(
        kind: RouteKind,
        options: &RouteOptions,
        units: &str,
        config: &Config,
    ) -> Result<Self, SpecError> {
        let length = |option: &str, raw: &Option<String>, default: f64| {
            resolve_length(option, raw, units).map(|v| v.unwrap_or(default))
        };
        let spacing_default = parse_length("200um", units).map_err(|source| SpecError::Unit {
            option: "meander.spacing".to_string(),
            source,
        })?;

        let fillet = length("fillet", &options.fillet, 0.0)?;
        let step_size = length("step_size", &options.step_size, config.routing.step_size)?;
        let spacing = length("meander.spacing", &options.meander.spacing, spacing_default)?;
        let length_tolerance = length(
            "length_tolerance",
            &options.length_tolerance,
            config.routing.length_tolerance,
        )?;
        for (option, value) in [
            ("step_size", step_size),
            ("meander.spacing", spacing),
            ("length_tolerance", length_tolerance),
        ] {
            if value <= 0.0 {
                return Err(SpecError::NotPositive {
                    option: option.to_string(),
                    value,
                });
            }
        }
        if fillet < 0.0 {
            return Err(SpecError::NotPositive {
                option: "fillet".to_string(),
                value: fillet,
            });
        }

        let target_length = resolve_length("total_length", &options.total_length, units)?;

        let frame = if kind == RouteKind::Framed {
            let keepout_default = parse_length("200um", units).map_err(|source| SpecError::Unit {
                option: "keepout".to_string(),
                source,
            })?;
            let keepout = length("keepout", &options.keepout, keepout_default)?;
            if keepout < 0.0 {
                return Err(SpecError::NotPositive {
                    option: "keepout".to_string(),
                    value: keepout,
                });
            }
            Some(FrameSpec {
                keepout,
                bounds: None,
            })
        } else {
            None
        };

        let lead = LeadSpec {
            start_straight: length("lead.start_straight", &options.lead.start_straight, 0.0)?,
            end_straight: length("lead.end_straight", &options.lead.end_straight, 0.0)?,
            start_jogs: parse_jogs(&options.lead.start_jogged_extension, units)?,
            end_jogs: parse_jogs(&options.lead.end_jogged_extension, units)?,
        };

        let side = match options.meander.side.as_deref().map(str::trim) {
            None | Some("auto") => MeanderSide::Auto,
            Some("left") => MeanderSide::Left,
            Some("right") => MeanderSide::Right,
            Some(other) => return Err(SpecError::BadSide(other.to_string())),
        };

        let mut segments = BTreeMap::new();
        if kind == RouteKind::Mixed {
            for (key, value) in &options.between_anchors {
                let index: usize = key.trim().parse().map_err(|_| SpecError::BadSegment {
                    key: key.clone(),
                    value: value.clone(),
                })?;
                segments.insert(index, parse_strategy(key, value)?);
            }
        }

        // only meandered routes are length matched
        let needs_target = kind == RouteKind::Meander
            || segments.values().any(|s| *s == SegmentStrategy::Meander);
        if needs_target && target_length.is_none() {
            return Err(SpecError::MissingTargetLength);
        }
        let target_length = target_length.filter(|_| needs_target);

        Ok(Self {
            target_length,
            lead,
            fillet,
            meander: MeanderSpec {
                spacing,
                asymmetry: length("meander.asymmetry", &options.meander.asymmetry, 0.0)?,
                side,
                max_iterations: config.meander.max_iterations,
            },
            length_tolerance,
            allow_pathfinder: !matches!(kind, RouteKind::Simple | RouteKind::Framed),
            avoid_collision: options.avoid_collision.unwrap_or(true),
            step_size,
            segments,
            frame,
        })
    }

    /// Strategy for the segment between waypoint `index` and `index + 1`.
    pub fn segment_strategy(&self, index: usize) -> SegmentStrategy {
        match self.segments.get(&index) {
            Some(&s) => s,
            None if self.allow_pathfinder => SegmentStrategy::Pathfinder,
            None => SegmentStrategy::Simple,
        }
    }

    pub fn has_meander_segments(&self) -> bool {
        self.segments.values().any(|s| *s == SegmentStrategy::Meander)
    }
}

fn resolve_length(option: &str, raw: &Option<String>, units: &str) -> Result<Option<f64>, SpecError> {
    raw.as_deref()
        .map(|s| {
            parse_length(s, units).map_err(|source| SpecError::Unit {
                option: option.to_string(),
                source,
            })
        })
        .transpose()
}

fn parse_strategy(key: &str, value: &str) -> Result<SegmentStrategy, SpecError> {
    match value.trim() {
        "S" | "simple" => Ok(SegmentStrategy::Simple),
        "PF" | "pathfinder" => Ok(SegmentStrategy::Pathfinder),
        "M" | "meander" => Ok(SegmentStrategy::Meander),
        _ => Err(SpecError::BadSegment {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_jogs(raw: &[(String, String)], units: &str) -> Result<Vec<Jog>, SpecError> {
    raw.iter()
        .enumerate()
        .map(|(i, (turn, len))| {
            let length = parse_length(len, units).map_err(|source| SpecError::Unit {
                option: format!("jogged extension {}", i),
                source,
            })?;
            Ok(Jog {
                angle: parse_turn(turn)?,
                length,
            })
        })
        .collect()
}

/// Turn in degrees, positive is counter-clockwise.
pub fn parse_turn(turn: &str) -> Result<f64, SpecError> {
    let t = turn.trim();
    let bad = || SpecError::BadTurn(turn.to_string());
    match t {
        "L" | "left" => return Ok(90.0),
        "R" | "right" => return Ok(-90.0),
        "S" | "D" | "straight" => return Ok(0.0),
        _ => {}
    }
    if let Ok(angle) = t.parse::<f64>() {
        return Ok(angle);
    }
    if let Some((prefix, angle)) = t.split_once(',') {
        if matches!(prefix.trim(), "A" | "angle") {
            return angle.trim().parse::<f64>().map_err(|_| bad());
        }
        return Err(bad());
    }
    for (prefix, sign) in [("left", 1.0), ("right", -1.0), ("L", 1.0), ("R", -1.0)] {
        if let Some(rest) = t.strip_prefix(prefix) {
            return rest.parse::<f64>().map(|a| sign * a).map_err(|_| bad());
        }
    }
    Err(bad())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("L", 90.0)]
    #[case("left", 90.0)]
    #[case("L45", 45.0)]
    #[case("R", -90.0)]
    #[case("right30", -30.0)]
    #[case("R-90", 90.0)]
    #[case("90", 90.0)]
    #[case("A,-45", -45.0)]
    #[case("straight", 0.0)]
    #[case("D", 0.0)]
    fn turns_parse(#[case] turn: &str, #[case] degrees: f64) {
        assert_eq!(parse_turn(turn).unwrap(), degrees);
    }

    #[test]
    fn bad_turn_is_rejected() {
        assert!(matches!(parse_turn("up"), Err(SpecError::BadTurn(_))));
        assert!(matches!(parse_turn("B,45"), Err(SpecError::BadTurn(_))));
    }

    #[test]
    fn resolve_parses_units_once() {
        let mut options = RouteOptions {
            fillet: Some("90um".to_string()),
            total_length: Some("7 mm".to_string()),
            ..RouteOptions::default()
        };
        options.lead.start_straight = Some("100um".to_string());
        options.lead.start_jogged_extension = vec![("R".to_string(), "0.2mm".to_string())];
        options.meander.side = Some("left".to_string());

        let spec = RouteSpec::resolve(RouteKind::Meander, &options, "mm", &Config::default()).unwrap();
        assert!((spec.fillet - 0.09).abs() < 1e-12);
        assert_eq!(spec.target_length, Some(7.0));
        assert!((spec.meander.spacing - 0.2).abs() < 1e-12);
        assert_eq!(spec.meander.side, MeanderSide::Left);
        assert!((spec.lead.start_length() - 0.3).abs() < 1e-12);
        assert_eq!(spec.lead.start_jogs[0].angle, -90.0);
        assert!(spec.allow_pathfinder);
    }

    #[test]
    fn meander_without_target_is_an_error() {
        let err = RouteSpec::resolve(
            RouteKind::Meander,
            &RouteOptions::default(),
            "mm",
            &Config::default(),
        );
        assert_eq!(err, Err(SpecError::MissingTargetLength));
    }

    #[test]
    fn mixed_segments_are_indexed() {
        let mut options = RouteOptions {
            total_length: Some("12".to_string()),
            ..RouteOptions::default()
        };
        options.between_anchors.insert("0".to_string(), "S".to_string());
        options.between_anchors.insert("1".to_string(), "M".to_string());

        let spec = RouteSpec::resolve(RouteKind::Mixed, &options, "mm", &Config::default()).unwrap();
        assert_eq!(spec.segment_strategy(0), SegmentStrategy::Simple);
        assert_eq!(spec.segment_strategy(1), SegmentStrategy::Meander);
        assert_eq!(spec.segment_strategy(2), SegmentStrategy::Pathfinder);
        assert!(spec.has_meander_segments());
    }

    #[test]
    fn target_is_dropped_without_meanders() {
        let options = RouteOptions {
            total_length: Some("12".to_string()),
            ..RouteOptions::default()
        };
        let spec =
            RouteSpec::resolve(RouteKind::Pathfinder, &options, "mm", &Config::default()).unwrap();
        assert_eq!(spec.target_length, None);
    }

    #[test]
    fn simple_kind_disables_pathfinder() {
        let spec = RouteSpec::resolve(
            RouteKind::Simple,
            &RouteOptions::default(),
            "um",
            &Config::default(),
        )
        .unwrap();
        assert!(!spec.allow_pathfinder);
        assert!((spec.meander.spacing - 200.0).abs() < 1e-9);
    }

    #[test]
    fn framed_kind_carries_keepout() {
        let spec = RouteSpec::resolve(
            RouteKind::Framed,
            &RouteOptions::default(),
            "mm",
            &Config::default(),
        )
        .unwrap();
        assert!(!spec.allow_pathfinder);
        let frame = spec.frame.unwrap();
        assert!((frame.keepout - 0.2).abs() < 1e-12);
        assert_eq!(frame.bounds, None);

        let options = RouteOptions {
            keepout: Some("-1mm".to_string()),
            ..RouteOptions::default()
        };
        let err = RouteSpec::resolve(RouteKind::Framed, &options, "mm", &Config::default());
        assert!(matches!(err, Err(SpecError::NotPositive { .. })));
    }
}
