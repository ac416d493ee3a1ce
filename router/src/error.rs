use qroute_common::geom::point::Point;
use qroute_common::util::units::UnitError;
use thiserror::Error;

/// Recoverable routing failures, reported through `RouteStatus::Failed`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoutingError {
    #[error("no path found from {from} to {to}")]
    NoPathFound { from: Point<f64>, to: Point<f64> },
    #[error("no straight run can hold a meander for {excess:.6} of extra length")]
    InsufficientLengthBudget { excess: f64 },
    #[error("every meander placement is obstructed")]
    MeanderObstructed,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidAnchorOrderError {
    #[error("waypoints {first} and {second} coincide at {point}")]
    CoincidentWaypoints {
        first: usize,
        second: usize,
        point: Point<f64>,
    },
    #[error("{0} pin has no direction")]
    UnorientedPin(&'static str),
}

/// Length target missed after the last correction step. The route is still
/// usable.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("meander reached {achieved:.6} for target {target:.6} after {iterations} iterations")]
pub struct MeanderToleranceWarning {
    pub target: f64,
    pub achieved: f64,
    pub iterations: usize,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpecError {
    #[error("option '{option}': {source}")]
    Unit { option: String, source: UnitError },
    #[error("option '{option}' must be positive, got {value}")]
    NotPositive { option: String, value: f64 },
    #[error("unsupported jog turn '{0}', use L, L#, R, R#, #, A,#, left, left#, right, right#, straight")]
    BadTurn(String),
    #[error("unknown meander side '{0}', use auto, left or right")]
    BadSide(String),
    #[error("segment '{key}': unknown strategy '{value}', use S, PF or M")]
    BadSegment { key: String, value: String },
    #[error("meander routes need a total_length")]
    MissingTargetLength,
}
