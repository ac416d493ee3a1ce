use crate::error::{MeanderToleranceWarning, RoutingError};
use qroute_common::geom::polyline::Polyline;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum RouteStatus {
    Routed,
    /// Already within tolerance of (or longer than) the target.
    NoAdjustmentNeeded,
    LengthMatched,
    ToleranceWarning(MeanderToleranceWarning),
    Failed(RoutingError),
}

impl RouteStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, RouteStatus::Failed(_))
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteStatus::Routed => write!(f, "routed"),
            RouteStatus::NoAdjustmentNeeded => write!(f, "no adjustment needed"),
            RouteStatus::LengthMatched => write!(f, "length matched"),
            RouteStatus::ToleranceWarning(w) => write!(f, "tolerance warning: {}", w),
            RouteStatus::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteResult {
    pub polyline: Option<Polyline>,
    /// Length with corner rounding applied.
    pub length: f64,
    pub status: RouteStatus,
}

impl RouteResult {
    pub fn new(polyline: Polyline, length: f64, status: RouteStatus) -> Self {
        Self {
            polyline: Some(polyline),
            length,
            status,
        }
    }

    pub fn failed(error: RoutingError) -> Self {
        Self {
            polyline: None,
            length: 0.0,
            status: RouteStatus::Failed(error),
        }
    }
}
