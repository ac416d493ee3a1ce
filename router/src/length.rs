use qroute_common::geom::point::Point;
use qroute_common::geom::polyline::raw_length;
use std::f64::consts::PI;

/// Turns this close to a full reversal are not rounded.
const REVERSAL_TOLERANCE: f64 = 1e-6;

/// Length saved by rounding a turn of `theta` radians with radius `r`:
/// the two tangent lengths minus the arc.
pub fn corner_excess(theta: f64, r: f64) -> f64 {
    if r <= 0.0 || theta <= 0.0 || theta > PI - REVERSAL_TOLERANCE {
        return 0.0;
    }
    2.0 * r * (theta / 2.0).tan() - r * theta
}

/// Total length removed from the raw length by rounding every interior vertex.
pub fn length_excess_corner_rounding(points: &[Point<f64>], r: f64) -> f64 {
    points
        .windows(3)
        .map(|w| {
            let u = w[1] - w[0];
            let v = w[2] - w[1];
            if u.norm() == 0.0 || v.norm() == 0.0 {
                return 0.0;
            }
            corner_excess(u.cross(v).abs().atan2(u.dot(v)), r)
        })
        .sum()
}

/// Drawn length of the trace once its corners are filleted with radius `r`.
pub fn total_length(points: &[Point<f64>], r: f64) -> f64 {
    raw_length(points) - length_excess_corner_rounding(points, r)
}
