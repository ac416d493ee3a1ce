use super::point::Point;

/// A position with the tangent a route must respect there.
///
/// At a route start the direction is the exit direction. At a route end it is
/// the outward normal of the pin (pointing back toward where the route comes
/// from). `None` means any non-reversing approach is accepted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientedPoint {
    pub position: Point<f64>,
    pub direction: Option<Point<f64>>,
}

impl OrientedPoint {
    /// Direction is normalised; a zero vector leaves the point unoriented.
    pub fn new(position: Point<f64>, direction: Point<f64>) -> Self {
        Self {
            position,
            direction: direction.normalized(),
        }
    }

    pub fn free(position: Point<f64>) -> Self {
        Self {
            position,
            direction: None,
        }
    }

    /// Direction to use for an unoriented end: along the longer side of the
    /// box spanned with `reference`, pointing back toward `reference`.
    pub fn assigned_direction(&self, reference: Point<f64>) -> Point<f64> {
        if let Some(d) = self.direction {
            return d;
        }
        let dx = reference.x - self.position.x;
        let dy = reference.y - self.position.y;
        if dx.abs() >= dy.abs() {
            Point::new(dx.signum(), 0.0)
        } else {
            Point::new(0.0, dy.signum())
        }
    }
}

/// Intermediate waypoint. `tangent` is the travel direction through the
/// anchor, when the user pins one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anchor {
    pub position: Point<f64>,
    pub tangent: Option<Point<f64>>,
}

impl Anchor {
    pub fn new(position: Point<f64>) -> Self {
        Self {
            position,
            tangent: None,
        }
    }

    pub fn with_tangent(position: Point<f64>, tangent: Point<f64>) -> Self {
        Self {
            position,
            tangent: tangent.normalized(),
        }
    }

    /// The anchor seen as the end of the incoming segment.
    pub fn as_target(&self) -> OrientedPoint {
        OrientedPoint {
            position: self.position,
            direction: self.tangent.map(|t| -t),
        }
    }
}
