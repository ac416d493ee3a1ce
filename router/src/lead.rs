use crate::spec::Jog;
use qroute_common::geom::oriented::OrientedPoint;
use qroute_common::geom::point::Point;

/// Extension grown out of a pin before the free routing starts. The points
/// run from the pin outward; `direction` is the heading at the tip.
#[derive(Debug, Clone, PartialEq)]
pub struct Lead {
    points: Vec<Point<f64>>,
    direction: Point<f64>,
}

impl Lead {
    /// Starts at the pin, heading along its outward normal.
    pub fn new(pin: &OrientedPoint) -> Option<Self> {
        Some(Self {
            points: vec![pin.position],
            direction: pin.direction?,
        })
    }

    /// Builds the straight part followed by the jogs.
    pub fn build(pin: &OrientedPoint, straight: f64, jogs: &[Jog]) -> Option<Self> {
        let mut lead = Self::new(pin)?;
        lead.go_straight(straight);
        for jog in jogs {
            lead.apply(jog);
        }
        Some(lead)
    }

    pub fn go_straight(&mut self, length: f64) {
        if length > 0.0 {
            let tip = self.tip_position() + self.direction * length;
            self.points.push(tip);
        }
    }

    pub fn go_left(&mut self, length: f64) {
        self.go_angle(length, 90.0);
    }

    pub fn go_right(&mut self, length: f64) {
        self.go_angle(length, -90.0);
    }

    /// Turns by `degrees` (positive is counter-clockwise), then advances.
    pub fn go_angle(&mut self, length: f64, degrees: f64) {
        self.direction = turn(self.direction, degrees);
        self.go_straight(length);
    }

    pub fn apply(&mut self, jog: &Jog) {
        self.go_angle(jog.length, jog.angle);
    }

    fn tip_position(&self) -> Point<f64> {
        self.points[self.points.len() - 1]
    }

    /// Where routing continues from, with the current heading.
    pub fn tip(&self) -> OrientedPoint {
        OrientedPoint {
            position: self.tip_position(),
            direction: Some(self.direction),
        }
    }

    pub fn points(&self) -> &[Point<f64>] {
        &self.points
    }

    pub fn length(&self) -> f64 {
        qroute_common::geom::polyline::raw_length(&self.points)
    }
}

/// Quarter turns are applied exactly so axis-aligned leads stay on axis.
fn turn(direction: Point<f64>, degrees: f64) -> Point<f64> {
    let quarter = degrees / 90.0;
    if (quarter - quarter.round()).abs() < 1e-12 {
        return match (quarter.round() as i64).rem_euclid(4) {
            0 => direction,
            1 => direction.perp(),
            2 => -direction,
            _ => -direction.perp(),
        };
    }
    direction.rotate(degrees.to_radians())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(x: f64, y: f64, dx: f64, dy: f64) -> OrientedPoint {
        OrientedPoint::new(Point::new(x, y), Point::new(dx, dy))
    }

    #[test]
    fn straight_then_jogs() {
        let jogs = [
            Jog {
                angle: 90.0,
                length: 0.5,
            },
            Jog {
                angle: -90.0,
                length: 0.25,
            },
        ];
        let lead = Lead::build(&pin(0.0, 0.0, 1.0, 0.0), 1.0, &jogs).unwrap();
        assert_eq!(
            lead.points(),
            &[
                Point::new(0.0, 0.0),
                Point::new(1.0, 0.0),
                Point::new(1.0, 0.5),
                Point::new(1.25, 0.5),
            ]
        );
        assert_eq!(lead.tip().direction, Some(Point::UNIT_X));
        assert!((lead.length() - 1.75).abs() < 1e-12);
    }

    #[test]
    fn zero_length_lead_is_the_pin() {
        let p = pin(2.0, 3.0, 0.0, -1.0);
        let lead = Lead::build(&p, 0.0, &[]).unwrap();
        assert_eq!(lead.points(), &[Point::new(2.0, 3.0)]);
        assert_eq!(lead.tip(), p);
    }

    #[test]
    fn right_turn_is_clockwise() {
        let mut lead = Lead::new(&pin(0.0, 0.0, 0.0, 1.0)).unwrap();
        lead.go_right(1.0);
        assert_eq!(lead.points()[1], Point::new(1.0, 0.0));
        lead.go_left(1.0);
        assert_eq!(lead.points()[2], Point::new(1.0, 1.0));
    }

    #[test]
    fn oblique_turn() {
        let mut lead = Lead::new(&pin(0.0, 0.0, 1.0, 0.0)).unwrap();
        lead.go_angle(2.0_f64.sqrt(), 45.0);
        assert!(lead.points()[1].approx_eq(Point::new(1.0, 1.0)));
    }

    #[test]
    fn unoriented_pin_has_no_lead() {
        assert!(Lead::new(&OrientedPoint::free(Point::new(0.0, 0.0))).is_none());
    }
}
