use qroute_common::geom::coord::LatticeCoord;
use qroute_common::geom::point::Point;

/// Maps between design coordinates and the implicit search lattice.
#[derive(Clone, Copy, Debug)]
pub struct LatticeConverter {
    origin: Point<f64>,
    step: f64,
}

impl LatticeConverter {
    pub fn new(origin: Point<f64>, step: f64) -> Self {
        Self { origin, step }
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Nearest lattice cell.
    pub fn to_lattice(&self, p: Point<f64>) -> LatticeCoord {
        let i = ((p.x - self.origin.x) / self.step).round();
        let j = ((p.y - self.origin.y) / self.step).round();
        LatticeCoord::new(
            i.clamp(i32::MIN as f64, i32::MAX as f64) as i32,
            j.clamp(i32::MIN as f64, i32::MAX as f64) as i32,
        )
    }

    pub fn to_world(&self, c: LatticeCoord) -> Point<f64> {
        Point::new(
            self.origin.x + c.i as f64 * self.step,
            self.origin.y + c.j as f64 * self.step,
        )
    }
}
