/// Cell of the implicit search lattice, counted in steps from the lattice origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LatticeCoord {
    pub i: i32,
    pub j: i32,
}

impl LatticeCoord {
    pub fn new(i: i32, j: i32) -> Self {
        Self { i, j }
    }

    pub fn offset(self, di: i32, dj: i32) -> Self {
        Self::new(self.i + di, self.j + dj)
    }
}
