/// Regularly spaced 3D sample lattice. Samples are stored x-fastest.
#[derive(Clone, Debug, PartialEq)]
pub struct StructuredGrid {
    pub dims: [usize; 3],
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
}

impl StructuredGrid {
    pub fn new(dims: [usize; 3], spacing: [f64; 3]) -> Self {
        Self {
            dims,
            spacing,
            origin: [0.0; 3],
        }
    }

    /// Unstructured point sets are laid out as an `n x 1 x 1` line.
    pub fn points(n: usize) -> Self {
        Self::new([n, 1, 1], [1.0; 3])
    }

    pub fn sample_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.dims[0] * (y + self.dims[1] * z)
    }

    pub fn coords(&self, index: usize) -> [usize; 3] {
        let [nx, ny, _] = self.dims;
        [index % nx, (index / nx) % ny, index / (nx * ny)]
    }

    /// True for samples on any of the six faces.
    pub fn is_boundary(&self, x: usize, y: usize, z: usize) -> bool {
        let [nx, ny, nz] = self.dims;
        x == 0 || y == 0 || z == 0 || x + 1 >= nx || y + 1 >= ny || z + 1 >= nz
    }

    /// World-space position of a sample.
    pub fn position(&self, x: usize, y: usize, z: usize) -> [f64; 3] {
        [
            self.origin[0] + x as f64 * self.spacing[0],
            self.origin[1] + y as f64 * self.spacing[1],
            self.origin[2] + z as f64 * self.spacing[2],
        ]
    }
}
