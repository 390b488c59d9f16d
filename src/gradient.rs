//! Gradient magnitude over a structured grid.
//!
//! Central differences are taken on interior samples only; the six faces of
//! the grid are forced to zero afterwards. Each field's derivative is scaled
//! by the inverse of its observed range so that fields with different units
//! contribute comparably.
//!
//! With one field the magnitude is the norm of its 3D gradient. With several
//! fields the per-field gradients form a 3 x N matrix `Df`; the magnitude is
//! the Frobenius norm of the 3 x 3 structure tensor `Df * Df^T`.

use log::debug;
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::dataset::field::FieldDescriptor;
use crate::dataset::grid::StructuredGrid;
use crate::dataset::mask::ValidityMask;
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct Gradient {
    /// Field indices this gradient was computed from, sorted and unique.
    pub indices: Vec<usize>,
    /// Per-sample magnitude, `dims[0] * dims[1] * dims[2]` entries.
    pub values: Vec<f32>,
    /// Largest interior magnitude over valid samples.
    pub max_magnitude: f32,
}

impl Gradient {
    /// Whether this gradient covers exactly `indices`, in any order.
    pub fn covers(&self, indices: &[usize]) -> bool {
        canonical_indices(indices) == self.indices
    }

    /// Magnitude at `sample` rescaled to `[0, 1]`.
    pub fn normalized(&self, sample: usize) -> f32 {
        match self.values.get(sample) {
            Some(&v) if self.max_magnitude > 0.0 => (v / self.max_magnitude).min(1.0),
            _ => 0.0,
        }
    }
}

/// Sorted, de-duplicated copy of a field index set.
pub fn canonical_indices(indices: &[usize]) -> Vec<usize> {
    let mut v = indices.to_vec();
    v.sort_unstable();
    v.dedup();
    v
}

/// Per-field inputs resolved once before the parallel pass.
struct Source<'a> {
    field: &'a FieldDescriptor,
    inv_range: f64,
}

impl Source<'_> {
    fn at(&self, sample: usize) -> f64 {
        self.field.tuple_value(sample).unwrap_or(0.0)
    }
}

/// Compute the gradient magnitude of `fields` (indexed by `indices`) over
/// `grid`. Every field must be loaded and hold one tuple per sample.
pub fn compute_gradient(
    grid: &StructuredGrid,
    fields: &[(usize, &FieldDescriptor)],
    mask: Option<&ValidityMask>,
) -> Result<Gradient> {
    let n = grid.sample_count();
    let mut sources = Vec::with_capacity(fields.len());
    for &(index, field) in fields {
        if !field.is_loaded() {
            return Err(Error::FieldNotLoaded(index));
        }
        if field.n_tuples != n {
            return Err(Error::BufferMismatch(n, field.n_tuples));
        }
        let inv_range = match field.range() {
            Some((min, max)) if max > min => 1.0 / (max - min),
            _ => 0.0,
        };
        sources.push(Source { field, inv_range });
    }

    let indices = canonical_indices(&fields.iter().map(|&(i, _)| i).collect::<Vec<_>>());
    let mut values = vec![0.0f32; n];
    let max_magnitude = Mutex::new(0.0f32);
    let [nx, ny, nz] = grid.dims;

    if n > 0 && !sources.is_empty() && nx >= 3 && ny >= 3 && nz >= 3 {
        let slice_len = nx * ny;
        let inv_2h = grid.spacing.map(|h| if h != 0.0 { 0.5 / h } else { 0.0 });
        let strides = [1, nx, nx * ny];

        values
            .par_chunks_mut(slice_len)
            .enumerate()
            .filter(|(z, _)| *z > 0 && *z + 1 < nz)
            .for_each(|(z, slice)| {
                let mut local_max = 0.0f32;
                let mut df = vec![[0.0f64; 3]; sources.len()];

                for y in 1..ny - 1 {
                    for x in 1..nx - 1 {
                        let sample = grid.index(x, y, z);
                        if mask.map_or(false, |m| !m.is_valid(sample)) {
                            continue;
                        }
                        for (k, src) in sources.iter().enumerate() {
                            for axis in 0..3 {
                                let d = src.at(sample + strides[axis]) - src.at(sample - strides[axis]);
                                df[k][axis] = d * inv_2h[axis] * src.inv_range;
                            }
                        }
                        let magnitude = magnitude(&df) as f32;
                        if !magnitude.is_finite() {
                            continue;
                        }
                        slice[x + nx * y] = magnitude;
                        local_max = local_max.max(magnitude);
                    }
                }

                let mut global = max_magnitude.lock();
                *global = global.max(local_max);
            });
    }

    zero_boundary(grid, &mut values);

    let max_magnitude = max_magnitude.into_inner();
    debug!(
        "Gradient over fields {:?}: {} samples, max magnitude {}",
        indices, n, max_magnitude
    );
    Ok(Gradient {
        indices,
        values,
        max_magnitude,
    })
}

/// Norm of a single gradient, or Frobenius norm of `Df * Df^T` for several.
fn magnitude(df: &[[f64; 3]]) -> f64 {
    if let [g] = df {
        return (g[0] * g[0] + g[1] * g[1] + g[2] * g[2]).sqrt();
    }
    let mut sum = 0.0;
    for i in 0..3 {
        for j in 0..3 {
            let g: f64 = df.iter().map(|col| col[i] * col[j]).sum();
            sum += g * g;
        }
    }
    sum.sqrt()
}

/// Force all six faces to exactly zero.
fn zero_boundary(grid: &StructuredGrid, values: &mut [f32]) {
    let [nx, ny, nz] = grid.dims;
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                if grid.is_boundary(x, y, z) {
                    values[grid.index(x, y, z)] = 0.0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::field::FieldValues;
    use crate::dtype::FieldFormat;

    fn field_from(grid: &StructuredGrid, f: impl Fn(usize, usize, usize) -> f32) -> FieldDescriptor {
        let n = grid.sample_count();
        let values = (0..n)
            .map(|i| {
                let [x, y, z] = grid.coords(i);
                f(x, y, z)
            })
            .collect();
        let mut d = FieldDescriptor::new("f", FieldFormat::F32, 1, n);
        d.set_values(FieldValues::F32(values)).unwrap();
        d.reduce(None).unwrap();
        d
    }

    #[test]
    fn test_boundary_is_zero_on_all_faces() {
        let grid = StructuredGrid::new([4, 4, 4], [1.0; 3]);
        let f = field_from(&grid, |x, y, z| ((x * x * 1000 + y * 37 + z * z * z * 500) as f32));
        let g = compute_gradient(&grid, &[(0, &f)], None).unwrap();

        assert_eq!(g.values.len(), 64);
        for i in 0..64 {
            let [x, y, z] = grid.coords(i);
            if grid.is_boundary(x, y, z) {
                assert_eq!(g.values[i], 0.0, "sample {:?} on a face", (x, y, z));
            } else {
                assert!(g.values[i] > 0.0);
            }
        }
        assert!(g.max_magnitude > 0.0);
    }

    #[test]
    fn test_linear_ramp_has_constant_gradient() {
        let grid = StructuredGrid::new([5, 5, 5], [0.5, 1.0, 1.0]);
        // Range is 4 (x from 0 to 4); d/dx = 1 per index = 2 per unit length.
        let f = field_from(&grid, |x, _, _| x as f32);
        let g = compute_gradient(&grid, &[(0, &f)], None).unwrap();
        let centre = grid.index(2, 2, 2);
        assert!((g.values[centre] - 0.5).abs() < 1e-6);
        assert!((g.max_magnitude - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_masked_samples_are_zero_and_ignored() {
        let grid = StructuredGrid::new([5, 5, 5], [1.0; 3]);
        let f = field_from(&grid, |x, y, z| if (x, y, z) == (2, 2, 2) { 0.0 } else { (x * y * z) as f32 });
        let mut mask = ValidityMask::all_valid(125);
        mask.invalidate(grid.index(2, 2, 2));
        let g = compute_gradient(&grid, &[(0, &f)], Some(&mask)).unwrap();
        assert_eq!(g.values[grid.index(2, 2, 2)], 0.0);
    }

    #[test]
    fn test_multi_field_uses_structure_tensor_norm() {
        let grid = StructuredGrid::new([3, 3, 3], [1.0; 3]);
        let a = field_from(&grid, |x, _, _| x as f32);
        let b = field_from(&grid, |_, y, _| y as f32);
        let g = compute_gradient(&grid, &[(3, &b), (1, &a)], None).unwrap();
        assert_eq!(g.indices, vec![1, 3]);
        // Each normalised derivative is 0.5 along its own axis, so G has two
        // diagonal entries of 0.25 and the norm is sqrt(2) * 0.25.
        let centre = grid.index(1, 1, 1);
        let expected = (2.0f32).sqrt() * 0.25;
        assert!((g.values[centre] - expected).abs() < 1e-6);
        assert!(g.covers(&[3, 1]));
        assert!(!g.covers(&[1]));
    }

    #[test]
    fn test_flat_grid_is_all_boundary() {
        let grid = StructuredGrid::new([6, 6, 2], [1.0; 3]);
        let f = field_from(&grid, |x, y, _| (x + y) as f32);
        let g = compute_gradient(&grid, &[(0, &f)], None).unwrap();
        assert!(g.values.iter().all(|&v| v == 0.0));
        assert_eq!(g.max_magnitude, 0.0);
        assert_eq!(g.normalized(0), 0.0);
    }

    #[test]
    fn test_unloaded_field_is_rejected() {
        let grid = StructuredGrid::new([3, 3, 3], [1.0; 3]);
        let f = FieldDescriptor::new("f", FieldFormat::F32, 1, 27);
        assert!(matches!(
            compute_gradient(&grid, &[(2, &f)], None),
            Err(Error::FieldNotLoaded(2))
        ));
    }
}
