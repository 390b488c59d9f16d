//! Dataset model: a lattice, its fields, the validity mask they share and
//! the gradients computed from them.

pub mod field;
pub mod grid;
pub mod mask;
pub mod source;
pub mod store;
pub mod subdataset;

use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::gradient::{compute_gradient, Gradient};
use crate::transfer_function::TransferFunction;

pub use field::{FieldDescriptor, FieldValues};
pub use grid::StructuredGrid;
pub use mask::ValidityMask;
pub use source::{DatasetLayout, DatasetSource, MemoryDataset, MemorySource};
pub use store::{DatasetStore, GroupKind, SubDatasetGroup};
pub use subdataset::{
    Owner, SubDataset, SubDatasetChanges, SubDatasetKey, SubDatasetListener, SubDatasetState,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DatasetKind {
    /// Structured grid; fields carry one tuple per lattice sample.
    Vtk,
    /// Unstructured point cloud.
    CloudPoint,
}

pub struct Dataset {
    id: i32,
    path: String,
    kind: DatasetKind,
    grid: StructuredGrid,
    point_fields: Vec<FieldDescriptor>,
    cell_fields: Vec<FieldDescriptor>,
    /// Shared by every point field; `None` for point clouds.
    mask: Option<ValidityMask>,
    gradients: Mutex<Vec<Arc<Gradient>>>,
}

impl Dataset {
    pub fn new(id: i32, path: impl Into<String>, kind: DatasetKind, layout: DatasetLayout) -> Self {
        let mask = match kind {
            DatasetKind::Vtk => Some(ValidityMask::all_valid(layout.grid.sample_count())),
            DatasetKind::CloudPoint => None,
        };
        Self {
            id,
            path: path.into(),
            kind,
            grid: layout.grid,
            point_fields: layout.point_fields,
            cell_fields: layout.cell_fields,
            mask,
            gradients: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn grid(&self) -> &StructuredGrid {
        &self.grid
    }

    pub fn mask(&self) -> Option<&ValidityMask> {
        self.mask.as_ref()
    }

    pub fn point_fields(&self) -> &[FieldDescriptor] {
        &self.point_fields
    }

    pub fn cell_fields(&self) -> &[FieldDescriptor] {
        &self.cell_fields
    }

    /// Point field by index; `None` past the end.
    pub fn field(&self, index: usize) -> Option<&FieldDescriptor> {
        self.point_fields.get(index)
    }

    pub fn cell_field(&self, index: usize) -> Option<&FieldDescriptor> {
        self.cell_fields.get(index)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.point_fields.iter().position(|f| f.name == name)
    }

    /// Attach values to a point field. Cached gradients that used it are
    /// dropped.
    pub fn set_field_values(&mut self, index: usize, values: FieldValues) -> Result<()> {
        let field = self
            .point_fields
            .get_mut(index)
            .ok_or(Error::FieldIndexOutOfRange(index))?;
        field.set_values(values)?;
        self.gradients.lock().retain(|g| !g.indices.contains(&index));
        Ok(())
    }

    pub fn set_cell_values(&mut self, index: usize, values: FieldValues) -> Result<()> {
        self.cell_fields
            .get_mut(index)
            .ok_or(Error::FieldIndexOutOfRange(index))?
            .set_values(values)
    }

    /// Run the min/max reduction of a point field against the shared mask.
    /// NaN samples found here are excluded for every field from now on.
    pub fn reduce_field(&mut self, index: usize) -> Result<Option<(f64, f64)>> {
        let field = self
            .point_fields
            .get_mut(index)
            .ok_or(Error::FieldIndexOutOfRange(index))?;
        if !field.is_loaded() {
            return Err(Error::FieldNotLoaded(index));
        }
        let range = field.reduce(self.mask.as_mut())?;
        debug!(
            "Dataset {} field {} '{}' range {:?}",
            self.id, index, field.name, range
        );
        self.gradients.get_mut().clear();
        Ok(range)
    }

    pub fn reduce_cell_field(&mut self, index: usize) -> Result<Option<(f64, f64)>> {
        let field = self
            .cell_fields
            .get_mut(index)
            .ok_or(Error::FieldIndexOutOfRange(index))?;
        if !field.is_loaded() {
            return Err(Error::FieldNotLoaded(index));
        }
        field.reduce(None)
    }

    /// Gradient magnitude over the given point fields, computed once and
    /// cached for any later request with the same set.
    pub fn gradient(&self, indices: &[usize]) -> Result<Arc<Gradient>> {
        if let Some(g) = self.gradients.lock().iter().find(|g| g.covers(indices)) {
            return Ok(Arc::clone(g));
        }

        let mut fields = Vec::with_capacity(indices.len());
        for &i in indices {
            let field = self.field(i).ok_or(Error::FieldIndexOutOfRange(i))?;
            fields.push((i, field));
        }
        let gradient = Arc::new(compute_gradient(&self.grid, &fields, self.mask.as_ref())?);
        info!(
            "Dataset {}: computed gradient over fields {:?}",
            self.id, gradient.indices
        );

        let mut cache = self.gradients.lock();
        if let Some(g) = cache.iter().find(|g| g.covers(indices)) {
            return Ok(Arc::clone(g));
        }
        cache.push(Arc::clone(&gradient));
        Ok(gradient)
    }

    /// Transfer-function input for one sample: normalized scalar values in
    /// coordinate order, and the normalized gradient in the last slot when
    /// the function uses it. `None` for masked or unloaded samples.
    pub fn tf_coordinates(
        &self,
        tf: &TransferFunction,
        gradient: Option<&Gradient>,
        sample: usize,
    ) -> Option<Vec<f32>> {
        if self.mask.as_ref().map_or(false, |m| !m.is_valid(sample)) {
            return None;
        }
        let dim = tf.dimension();
        let mut coords = vec![0.0f32; dim];
        let scalar_slots = if tf.has_gradient() { dim.saturating_sub(1) } else { dim };
        for (slot, &index) in tf.scalar_fields().iter().take(scalar_slots).enumerate() {
            coords[slot] = self.field(index)?.normalized(sample)? as f32;
        }
        if tf.has_gradient() && dim > 0 {
            coords[dim - 1] = gradient?.normalized(sample);
        }
        Some(coords)
    }

    /// Evaluate a transfer function on every sample: `(alpha, color)` pairs,
    /// with masked or undefined samples fully transparent.
    pub fn classify(&self, tf: &TransferFunction) -> Result<Vec<(f32, f32)>> {
        let gradient = if tf.has_gradient() {
            Some(self.gradient(tf.scalar_fields())?)
        } else {
            None
        };

        let n = self.grid.sample_count();
        Ok((0..n)
            .map(|sample| match self.tf_coordinates(tf, gradient.as_deref(), sample) {
                Some(coords) => {
                    let alpha = tf.compute_alpha(&coords);
                    if alpha < 0.0 {
                        (0.0, 0.0)
                    } else {
                        (alpha, tf.compute_color(&coords))
                    }
                }
                None => (0.0, 0.0),
            })
            .collect())
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("dims", &self.grid.dims)
            .field("point_fields", &self.point_fields.len())
            .field("cell_fields", &self.cell_fields.len())
            .finish()
    }
}
