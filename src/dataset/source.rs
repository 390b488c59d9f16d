//! Where datasets come from: the parser seam between a dataset path and the
//! dataset model.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::dataset::field::{FieldDescriptor, FieldValues};
use crate::dataset::grid::StructuredGrid;
use crate::dtype::FieldFormat;
use crate::error::{Error, Result};

/// Header of a dataset: its lattice and the descriptors of every field,
/// without values.
#[derive(Clone, Debug)]
pub struct DatasetLayout {
    pub grid: StructuredGrid,
    pub point_fields: Vec<FieldDescriptor>,
    pub cell_fields: Vec<FieldDescriptor>,
}

/// Turns a dataset path into field descriptors and typed value buffers.
///
/// `describe` runs on the decoding thread and must only read headers;
/// values are loaded later through `load_point_values`/`load_cell_values`.
pub trait DatasetSource: Send + Sync {
    fn describe(&self, path: &str) -> Result<DatasetLayout>;

    fn load_point_values(&self, path: &str, index: usize) -> Result<FieldValues>;

    fn load_cell_values(&self, path: &str, index: usize) -> Result<FieldValues>;
}

/// A dataset held entirely in memory.
#[derive(Clone, Debug)]
pub struct MemoryDataset {
    grid: StructuredGrid,
    point_fields: Vec<(FieldDescriptor, FieldValues)>,
    cell_fields: Vec<(FieldDescriptor, FieldValues)>,
}

impl MemoryDataset {
    pub fn new(grid: StructuredGrid) -> Self {
        Self {
            grid,
            point_fields: Vec::new(),
            cell_fields: Vec::new(),
        }
    }

    /// Add a point field. The tuple count is derived from the buffer length.
    pub fn with_point_field(
        mut self,
        name: &str,
        n_values_per_tuple: usize,
        values: FieldValues,
    ) -> Self {
        let desc = descriptor(name, n_values_per_tuple, &values);
        self.point_fields.push((desc, values));
        self
    }

    pub fn with_cell_field(mut self, name: &str, n_values_per_tuple: usize, values: FieldValues) -> Self {
        let desc = descriptor(name, n_values_per_tuple, &values);
        self.cell_fields.push((desc, values));
        self
    }

    /// Add a point field stored as a big-endian raw buffer.
    pub fn with_raw_point_field(
        self,
        name: &str,
        format: FieldFormat,
        n_values_per_tuple: usize,
        bytes: &[u8],
    ) -> Result<Self> {
        let values = FieldValues::from_be_bytes(format, bytes)?;
        Ok(self.with_point_field(name, n_values_per_tuple, values))
    }

    fn layout(&self) -> DatasetLayout {
        DatasetLayout {
            grid: self.grid.clone(),
            point_fields: self.point_fields.iter().map(|(d, _)| d.clone()).collect(),
            cell_fields: self.cell_fields.iter().map(|(d, _)| d.clone()).collect(),
        }
    }
}

fn descriptor(name: &str, n_values_per_tuple: usize, values: &FieldValues) -> FieldDescriptor {
    let k = n_values_per_tuple.max(1);
    FieldDescriptor::new(name, values.format(), k, values.len() / k)
}

/// In-memory `DatasetSource`, keyed by path.
#[derive(Default)]
pub struct MemorySource {
    datasets: RwLock<HashMap<String, MemoryDataset>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, dataset: MemoryDataset) {
        self.datasets.write().insert(path.into(), dataset);
    }

    fn values(
        &self,
        path: &str,
        index: usize,
        pick: impl Fn(&MemoryDataset) -> &[(FieldDescriptor, FieldValues)],
    ) -> Result<FieldValues> {
        let datasets = self.datasets.read();
        let dataset = datasets
            .get(path)
            .ok_or_else(|| Error::UnknownSource(path.to_string()))?;
        pick(dataset)
            .get(index)
            .map(|(_, v)| v.clone())
            .ok_or(Error::FieldIndexOutOfRange(index))
    }
}

impl DatasetSource for MemorySource {
    fn describe(&self, path: &str) -> Result<DatasetLayout> {
        self.datasets
            .read()
            .get(path)
            .map(MemoryDataset::layout)
            .ok_or_else(|| Error::UnknownSource(path.to_string()))
    }

    fn load_point_values(&self, path: &str, index: usize) -> Result<FieldValues> {
        self.values(path, index, |d| d.point_fields.as_slice())
    }

    fn load_cell_values(&self, path: &str, index: usize) -> Result<FieldValues> {
        self.values(path, index, |d| d.cell_fields.as_slice())
    }
}
