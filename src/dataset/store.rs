//! Owning tables for datasets, sub-datasets and sub-dataset groups.
//!
//! Entities refer to each other by id only. A group lists its members by
//! key and each member records its group id; every mutation here keeps both
//! sides in agreement.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use log::{debug, info};

use crate::dataset::subdataset::{Owner, SubDataset, SubDatasetKey};
use crate::dataset::Dataset;
use crate::error::{Error, Result};

/// How members of a group relate to its base sub-dataset.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GroupKind {
    /// Every member mirrors the transformations of the others.
    Symmetric = 0,
    /// Members are stacked copies that follow the base.
    Subjective = 1,
}

impl GroupKind {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(GroupKind::Symmetric),
            1 => Some(GroupKind::Subjective),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubDatasetGroup {
    pub id: i32,
    pub kind: GroupKind,
    pub base: SubDatasetKey,
    members: BTreeSet<SubDatasetKey>,
}

impl SubDatasetGroup {
    /// Members in key order, the base included.
    pub fn members(&self) -> impl Iterator<Item = SubDatasetKey> + '_ {
        self.members.iter().copied()
    }

    pub fn contains(&self, key: SubDatasetKey) -> bool {
        self.members.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Default)]
pub struct DatasetStore {
    datasets: HashMap<i32, Dataset>,
    subdatasets: HashMap<SubDatasetKey, Arc<SubDataset>>,
    groups: HashMap<i32, SubDatasetGroup>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------------
    // Datasets
    // ---------------------------------------------------------------------

    /// Insert a dataset, replacing (and fully removing) any previous one with
    /// the same id.
    pub fn add_dataset(&mut self, dataset: Dataset) {
        let id = dataset.id();
        if self.datasets.contains_key(&id) {
            let _ = self.remove_dataset(id);
        }
        info!("Added dataset {} ({})", id, dataset.path());
        self.datasets.insert(id, dataset);
    }

    pub fn dataset(&self, id: i32) -> Option<&Dataset> {
        self.datasets.get(&id)
    }

    pub fn dataset_mut(&mut self, id: i32) -> Option<&mut Dataset> {
        self.datasets.get_mut(&id)
    }

    pub fn dataset_ids(&self) -> Vec<i32> {
        let mut ids: Vec<_> = self.datasets.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Remove a dataset together with all of its sub-datasets.
    pub fn remove_dataset(&mut self, id: i32) -> Result<Dataset> {
        let dataset = self.datasets.remove(&id).ok_or(Error::UnknownDataset(id))?;
        for key in self.subdataset_keys_of(id) {
            self.remove_subdataset(key)?;
        }
        info!("Removed dataset {}", id);
        Ok(dataset)
    }

    // ---------------------------------------------------------------------
    // Sub-datasets
    // ---------------------------------------------------------------------

    pub fn add_subdataset(
        &mut self,
        key: SubDatasetKey,
        name: &str,
        owner: Owner,
    ) -> Result<Arc<SubDataset>> {
        if !self.datasets.contains_key(&key.dataset_id) {
            return Err(Error::UnknownDataset(key.dataset_id));
        }
        if self.subdatasets.contains_key(&key) {
            self.remove_subdataset(key)?;
        }
        let sd = Arc::new(SubDataset::new(key, name, owner));
        self.subdatasets.insert(key, Arc::clone(&sd));
        debug!("Added sub-dataset {:?} '{}'", key, name);
        Ok(sd)
    }

    pub fn subdataset(&self, key: SubDatasetKey) -> Option<&Arc<SubDataset>> {
        self.subdatasets.get(&key)
    }

    /// Like `subdataset`, for callers that treat a miss as an error.
    pub fn require_subdataset(&self, key: SubDatasetKey) -> Result<&Arc<SubDataset>> {
        self.subdatasets.get(&key).ok_or(Error::UnknownSubDataset {
            dataset_id: key.dataset_id,
            subdataset_id: key.subdataset_id,
        })
    }

    pub fn subdataset_keys_of(&self, dataset_id: i32) -> Vec<SubDatasetKey> {
        let mut keys: Vec<_> = self
            .subdatasets
            .keys()
            .filter(|k| k.dataset_id == dataset_id)
            .copied()
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn subdatasets(&self) -> impl Iterator<Item = &Arc<SubDataset>> {
        self.subdatasets.values()
    }

    /// Remove a sub-dataset. If it was the base of a group the whole group is
    /// dissolved; otherwise it just leaves its group.
    pub fn remove_subdataset(&mut self, key: SubDatasetKey) -> Result<Arc<SubDataset>> {
        let sd = self
            .subdatasets
            .remove(&key)
            .ok_or(Error::UnknownSubDataset {
                dataset_id: key.dataset_id,
                subdataset_id: key.subdataset_id,
            })?;

        if let Some(group_id) = sd.group() {
            let is_base = self.groups.get(&group_id).map_or(false, |g| g.base == key);
            if is_base {
                self.remove_group(group_id)?;
            } else if let Some(group) = self.groups.get_mut(&group_id) {
                group.members.remove(&key);
            }
            sd.set_group(None);
        }
        debug!("Removed sub-dataset {:?}", key);
        Ok(sd)
    }

    // ---------------------------------------------------------------------
    // Groups
    // ---------------------------------------------------------------------

    /// Create a group around `base`, which becomes its first member.
    pub fn add_group(&mut self, id: i32, kind: GroupKind, base: SubDatasetKey) -> Result<()> {
        self.require_subdataset(base)?;
        if self.groups.contains_key(&id) {
            self.remove_group(id)?;
        }
        self.groups.insert(
            id,
            SubDatasetGroup {
                id,
                kind,
                base,
                members: BTreeSet::new(),
            },
        );
        self.add_to_group(id, base)
    }

    pub fn group(&self, id: i32) -> Option<&SubDatasetGroup> {
        self.groups.get(&id)
    }

    /// Move a sub-dataset into a group, leaving its previous group first.
    pub fn add_to_group(&mut self, group_id: i32, key: SubDatasetKey) -> Result<()> {
        if !self.groups.contains_key(&group_id) {
            return Err(Error::UnknownGroup(group_id));
        }
        let sd = Arc::clone(self.require_subdataset(key)?);

        if let Some(previous) = sd.group() {
            if previous == group_id {
                return Ok(());
            }
            if let Some(group) = self.groups.get_mut(&previous) {
                group.members.remove(&key);
            }
        }
        if let Some(group) = self.groups.get_mut(&group_id) {
            group.members.insert(key);
        }
        sd.set_group(Some(group_id));
        Ok(())
    }

    /// Dissolve a group. Its members stay in the store without a group.
    pub fn remove_group(&mut self, id: i32) -> Result<SubDatasetGroup> {
        let group = self.groups.remove(&id).ok_or(Error::UnknownGroup(id))?;
        for key in &group.members {
            if let Some(sd) = self.subdatasets.get(key) {
                sd.set_group(None);
            }
        }
        Ok(group)
    }
}
