//! The application side of the stream: applies every decoded message to the
//! dataset store and keeps the collaboration state (headsets, tablet,
//! selection, anchoring).
//!
//! `on_message` runs on the transport's reading thread. It only parses
//! dataset headers; field values are loaded and reduced later by
//! `load_pending`, on whichever thread the host chooses.

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::dataset::{
    Dataset, DatasetKind, DatasetSource, DatasetStore, GroupKind, Owner, SubDataset,
    SubDatasetKey, ValidityMask,
};
use crate::error::{Error, Result};
use crate::protocol::kinds::{HeadsetBindingInfo, HeadsetStatus, Location, TabletScale};
use crate::protocol::{Message, MessageListener};
use crate::transfer_function::TransferFunction;

/// Progress of the spatial-anchor exchange.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Anchoring {
    #[default]
    Idle,
    /// Segments received so far, concatenated.
    Receiving(Vec<u8>),
    /// The exchange ended; the data is kept only on success.
    Finished { succeeded: bool, data: Vec<u8> },
}

/// Collaboration state that is not attached to a dataset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    /// This client's own binding, once the server has assigned one.
    pub binding: Option<HeadsetBindingInfo>,
    /// Last broadcast of every connected headset.
    pub headsets: Vec<HeadsetStatus>,
    pub current_action: i32,
    pub tablet_location: Location,
    pub tablet_scale: TabletScale,
    pub lasso: Vec<[f32; 2]>,
    /// Boolean operations of the selection inputs added since the last reset.
    pub selection_inputs: Vec<i16>,
    pub confirmed_selections: Vec<SubDatasetKey>,
    pub anchoring: Anchoring,
}

/// Field values still to be loaded for a dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PendingLoad {
    dataset_id: i32,
    path: String,
    point_fields: Vec<usize>,
    cell_fields: Vec<usize>,
}

pub struct Session {
    store: Arc<RwLock<DatasetStore>>,
    source: Arc<dyn DatasetSource>,
    state: Mutex<SessionState>,
    pending: Mutex<Vec<PendingLoad>>,
}

impl Session {
    pub fn new(source: Arc<dyn DatasetSource>) -> Self {
        Self::with_store(source, Arc::new(RwLock::new(DatasetStore::new())))
    }

    pub fn with_store(source: Arc<dyn DatasetSource>, store: Arc<RwLock<DatasetStore>>) -> Self {
        Self {
            store,
            source,
            state: Mutex::new(SessionState::default()),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> Arc<RwLock<DatasetStore>> {
        Arc::clone(&self.store)
    }

    /// Copy of the collaboration state.
    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Number of datasets whose values are still to be loaded.
    pub fn pending_loads(&self) -> usize {
        self.pending.lock().len()
    }

    /// Load and reduce the field values requested by dataset messages received
    /// so far. Returns the number of fields loaded.
    ///
    /// Values are read from the source without holding the store lock. A
    /// dataset removed in the meantime is skipped. A job that fails is logged
    /// and dropped; the remaining jobs still run and the first error is
    /// returned once they are done.
    pub fn load_pending(&self) -> Result<usize> {
        let jobs = std::mem::take(&mut *self.pending.lock());
        let mut loaded = 0;
        let mut first_error = None;

        for job in jobs {
            match self.load_job(&job) {
                Ok(n) => loaded += n,
                Err(e) => {
                    warn!("Dataset {}: could not load {}: {}", job.dataset_id, job.path, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(loaded),
        }
    }

    fn load_job(&self, job: &PendingLoad) -> Result<usize> {
        let mut point_values = Vec::with_capacity(job.point_fields.len());
        for &i in &job.point_fields {
            point_values.push((i, self.source.load_point_values(&job.path, i)?));
        }
        let mut cell_values = Vec::with_capacity(job.cell_fields.len());
        for &i in &job.cell_fields {
            cell_values.push((i, self.source.load_cell_values(&job.path, i)?));
        }

        let mut store = self.store.write();
        let Some(dataset) = store.dataset_mut(job.dataset_id) else {
            debug!("Dataset {} was removed before loading", job.dataset_id);
            return Ok(0);
        };
        let mut loaded = 0;
        for (i, values) in point_values {
            dataset.set_field_values(i, values)?;
            dataset.reduce_field(i)?;
            loaded += 1;
        }
        for (i, values) in cell_values {
            dataset.set_cell_values(i, values)?;
            dataset.reduce_cell_field(i)?;
            loaded += 1;
        }
        info!("Dataset {}: loaded field values from {}", job.dataset_id, job.path);
        Ok(loaded)
    }

    /// Apply one message. Errors leave the store unchanged.
    pub fn apply(&self, message: &Message) -> Result<()> {
        match message {
            Message::AddVtkDataset(m) => {
                let point_fields = field_indices(&m.pt_field_indices);
                let cell_fields = field_indices(&m.cell_field_indices);
                self.add_dataset(m.dataset_id, &m.path, DatasetKind::Vtk, point_fields, cell_fields)
            }
            Message::AddCloudPointDataset(m) => {
                self.add_dataset(m.dataset_id, &m.path, DatasetKind::CloudPoint, vec![0], Vec::new())
            }
            Message::RemoveDataset(m) => {
                self.pending.lock().retain(|p| p.dataset_id != m.dataset_id);
                self.store.write().remove_dataset(m.dataset_id).map(drop)
            }
            Message::AddSubDataset(m) => {
                let key = SubDatasetKey::new(m.dataset_id, m.subdataset_id);
                self.store
                    .write()
                    .add_subdataset(key, &m.name, Owner::from_id(m.owner_id))
                    .map(drop)
            }
            Message::RemoveSubDataset(m) => {
                let key = SubDatasetKey::new(m.dataset_id, m.subdataset_id);
                self.store.write().remove_subdataset(key).map(drop)
            }
            Message::RenameSubDataset(m) => {
                self.with_subdataset(m.dataset_id, m.subdataset_id, |sd| sd.set_name(&m.name))
            }
            Message::MoveDataset(m) => {
                self.with_subdataset(m.dataset_id, m.subdataset_id, |sd| sd.set_position(m.position))
            }
            Message::RotateDataset(m) => {
                self.with_subdataset(m.dataset_id, m.subdataset_id, |sd| sd.set_rotation(m.rotation))
            }
            Message::ScaleDataset(m) => {
                self.with_subdataset(m.dataset_id, m.subdataset_id, |sd| sd.set_scale(m.scale))
            }
            Message::TfDataset(m) => {
                let tf = TransferFunction::from_payload(&m.tf).map(Arc::new);
                self.with_subdataset(m.dataset_id, m.subdataset_id, |sd| {
                    sd.set_transfer_function(tf)
                })
            }
            Message::SubDatasetOwner(m) => self.with_subdataset(m.dataset_id, m.subdataset_id, |sd| {
                sd.set_owner(Owner::from_id(m.headset_id))
            }),
            Message::SubDatasetLockOwner(m) => {
                let lock = (m.headset_id >= 0).then_some(m.headset_id);
                self.with_subdataset(m.dataset_id, m.subdataset_id, |sd| sd.set_lock_owner(lock))
            }
            Message::SubDatasetClipping(m) => self.with_subdataset(m.dataset_id, m.subdataset_id, |sd| {
                sd.set_depth_clipping(m.min_depth, m.max_depth)
            }),
            Message::SubDatasetVisibility(m) => {
                self.with_subdataset(m.dataset_id, m.subdataset_id, |sd| sd.set_visible(m.visible))
            }
            Message::VolumetricMask(m) => {
                let (samples, sd) = {
                    let store = self.store.read();
                    let samples = store
                        .dataset(m.dataset_id)
                        .map(|d| d.grid().sample_count())
                        .ok_or(Error::UnknownDataset(m.dataset_id))?;
                    let key = SubDatasetKey::new(m.dataset_id, m.subdataset_id);
                    (samples, Arc::clone(store.require_subdataset(key)?))
                };
                let mask = m.enabled.then(|| ValidityMask::from_bytes(&m.mask, samples));
                sd.set_volumetric_mask(mask);
                Ok(())
            }
            Message::ResetVolumetricSelection(m) => {
                debug!("Headset {} reset the volumetric selection", m.headset_id);
                let subdatasets: Vec<_> = self.store.read().subdatasets().cloned().collect();
                for sd in subdatasets {
                    sd.set_volumetric_mask(None);
                }
                let mut state = self.state.lock();
                state.lasso.clear();
                state.selection_inputs.clear();
                Ok(())
            }
            Message::HeadsetBindingInfo(m) => {
                info!("Bound as headset {} (color {:#08x})", m.headset_id, m.color);
                self.state.lock().binding = Some(m.clone());
                Ok(())
            }
            Message::HeadsetsStatus(m) => {
                self.state.lock().headsets = m.headsets.clone();
                Ok(())
            }
            Message::StartAnchoring => {
                self.state.lock().anchoring = Anchoring::Receiving(Vec::new());
                Ok(())
            }
            Message::AnchoringDataSegment(m) => {
                let mut state = self.state.lock();
                match &mut state.anchoring {
                    Anchoring::Receiving(data) => data.extend_from_slice(&m.data),
                    other => *other = Anchoring::Receiving(m.data.clone()),
                }
                Ok(())
            }
            Message::AnchoringDataStatus(m) => {
                let mut state = self.state.lock();
                let data = match std::mem::take(&mut state.anchoring) {
                    Anchoring::Receiving(data) if m.succeeded => data,
                    _ => Vec::new(),
                };
                state.anchoring = Anchoring::Finished {
                    succeeded: m.succeeded,
                    data,
                };
                Ok(())
            }
            Message::CurrentAction(m) => {
                self.state.lock().current_action = m.action;
                Ok(())
            }
            Message::Location(m) => {
                self.state.lock().tablet_location = m.clone();
                Ok(())
            }
            Message::TabletScale(m) => {
                self.state.lock().tablet_scale = m.clone();
                Ok(())
            }
            Message::Lasso(m) => {
                self.state.lock().lasso = m.points.clone();
                Ok(())
            }
            Message::ConfirmSelection(m) => {
                let key = SubDatasetKey::new(m.dataset_id, m.subdataset_id);
                self.store.read().require_subdataset(key)?;
                let mut state = self.state.lock();
                state.confirmed_selections.push(key);
                state.lasso.clear();
                Ok(())
            }
            Message::AddNewSelectionInput(m) => {
                self.state.lock().selection_inputs.push(m.boolean_op);
                Ok(())
            }
            Message::AddSubDatasetGroup(m) => {
                let kind = GroupKind::from_u8(m.kind).ok_or(Error::UnknownGroup(m.group_id))?;
                let base = SubDatasetKey::new(m.base_dataset_id, m.base_subdataset_id);
                self.store.write().add_group(m.group_id, kind, base)
            }
            Message::RemoveSubDatasetGroup(m) => {
                self.store.write().remove_group(m.group_id).map(drop)
            }
            Message::AddSubDatasetToGroup(m) => {
                let key = SubDatasetKey::new(m.dataset_id, m.subdataset_id);
                self.store.write().add_to_group(m.group_id, key)
            }
        }
    }

    fn add_dataset(
        &self,
        id: i32,
        path: &str,
        kind: DatasetKind,
        point_fields: Vec<usize>,
        cell_fields: Vec<usize>,
    ) -> Result<()> {
        let layout = self.source.describe(path)?;
        let point_fields: Vec<_> = point_fields
            .into_iter()
            .filter(|&i| i < layout.point_fields.len())
            .collect();
        let cell_fields: Vec<_> = cell_fields
            .into_iter()
            .filter(|&i| i < layout.cell_fields.len())
            .collect();

        self.store.write().add_dataset(Dataset::new(id, path, kind, layout));
        let mut pending = self.pending.lock();
        pending.retain(|p| p.dataset_id != id);
        pending.push(PendingLoad {
            dataset_id: id,
            path: path.to_string(),
            point_fields,
            cell_fields,
        });
        Ok(())
    }

    fn with_subdataset(
        &self,
        dataset_id: i32,
        subdataset_id: i32,
        apply: impl FnOnce(&SubDataset) -> bool,
    ) -> Result<()> {
        let sd = Arc::clone(
            self.store
                .read()
                .require_subdataset(SubDatasetKey::new(dataset_id, subdataset_id))?,
        );
        // Listeners run inside the setter; the store lock is already released.
        apply(&sd);
        Ok(())
    }
}

/// Non-negative indices from the wire, in order, without duplicates.
fn field_indices(raw: &[i32]) -> Vec<usize> {
    let mut out = Vec::with_capacity(raw.len());
    for &i in raw {
        if i < 0 {
            warn!("Ignoring negative field index {}", i);
            continue;
        }
        if !out.contains(&(i as usize)) {
            out.push(i as usize);
        }
    }
    out
}

impl MessageListener for Session {
    fn on_message(&self, message: &Message) {
        if let Err(e) = self.apply(message) {
            warn!("Could not apply {:?}: {}", message.message_type(), e);
        }
    }
}
