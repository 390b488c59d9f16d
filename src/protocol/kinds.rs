//! Per-kind message bodies and their field layouts.

use crate::dtype::{Value, ValueKind};
use crate::protocol::message::{span_end, FieldSequence};

fn count(value: &Value) -> usize {
    value.as_int().max(0) as usize
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddVtkDataset {
    pub dataset_id: i32,
    pub path: String,
    pub pt_field_indices: Vec<i32>,
    pub cell_field_indices: Vec<i32>,
}

impl AddVtkDataset {
    /// Cursor of the cell index count.
    fn cell_count_at(&self) -> i32 {
        span_end(3, self.pt_field_indices.len(), 1)
    }
}

impl FieldSequence for AddVtkDataset {
    // id, path, pt count, pt indices, cell count, cell indices
    fn max_cursor(&self) -> i32 {
        span_end(self.cell_count_at(), self.cell_field_indices.len(), 1)
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        if cursor == 1 {
            ValueKind::Str
        } else {
            ValueKind::Int
        }
    }

    fn store(&mut self, cursor: i32, value: Value) {
        let cell_count_at = self.cell_count_at();
        match cursor {
            0 => self.dataset_id = value.as_int(),
            1 => self.path = value.into_string(),
            2 => self.pt_field_indices = vec![0; count(&value)],
            c if c < cell_count_at => self.pt_field_indices[(c - 3) as usize] = value.as_int(),
            c if c == cell_count_at => self.cell_field_indices = vec![0; count(&value)],
            c => {
                let slot = (c - cell_count_at - 1) as usize;
                if let Some(v) = self.cell_field_indices.get_mut(slot) {
                    *v = value.as_int();
                }
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddCloudPointDataset {
    pub dataset_id: i32,
    pub path: String,
}

impl FieldSequence for AddCloudPointDataset {
    fn max_cursor(&self) -> i32 {
        1
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        if cursor == 1 {
            ValueKind::Str
        } else {
            ValueKind::Int
        }
    }

    fn store(&mut self, cursor: i32, value: Value) {
        match cursor {
            0 => self.dataset_id = value.as_int(),
            _ => self.path = value.into_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatasetRef {
    pub dataset_id: i32,
}

impl FieldSequence for DatasetRef {
    fn max_cursor(&self) -> i32 {
        0
    }

    fn expected_kind(&self, _cursor: i32) -> ValueKind {
        ValueKind::Int
    }

    fn store(&mut self, _cursor: i32, value: Value) {
        self.dataset_id = value.as_int();
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubDatasetRef {
    pub dataset_id: i32,
    pub subdataset_id: i32,
}

impl FieldSequence for SubDatasetRef {
    fn max_cursor(&self) -> i32 {
        1
    }

    fn expected_kind(&self, _cursor: i32) -> ValueKind {
        ValueKind::Int
    }

    fn store(&mut self, cursor: i32, value: Value) {
        match cursor {
            0 => self.dataset_id = value.as_int(),
            _ => self.subdataset_id = value.as_int(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddSubDataset {
    pub dataset_id: i32,
    pub subdataset_id: i32,
    pub name: String,
    /// Owning headset, -1 when the sub-dataset is public.
    pub owner_id: i32,
}

impl FieldSequence for AddSubDataset {
    fn max_cursor(&self) -> i32 {
        3
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        if cursor == 2 {
            ValueKind::Str
        } else {
            ValueKind::Int
        }
    }

    fn store(&mut self, cursor: i32, value: Value) {
        match cursor {
            0 => self.dataset_id = value.as_int(),
            1 => self.subdataset_id = value.as_int(),
            2 => self.name = value.into_string(),
            _ => self.owner_id = value.as_int(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenameSubDataset {
    pub dataset_id: i32,
    pub subdataset_id: i32,
    pub name: String,
}

impl FieldSequence for RenameSubDataset {
    fn max_cursor(&self) -> i32 {
        2
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        if cursor == 2 {
            ValueKind::Str
        } else {
            ValueKind::Int
        }
    }

    fn store(&mut self, cursor: i32, value: Value) {
        match cursor {
            0 => self.dataset_id = value.as_int(),
            1 => self.subdataset_id = value.as_int(),
            _ => self.name = value.into_string(),
        }
    }
}

/// Shared layout of the move/rotate/scale messages: dataset id, sub-dataset
/// id, headset id, then `N` floats.
fn store_transform<const N: usize>(
    ids: &mut [i32; 3],
    values: &mut [f32; N],
    cursor: i32,
    value: Value,
) {
    match cursor {
        0..=2 => ids[cursor as usize] = value.as_int(),
        c => {
            if let Some(v) = values.get_mut((c - 3) as usize) {
                *v = value.as_float();
            }
        }
    }
}

fn transform_kind(cursor: i32) -> ValueKind {
    if cursor < 3 {
        ValueKind::Int
    } else {
        ValueKind::Float
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MoveDataset {
    pub dataset_id: i32,
    pub subdataset_id: i32,
    pub headset_id: i32,
    pub position: [f32; 3],
}

impl FieldSequence for MoveDataset {
    fn max_cursor(&self) -> i32 {
        5
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        transform_kind(cursor)
    }

    fn store(&mut self, cursor: i32, value: Value) {
        let mut ids = [self.dataset_id, self.subdataset_id, self.headset_id];
        store_transform(&mut ids, &mut self.position, cursor, value);
        [self.dataset_id, self.subdataset_id, self.headset_id] = ids;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RotateDataset {
    pub dataset_id: i32,
    pub subdataset_id: i32,
    pub headset_id: i32,
    /// Quaternion, `w` first.
    pub rotation: [f32; 4],
}

impl FieldSequence for RotateDataset {
    fn max_cursor(&self) -> i32 {
        6
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        transform_kind(cursor)
    }

    fn store(&mut self, cursor: i32, value: Value) {
        let mut ids = [self.dataset_id, self.subdataset_id, self.headset_id];
        store_transform(&mut ids, &mut self.rotation, cursor, value);
        [self.dataset_id, self.subdataset_id, self.headset_id] = ids;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScaleDataset {
    pub dataset_id: i32,
    pub subdataset_id: i32,
    pub headset_id: i32,
    pub scale: [f32; 3],
}

impl FieldSequence for ScaleDataset {
    fn max_cursor(&self) -> i32 {
        5
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        transform_kind(cursor)
    }

    fn store(&mut self, cursor: i32, value: Value) {
        let mut ids = [self.dataset_id, self.subdataset_id, self.headset_id];
        store_transform(&mut ids, &mut self.scale, cursor, value);
        [self.dataset_id, self.subdataset_id, self.headset_id] = ids;
    }
}

/// Sub-dataset plus a headset: ownership and lock-ownership changes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubDatasetHeadset {
    pub dataset_id: i32,
    pub subdataset_id: i32,
    /// -1 clears the owner.
    pub headset_id: i32,
}

impl FieldSequence for SubDatasetHeadset {
    fn max_cursor(&self) -> i32 {
        2
    }

    fn expected_kind(&self, _cursor: i32) -> ValueKind {
        ValueKind::Int
    }

    fn store(&mut self, cursor: i32, value: Value) {
        match cursor {
            0 => self.dataset_id = value.as_int(),
            1 => self.subdataset_id = value.as_int(),
            _ => self.headset_id = value.as_int(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubDatasetClipping {
    pub dataset_id: i32,
    pub subdataset_id: i32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl FieldSequence for SubDatasetClipping {
    fn max_cursor(&self) -> i32 {
        3
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        if cursor < 2 {
            ValueKind::Int
        } else {
            ValueKind::Float
        }
    }

    fn store(&mut self, cursor: i32, value: Value) {
        match cursor {
            0 => self.dataset_id = value.as_int(),
            1 => self.subdataset_id = value.as_int(),
            2 => self.min_depth = value.as_float(),
            _ => self.max_depth = value.as_float(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubDatasetVisibility {
    pub dataset_id: i32,
    pub subdataset_id: i32,
    pub visible: bool,
}

impl FieldSequence for SubDatasetVisibility {
    fn max_cursor(&self) -> i32 {
        2
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        if cursor < 2 {
            ValueKind::Int
        } else {
            ValueKind::Byte
        }
    }

    fn store(&mut self, cursor: i32, value: Value) {
        match cursor {
            0 => self.dataset_id = value.as_int(),
            1 => self.subdataset_id = value.as_int(),
            _ => self.visible = value.as_bool(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VolumetricMask {
    pub dataset_id: i32,
    pub subdataset_id: i32,
    pub enabled: bool,
    /// One bit per spatial sample, least significant bit first.
    pub mask: Vec<u8>,
}

impl FieldSequence for VolumetricMask {
    fn max_cursor(&self) -> i32 {
        3
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        match cursor {
            0 | 1 => ValueKind::Int,
            2 => ValueKind::Byte,
            _ => ValueKind::Bytes,
        }
    }

    fn store(&mut self, cursor: i32, value: Value) {
        match cursor {
            0 => self.dataset_id = value.as_int(),
            1 => self.subdataset_id = value.as_int(),
            2 => self.enabled = value.as_bool(),
            _ => self.mask = value.into_bytes(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeadsetRef {
    pub headset_id: i32,
}

impl FieldSequence for HeadsetRef {
    fn max_cursor(&self) -> i32 {
        0
    }

    fn expected_kind(&self, _cursor: i32) -> ValueKind {
        ValueKind::Int
    }

    fn store(&mut self, _cursor: i32, value: Value) {
        self.headset_id = value.as_int();
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeadsetBindingInfo {
    pub headset_id: i32,
    pub color: i32,
    pub tablet_connected: bool,
    pub first_connected: bool,
}

impl FieldSequence for HeadsetBindingInfo {
    fn max_cursor(&self) -> i32 {
        3
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        if cursor < 2 {
            ValueKind::Int
        } else {
            ValueKind::Byte
        }
    }

    fn store(&mut self, cursor: i32, value: Value) {
        match cursor {
            0 => self.headset_id = value.as_int(),
            1 => self.color = value.as_int(),
            2 => self.tablet_connected = value.as_bool(),
            _ => self.first_connected = value.as_bool(),
        }
    }
}

/// One entry of a collaborator status broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HeadsetStatus {
    pub id: i32,
    pub color: i32,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

/// Fields per headset entry: id, color, position, rotation.
const HEADSET_STRIDE: i32 = 9;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeadsetsStatus {
    pub headsets: Vec<HeadsetStatus>,
}

impl FieldSequence for HeadsetsStatus {
    fn max_cursor(&self) -> i32 {
        span_end(0, self.headsets.len(), HEADSET_STRIDE)
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        if cursor == 0 {
            return ValueKind::Int;
        }
        match (cursor - 1) % HEADSET_STRIDE {
            0 | 1 => ValueKind::Int,
            _ => ValueKind::Float,
        }
    }

    fn store(&mut self, cursor: i32, value: Value) {
        if cursor == 0 {
            self.headsets = vec![HeadsetStatus::default(); count(&value)];
            return;
        }
        let slot = ((cursor - 1) / HEADSET_STRIDE) as usize;
        let field = (cursor - 1) % HEADSET_STRIDE;
        let Some(h) = self.headsets.get_mut(slot) else {
            return;
        };
        match field {
            0 => h.id = value.as_int(),
            1 => h.color = value.as_int(),
            2..=4 => h.position[(field - 2) as usize] = value.as_float(),
            _ => h.rotation[(field - 5) as usize] = value.as_float(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnchoringDataSegment {
    pub data: Vec<u8>,
}

impl FieldSequence for AnchoringDataSegment {
    fn max_cursor(&self) -> i32 {
        0
    }

    fn expected_kind(&self, _cursor: i32) -> ValueKind {
        ValueKind::Bytes
    }

    fn store(&mut self, _cursor: i32, value: Value) {
        self.data = value.into_bytes();
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnchoringDataStatus {
    pub succeeded: bool,
}

impl FieldSequence for AnchoringDataStatus {
    fn max_cursor(&self) -> i32 {
        0
    }

    fn expected_kind(&self, _cursor: i32) -> ValueKind {
        ValueKind::Byte
    }

    fn store(&mut self, _cursor: i32, value: Value) {
        self.succeeded = value.as_bool();
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CurrentAction {
    pub action: i32,
}

impl FieldSequence for CurrentAction {
    fn max_cursor(&self) -> i32 {
        0
    }

    fn expected_kind(&self, _cursor: i32) -> ValueKind {
        ValueKind::Int
    }

    fn store(&mut self, _cursor: i32, value: Value) {
        self.action = value.as_int();
    }
}

/// Tablet pose in the shared anchor space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Location {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

impl FieldSequence for Location {
    fn max_cursor(&self) -> i32 {
        6
    }

    fn expected_kind(&self, _cursor: i32) -> ValueKind {
        ValueKind::Float
    }

    fn store(&mut self, cursor: i32, value: Value) {
        match cursor {
            0..=2 => self.position[cursor as usize] = value.as_float(),
            3..=6 => self.rotation[(cursor - 3) as usize] = value.as_float(),
            _ => {}
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TabletScale {
    pub scale: f32,
    pub width: f32,
    pub height: f32,
    pub pos_x: f32,
    pub pos_y: f32,
}

impl FieldSequence for TabletScale {
    fn max_cursor(&self) -> i32 {
        4
    }

    fn expected_kind(&self, _cursor: i32) -> ValueKind {
        ValueKind::Float
    }

    fn store(&mut self, cursor: i32, value: Value) {
        let v = value.as_float();
        match cursor {
            0 => self.scale = v,
            1 => self.width = v,
            2 => self.height = v,
            3 => self.pos_x = v,
            _ => self.pos_y = v,
        }
    }
}

/// Lasso drawn on the tablet, in tablet-normalised coordinates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Lasso {
    pub points: Vec<[f32; 2]>,
}

impl FieldSequence for Lasso {
    fn max_cursor(&self) -> i32 {
        span_end(0, self.points.len(), 2)
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        if cursor == 0 {
            ValueKind::Int
        } else {
            ValueKind::Float
        }
    }

    fn store(&mut self, cursor: i32, value: Value) {
        if cursor == 0 {
            self.points = vec![[0.0; 2]; count(&value)];
            return;
        }
        let slot = ((cursor - 1) / 2) as usize;
        if let Some(p) = self.points.get_mut(slot) {
            p[((cursor - 1) % 2) as usize] = value.as_float();
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddNewSelectionInput {
    pub boolean_op: i16,
}

impl FieldSequence for AddNewSelectionInput {
    fn max_cursor(&self) -> i32 {
        0
    }

    fn expected_kind(&self, _cursor: i32) -> ValueKind {
        ValueKind::Short
    }

    fn store(&mut self, _cursor: i32, value: Value) {
        self.boolean_op = value.as_short();
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddSubDatasetGroup {
    pub group_id: i32,
    pub kind: u8,
    pub base_dataset_id: i32,
    pub base_subdataset_id: i32,
}

impl FieldSequence for AddSubDatasetGroup {
    fn max_cursor(&self) -> i32 {
        3
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        if cursor == 1 {
            ValueKind::Byte
        } else {
            ValueKind::Int
        }
    }

    fn store(&mut self, cursor: i32, value: Value) {
        match cursor {
            0 => self.group_id = value.as_int(),
            1 => self.kind = value.as_byte(),
            2 => self.base_dataset_id = value.as_int(),
            _ => self.base_subdataset_id = value.as_int(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupRef {
    pub group_id: i32,
}

impl FieldSequence for GroupRef {
    fn max_cursor(&self) -> i32 {
        0
    }

    fn expected_kind(&self, _cursor: i32) -> ValueKind {
        ValueKind::Int
    }

    fn store(&mut self, _cursor: i32, value: Value) {
        self.group_id = value.as_int();
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddSubDatasetToGroup {
    pub group_id: i32,
    pub dataset_id: i32,
    pub subdataset_id: i32,
}

impl FieldSequence for AddSubDatasetToGroup {
    fn max_cursor(&self) -> i32 {
        2
    }

    fn expected_kind(&self, _cursor: i32) -> ValueKind {
        ValueKind::Int
    }

    fn store(&mut self, cursor: i32, value: Value) {
        match cursor {
            0 => self.group_id = value.as_int(),
            1 => self.dataset_id = value.as_int(),
            _ => self.subdataset_id = value.as_int(),
        }
    }
}
