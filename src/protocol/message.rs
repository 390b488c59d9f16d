//! Message descriptors: the cursor-driven state machine behind every
//! server-to-client message.
//!
//! A descriptor says which primitive it wants next and stores each primitive
//! the router hands it. Length fields sit at fixed early cursor positions, so
//! `max_cursor` is only ever computed from fields that have already arrived.

use crate::dtype::{Value, ValueKind};
use crate::protocol::kinds::*;
use crate::protocol::tf::TfDataset;

/// Field layout of one message body.
pub trait FieldSequence {
    /// Highest cursor position; -1 for a message without fields.
    fn max_cursor(&self) -> i32;

    /// Primitive kind expected at `cursor`.
    fn expected_kind(&self, cursor: i32) -> ValueKind;

    /// Store the primitive that arrived at `cursor`.
    fn store(&mut self, cursor: i32, value: Value);
}

/// Last cursor of `count` entries of `stride` positions following `base`,
/// saturating at `i32::MAX` for counts no real message can reach.
pub(crate) fn span_end(base: i32, count: usize, stride: i32) -> i32 {
    let count = i32::try_from(count).unwrap_or(i32::MAX);
    base.saturating_add(stride.saturating_mul(count))
}

/// A message body plus the cursor tracking how much of it has been decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor<T> {
    cursor: i32,
    body: T,
}

impl<T: FieldSequence> Descriptor<T> {
    pub fn new(body: T) -> Self {
        Self::starting_at(body, 0)
    }

    /// Descriptor whose first `cursor` positions are provided elsewhere.
    pub fn starting_at(body: T, cursor: i32) -> Self {
        Self { cursor, body }
    }

    pub fn cursor(&self) -> i32 {
        self.cursor
    }

    pub fn max_cursor(&self) -> i32 {
        self.body.max_cursor()
    }

    pub fn is_complete(&self) -> bool {
        self.cursor > self.body.max_cursor()
    }

    pub fn expected_kind(&self) -> ValueKind {
        self.body.expected_kind(self.cursor)
    }

    /// Store `value` at the current position, then advance.
    pub fn accept(&mut self, value: Value) {
        self.body.store(self.cursor, value);
        self.cursor += 1;
    }

    pub fn body(&self) -> &T {
        &self.body
    }

    pub fn into_inner(self) -> T {
        self.body
    }
}

/// Server-to-client message type tags
#[repr(i16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    AddVtkDataset = 0,
    AddCloudPointDataset = 1,
    RemoveDataset = 2,
    AddSubDataset = 3,
    RemoveSubDataset = 4,
    RenameSubDataset = 5,
    MoveDataset = 6,
    RotateDataset = 7,
    ScaleDataset = 8,
    TfDataset = 9,
    SubDatasetOwner = 10,
    SubDatasetLockOwner = 11,
    SubDatasetClipping = 12,
    SubDatasetVisibility = 13,
    VolumetricMask = 14,
    ResetVolumetricSelection = 15,
    HeadsetBindingInfo = 16,
    HeadsetsStatus = 17,
    StartAnchoring = 18,
    AnchoringDataSegment = 19,
    AnchoringDataStatus = 20,
    CurrentAction = 21,
    Location = 22,
    TabletScale = 23,
    Lasso = 24,
    ConfirmSelection = 25,
    AddNewSelectionInput = 26,
    AddSubDatasetGroup = 27,
    RemoveSubDatasetGroup = 28,
    AddSubDatasetToGroup = 29,
}

impl MessageType {
    pub fn from_i16(val: i16) -> Option<Self> {
        use MessageType::*;
        Some(match val {
            0 => AddVtkDataset,
            1 => AddCloudPointDataset,
            2 => RemoveDataset,
            3 => AddSubDataset,
            4 => RemoveSubDataset,
            5 => RenameSubDataset,
            6 => MoveDataset,
            7 => RotateDataset,
            8 => ScaleDataset,
            9 => TfDataset,
            10 => SubDatasetOwner,
            11 => SubDatasetLockOwner,
            12 => SubDatasetClipping,
            13 => SubDatasetVisibility,
            14 => VolumetricMask,
            15 => ResetVolumetricSelection,
            16 => HeadsetBindingInfo,
            17 => HeadsetsStatus,
            18 => StartAnchoring,
            19 => AnchoringDataSegment,
            20 => AnchoringDataStatus,
            21 => CurrentAction,
            22 => Location,
            23 => TabletScale,
            24 => Lasso,
            25 => ConfirmSelection,
            26 => AddNewSelectionInput,
            27 => AddSubDatasetGroup,
            28 => RemoveSubDatasetGroup,
            29 => AddSubDatasetToGroup,
            _ => return None,
        })
    }

    /// Fresh, empty message body for this type.
    pub fn new_message(self) -> Message {
        use MessageType as T;
        match self {
            T::AddVtkDataset => Message::AddVtkDataset(Default::default()),
            T::AddCloudPointDataset => Message::AddCloudPointDataset(Default::default()),
            T::RemoveDataset => Message::RemoveDataset(Default::default()),
            T::AddSubDataset => Message::AddSubDataset(Default::default()),
            T::RemoveSubDataset => Message::RemoveSubDataset(Default::default()),
            T::RenameSubDataset => Message::RenameSubDataset(Default::default()),
            T::MoveDataset => Message::MoveDataset(Default::default()),
            T::RotateDataset => Message::RotateDataset(Default::default()),
            T::ScaleDataset => Message::ScaleDataset(Default::default()),
            T::TfDataset => Message::TfDataset(Default::default()),
            T::SubDatasetOwner => Message::SubDatasetOwner(Default::default()),
            T::SubDatasetLockOwner => Message::SubDatasetLockOwner(Default::default()),
            T::SubDatasetClipping => Message::SubDatasetClipping(Default::default()),
            T::SubDatasetVisibility => Message::SubDatasetVisibility(Default::default()),
            T::VolumetricMask => Message::VolumetricMask(Default::default()),
            T::ResetVolumetricSelection => Message::ResetVolumetricSelection(Default::default()),
            T::HeadsetBindingInfo => Message::HeadsetBindingInfo(Default::default()),
            T::HeadsetsStatus => Message::HeadsetsStatus(Default::default()),
            T::StartAnchoring => Message::StartAnchoring,
            T::AnchoringDataSegment => Message::AnchoringDataSegment(Default::default()),
            T::AnchoringDataStatus => Message::AnchoringDataStatus(Default::default()),
            T::CurrentAction => Message::CurrentAction(Default::default()),
            T::Location => Message::Location(Default::default()),
            T::TabletScale => Message::TabletScale(Default::default()),
            T::Lasso => Message::Lasso(Default::default()),
            T::ConfirmSelection => Message::ConfirmSelection(Default::default()),
            T::AddNewSelectionInput => Message::AddNewSelectionInput(Default::default()),
            T::AddSubDatasetGroup => Message::AddSubDatasetGroup(Default::default()),
            T::RemoveSubDatasetGroup => Message::RemoveSubDatasetGroup(Default::default()),
            T::AddSubDatasetToGroup => Message::AddSubDatasetToGroup(Default::default()),
        }
    }
}

/// A fully typed server-to-client message.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    AddVtkDataset(AddVtkDataset),
    AddCloudPointDataset(AddCloudPointDataset),
    RemoveDataset(DatasetRef),
    AddSubDataset(AddSubDataset),
    RemoveSubDataset(SubDatasetRef),
    RenameSubDataset(RenameSubDataset),
    MoveDataset(MoveDataset),
    RotateDataset(RotateDataset),
    ScaleDataset(ScaleDataset),
    TfDataset(TfDataset),
    SubDatasetOwner(SubDatasetHeadset),
    SubDatasetLockOwner(SubDatasetHeadset),
    SubDatasetClipping(SubDatasetClipping),
    SubDatasetVisibility(SubDatasetVisibility),
    VolumetricMask(VolumetricMask),
    ResetVolumetricSelection(HeadsetRef),
    HeadsetBindingInfo(HeadsetBindingInfo),
    HeadsetsStatus(HeadsetsStatus),
    StartAnchoring,
    AnchoringDataSegment(AnchoringDataSegment),
    AnchoringDataStatus(AnchoringDataStatus),
    CurrentAction(CurrentAction),
    Location(Location),
    TabletScale(TabletScale),
    Lasso(Lasso),
    ConfirmSelection(SubDatasetRef),
    AddNewSelectionInput(AddNewSelectionInput),
    AddSubDatasetGroup(AddSubDatasetGroup),
    RemoveSubDatasetGroup(GroupRef),
    AddSubDatasetToGroup(AddSubDatasetToGroup),
}

// Forwards a FieldSequence method to the payload of whichever variant is
// active. `StartAnchoring` carries no fields and is handled by the caller.
macro_rules! forward {
    ($self:expr, $m:ident => $body:expr, empty => $empty:expr) => {
        match $self {
            Message::AddVtkDataset($m) => $body,
            Message::AddCloudPointDataset($m) => $body,
            Message::RemoveDataset($m) => $body,
            Message::AddSubDataset($m) => $body,
            Message::RemoveSubDataset($m) => $body,
            Message::RenameSubDataset($m) => $body,
            Message::MoveDataset($m) => $body,
            Message::RotateDataset($m) => $body,
            Message::ScaleDataset($m) => $body,
            Message::TfDataset($m) => $body,
            Message::SubDatasetOwner($m) => $body,
            Message::SubDatasetLockOwner($m) => $body,
            Message::SubDatasetClipping($m) => $body,
            Message::SubDatasetVisibility($m) => $body,
            Message::VolumetricMask($m) => $body,
            Message::ResetVolumetricSelection($m) => $body,
            Message::HeadsetBindingInfo($m) => $body,
            Message::HeadsetsStatus($m) => $body,
            Message::StartAnchoring => $empty,
            Message::AnchoringDataSegment($m) => $body,
            Message::AnchoringDataStatus($m) => $body,
            Message::CurrentAction($m) => $body,
            Message::Location($m) => $body,
            Message::TabletScale($m) => $body,
            Message::Lasso($m) => $body,
            Message::ConfirmSelection($m) => $body,
            Message::AddNewSelectionInput($m) => $body,
            Message::AddSubDatasetGroup($m) => $body,
            Message::RemoveSubDatasetGroup($m) => $body,
            Message::AddSubDatasetToGroup($m) => $body,
        }
    };
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        use MessageType as T;
        match self {
            Message::AddVtkDataset(_) => T::AddVtkDataset,
            Message::AddCloudPointDataset(_) => T::AddCloudPointDataset,
            Message::RemoveDataset(_) => T::RemoveDataset,
            Message::AddSubDataset(_) => T::AddSubDataset,
            Message::RemoveSubDataset(_) => T::RemoveSubDataset,
            Message::RenameSubDataset(_) => T::RenameSubDataset,
            Message::MoveDataset(_) => T::MoveDataset,
            Message::RotateDataset(_) => T::RotateDataset,
            Message::ScaleDataset(_) => T::ScaleDataset,
            Message::TfDataset(_) => T::TfDataset,
            Message::SubDatasetOwner(_) => T::SubDatasetOwner,
            Message::SubDatasetLockOwner(_) => T::SubDatasetLockOwner,
            Message::SubDatasetClipping(_) => T::SubDatasetClipping,
            Message::SubDatasetVisibility(_) => T::SubDatasetVisibility,
            Message::VolumetricMask(_) => T::VolumetricMask,
            Message::ResetVolumetricSelection(_) => T::ResetVolumetricSelection,
            Message::HeadsetBindingInfo(_) => T::HeadsetBindingInfo,
            Message::HeadsetsStatus(_) => T::HeadsetsStatus,
            Message::StartAnchoring => T::StartAnchoring,
            Message::AnchoringDataSegment(_) => T::AnchoringDataSegment,
            Message::AnchoringDataStatus(_) => T::AnchoringDataStatus,
            Message::CurrentAction(_) => T::CurrentAction,
            Message::Location(_) => T::Location,
            Message::TabletScale(_) => T::TabletScale,
            Message::Lasso(_) => T::Lasso,
            Message::ConfirmSelection(_) => T::ConfirmSelection,
            Message::AddNewSelectionInput(_) => T::AddNewSelectionInput,
            Message::AddSubDatasetGroup(_) => T::AddSubDatasetGroup,
            Message::RemoveSubDatasetGroup(_) => T::RemoveSubDatasetGroup,
            Message::AddSubDatasetToGroup(_) => T::AddSubDatasetToGroup,
        }
    }
}

impl FieldSequence for Message {
    fn max_cursor(&self) -> i32 {
        forward!(self, m => m.max_cursor(), empty => -1)
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        forward!(self, m => m.expected_kind(cursor), empty => ValueKind::Byte)
    }

    fn store(&mut self, cursor: i32, value: Value) {
        forward!(self, m => m.store(cursor, value), empty => ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tag_round_trips_through_its_type() {
        for tag in 0..30i16 {
            let ty = MessageType::from_i16(tag).expect("known tag");
            assert_eq!(ty as i16, tag);
            assert_eq!(ty.new_message().message_type(), ty);
        }
        assert_eq!(MessageType::from_i16(30), None);
        assert_eq!(MessageType::from_i16(-1), None);
    }

    #[test]
    fn test_span_end_saturates() {
        assert_eq!(span_end(3, 3, 1), 6);
        assert_eq!(span_end(0, 2, 9), 18);
        assert_eq!(span_end(0, i32::MAX as usize, 9), i32::MAX);
        assert_eq!(span_end(6, usize::MAX, 3), i32::MAX);
        assert_eq!(span_end(i32::MAX - 1, 5, 1), i32::MAX);
    }

    #[test]
    fn test_empty_message_is_complete_on_allocation() {
        let desc = Descriptor::new(MessageType::StartAnchoring.new_message());
        assert_eq!(desc.max_cursor(), -1);
        assert!(desc.is_complete());
    }

    #[test]
    fn test_descriptor_advances_one_position_per_value() {
        let mut desc = Descriptor::new(MessageType::RemoveSubDataset.new_message());
        assert_eq!(desc.expected_kind(), ValueKind::Int);
        desc.accept(Value::Int(4));
        assert!(!desc.is_complete());
        desc.accept(Value::Int(9));
        assert!(desc.is_complete());
        assert_eq!(
            desc.into_inner(),
            Message::RemoveSubDataset(SubDatasetRef {
                dataset_id: 4,
                subdataset_id: 9
            })
        );
    }
}
