//! Transfer-function message, the one recursive message kind.
//!
//! The outer message carries the dataset, sub-dataset and headset ids at
//! cursor positions 0..=2. The transfer-function payload starts at cursor 3.
//! A merge payload embeds two more payloads; each nested one is a
//! descriptor of its own, pre-seeded at cursor 3 because the ids only exist
//! in the outer message.

use crate::dtype::{Value, ValueKind};
use crate::protocol::message::{span_end, Descriptor, FieldSequence};

/// Cursor position of the first payload field.
pub const TF_PAYLOAD_START: i32 = 3;

/// `prop_id` marking the gradient-magnitude coordinate.
pub const GRADIENT_PROPERTY: i32 = -1;

/// Transfer function type codes
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TfKind {
    Gaussian = 0,
    TriangularGaussian = 1,
    Merge = 2,
    /// Any other code: the sub-dataset has no transfer function.
    Empty = 255,
}

impl TfKind {
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => TfKind::Gaussian,
            1 => TfKind::TriangularGaussian,
            2 => TfKind::Merge,
            _ => TfKind::Empty,
        }
    }
}

/// One property entry of a Gaussian-family payload.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TfProperty {
    pub prop_id: i32,
    pub center: f32,
    pub scale: f32,
}

const PROPERTY_STRIDE: i32 = 3;

#[derive(Clone, Debug, PartialEq)]
pub struct MergePayload {
    pub t: f32,
    pub first: Descriptor<TfPayload>,
    pub second: Descriptor<TfPayload>,
}

impl MergePayload {
    fn new() -> Self {
        Self {
            t: 0.0,
            first: Descriptor::starting_at(TfPayload::default(), TF_PAYLOAD_START),
            second: Descriptor::starting_at(TfPayload::default(), TF_PAYLOAD_START),
        }
    }

    fn active(&self) -> &Descriptor<TfPayload> {
        if self.first.is_complete() {
            &self.second
        } else {
            &self.first
        }
    }

    fn active_mut(&mut self) -> &mut Descriptor<TfPayload> {
        if self.first.is_complete() {
            &mut self.second
        } else {
            &mut self.first
        }
    }
}

/// Number of cursor positions a nested payload occupies.
fn span(desc: &Descriptor<TfPayload>) -> i32 {
    desc.max_cursor() - TF_PAYLOAD_START + 1
}

/// Transfer-function payload. Positions are absolute message cursors.
///
/// | cursor | field |
/// |---|---|
/// | 3 | type (byte) |
/// | 4 | color mode (i32) |
/// | 5 | alpha max (f32), or `t` for a merge |
/// | 6 | property count (i32), or the first nested payload |
/// | 7.. | `prop_id`, `center`, `scale` per property |
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TfPayload {
    /// `None` until the type byte has arrived.
    pub kind: Option<TfKind>,
    pub color_mode: i32,
    pub alpha_max: f32,
    pub props: Vec<TfProperty>,
    pub merge: Option<Box<MergePayload>>,
}

impl FieldSequence for TfPayload {
    fn max_cursor(&self) -> i32 {
        match self.kind {
            None | Some(TfKind::Empty) => 4,
            Some(TfKind::Gaussian) | Some(TfKind::TriangularGaussian) => {
                span_end(6, self.props.len(), PROPERTY_STRIDE)
            }
            Some(TfKind::Merge) => match &self.merge {
                Some(m) => 5i32.saturating_add(span(&m.first)).saturating_add(span(&m.second)),
                None => 5,
            },
        }
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        match cursor {
            3 => ValueKind::Byte,
            4 => ValueKind::Int,
            5 => ValueKind::Float,
            c => match (&self.kind, &self.merge) {
                (Some(TfKind::Merge), Some(m)) => m.active().expected_kind(),
                _ if c == 6 => ValueKind::Int,
                _ => match (c - 7) % PROPERTY_STRIDE {
                    0 => ValueKind::Int,
                    _ => ValueKind::Float,
                },
            },
        }
    }

    fn store(&mut self, cursor: i32, value: Value) {
        match cursor {
            3 => {
                let kind = TfKind::from_u8(value.as_byte());
                if kind == TfKind::Merge {
                    self.merge = Some(Box::new(MergePayload::new()));
                }
                self.kind = Some(kind);
            }
            4 => self.color_mode = value.as_int(),
            5 => match &mut self.merge {
                Some(m) => m.t = value.as_float(),
                None => self.alpha_max = value.as_float(),
            },
            c => {
                if let Some(m) = &mut self.merge {
                    m.active_mut().accept(value);
                    return;
                }
                if c == 6 {
                    self.props = vec![TfProperty::default(); value.as_int().max(0) as usize];
                    return;
                }
                let slot = ((c - 7) / PROPERTY_STRIDE) as usize;
                let Some(p) = self.props.get_mut(slot) else {
                    return;
                };
                match (c - 7) % PROPERTY_STRIDE {
                    0 => p.prop_id = value.as_int(),
                    1 => p.center = value.as_float(),
                    _ => p.scale = value.as_float(),
                }
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TfDataset {
    pub dataset_id: i32,
    pub subdataset_id: i32,
    pub headset_id: i32,
    pub tf: TfPayload,
}

impl FieldSequence for TfDataset {
    fn max_cursor(&self) -> i32 {
        self.tf.max_cursor()
    }

    fn expected_kind(&self, cursor: i32) -> ValueKind {
        if cursor < TF_PAYLOAD_START {
            ValueKind::Int
        } else {
            self.tf.expected_kind(cursor)
        }
    }

    fn store(&mut self, cursor: i32, value: Value) {
        match cursor {
            0 => self.dataset_id = value.as_int(),
            1 => self.subdataset_id = value.as_int(),
            2 => self.headset_id = value.as_int(),
            c => self.tf.store(c, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_values(color_mode: i32, props: &[(i32, f32, f32)]) -> Vec<Value> {
        let mut v = vec![
            Value::Byte(TfKind::Gaussian as u8),
            Value::Int(color_mode),
            Value::Float(1.0),
            Value::Int(props.len() as i32),
        ];
        for &(id, c, s) in props {
            v.extend([Value::Int(id), Value::Float(c), Value::Float(s)]);
        }
        v
    }

    fn feed(desc: &mut Descriptor<TfDataset>, values: Vec<Value>) {
        for v in values {
            assert!(!desc.is_complete(), "message completed early at {}", desc.cursor());
            assert_eq!(desc.expected_kind(), v.kind(), "at cursor {}", desc.cursor());
            desc.accept(v);
        }
    }

    #[test]
    fn test_gaussian_payload() {
        let mut desc = Descriptor::new(TfDataset::default());
        feed(&mut desc, vec![Value::Int(1), Value::Int(0), Value::Int(2)]);
        feed(&mut desc, gaussian_values(3, &[(0, 0.5, 0.2), (-1, 0.9, 0.1)]));
        assert!(desc.is_complete());

        let body = desc.into_inner();
        assert_eq!(body.tf.kind, Some(TfKind::Gaussian));
        assert_eq!(body.tf.color_mode, 3);
        assert_eq!(body.tf.props.len(), 2);
        assert_eq!(body.tf.props[1].prop_id, GRADIENT_PROPERTY);
        assert_eq!(body.tf.props[1].center, 0.9);
    }

    #[test]
    fn test_empty_payload_ends_after_color_mode() {
        let mut desc = Descriptor::new(TfDataset::default());
        feed(&mut desc, vec![Value::Int(1), Value::Int(0), Value::Int(2)]);
        feed(&mut desc, vec![Value::Byte(42), Value::Int(0)]);
        assert!(desc.is_complete());
        assert_eq!(desc.body().tf.kind, Some(TfKind::Empty));
    }

    #[test]
    fn test_merge_delegates_to_nested_payloads() {
        let mut desc = Descriptor::new(TfDataset::default());
        feed(&mut desc, vec![Value::Int(1), Value::Int(0), Value::Int(2)]);
        feed(
            &mut desc,
            vec![Value::Byte(TfKind::Merge as u8), Value::Int(0), Value::Float(0.25)],
        );
        feed(&mut desc, gaussian_values(1, &[(0, 0.5, 0.2)]));
        assert!(!desc.is_complete());

        let mut second = vec![
            Value::Byte(TfKind::TriangularGaussian as u8),
            Value::Int(2),
            Value::Float(0.8),
            Value::Int(2),
        ];
        second.extend([Value::Int(0), Value::Float(0.1), Value::Float(1.0)]);
        second.extend([Value::Int(1), Value::Float(0.2), Value::Float(2.0)]);
        feed(&mut desc, second);
        assert!(desc.is_complete());

        let body = desc.into_inner();
        let merge = body.tf.merge.expect("merge payload");
        assert_eq!(merge.t, 0.25);
        assert_eq!(merge.first.body().props.len(), 1);
        assert_eq!(merge.second.body().kind, Some(TfKind::TriangularGaussian));
        assert_eq!(merge.second.body().alpha_max, 0.8);
        assert_eq!(merge.second.body().props[1].scale, 2.0);
    }

    #[test]
    fn test_nested_merge() {
        let mut desc = Descriptor::new(TfDataset::default());
        feed(&mut desc, vec![Value::Int(1), Value::Int(0), Value::Int(2)]);
        feed(
            &mut desc,
            vec![Value::Byte(TfKind::Merge as u8), Value::Int(0), Value::Float(0.5)],
        );
        feed(
            &mut desc,
            vec![Value::Byte(TfKind::Merge as u8), Value::Int(0), Value::Float(0.1)],
        );
        feed(&mut desc, gaussian_values(0, &[]));
        feed(&mut desc, gaussian_values(0, &[(3, 0.0, 1.0)]));
        assert!(!desc.is_complete());
        feed(&mut desc, gaussian_values(0, &[]));
        assert!(desc.is_complete());
    }
}
