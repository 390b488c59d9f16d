//! Typed field value buffers and the min/max reduction over them.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use log::warn;
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::dataset::mask::ValidityMask;
use crate::dtype::FieldFormat;
use crate::error::{Error, Result};

/// Flat value buffer tagged with its element encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValues {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl FieldValues {
    pub fn format(&self) -> FieldFormat {
        match self {
            FieldValues::I8(_) => FieldFormat::I8,
            FieldValues::U8(_) => FieldFormat::U8,
            FieldValues::I16(_) => FieldFormat::I16,
            FieldValues::U16(_) => FieldFormat::U16,
            FieldValues::I32(_) => FieldFormat::I32,
            FieldValues::U32(_) => FieldFormat::U32,
            FieldValues::I64(_) => FieldFormat::I64,
            FieldValues::U64(_) => FieldFormat::U64,
            FieldValues::F32(_) => FieldFormat::F32,
            FieldValues::F64(_) => FieldFormat::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FieldValues::I8(v) => v.len(),
            FieldValues::U8(v) => v.len(),
            FieldValues::I16(v) => v.len(),
            FieldValues::U16(v) => v.len(),
            FieldValues::I32(v) => v.len(),
            FieldValues::U32(v) => v.len(),
            FieldValues::I64(v) => v.len(),
            FieldValues::U64(v) => v.len(),
            FieldValues::F32(v) => v.len(),
            FieldValues::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `index`, widened to a double. Panics if out of bounds, like
    /// slice indexing.
    pub fn read_as_f64(&self, index: usize) -> f64 {
        match self {
            FieldValues::I8(v) => v[index] as f64,
            FieldValues::U8(v) => v[index] as f64,
            FieldValues::I16(v) => v[index] as f64,
            FieldValues::U16(v) => v[index] as f64,
            FieldValues::I32(v) => v[index] as f64,
            FieldValues::U32(v) => v[index] as f64,
            FieldValues::I64(v) => v[index] as f64,
            FieldValues::U64(v) => v[index] as f64,
            FieldValues::F32(v) => v[index] as f64,
            FieldValues::F64(v) => v[index],
        }
    }

    pub fn read_as_f32(&self, index: usize) -> f32 {
        self.read_as_f64(index) as f32
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        (index < self.len()).then(|| self.read_as_f64(index))
    }

    /// Decode a big-endian raw buffer, as stored by structured-grid files.
    pub fn from_be_bytes(format: FieldFormat, bytes: &[u8]) -> Result<Self> {
        let width = format.byte_width();
        if bytes.len() % width != 0 {
            return Err(Error::BufferMismatch(width, bytes.len()));
        }
        let n = bytes.len() / width;

        Ok(match format {
            FieldFormat::I8 => FieldValues::I8(bytes.iter().map(|&b| b as i8).collect()),
            FieldFormat::U8 => FieldValues::U8(bytes.to_vec()),
            FieldFormat::I16 => {
                let mut v = vec![0; n];
                BigEndian::read_i16_into(bytes, &mut v);
                FieldValues::I16(v)
            }
            FieldFormat::U16 => {
                let mut v = vec![0; n];
                BigEndian::read_u16_into(bytes, &mut v);
                FieldValues::U16(v)
            }
            FieldFormat::I32 => {
                let mut v = vec![0; n];
                BigEndian::read_i32_into(bytes, &mut v);
                FieldValues::I32(v)
            }
            FieldFormat::U32 => {
                let mut v = vec![0; n];
                BigEndian::read_u32_into(bytes, &mut v);
                FieldValues::U32(v)
            }
            FieldFormat::I64 => {
                let mut v = vec![0; n];
                BigEndian::read_i64_into(bytes, &mut v);
                FieldValues::I64(v)
            }
            FieldFormat::U64 => {
                let mut v = vec![0; n];
                BigEndian::read_u64_into(bytes, &mut v);
                FieldValues::U64(v)
            }
            FieldFormat::F32 => {
                let mut v = vec![0.0; n];
                BigEndian::read_f32_into(bytes, &mut v);
                FieldValues::F32(v)
            }
            FieldFormat::F64 => {
                let mut v = vec![0.0; n];
                BigEndian::read_f64_into(bytes, &mut v);
                FieldValues::F64(v)
            }
        })
    }
}

/// One named scalar or vector property of a dataset.
#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    pub name: String,
    pub format: FieldFormat,
    pub n_values_per_tuple: usize,
    pub n_tuples: usize,
    range: Option<(f64, f64)>,
    values: Option<Arc<FieldValues>>,
}

impl FieldDescriptor {
    pub fn new(
        name: impl Into<String>,
        format: FieldFormat,
        n_values_per_tuple: usize,
        n_tuples: usize,
    ) -> Self {
        Self {
            name: name.into(),
            format,
            n_values_per_tuple: n_values_per_tuple.max(1),
            n_tuples,
            range: None,
            values: None,
        }
    }

    pub fn is_vector(&self) -> bool {
        self.n_values_per_tuple > 1
    }

    pub fn is_loaded(&self) -> bool {
        self.values.is_some()
    }

    pub fn values(&self) -> Option<&Arc<FieldValues>> {
        self.values.as_ref()
    }

    /// Attach the value buffer. Any previous range is discarded.
    pub fn set_values(&mut self, values: FieldValues) -> Result<()> {
        let expected = self.n_tuples * self.n_values_per_tuple;
        if values.format() != self.format {
            return Err(Error::UnsupportedFormat(values.format() as i32));
        }
        if values.len() != expected {
            return Err(Error::BufferMismatch(expected, values.len()));
        }
        self.values = Some(Arc::new(values));
        self.range = None;
        Ok(())
    }

    /// Observed `(min, max)`; `None` until a reduction has run.
    pub fn range(&self) -> Option<(f64, f64)> {
        self.range
    }

    /// Scalar value of a tuple, or the Euclidean magnitude of a vector tuple
    /// computed in double precision. `None` when values are not loaded or
    /// `tuple` is past the end.
    pub fn tuple_value(&self, tuple: usize) -> Option<f64> {
        if tuple >= self.n_tuples {
            return None;
        }
        tuple_value(self.values.as_ref()?, self.n_values_per_tuple, tuple)
    }

    /// Value of a tuple rescaled to `[0, 1]` by the observed range.
    pub fn normalized(&self, tuple: usize) -> Option<f64> {
        let (min, max) = self.range?;
        let v = self.tuple_value(tuple)?;
        if max > min {
            Some(((v - min) / (max - min)).clamp(0.0, 1.0))
        } else {
            Some(0.0)
        }
    }

    /// Run the min/max reduction and store its result.
    pub fn reduce(&mut self, mask: Option<&mut ValidityMask>) -> Result<Option<(f64, f64)>> {
        self.range = reduce_min_max(self, mask)?;
        Ok(self.range)
    }
}

fn tuple_value(values: &FieldValues, k: usize, tuple: usize) -> Option<f64> {
    if k == 1 {
        return values.get(tuple);
    }
    let base = tuple.checked_mul(k)?;
    let mut sum = 0.0;
    for c in 0..k {
        let v = values.get(base + c)?;
        sum += v * v;
    }
    Some(sum.sqrt())
}

#[derive(Debug)]
struct Partial {
    min: f64,
    max: f64,
    nan_samples: Vec<usize>,
}

impl Partial {
    fn empty() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            nan_samples: Vec::new(),
        }
    }

    fn merge(&mut self, other: Partial) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.nan_samples.extend(other.nan_samples);
    }
}

/// Parallel min/max over all tuples of a field.
///
/// Masked-out tuples are skipped. A tuple with any NaN component clears its
/// mask bit and is skipped as well. Vector tuples reduce by magnitude. The
/// result is narrowed to the field's element type; `None` when no tuple
/// contributed.
pub fn reduce_min_max(
    desc: &FieldDescriptor,
    mask: Option<&mut ValidityMask>,
) -> Result<Option<(f64, f64)>> {
    let values = desc
        .values
        .as_ref()
        .ok_or_else(|| Error::FieldNotLoaded(0))?;
    let k = desc.n_values_per_tuple;
    let check_nan = desc.format.is_floating();

    let combined = Mutex::new(Partial::empty());
    {
        let read_mask: Option<&ValidityMask> = mask.as_deref();
        (0..desc.n_tuples)
            .into_par_iter()
            .fold(Partial::empty, |mut acc, i| {
                if let Some(m) = read_mask {
                    if !m.is_valid(i) {
                        return acc;
                    }
                }
                let Some(v) = tuple_value(values, k, i) else {
                    return acc;
                };
                if check_nan && v.is_nan() {
                    acc.nan_samples.push(i);
                } else {
                    acc.min = acc.min.min(v);
                    acc.max = acc.max.max(v);
                }
                acc
            })
            .for_each(|partial| combined.lock().merge(partial));
    }

    let result = combined.into_inner();
    if let Some(m) = mask {
        for &i in &result.nan_samples {
            m.invalidate(i);
        }
    }
    if !result.nan_samples.is_empty() {
        warn!(
            "Field '{}': {} tuples contain NaN and were masked out",
            desc.name,
            result.nan_samples.len()
        );
    }

    if result.min > result.max {
        return Ok(None);
    }
    Ok(Some((desc.format.narrow(result.min), desc.format.narrow(result.max))))
}
