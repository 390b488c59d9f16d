//! Resumable big-endian primitive decoding.
//!
//! TCP hands us the stream in arbitrary chunks, so any primitive may straddle
//! two `push` calls. The decoder keeps the bytes it has already seen (a 4-byte
//! scratch for scalars, a length-sized buffer for blobs) and picks up where it
//! stopped on the next call.

use byteorder::{BigEndian, ByteOrder};

use crate::dtype::{Value, ValueKind};
use crate::error::{Error, Result};

/// Outcome of one decode attempt.
#[derive(Debug, PartialEq)]
pub enum Decoded<T> {
    /// The value is complete; `next` is the offset just past its last byte.
    Complete { value: T, next: usize },
    /// All remaining input was consumed and more bytes are needed.
    Incomplete,
}

impl<T> Decoded<T> {
    fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
        match self {
            Decoded::Complete { value, next } => Decoded::Complete { value: f(value), next },
            Decoded::Incomplete => Decoded::Incomplete,
        }
    }
}

#[derive(Debug)]
struct BlobState {
    data: Vec<u8>,
    filled: usize,
}

/// Assembles primitives across chunk boundaries.
///
/// At most one scalar or one blob is in progress at any time. A blob's
/// length prefix is itself a scalar, so while it is being assembled the
/// scratch is in use and no blob state exists yet.
#[derive(Debug, Default)]
pub struct PrimitiveDecoder {
    scratch: [u8; 4],
    filled: usize,
    blob: Option<BlobState>,
    max_blob_len: Option<u32>,
}

impl PrimitiveDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that rejects blobs longer than `max` bytes.
    pub fn with_max_blob_len(max: Option<u32>) -> Self {
        Self {
            max_blob_len: max,
            ..Self::default()
        }
    }

    /// True when no partial scalar or blob is pending.
    pub fn is_idle(&self) -> bool {
        self.filled == 0 && self.blob.is_none()
    }

    /// Drop any partially assembled value.
    pub fn reset(&mut self) {
        self.filled = 0;
        self.blob = None;
    }

    fn fill_scalar(&mut self, buf: &[u8], offset: usize, width: usize) -> Option<usize> {
        let available = buf.len().saturating_sub(offset);
        let take = (width - self.filled).min(available);
        if take > 0 {
            self.scratch[self.filled..self.filled + take].copy_from_slice(&buf[offset..offset + take]);
            self.filled += take;
        }
        if self.filled < width {
            return None;
        }
        self.filled = 0;
        Some(offset + take)
    }

    pub fn read_byte(&mut self, buf: &[u8], offset: usize) -> Decoded<u8> {
        match buf.get(offset) {
            Some(&b) => Decoded::Complete {
                value: b,
                next: offset + 1,
            },
            None => Decoded::Incomplete,
        }
    }

    pub fn read_i16(&mut self, buf: &[u8], offset: usize) -> Decoded<i16> {
        match self.fill_scalar(buf, offset, 2) {
            Some(next) => Decoded::Complete {
                value: BigEndian::read_i16(&self.scratch[..2]),
                next,
            },
            None => Decoded::Incomplete,
        }
    }

    pub fn read_i32(&mut self, buf: &[u8], offset: usize) -> Decoded<i32> {
        match self.fill_scalar(buf, offset, 4) {
            Some(next) => Decoded::Complete {
                value: BigEndian::read_i32(&self.scratch),
                next,
            },
            None => Decoded::Incomplete,
        }
    }

    /// A float is the bit reinterpretation of a big-endian 32-bit integer.
    pub fn read_f32(&mut self, buf: &[u8], offset: usize) -> Decoded<f32> {
        self.read_i32(buf, offset).map(|bits| f32::from_bits(bits as u32))
    }

    /// Length-prefixed byte array.
    pub fn read_blob(&mut self, buf: &[u8], offset: usize) -> Result<Decoded<Vec<u8>>> {
        let (mut state, mut offset) = match self.blob.take() {
            Some(state) => (state, offset),
            None => {
                let (len, next) = match self.read_i32(buf, offset) {
                    Decoded::Complete { value, next } => (value, next),
                    Decoded::Incomplete => return Ok(Decoded::Incomplete),
                };
                if len < 0 {
                    return Err(Error::InvalidLength(len));
                }
                if let Some(max) = self.max_blob_len {
                    if len as u32 > max {
                        return Err(Error::BlobTooLarge {
                            len: len as u32,
                            max,
                        });
                    }
                }
                let state = BlobState {
                    data: vec![0u8; len as usize],
                    filled: 0,
                };
                (state, next)
            }
        };

        let available = buf.len().saturating_sub(offset);
        let take = (state.data.len() - state.filled).min(available);
        if take > 0 {
            state.data[state.filled..state.filled + take].copy_from_slice(&buf[offset..offset + take]);
            state.filled += take;
            offset += take;
        }

        if state.filled == state.data.len() {
            Ok(Decoded::Complete {
                value: state.data,
                next: offset,
            })
        } else {
            self.blob = Some(state);
            Ok(Decoded::Incomplete)
        }
    }

    /// Length-prefixed text. Invalid UTF-8 sequences are replaced rather
    /// than rejected.
    pub fn read_string(&mut self, buf: &[u8], offset: usize) -> Result<Decoded<String>> {
        Ok(self.read_blob(buf, offset)?.map(|bytes| match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }))
    }

    /// Decode one primitive of the requested kind.
    pub fn read_value(&mut self, kind: ValueKind, buf: &[u8], offset: usize) -> Result<Decoded<Value>> {
        Ok(match kind {
            ValueKind::Byte => self.read_byte(buf, offset).map(Value::Byte),
            ValueKind::Short => self.read_i16(buf, offset).map(Value::Short),
            ValueKind::Int => self.read_i32(buf, offset).map(Value::Int),
            ValueKind::Float => self.read_f32(buf, offset).map(Value::Float),
            ValueKind::Str => self.read_string(buf, offset)?.map(Value::Str),
            ValueKind::Bytes => self.read_blob(buf, offset)?.map(Value::Bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i32_across_chunks() {
        let bytes = 0x0102_0304i32.to_be_bytes();
        let mut dec = PrimitiveDecoder::new();

        assert_eq!(dec.read_i32(&bytes[..1], 0), Decoded::Incomplete);
        assert!(!dec.is_idle());
        assert_eq!(dec.read_i32(&bytes[1..3], 0), Decoded::Incomplete);
        assert_eq!(
            dec.read_i32(&bytes[3..], 0),
            Decoded::Complete {
                value: 0x0102_0304,
                next: 1
            }
        );
        assert!(dec.is_idle());
    }

    #[test]
    fn test_negative_short_and_float() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(-2i16).to_be_bytes());
        buf.extend_from_slice(&1.5f32.to_bits().to_be_bytes());

        let mut dec = PrimitiveDecoder::new();
        let next = match dec.read_i16(&buf, 0) {
            Decoded::Complete { value, next } => {
                assert_eq!(value, -2);
                next
            }
            Decoded::Incomplete => panic!("short should be complete"),
        };
        assert_eq!(
            dec.read_f32(&buf, next),
            Decoded::Complete {
                value: 1.5,
                next: 6
            }
        );
    }

    #[test]
    fn test_string_split_in_length_and_body() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&5i32.to_be_bytes());
        buf.extend_from_slice(b"hello");

        let mut dec = PrimitiveDecoder::new();
        assert_eq!(dec.read_string(&buf[..2], 0).unwrap(), Decoded::Incomplete);
        assert_eq!(dec.read_string(&buf[2..6], 0).unwrap(), Decoded::Incomplete);
        assert_eq!(dec.read_string(&buf[6..8], 0).unwrap(), Decoded::Incomplete);
        assert_eq!(
            dec.read_string(&buf[8..], 0).unwrap(),
            Decoded::Complete {
                value: "hello".to_string(),
                next: 1
            }
        );
        assert!(dec.is_idle());
    }

    #[test]
    fn test_empty_blob_completes_without_body() {
        let buf = 0i32.to_be_bytes();
        let mut dec = PrimitiveDecoder::new();
        assert_eq!(
            dec.read_blob(&buf, 0).unwrap(),
            Decoded::Complete {
                value: Vec::new(),
                next: 4
            }
        );
    }

    #[test]
    fn test_byte_needs_input() {
        let mut dec = PrimitiveDecoder::new();
        assert_eq!(dec.read_byte(&[], 0), Decoded::Incomplete);
        assert_eq!(dec.read_byte(&[9], 0), Decoded::Complete { value: 9, next: 1 });
    }

    #[test]
    fn test_blob_length_policy() {
        let mut dec = PrimitiveDecoder::new();
        let err = dec.read_blob(&(-1i32).to_be_bytes(), 0).unwrap_err();
        assert!(matches!(err, Error::InvalidLength(-1)));

        let mut bounded = PrimitiveDecoder::with_max_blob_len(Some(4));
        let err = bounded.read_blob(&16i32.to_be_bytes(), 0).unwrap_err();
        assert!(matches!(err, Error::BlobTooLarge { len: 16, max: 4 }));

        // No bound configured: large declared lengths are accepted and wait for data.
        let mut open = PrimitiveDecoder::new();
        assert_eq!(open.read_blob(&4096i32.to_be_bytes(), 0).unwrap(), Decoded::Incomplete);
        assert!(!open.is_idle());
    }
}
