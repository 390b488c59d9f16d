use bitvec::prelude::*;

/// One bit per spatial sample; a cleared bit excludes the sample from
/// reductions and gradients.
///
/// Bits only ever go from valid to invalid. A sample invalidated through one
/// field stays invalid for every other field of the dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidityMask {
    bits: BitVec<u8, Lsb0>,
}

impl ValidityMask {
    /// Mask with every sample valid.
    pub fn all_valid(len: usize) -> Self {
        Self {
            bits: bitvec![u8, Lsb0; 1; len],
        }
    }

    /// Mask from packed bytes, least significant bit first. Missing bytes
    /// count as valid samples.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Self {
        let mut bits = BitVec::<u8, Lsb0>::from_slice(bytes);
        bits.resize(len, true);
        Self { bits }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Samples beyond the mask are treated as valid.
    pub fn is_valid(&self, index: usize) -> bool {
        self.bits.get(index).map(|b| *b).unwrap_or(true)
    }

    /// Permanently exclude a sample. Returns true if it was valid before.
    pub fn invalidate(&mut self, index: usize) -> bool {
        match self.bits.get_mut(index) {
            Some(mut bit) => {
                let was = *bit;
                *bit = false;
                was
            }
            None => false,
        }
    }

    pub fn count_valid(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn as_raw_slice(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }
}
