use std::fmt;

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::buf::Buf32;

/// Reference to a block: its height and ID.
///
/// The zero reference (height 0, all-zero ID) stands for "no block", e.g. a
/// database whose last-written-block marker has never been set.
#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Debug,
    Default,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct BlockRef {
    num: u64,
    id: Buf32,
}

impl BlockRef {
    pub fn new(num: u64, id: Buf32) -> Self {
        Self { num, id }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn num(&self) -> u64 {
        self.num
    }

    pub fn id(&self) -> &Buf32 {
        &self.id
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0 && self.id.is_zero()
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.num, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ref() {
        assert!(BlockRef::zero().is_zero());
        assert!(!BlockRef::new(4, Buf32::zero()).is_zero());
        assert!(!BlockRef::new(0, Buf32::from([2u8; 32])).is_zero());
    }

    #[test]
    fn test_borsh_roundtrip() {
        let block = BlockRef::new(1042, Buf32::from([7u8; 32]));
        let encoded = borsh::to_vec(&block).expect("serialize block ref");
        let decoded: BlockRef = borsh::from_slice(&encoded).expect("deserialize block ref");
        assert_eq!(decoded, block);
    }
}
