//! Base-32 blockchain name codec.
//!
//! Account, table, scope, action and permission identities are all 64-bit
//! names: up to 13 characters from `.12345a-z`, packed 5 bits per character
//! except the 13th, which only gets the remaining 4 bits and is therefore
//! restricted to `.1-5a-j`.  The packing is chosen so that numeric ordering
//! of the raw value matches lexicographic ordering of the decoded string.

use std::fmt;
use std::str::FromStr;

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Character set indexed by 5-bit symbol value.
const NAME_CHARS: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

/// Errors from decoding a name string.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum NameError {
    #[error("name longer than 13 characters: {0}")]
    TooLong(String),

    #[error("invalid character {1:?} in name {0}")]
    InvalidChar(String, char),

    /// The 13th character only has 4 bits available.
    #[error("character {1:?} not allowed in 13th position of name {0}")]
    InvalidTailChar(String, char),
}

/// A 64-bit encoded blockchain name.
#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Default,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct Name(u64);

impl Name {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Renders the canonical 16-lowercase-hex-digit form used in row keys.
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl From<u64> for Name {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Name> for u64 {
    fn from(value: Name) -> Self {
        value.0
    }
}

fn symbol_of(c: u8) -> Option<u64> {
    match c {
        b'.' => Some(0),
        b'1'..=b'5' => Some((c - b'1') as u64 + 1),
        b'a'..=b'z' => Some((c - b'a') as u64 + 6),
        _ => None,
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = [b'.'; 13];
        let mut tmp = self.0;
        for i in 0..13 {
            let (mask, shift) = if i == 0 { (0x0f, 4) } else { (0x1f, 5) };
            chars[12 - i] = NAME_CHARS[(tmp & mask) as usize];
            tmp >>= shift;
        }

        let trimmed = chars.iter().rposition(|c| *c != b'.').map_or(0, |p| p + 1);
        // The charset is ASCII, so the slice is always valid UTF-8.
        f.write_str(std::str::from_utf8(&chars[..trimmed]).map_err(|_| fmt::Error)?)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() > 13 {
            return Err(NameError::TooLong(s.to_string()));
        }

        let mut value = 0u64;
        for (i, c) in bytes.iter().enumerate() {
            let symbol =
                symbol_of(*c).ok_or_else(|| NameError::InvalidChar(s.to_string(), *c as char))?;
            if i < 12 {
                value |= symbol << (64 - 5 * (i as u64 + 1));
            } else {
                if symbol > 0x0f {
                    return Err(NameError::InvalidTailChar(s.to_string(), *c as char));
                }
                value |= symbol;
            }
        }

        Ok(Self(value))
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        s.parse().expect("valid name")
    }

    #[test]
    fn test_known_values() {
        // 'a' is symbol 6, shifted into the top 5 bits.
        assert_eq!(name("a").as_u64(), 6 << 59);
        assert_eq!(name("").as_u64(), 0);
        assert_eq!(Name::new(0).to_string(), "");
    }

    #[test]
    fn test_roundtrip() {
        for s in [
            "eosio",
            "eosio.token",
            "a",
            "zzzzzzzzzzzz",
            "active",
            "a.b.c",
            "12345abcdefgh",
            "aaaaaaaaaaaaj",
        ] {
            assert_eq!(name(s).to_string(), s, "roundtrip of {s}");
        }
    }

    #[test]
    fn test_hex_form() {
        assert_eq!(name("a").to_hex(), "3000000000000000");
        assert_eq!(Name::new(0).to_hex(), "0000000000000000");
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(matches!(
            "0abc".parse::<Name>(),
            Err(NameError::InvalidChar(_, '0'))
        ));
        assert!(matches!(
            "toolongtoolong".parse::<Name>(),
            Err(NameError::TooLong(_))
        ));
        // 'z' encodes to 31, which does not fit the 4-bit tail.
        assert!(matches!(
            "aaaaaaaaaaaaz".parse::<Name>(),
            Err(NameError::InvalidTailChar(_, 'z'))
        ));
    }

    #[test]
    fn test_numeric_order_matches_string_order() {
        let mut names = ["alice", "bob", "a.b", "ab", "abc", "zz", "111", "eosio"]
            .iter()
            .map(|s| name(s))
            .collect::<Vec<_>>();
        names.sort();

        let strings = names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        let mut sorted = strings.clone();
        sorted.sort();
        assert_eq!(strings, sorted);
    }

    #[test]
    fn test_serde_as_string() {
        let n = name("eosio.token");
        let json = serde_json::to_string(&n).expect("serialize");
        assert_eq!(json, "\"eosio.token\"");
        let back: Name = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, n);
    }
}
