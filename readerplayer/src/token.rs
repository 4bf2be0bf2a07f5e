use core::fmt;
use core::fmt::Write as _;
use core::str::FromStr;

use heapless::String;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Longest UID an ISO 14443A tag can report (triple size).
pub const MAX_UID_LEN: usize = 10;

const HEX_LEN: usize = MAX_UID_LEN * 2;

/// Canonical identity of a scanned tag: its UID as lowercase hex, no prefix.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(String<HEX_LEN>);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenParseError {
    #[error("token is empty")]
    Empty,
    #[error("token is longer than 10 bytes")]
    TooLong,
    #[error("token has an odd number of hex digits")]
    OddLength,
    #[error("token contains a non-hex character")]
    InvalidDigit,
}

impl TokenId {
    pub fn from_bytes(uid: &[u8]) -> Result<Self, TokenParseError> {
        if uid.is_empty() {
            return Err(TokenParseError::Empty);
        }
        if uid.len() > MAX_UID_LEN {
            return Err(TokenParseError::TooLong);
        }

        let mut hex = String::new();
        for byte in uid {
            // capacity is checked above
            write!(hex, "{:02x}", byte).map_err(|_| TokenParseError::TooLong)?;
        }
        Ok(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TokenId {
    type Err = TokenParseError;

    /// Accepts an optional `0x` prefix and either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        if digits.is_empty() {
            return Err(TokenParseError::Empty);
        }
        if digits.len() > HEX_LEN {
            return Err(TokenParseError::TooLong);
        }
        if digits.len() % 2 != 0 {
            return Err(TokenParseError::OddLength);
        }

        let mut hex = String::new();
        for c in digits.chars() {
            if !c.is_ascii_hexdigit() {
                return Err(TokenParseError::InvalidDigit);
            }
            hex.push(c.to_ascii_lowercase())
                .map_err(|_| TokenParseError::TooLong)?;
        }
        Ok(Self(hex))
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId(0x{})", self.0)
    }
}

impl Serialize for TokenId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // room for a "0x" prefix and some surrounding whitespace
        let raw = String::<{ HEX_LEN + 4 }>::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Zero-based folder number. The player numbers its folders from one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FolderIndex(pub u16);

impl FolderIndex {
    pub fn one_based(self) -> u32 {
        u32::from(self.0) + 1
    }

    pub fn from_one_based(folder: u16) -> Option<Self> {
        folder.checked_sub(1).map(Self)
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for FolderIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
