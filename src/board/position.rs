use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const FILES: u8 = 8;
pub const RANKS: u8 = 8;

/// One square of the board. `file` and `rank` are both 1-based.
///
/// Ordering is row-major (rank first, then file) so iterating a sorted
/// collection matches the physical sweep order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    rank: u8,
    file: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("square out of range: file={file} rank={rank}")]
    OutOfRange { file: u8, rank: u8 },
    #[error("malformed square {0:?}")]
    Malformed(String),
}

impl Position {
    pub fn new(file: u8, rank: u8) -> Result<Self, PositionError> {
        if !(1..=FILES).contains(&file) || !(1..=RANKS).contains(&rank) {
            return Err(PositionError::OutOfRange { file, rank });
        }
        Ok(Self { rank, file })
    }

    /// Sensor index `0..64`, rank 1 first.
    pub fn from_index(index: usize) -> Option<Self> {
        if index >= (FILES as usize) * (RANKS as usize) {
            return None;
        }
        Some(Self {
            file: (index % FILES as usize) as u8 + 1,
            rank: (index / FILES as usize) as u8 + 1,
        })
    }

    pub fn index(&self) -> usize {
        (self.rank as usize - 1) * FILES as usize + (self.file as usize - 1)
    }

    pub fn file(&self) -> u8 {
        self.file
    }

    pub fn rank(&self) -> u8 {
        self.rank
    }

    pub fn file_char(&self) -> char {
        (b'a' + self.file - 1) as char
    }

    /// All 64 squares in sweep order.
    pub fn all() -> impl Iterator<Item = Position> {
        (0..(FILES as usize * RANKS as usize)).filter_map(Position::from_index)
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.rank, self.file).cmp(&(other.rank, other.file))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file_char(), self.rank)
    }
}

impl FromStr for Position {
    type Err = PositionError;

    /// Parses algebraic notation: file letter `a`..`h` then rank digit `1`..`8`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(PositionError::Malformed(s.to_string()));
        }
        let file = bytes[0].to_ascii_lowercase();
        let rank = bytes[1];
        if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
            return Err(PositionError::Malformed(s.to_string()));
        }
        Position::new(file - b'a' + 1, rank - b'0')
    }
}

/// Serialized in the same two-character form used on the wire, so a
/// deserialized square has passed the range check.
impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
