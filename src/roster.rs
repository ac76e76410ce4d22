//! Which tag belongs to which piece, and where each piece starts.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::{Position, TokenId};

pub const PIECES_PER_SIDE: usize = 16;
pub const FULL_SET: usize = 2 * PIECES_PER_SIDE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Pawn,
    Rook,
    Knight,
    Bishop,
    Queen,
    King,
}

impl PieceKind {
    fn count_per_side(self) -> usize {
        match self {
            PieceKind::Pawn => 8,
            PieceKind::Rook | PieceKind::Knight | PieceKind::Bishop => 2,
            PieceKind::Queen | PieceKind::King => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub uid: TokenId,
    pub color: Color,
    pub kind: PieceKind,
}

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("cannot read roster file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse roster file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("uid {0} listed twice")]
    Duplicate(TokenId),
    #[error("{color:?} has {found} {kind:?}, expected {expected}")]
    Composition {
        color: Color,
        kind: PieceKind,
        found: usize,
        expected: usize,
    },
}

/// The piece an opening position expects on `position`, if any.
pub fn expected_at(position: Position) -> Option<(Color, PieceKind)> {
    let back_rank = |file: u8| match file {
        1 | 8 => PieceKind::Rook,
        2 | 7 => PieceKind::Knight,
        3 | 6 => PieceKind::Bishop,
        4 => PieceKind::Queen,
        _ => PieceKind::King,
    };
    match position.rank() {
        1 => Some((Color::White, back_rank(position.file()))),
        2 => Some((Color::White, PieceKind::Pawn)),
        7 => Some((Color::Black, PieceKind::Pawn)),
        8 => Some((Color::Black, back_rank(position.file()))),
        _ => None,
    }
}

/// The session's expected identities: exactly one full chess set.
#[derive(Debug, Clone)]
pub struct Roster {
    pieces: HashMap<TokenId, (Color, PieceKind)>,
}

impl Roster {
    pub fn from_entries(entries: &[RosterEntry]) -> Result<Self, RosterError> {
        let mut pieces = HashMap::new();
        for e in entries {
            if pieces.insert(e.uid, (e.color, e.kind)).is_some() {
                return Err(RosterError::Duplicate(e.uid));
            }
        }
        for color in [Color::White, Color::Black] {
            for kind in [
                PieceKind::Pawn,
                PieceKind::Rook,
                PieceKind::Knight,
                PieceKind::Bishop,
                PieceKind::Queen,
                PieceKind::King,
            ] {
                let found = pieces.values().filter(|v| **v == (color, kind)).count();
                if found != kind.count_per_side() {
                    return Err(RosterError::Composition {
                        color,
                        kind,
                        found,
                        expected: kind.count_per_side(),
                    });
                }
            }
        }
        Ok(Self { pieces })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RosterError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<RosterEntry> = serde_json::from_str(&raw)?;
        Self::from_entries(&entries)
    }

    /// The tag set shipped with the board.
    pub fn standard() -> Self {
        let mut pieces = HashMap::new();
        for (color, kind, uids) in STANDARD_SET {
            for uid in *uids {
                if let Ok(t) = uid.parse::<TokenId>() {
                    pieces.insert(t, (*color, *kind));
                }
            }
        }
        Self { pieces }
    }

    pub fn piece(&self, token: &TokenId) -> Option<(Color, PieceKind)> {
        self.pieces.get(token).copied()
    }

    /// True when `token` is the right kind of piece for `position`'s opening square.
    pub fn accepts(&self, position: Position, token: &TokenId) -> bool {
        match (self.piece(token), expected_at(position)) {
            (Some(have), Some(want)) => have == want,
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// One valid opening layout: each tag paired with a square that accepts it.
    pub fn opening_layout(&self) -> Vec<(Position, TokenId)> {
        let mut tokens: Vec<(&TokenId, &(Color, PieceKind))> = self.pieces.iter().collect();
        tokens.sort_by_key(|(t, _)| t.to_hex());
        let mut layout = Vec::with_capacity(self.pieces.len());
        let mut used = std::collections::HashSet::new();
        for pos in Position::all() {
            let Some(want) = expected_at(pos) else { continue };
            if let Some((t, _)) = tokens.iter().find(|(t, p)| **p == want && !used.contains(*t)) {
                used.insert(**t);
                layout.push((pos, **t));
            }
        }
        layout
    }
}

type SetRow = (Color, PieceKind, &'static [&'static str]);

const STANDARD_SET: &[SetRow] = &[
    (Color::White, PieceKind::Pawn, &[
        "1D0BDB5D0D1080", "1D0CDB5D0D1080", "1D0DDB5D0D1080", "1D0EDB5D0D1080",
        "1D9BDB5D0D1080", "1DA7DA5D0D1080", "1DA8DA5D0D1080", "1DAADA5D0D1080",
    ]),
    (Color::White, PieceKind::Rook, &["1DA0DA5D0D1080", "1DA6DA5D0D1080"]),
    (Color::White, PieceKind::Knight, &["1DA5DA5D0D1080", "1DA9DA5D0D1080"]),
    (Color::White, PieceKind::Bishop, &["1DA1DA5D0D1080", "1DA4DA5D0D1080"]),
    (Color::White, PieceKind::King, &["1DA2DA5D0D1080"]),
    (Color::White, PieceKind::Queen, &["1DA3DA5D0D1080"]),
    (Color::Black, PieceKind::Pawn, &[
        "1D11DB5D0D1080", "1D12DB5D0D1080", "1D13DB5D0D1080", "1D14DB5D0D1080",
        "1D17DB5D0D1080", "1D19DB5D0D1080", "1D1ADB5D0D1080", "1D1EDB5D0D1080",
    ]),
    (Color::Black, PieceKind::Rook, &["1D0FDB5D0D1080", "1D1DDB5D0D1080"]),
    (Color::Black, PieceKind::Knight, &["1D10DB5D0D1080", "1D1CDB5D0D1080"]),
    (Color::Black, PieceKind::Bishop, &["1D15DB5D0D1080", "1D16DB5D0D1080"]),
    (Color::Black, PieceKind::Queen, &["1D18DB5D0D1080"]),
    (Color::Black, PieceKind::King, &["1D1BDB5D0D1080"]),
];
