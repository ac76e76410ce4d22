use std::collections::HashMap;

use super::position::Position;
use super::token::TokenId;

/// Canonical record of which token sits on which square.
///
/// Both directions are kept in lockstep: every mutation removes the stale
/// counterpart before writing, so a token never maps to two squares and a
/// square never holds two tokens.
#[derive(Debug, Clone, Default)]
pub struct IdentityPositionMap {
    by_token: HashMap<TokenId, Position>,
    by_position: HashMap<Position, TokenId>,
}

impl IdentityPositionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `token` on `position`, detaching whatever either side pointed at.
    ///
    /// Returns the token that was displaced from `position`, if it was a
    /// different one.
    pub fn insert(&mut self, token: TokenId, position: Position) -> Option<TokenId> {
        if let Some(old_pos) = self.by_token.remove(&token) {
            self.by_position.remove(&old_pos);
        }
        let displaced = self.by_position.remove(&position);
        if let Some(other) = displaced {
            self.by_token.remove(&other);
        }
        self.by_token.insert(token, position);
        self.by_position.insert(position, token);
        displaced.filter(|other| *other != token)
    }

    pub fn remove_by_token(&mut self, token: &TokenId) -> Option<Position> {
        let pos = self.by_token.remove(token)?;
        self.by_position.remove(&pos);
        Some(pos)
    }

    pub fn remove_by_position(&mut self, position: &Position) -> Option<TokenId> {
        let token = self.by_position.remove(position)?;
        self.by_token.remove(&token);
        Some(token)
    }

    pub fn contains_token(&self, token: &TokenId) -> bool {
        self.by_token.contains_key(token)
    }

    pub fn contains_position(&self, position: &Position) -> bool {
        self.by_position.contains_key(position)
    }

    pub fn lookup_by_token(&self, token: &TokenId) -> Option<Position> {
        self.by_token.get(token).copied()
    }

    pub fn lookup_by_position(&self, position: &Position) -> Option<TokenId> {
        self.by_position.get(position).copied()
    }

    pub fn clear(&mut self) {
        self.by_token.clear();
        self.by_position.clear();
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }

    /// Entries sorted by square.
    pub fn entries(&self) -> Vec<(Position, TokenId)> {
        let mut out: Vec<_> = self.by_position.iter().map(|(p, t)| (*p, *t)).collect();
        out.sort_by_key(|(p, _)| *p);
        out
    }

    pub(crate) fn forward(&self) -> &HashMap<TokenId, Position> {
        &self.by_token
    }

    pub(crate) fn backward(&self) -> &HashMap<Position, TokenId> {
        &self.by_position
    }
}
