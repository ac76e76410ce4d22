use thiserror::Error;

use crate::board::IdentityPositionMap;
use crate::state::BoardState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invariant violated: {msg}")]
pub struct InvariantViolation {
    pub msg: String,
}

impl InvariantViolation {
    fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

/// Both directions of the map must describe the same set of pairs.
pub fn assert_bijection(map: &IdentityPositionMap) -> Result<(), InvariantViolation> {
    let forward = map.forward();
    let backward = map.backward();
    if forward.len() != backward.len() {
        return Err(InvariantViolation::new(format!(
            "map sides differ in size: {} tokens vs {} squares",
            forward.len(),
            backward.len()
        )));
    }
    for (token, pos) in forward {
        if backward.get(pos) != Some(token) {
            return Err(InvariantViolation::new(format!(
                "token {} points at {} but that square does not point back",
                token, pos
            )));
        }
    }
    for (pos, token) in backward {
        if forward.get(token) != Some(pos) {
            return Err(InvariantViolation::new(format!(
                "square {} holds {} but that token does not point back",
                pos, token
            )));
        }
    }
    Ok(())
}

/// Every lifted token is a known token, so the hover set can never outgrow the map.
pub fn assert_hover_bound(state: &BoardState) -> Result<(), InvariantViolation> {
    if state.hover.len() > state.map.len() {
        return Err(InvariantViolation::new(format!(
            "{} hovering tokens but only {} on the map",
            state.hover.len(),
            state.map.len()
        )));
    }
    if let Some(stray) = state.hover.iter().find(|t| !state.map.contains_token(t)) {
        return Err(InvariantViolation::new(format!(
            "hovering token {} is not on the map",
            stray
        )));
    }
    Ok(())
}

pub fn assert_board_invariants(state: &BoardState) -> Result<(), InvariantViolation> {
    assert_bijection(&state.map)?;
    assert_hover_bound(state)
}
