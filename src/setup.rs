//! Opening-position validation while the board waits for setup.
//!
//! Builds the canonical map from scratch: each correctly placed piece is
//! inserted directly, wrong pieces are held in the invalid set until the
//! square is emptied or corrected.

use crate::board::Position;
use crate::events::SemanticEvent;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::roster::{Roster, FULL_SET};
use crate::sensor::Reading;
use crate::state::BoardState;

pub fn validate(
    state: &mut BoardState,
    roster: &Roster,
    position: Position,
    reading: Reading,
) -> Vec<SemanticEvent> {
    let mut out = Vec::new();
    match reading {
        Reading::Present(token) if roster.accepts(position, &token) => {
            state.invalid.remove(&position);
            if state.map.lookup_by_position(&position) != Some(token) {
                let previous = state.map.lookup_by_token(&token);
                state.map.insert(token, position);
                push_vacated(&mut out, previous, position);
                log(
                    Level::Info,
                    Domain::Setup,
                    "placed",
                    obj(&[
                        ("square", v_str(&position.to_string())),
                        ("uid", v_str(&token.to_hex())),
                    ]),
                );
                out.push(SemanticEvent::PlacementValid { at: position });
            }
        }
        Reading::Present(token) => {
            state.map.remove_by_position(&position);
            let previous = state.map.remove_by_token(&token);
            push_vacated(&mut out, previous, position);
            if state.invalid.insert(position) {
                log(
                    Level::Warn,
                    Domain::Setup,
                    "invalid_placement",
                    obj(&[
                        ("square", v_str(&position.to_string())),
                        ("uid", v_str(&token.to_hex())),
                        ("msg", v_str("wrong piece for this square")),
                    ]),
                );
                out.push(SemanticEvent::PlacementInvalid { at: position });
            }
        }
        Reading::Empty => {
            let removed = state.map.remove_by_position(&position);
            let was_invalid = state.invalid.remove(&position);
            if let Some(token) = removed {
                log(
                    Level::Info,
                    Domain::Setup,
                    "removed",
                    obj(&[
                        ("square", v_str(&position.to_string())),
                        ("uid", v_str(&token.to_hex())),
                    ]),
                );
            }
            if removed.is_some() || was_invalid {
                out.push(SemanticEvent::PlacementCleared { at: position });
            }
        }
    }
    out
}

/// A recorded piece turned up elsewhere: its old square no longer holds it,
/// even if that square is scanned later in this sweep.
fn push_vacated(out: &mut Vec<SemanticEvent>, previous: Option<Position>, now: Position) {
    if let Some(old) = previous.filter(|old| *old != now) {
        out.push(SemanticEvent::PlacementCleared { at: old });
    }
}

/// All 32 pieces recorded and nothing flagged. Checked once per full sweep.
pub fn setup_complete(state: &BoardState) -> bool {
    state.map.len() == FULL_SET && state.invalid.is_empty()
}
