//! Per-square event classification during play.
//!
//! Compares one resolved reading against the canonical map and the hover
//! set. Only the hover set and the foreign-object alerts are written here;
//! the map itself changes only when the peer acknowledges.

use crate::board::Position;
use crate::events::SemanticEvent;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::sensor::Reading;
use crate::state::BoardState;

pub fn classify(state: &mut BoardState, position: Position, reading: Reading) -> Vec<SemanticEvent> {
    let mut out = Vec::new();
    match reading {
        Reading::Present(token) => {
            if !state.map.contains_token(&token) {
                if state.foreign.insert(position, token) != Some(token) {
                    log(
                        Level::Warn,
                        Domain::Classify,
                        "foreign_object",
                        obj(&[
                            ("square", v_str(&position.to_string())),
                            ("uid", v_str(&token.to_hex())),
                            ("msg", v_str("remove this piece, it is not part of the game")),
                        ]),
                    );
                }
                out.push(SemanticEvent::ForeignObject { at: position });
                return out;
            }
            if state.foreign.remove(&position).is_some() {
                out.push(SemanticEvent::ForeignObjectCleared { at: position });
            }

            // Known token: where does the map say it lives?
            let Some(home) = state.map.lookup_by_token(&token) else {
                return out;
            };
            match state.map.lookup_by_position(&position) {
                Some(owner) if owner == token => {
                    if state.hover.remove(&token) {
                        out.push(SemanticEvent::HoverCleared { at: position });
                    }
                }
                Some(_) => out.push(SemanticEvent::Capture { from: home, at: position }),
                None => out.push(SemanticEvent::Move { from: home, to: position }),
            }
        }
        Reading::Empty => {
            if state.foreign.remove(&position).is_some() {
                log(
                    Level::Info,
                    Domain::Classify,
                    "foreign_object_removed",
                    obj(&[("square", v_str(&position.to_string()))]),
                );
                out.push(SemanticEvent::ForeignObjectCleared { at: position });
            }
            if let Some(owner) = state.map.lookup_by_position(&position) {
                if state.hover.insert(owner) {
                    out.push(SemanticEvent::Hover { at: position });
                }
            }
        }
    }
    for e in &out {
        log(
            Level::Debug,
            Domain::Classify,
            e.name(),
            obj(&[("square", v_str(&e.square().to_string()))]),
        );
    }
    out
}
