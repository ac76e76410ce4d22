//! Applies peer acknowledgments to the canonical map.
//!
//! During play this is the only writer of the map. Every command is checked
//! against current state first; a rejected ack leaves state byte-for-byte
//! unchanged.

use thiserror::Error;

use crate::board::{Position, TokenId};
use crate::lifecycle::{LifecycleEvent, Phase};
use crate::logging::{log, log_audit, log_rejected_ack, obj, v_str, Domain, Level};
use crate::protocol::AckCommand;
use crate::state::BoardState;

/// Ack that does not match canonical state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StaleAck {
    #[error("no piece on source square {0}")]
    UnknownSource(Position),
    #[error("no piece on target square {0}")]
    UnknownTarget(Position),
    #[error("target square {0} is occupied")]
    TargetOccupied(Position),
    #[error("source and target are both {0}")]
    SameSquare(Position),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("stale ack: {0}")]
    Stale(#[from] StaleAck),
    #[error("{command} not accepted while {phase:?}")]
    WrongPhase { command: AckCommand, phase: Phase },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Moved { token: TokenId, from: Position, to: Position },
    Captured { attacker: TokenId, captured: TokenId, from: Position, to: Position },
    Started { already_playing: bool },
    Ended,
}

pub fn apply_ack(state: &mut BoardState, command: AckCommand) -> Result<Applied, ReconcileError> {
    match apply(state, command) {
        Ok(applied) => {
            log(
                Level::Info,
                Domain::Reconcile,
                "ack_applied",
                obj(&[
                    ("command", v_str(&command.to_string())),
                    ("result", v_str(&format!("{:?}", applied))),
                ]),
            );
            log_audit("ack_applied", &state.digest(), state.map.len());
            Ok(applied)
        }
        Err(e) => {
            log_rejected_ack(&command.to_string(), &e.to_string(), &state.digest());
            Err(e)
        }
    }
}

fn require_playing(state: &BoardState, command: AckCommand) -> Result<(), ReconcileError> {
    if state.phase != Phase::Playing {
        return Err(ReconcileError::WrongPhase {
            command,
            phase: state.phase,
        });
    }
    Ok(())
}

fn apply(state: &mut BoardState, command: AckCommand) -> Result<Applied, ReconcileError> {
    match command {
        AckCommand::MoveAck { from, to } => {
            require_playing(state, command)?;
            if from == to {
                return Err(StaleAck::SameSquare(from).into());
            }
            let token = state
                .map
                .lookup_by_position(&from)
                .ok_or(StaleAck::UnknownSource(from))?;
            if state.map.contains_position(&to) {
                return Err(StaleAck::TargetOccupied(to).into());
            }
            state.map.remove_by_position(&from);
            state.map.insert(token, to);
            state.hover.remove(&token);
            Ok(Applied::Moved { token, from, to })
        }
        AckCommand::CaptureAck { from, to } => {
            require_playing(state, command)?;
            if from == to {
                return Err(StaleAck::SameSquare(from).into());
            }
            let attacker = state
                .map
                .lookup_by_position(&from)
                .ok_or(StaleAck::UnknownSource(from))?;
            let captured = state
                .map
                .lookup_by_position(&to)
                .ok_or(StaleAck::UnknownTarget(to))?;
            state.map.remove_by_token(&captured);
            state.hover.remove(&captured);
            state.map.remove_by_position(&from);
            state.map.insert(attacker, to);
            state.hover.remove(&attacker);
            Ok(Applied::Captured { attacker, captured, from, to })
        }
        AckCommand::GameStartConfirmed => {
            let (prev, _) = state
                .transition(LifecycleEvent::StartConfirmed)
                .map_err(|e| ReconcileError::WrongPhase {
                    command,
                    phase: e.from,
                })?;
            Ok(Applied::Started {
                already_playing: prev == Phase::Playing,
            })
        }
        AckCommand::GameEnded => {
            state.end_game().map_err(|e| ReconcileError::WrongPhase {
                command,
                phase: e.from,
            })?;
            Ok(Applied::Ended)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::invariants::assert_board_invariants;

    fn sq(s: &str) -> Position {
        s.parse().unwrap()
    }

    fn tok(b: u8) -> TokenId {
        TokenId::from_bytes(&[0x1D, b]).unwrap()
    }

    fn playing(pairs: &[(u8, &str)]) -> BoardState {
        let mut s = BoardState::new();
        s.phase = Phase::Playing;
        for (t, p) in pairs {
            s.map.insert(tok(*t), sq(p));
        }
        s
    }

    #[test]
    fn test_move_ack_commits_and_clears_hover() {
        let mut s = playing(&[(1, "e2")]);
        s.hover.insert(tok(1));
        let got = apply_ack(&mut s, AckCommand::MoveAck { from: sq("e2"), to: sq("e4") }).unwrap();
        assert_eq!(got, Applied::Moved { token: tok(1), from: sq("e2"), to: sq("e4") });
        assert_eq!(s.map.lookup_by_token(&tok(1)), Some(sq("e4")));
        assert!(!s.map.contains_position(&sq("e2")));
        assert!(s.hover.is_empty());
        assert_board_invariants(&s).unwrap();
    }

    #[test]
    fn test_repeated_move_ack_is_stale() {
        let mut s = playing(&[(1, "e2")]);
        let ack = AckCommand::MoveAck { from: sq("e2"), to: sq("e4") };
        apply_ack(&mut s, ack).unwrap();
        let before = s.digest();
        assert_eq!(
            apply_ack(&mut s, ack),
            Err(ReconcileError::Stale(StaleAck::UnknownSource(sq("e2"))))
        );
        assert_eq!(s.digest(), before);
    }

    #[test]
    fn test_move_onto_occupied_square_rejected() {
        let mut s = playing(&[(1, "e2"), (2, "e4")]);
        let before = s.digest();
        assert_eq!(
            apply_ack(&mut s, AckCommand::MoveAck { from: sq("e2"), to: sq("e4") }),
            Err(ReconcileError::Stale(StaleAck::TargetOccupied(sq("e4"))))
        );
        assert_eq!(s.digest(), before);
    }

    #[test]
    fn test_capture_ack_removes_victim_entirely() {
        let mut s = playing(&[(1, "e4"), (2, "d5")]);
        s.hover.insert(tok(1));
        let got = apply_ack(&mut s, AckCommand::CaptureAck { from: sq("e4"), to: sq("d5") }).unwrap();
        assert!(matches!(got, Applied::Captured { .. }));
        assert!(!s.map.contains_token(&tok(2)));
        assert_eq!(s.map.lookup_by_token(&tok(1)), Some(sq("d5")));
        assert!(!s.map.contains_position(&sq("e4")));
        assert_eq!(s.map.len(), 1);
        assert!(s.hover.is_empty());
        assert_board_invariants(&s).unwrap();
    }

    #[test]
    fn test_capture_ack_with_missing_sides() {
        let mut s = playing(&[(1, "e4")]);
        assert_eq!(
            apply_ack(&mut s, AckCommand::CaptureAck { from: sq("e4"), to: sq("d5") }),
            Err(ReconcileError::Stale(StaleAck::UnknownTarget(sq("d5"))))
        );
        assert_eq!(
            apply_ack(&mut s, AckCommand::CaptureAck { from: sq("a1"), to: sq("e4") }),
            Err(ReconcileError::Stale(StaleAck::UnknownSource(sq("a1"))))
        );
        assert_eq!(
            apply_ack(&mut s, AckCommand::CaptureAck { from: sq("e4"), to: sq("e4") }),
            Err(ReconcileError::Stale(StaleAck::SameSquare(sq("e4"))))
        );
    }

    #[test]
    fn test_acks_rejected_outside_play() {
        let mut s = BoardState::new();
        s.phase = Phase::Ready;
        s.map.insert(tok(1), sq("e2"));
        let err = apply_ack(&mut s, AckCommand::MoveAck { from: sq("e2"), to: sq("e4") }).unwrap_err();
        assert!(matches!(err, ReconcileError::WrongPhase { phase: Phase::Ready, .. }));
        assert_eq!(s.map.lookup_by_token(&tok(1)), Some(sq("e2")));
    }

    #[test]
    fn test_start_confirmed_idempotent() {
        let mut s = BoardState::new();
        s.phase = Phase::Ready;
        assert_eq!(
            apply_ack(&mut s, AckCommand::GameStartConfirmed),
            Ok(Applied::Started { already_playing: false })
        );
        assert_eq!(
            apply_ack(&mut s, AckCommand::GameStartConfirmed),
            Ok(Applied::Started { already_playing: true })
        );
        assert_eq!(s.phase, Phase::Playing);
    }

    #[test]
    fn test_start_before_setup_rejected() {
        let mut s = BoardState::new();
        s.phase = Phase::AwaitingSetup;
        assert!(matches!(
            apply_ack(&mut s, AckCommand::GameStartConfirmed),
            Err(ReconcileError::WrongPhase { phase: Phase::AwaitingSetup, .. })
        ));
    }

    #[test]
    fn test_game_ended_resets_to_setup() {
        let mut s = playing(&[(1, "e2"), (2, "e7")]);
        s.hover.insert(tok(2));
        assert_eq!(apply_ack(&mut s, AckCommand::GameEnded), Ok(Applied::Ended));
        assert_eq!(s.phase, Phase::AwaitingSetup);
        assert!(s.map.is_empty());
        assert!(s.hover.is_empty());
    }
}
