//! Text protocol spoken with the peer application.
//!
//! Inbound commands are ASCII with fixed prefixes; squares are two
//! characters, file letter then rank digit (`e2`). Outbound records mirror
//! the same encoding.

use std::fmt;

use thiserror::Error;

use crate::board::Position;
use crate::events::{Outbound, SemanticEvent};

/// Peer confirmations that commit (or end) board state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCommand {
    MoveAck { from: Position, to: Position },
    CaptureAck { from: Position, to: Position },
    GameStartConfirmed,
    GameEnded,
}

impl fmt::Display for AckCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckCommand::MoveAck { from, to } => write!(f, "move_ack:{}{}", from, to),
            AckCommand::CaptureAck { from, to } => write!(f, "capture_ack:{}{}", from, to),
            AckCommand::GameStartConfirmed => f.write_str("start_confirmed"),
            AckCommand::GameEnded => f.write_str("game_ended"),
        }
    }
}

/// Requests for the LED / motion collaborators. Never touch board state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackCommand {
    /// First square is the selected piece, the rest are its targets.
    LightOn(Vec<Position>),
    LightOff,
    InCheck(Position),
    ClearPiece(Vec<Position>),
    MoveRequest { from: Position, to: Position },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCommand {
    Ack(AckCommand),
    Feedback(FeedbackCommand),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("{command}: bad square list {raw:?}")]
    BadSquares { command: &'static str, raw: String },
}

fn squares(command: &'static str, raw: &str) -> Result<Vec<Position>, ProtocolError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bad = || ProtocolError::BadSquares {
        command,
        raw: raw.to_string(),
    };
    if compact.is_empty() || compact.len() % 2 != 0 || !compact.is_ascii() {
        return Err(bad());
    }
    compact
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| s.parse::<Position>().ok())
                .ok_or_else(bad)
        })
        .collect()
}

fn square_pair(command: &'static str, raw: &str) -> Result<(Position, Position), ProtocolError> {
    match squares(command, raw)?.as_slice() {
        [from, to] => Ok((*from, *to)),
        _ => Err(ProtocolError::BadSquares {
            command,
            raw: raw.to_string(),
        }),
    }
}

fn single_square(command: &'static str, raw: &str) -> Result<Position, ProtocolError> {
    match squares(command, raw)?.as_slice() {
        [at] => Ok(*at),
        _ => Err(ProtocolError::BadSquares {
            command,
            raw: raw.to_string(),
        }),
    }
}

pub fn parse_command(text: &str) -> Result<PeerCommand, ProtocolError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ProtocolError::Empty);
    }
    match text {
        "start_confirmed" => return Ok(PeerCommand::Ack(AckCommand::GameStartConfirmed)),
        "game_ended" => return Ok(PeerCommand::Ack(AckCommand::GameEnded)),
        "light_off" => return Ok(PeerCommand::Feedback(FeedbackCommand::LightOff)),
        _ => {}
    }
    let Some((prefix, rest)) = text.split_once(':') else {
        return Err(ProtocolError::Unknown(text.to_string()));
    };
    let cmd = match prefix {
        "move_ack" => {
            let (from, to) = square_pair("move_ack", rest)?;
            PeerCommand::Ack(AckCommand::MoveAck { from, to })
        }
        "capture_ack" => {
            let (from, to) = square_pair("capture_ack", rest)?;
            PeerCommand::Ack(AckCommand::CaptureAck { from, to })
        }
        "move_cnc" => {
            let (from, to) = square_pair("move_cnc", rest)?;
            PeerCommand::Feedback(FeedbackCommand::MoveRequest { from, to })
        }
        "light_on" => PeerCommand::Feedback(FeedbackCommand::LightOn(squares("light_on", rest)?)),
        "clear_piece" => {
            PeerCommand::Feedback(FeedbackCommand::ClearPiece(squares("clear_piece", rest)?))
        }
        "in_check" => PeerCommand::Feedback(FeedbackCommand::InCheck(single_square("in_check", rest)?)),
        _ => return Err(ProtocolError::Unknown(text.to_string())),
    };
    Ok(cmd)
}

/// Wire form of an outbound message.
pub fn encode(msg: &Outbound) -> String {
    match msg {
        Outbound::ReadyToStart => "ready_to_start".to_string(),
        Outbound::Connected => "connected".to_string(),
        Outbound::Event(e) => match e {
            SemanticEvent::Hover { at } => format!("hover:{}", at),
            SemanticEvent::HoverCleared { .. } => "clear".to_string(),
            SemanticEvent::Move { from, to } => format!("move:{}{}", from, to),
            SemanticEvent::Capture { from, at } => format!("capture:{}{}", from, at),
            SemanticEvent::ForeignObject { at } => format!("foreign:{}", at),
            SemanticEvent::ForeignObjectCleared { at } => format!("foreign_clear:{}", at),
            SemanticEvent::PlacementValid { at } => format!("placement_valid:{}", at),
            SemanticEvent::PlacementInvalid { at } => format!("placement_invalid:{}", at),
            SemanticEvent::PlacementCleared { at } => format!("placement_clear:{}", at),
        },
    }
}
