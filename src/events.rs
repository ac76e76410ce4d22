use serde::Serialize;

use crate::board::Position;

/// What the classifier or the placement validator concluded about one square.
///
/// Hints only: canonical state changes when the peer acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SemanticEvent {
    Hover { at: Position },
    HoverCleared { at: Position },
    Move { from: Position, to: Position },
    Capture { from: Position, at: Position },
    ForeignObject { at: Position },
    ForeignObjectCleared { at: Position },
    PlacementValid { at: Position },
    PlacementInvalid { at: Position },
    PlacementCleared { at: Position },
}

impl SemanticEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SemanticEvent::Hover { .. } => "hover",
            SemanticEvent::HoverCleared { .. } => "hover_cleared",
            SemanticEvent::Move { .. } => "move",
            SemanticEvent::Capture { .. } => "capture",
            SemanticEvent::ForeignObject { .. } => "foreign_object",
            SemanticEvent::ForeignObjectCleared { .. } => "foreign_object_cleared",
            SemanticEvent::PlacementValid { .. } => "placement_valid",
            SemanticEvent::PlacementInvalid { .. } => "placement_invalid",
            SemanticEvent::PlacementCleared { .. } => "placement_cleared",
        }
    }

    /// The square this event is about (the destination for moves and captures).
    pub fn square(&self) -> Position {
        match *self {
            SemanticEvent::Hover { at }
            | SemanticEvent::HoverCleared { at }
            | SemanticEvent::Capture { at, .. }
            | SemanticEvent::ForeignObject { at }
            | SemanticEvent::ForeignObjectCleared { at }
            | SemanticEvent::PlacementValid { at }
            | SemanticEvent::PlacementInvalid { at }
            | SemanticEvent::PlacementCleared { at } => at,
            SemanticEvent::Move { to, .. } => to,
        }
    }
}

/// Everything that goes out to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outbound {
    Event(SemanticEvent),
    ReadyToStart,
    Connected,
}

impl From<SemanticEvent> for Outbound {
    fn from(e: SemanticEvent) -> Self {
        Outbound::Event(e)
    }
}
