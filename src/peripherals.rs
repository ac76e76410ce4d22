//! Seam to the LED matrix and the motorized mover.
//!
//! The core never drives hardware itself; it hands semantic events and peer
//! feedback requests to whatever implements [`Peripherals`].

use serde_json::json;

use crate::board::Position;
use crate::events::SemanticEvent;
use crate::lifecycle::Phase;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::protocol::FeedbackCommand;
use crate::roster::expected_at;

pub trait Peripherals: Send + Sync {
    /// Render a classifier or validator result.
    fn render(&self, event: &SemanticEvent);

    /// Act on a feedback request from the peer. `occupied` lists the
    /// command's squares that hold a piece on the canonical map.
    fn feedback(&self, command: &FeedbackCommand, occupied: &[Position]);

    fn phase_changed(&self, _phase: Phase) {}
}

/// Square colour for an event: red for something to remove, green for an
/// empty starting square still waiting for its piece.
pub fn led_color(event: &SemanticEvent) -> &'static str {
    match event {
        SemanticEvent::ForeignObject { .. } | SemanticEvent::PlacementInvalid { .. } => "red",
        SemanticEvent::PlacementCleared { at } if expected_at(*at).is_some() => "green",
        _ => "off",
    }
}

/// Logs what a real LED/mover driver would be asked to do.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPeripherals;

impl Peripherals for LogPeripherals {
    fn render(&self, event: &SemanticEvent) {
        let color = led_color(event);
        log(
            Level::Debug,
            Domain::Peripheral,
            "render",
            obj(&[
                ("square", v_str(&event.square().to_string())),
                ("event", v_str(event.name())),
                ("color", v_str(color)),
            ]),
        );
    }

    fn feedback(&self, command: &FeedbackCommand, occupied: &[Position]) {
        let squares = match command {
            FeedbackCommand::LightOn(list) | FeedbackCommand::ClearPiece(list) => {
                list.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(",")
            }
            FeedbackCommand::InCheck(p) => p.to_string(),
            FeedbackCommand::MoveRequest { from, to } => format!("{}{}", from, to),
            FeedbackCommand::LightOff => String::new(),
        };
        log(
            Level::Info,
            Domain::Peripheral,
            "feedback",
            obj(&[
                ("command", v_str(&format!("{:?}", command))),
                ("squares", v_str(&squares)),
                ("occupied", json!(occupied.len())),
            ]),
        );
    }

    fn phase_changed(&self, phase: Phase) {
        log(
            Level::Debug,
            Domain::Peripheral,
            "phase",
            obj(&[("phase", v_str(phase.as_str()))]),
        );
    }
}
