//! Phase state machine for one board session.
//!
//! ```text
//! Disconnected ──connect──► AwaitingSetup ──setup complete──► Ready
//!       ▲                        ▲                              │
//!       │                        │                        start_confirmed
//!   disconnect               (reset)                            ▼
//!  (any phase)                   └────────── Ended ◄─game_ended── Playing
//! ```
//!
//! Only one of the placement validator (`AwaitingSetup`) and the event
//! classifier (`Playing`) is ever the source of truth for sweeps.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Disconnected,
    AwaitingSetup,
    Ready,
    Playing,
    Ended,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Disconnected => "disconnected",
            Phase::AwaitingSetup => "awaiting_setup",
            Phase::Ready => "ready",
            Phase::Playing => "playing",
            Phase::Ended => "ended",
        }
    }

    /// Value of the readable status the peer polls, in the same words as
    /// the outbound notices.
    pub fn status(&self) -> &'static str {
        match self {
            Phase::Disconnected => "waiting",
            Phase::AwaitingSetup => "connected",
            Phase::Ready => "ready_to_start",
            Phase::Playing => "playing",
            Phase::Ended => "ended",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    PeerConnected,
    SetupComplete,
    StartConfirmed,
    GameEnded,
    ResetDone,
    PeerDisconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no transition from {from:?} on {event:?}")]
pub struct TransitionError {
    pub from: Phase,
    pub event: LifecycleEvent,
}

/// Next phase for `event`, or an error when the event is illegal in `from`.
///
/// Repeating the event that led into the current phase is accepted and
/// leaves the phase unchanged.
pub fn next_phase(from: Phase, event: LifecycleEvent) -> Result<Phase, TransitionError> {
    use LifecycleEvent as E;
    use Phase as P;
    match (from, event) {
        (_, E::PeerDisconnected) => Ok(P::Disconnected),
        (P::Disconnected, E::PeerConnected) => Ok(P::AwaitingSetup),
        (P::AwaitingSetup, E::PeerConnected) => Ok(P::AwaitingSetup),
        (P::AwaitingSetup, E::SetupComplete) => Ok(P::Ready),
        (P::Ready, E::StartConfirmed) => Ok(P::Playing),
        (P::Playing, E::StartConfirmed) => Ok(P::Playing),
        (P::AwaitingSetup | P::Ready | P::Playing | P::Ended, E::GameEnded) => Ok(P::Ended),
        (P::Ended, E::ResetDone) => Ok(P::AwaitingSetup),
        _ => Err(TransitionError { from, event }),
    }
}
