//! Board-state synchronization for a sensor-grid chessboard.
//!
//! Turns per-square presence readings into semantic move hints, reconciles
//! them against peer acknowledgments, and streams notices back to the peer.

pub mod board;
pub mod classify;
pub mod engine;
pub mod events;
pub mod lifecycle;
pub mod logging;
pub mod notify;
pub mod peripherals;
pub mod protocol;
pub mod reconcile;
pub mod reliability;
pub mod roster;
pub mod sensor;
pub mod setup;
pub mod state;
pub mod verify;
