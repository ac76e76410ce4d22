//! Board vocabulary: squares, tag identities and the canonical map between them.

pub mod map;
pub mod position;
pub mod token;

pub use map::IdentityPositionMap;
pub use position::{Position, PositionError};
pub use token::{TokenError, TokenId};
