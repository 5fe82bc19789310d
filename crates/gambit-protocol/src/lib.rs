//! Wire protocol for gambit.
//!
//! This crate defines the "language" peers and the server speak:
//!
//! - **Types** ([`Color`], [`RoomCode`], [`Identity`], [`TimeControl`],
//!   [`Outcome`], ...): game vocabulary shared by every layer.
//! - **Events** ([`ClientEvent`], [`ServerEvent`]): what travels over a
//!   connection in each direction.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how events are turned
//!   into frames and back.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing that.
//!
//! # Architecture
//!
//! ```text
//! Transport (frames) → Protocol (events) → Session (rooms, identities)
//! ```

mod codec;
mod error;
mod events;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use events::{ClientEvent, ServerEvent, codes};
pub use gambit_transport::ConnectionId;
pub use types::{
    ClockView, Color, EndReason, GameResult, Identity, MoveRequest,
    Outcome, PlayerView, RoomCode, RoomStatus, SeatsView, TimeControl,
};
