//! Session layer for gambit.
//!
//! This crate sits between the connection handlers and the rooms:
//!
//! 1. **Admission**: [`authenticate`] turns a token into an [`Identity`]
//!    through an [`AuthVerifier`], falling back to a guest identity when
//!    the auth service is down.
//! 2. **Routing**: [`SessionManager`] owns the room registry and the
//!    connection index, and turns every inbound event into a room
//!    operation plus the events peers need to see.
//! 3. **Mirroring**: [`Mirror`] copies matches, moves, and results to a
//!    [`MatchStore`] without ever holding up a game.
//!
//! ```text
//! Server (above)   ← feeds events in, delivers outboxes
//!     ↕
//! Session (this crate)
//!     ↕
//! Room / Snapshot / Protocol (below)
//! ```
//!
//! [`Identity`]: gambit_protocol::Identity

#![allow(async_fn_in_trait)]

mod auth;
mod config;
mod error;
mod ids;
mod manager;
mod mirror;
mod store;

pub use auth::{AuthVerifier, Authenticated, DevVerifier, authenticate};
pub use config::{SessionConfig, UNAMBIGUOUS_ALPHABET};
pub use error::{AuthError, SessionError, StoreError};
pub use ids::guest_identity;
pub use manager::{Dispatch, JoinAttempt, Outbox, SessionManager};
pub use mirror::{DEFAULT_WRITE_BACKLOG, Mirror, MirrorRequest};
pub use store::{
    MatchStore, MemoryStore, PlayerStats, StatResult, StoreWrite, StoredMatch,
};
