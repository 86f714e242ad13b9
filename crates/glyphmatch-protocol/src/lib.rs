//! Wire vocabulary for Glyphmatch.
//!
//! This crate defines the "language" that clients and the room server
//! speak:
//!
//! - **Identity types** ([`RoomId`], [`ConnectionId`], [`PersistentId`],
//!   [`Symbol`]) — the handles that name rooms, live connections, and
//!   players across reconnects.
//! - **Events** ([`ClientEvent`], [`ServerEvent`]) — every named event
//!   that travels on the wire, as internally tagged unions.
//! - **Shared state vocabulary** ([`Phase`], [`EndReason`],
//!   [`RosterEntry`], [`RoundSummary`]) — the pieces of room state that
//!   clients render.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how events are
//!   converted to/from bytes.
//!
//! The protocol layer sits below the room core: it knows nothing about
//! timers, registries, or sockets — only the shape of messages.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientEvent, ConnectionId, EndReason, PersistentId, Phase, RoomId,
    RosterEntry, RoundRole, RoundSummary, ServerEvent, Symbol, TurnPick,
};
