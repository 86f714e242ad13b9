//! Room lifecycle, round resolution, and registry for Glyphmatch.
//!
//! This crate is the heart of the server. Each room runs as an isolated
//! Tokio task (actor model) that owns a pure [`Room`] state machine; the
//! outside world talks to it through a command channel, so events for one
//! room are processed strictly in arrival order while unrelated rooms run
//! in parallel.
//!
//! # Key types
//!
//! - [`Room`] — the pure state machine: phases, players, rounds. Every
//!   handler consumes a typed event and returns the [`Effect`]s it wants
//!   performed, which makes transitions unit-testable without a socket
//!   in sight.
//! - [`RoomRegistry`] — creates/destroys rooms, owns the
//!   connection-to-room index, and does quick-match placement.
//! - [`RoomHandle`] — send commands to a running room task.
//! - [`TimerHandle`] — the cancellable one-shot timer every countdown,
//!   grace period, and inter-round pause is built on.
//! - [`Notifier`] — the boundary to the transport layer; the core only
//!   ever asks it to deliver events, never how.

mod config;
mod driver;
mod error;
mod event;
mod notify;
mod registry;
mod resolver;
mod room;
mod timer;

pub use config::{GameVariant, RoomSettings, StartRule};
pub use driver::{JoinAck, RoomHandle};
pub use error::RoomError;
pub use event::{Effect, PlayerAction, TimerEvent};
pub use notify::Notifier;
pub use registry::{RoomNotice, RoomRegistry};
pub use room::{JoinOutcome, Player, Room, RoomInfo, RoundState};
pub use timer::TimerHandle;
