//! Typed events in and effects out of the room state machine.
//!
//! The state machine never performs I/O. Every handler takes one of the
//! event types below and returns a list of [`Effect`]s describing what
//! should happen — which connections to notify, which timers to arm or
//! disarm, whether the room is done. The driver task interprets them.

use std::time::Duration;

use glyphmatch_protocol::{
    ConnectionId, EndReason, PersistentId, ServerEvent, Symbol,
};

/// An in-room action from a player, forwarded by the gateway with the
/// sender's connection id.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerAction {
    /// Toggle lobby readiness.
    SetReady { ready: bool },
    /// The player's client finished loading its board.
    AssetsLoaded,
    /// Pick (matching) or press (relay) a symbol.
    Select { symbol: Symbol },
    /// Leave immediately, no grace period.
    Leave,
    /// Operator: start play now, bypassing the ready gate.
    ForceActivate,
    /// Operator: end the room with `admin_reset`.
    ForceReset,
}

/// A timer firing, re-entering the room's command queue as an ordinary
/// event. Each carries enough context for the room to detect staleness —
/// a fired timer whose generation or round has moved on is a silent no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// The lobby countdown ran out.
    CountdownElapsed { generation: u64 },
    /// A disconnected player's grace window ran out.
    RemovalElapsed { player: PersistentId },
    /// The pause after a resolved round is over.
    NextRoundDue { round: u32 },
}

/// One side effect requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Deliver an event to a single connection.
    Unicast {
        conn: ConnectionId,
        event: ServerEvent,
    },
    /// Fan an event out to every connection subscribed to the room.
    Broadcast { event: ServerEvent },
    /// Subscribe a connection to the room channel.
    Subscribe { conn: ConnectionId },
    /// Unsubscribe a connection from the room channel.
    Unsubscribe { conn: ConnectionId },
    /// Arm the lobby countdown. A room has at most one; arming while one
    /// is already running is ignored by the driver.
    ArmCountdown { generation: u64, after: Duration },
    /// Cancel the lobby countdown, if armed.
    DisarmCountdown,
    /// Arm the removal timer for a disconnected player.
    ArmRemoval {
        player: PersistentId,
        after: Duration,
    },
    /// Cancel a player's removal timer (reconnect, removal, teardown).
    CancelRemoval { player: PersistentId },
    /// Arm the pause that separates a resolved round from the next one.
    ArmRoundPause { round: u32, after: Duration },
    /// Terminal: tear the room down. The driver reports the closure to
    /// the registry and stops processing commands.
    CloseRoom { reason: EndReason },
}
