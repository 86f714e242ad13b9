//! Core wire types: identities, room lifecycle vocabulary, and the
//! client/server event unions.
//!
//! Everything in this module is serialized with serde. Events use
//! internally tagged JSON (`{"type": "SetReady", "ready": true}`) so a
//! browser client can switch on a single `type` field; identity newtypes
//! are `#[serde(transparent)]` so they appear as plain strings/numbers.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a room.
///
/// Room ids are short join codes (six digits in practice) rather than
/// opaque integers, so players can read one off another player's screen.
/// Globally unique and immutable for the life of the room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Wraps an existing join code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the join code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room-{}", self.0)
    }
}

/// Opaque identifier for a live transport connection.
///
/// Assigned by the gateway when a socket is accepted; dies with the
/// socket. A player who reconnects gets a *new* `ConnectionId` — their
/// [`PersistentId`] is what survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A player identity that is stable across reconnects.
///
/// Minted once by the server on a player's first successful join (a
/// 32-character hex token) and returned to the client, which presents it
/// again to resume its slot after a transport drop. Distinct from the
/// transient [`ConnectionId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistentId(pub String);

impl PersistentId {
    /// Wraps an existing token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersistentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One game token (an icon, in practice an emoji) from a theme's pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(pub String);

impl Symbol {
    /// Wraps a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// The lifecycle phase of a room.
///
/// Transitions:
///
/// ```text
///            ┌──────────(cancel)──────────┐
///            ▼                            │
/// Lobby → CountdownPending → AssetLoading → Active → Ended
/// ```
///
/// - **Lobby**: players join and toggle readiness.
/// - **CountdownPending**: the start condition holds; a fixed countdown
///   is running and can still be cancelled back to `Lobby`.
/// - **AssetLoading**: boards are assigned; players report when their
///   assets are in.
/// - **Active**: turns are generated and resolved.
/// - **Ended**: terminal. The room is torn down and accepts nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Lobby,
    CountdownPending,
    AssetLoading,
    Active,
    Ended,
}

impl Phase {
    /// Returns `true` if matchmaking may place new players here.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Lobby)
    }

    /// Returns `true` if a fresh (non-resuming) join is still accepted.
    ///
    /// Joins are allowed during the countdown; once asset loading begins
    /// the roster is fixed and late joiners get `AlreadyStarted`.
    pub fn accepts_new_players(&self) -> bool {
        matches!(self, Self::Lobby | Self::CountdownPending)
    }

    /// Returns `true` once the room has committed to playing (boards
    /// assigned or play in progress).
    pub fn is_started(&self) -> bool {
        matches!(self, Self::AssetLoading | Self::Active)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "Lobby"),
            Self::CountdownPending => write!(f, "CountdownPending"),
            Self::AssetLoading => write!(f, "AssetLoading"),
            Self::Active => write!(f, "Active"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}

// ---------------------------------------------------------------------------
// EndReason
// ---------------------------------------------------------------------------

/// Machine-readable reason codes for a room ending or being cancelled.
///
/// Serialized in snake_case (`"insufficient_players"`) — these codes are
/// part of the wire contract and clients branch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The win condition was reached.
    Victory,
    /// Fewer than two players remained in a started room.
    InsufficientPlayers,
    /// An operator force-reset the room.
    AdminReset,
    /// Kept for client compatibility with host-managed deployments.
    HostDisconnected,
    /// The room reached an inconsistent state and was ended defensively.
    InternalError,
}

impl EndReason {
    /// A human-readable companion to the reason code.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Victory => "All symbols matched — you win!",
            Self::InsufficientPlayers => "Not enough players to continue.",
            Self::AdminReset => "The room was reset by an operator.",
            Self::HostDisconnected => "The host disconnected.",
            Self::InternalError => "The room hit an internal error.",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Victory => write!(f, "victory"),
            Self::InsufficientPlayers => write!(f, "insufficient_players"),
            Self::AdminReset => write!(f, "admin_reset"),
            Self::HostDisconnected => write!(f, "host_disconnected"),
            Self::InternalError => write!(f, "internal_error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Roster / round summaries
// ---------------------------------------------------------------------------

/// One row of the room roster, as broadcast to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// The player's stable identity.
    pub player: PersistentId,
    /// Display name.
    pub name: String,
    /// Lobby readiness flag.
    pub ready: bool,
    /// `false` while the player is inside the reconnect grace window.
    pub connected: bool,
}

/// A player's role in a relay round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundRole {
    /// Announces the symbol.
    Source,
    /// Must press the matching symbol on their own board.
    Target,
    /// Watches this round.
    Bystander,
}

/// Snapshot of the in-flight round, replayed to a reconnecting player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style")]
pub enum RoundSummary {
    /// Simultaneous-matching turn in progress.
    Matching { turn: u32 },
    /// Relay round in progress, described from the recipient's view.
    Relay {
        round: u32,
        role: RoundRole,
        symbol: Symbol,
        /// Index into the recipient's own board; only set for the target.
        target_index: Option<usize>,
        bonus: bool,
    },
}

/// One recorded selection in a mismatched turn, echoed back on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnPick {
    pub player: PersistentId,
    pub symbol: Symbol,
}

// ---------------------------------------------------------------------------
// ClientEvent — everything a client can send
// ---------------------------------------------------------------------------

/// Events sent by clients. The gateway decodes these from the socket and
/// routes them; each one implicitly carries the sender's connection id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Create a fresh room from a theme template and join it.
    CreateRoom {
        theme: String,
        #[serde(default)]
        name: Option<String>,
    },

    /// Join a specific room by its code. `resume_id` turns the join into
    /// a reconnect if it names a player still inside the grace window.
    JoinRoom {
        room_id: RoomId,
        #[serde(default)]
        resume_id: Option<PersistentId>,
        #[serde(default)]
        name: Option<String>,
    },

    /// Find a joinable room for the theme or create one, then join it.
    QuickMatch {
        theme: String,
        #[serde(default)]
        name: Option<String>,
    },

    /// Toggle lobby readiness.
    SetReady { ready: bool },

    /// Report that this client finished loading its assigned board.
    AssetsLoaded,

    /// Pick a symbol in the current turn (or press one, relay style).
    Select { symbol: Symbol },

    /// Leave the current room immediately (no grace period).
    LeaveRoom,

    /// Operator control: start play now, bypassing the ready gate.
    ForceActivate,

    /// Operator control: end the room with an `admin_reset` reason.
    ForceReset,
}

// ---------------------------------------------------------------------------
// ServerEvent — everything the server can send
// ---------------------------------------------------------------------------

/// Events sent by the server, either to one connection or fanned out to a
/// room channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Reply to a successful join. The client must remember `player_id`
    /// to be able to resume after a disconnect.
    RoomJoined {
        room_id: RoomId,
        player_id: PersistentId,
        roster: Vec<RosterEntry>,
    },

    /// Full phase-appropriate state, replayed to a resuming connection
    /// only.
    RoomSnapshot {
        room_id: RoomId,
        player_id: PersistentId,
        phase: Phase,
        roster: Vec<RosterEntry>,
        /// The recipient's private board layout (empty before assignment).
        layout: Vec<Symbol>,
        collected: Vec<Symbol>,
        round: Option<RoundSummary>,
    },

    /// The roster changed (join, leave, rename).
    RosterUpdate { roster: Vec<RosterEntry> },

    /// A player toggled readiness.
    ReadyChanged { player: PersistentId, ready: bool },

    /// The start condition holds; play begins in `seconds` unless
    /// cancelled.
    CountdownStarted { seconds: u64 },

    /// The countdown was cancelled and the room is back in the lobby.
    CountdownCancelled { reason: String },

    /// The room moved to a new phase.
    PhaseChanged { phase: Phase },

    /// The recipient's private board layout for this session.
    BoardAssigned { symbols: Vec<Symbol> },

    /// A new simultaneous-matching turn is open for selections.
    TurnStarted { turn: u32 },

    /// A player locked in a selection (the symbol stays hidden until the
    /// turn resolves).
    PickRegistered { player: PersistentId, turn: u32 },

    /// Every connected player picked the same symbol.
    TurnMatched {
        turn: u32,
        symbol: Symbol,
        collected: usize,
    },

    /// Selections differed; the full choice set is revealed.
    TurnMismatched { turn: u32, picks: Vec<TurnPick> },

    /// The in-flight round was thrown away (a participant departed) and
    /// a fresh one follows.
    RoundAbandoned { round: u32 },

    /// A relay round started, described from the recipient's view.
    RoundStarted {
        round: u32,
        role: RoundRole,
        symbol: Symbol,
        /// Index into the recipient's own board; only set for the target.
        target_index: Option<usize>,
        bonus: bool,
    },

    /// The relay target acted and the round is over.
    RoundResolved {
        round: u32,
        player: PersistentId,
        correct: bool,
        pieces: usize,
    },

    /// A bonus-round stake was forfeited by a wrong or out-of-turn press.
    PieceLost { player: PersistentId, pieces: usize },

    /// Private nudge to one connection ("Correct!", "Not your turn!").
    Feedback { correct: bool, message: String },

    /// A player dropped; their slot is held for the grace window.
    PlayerDisconnected { player: PersistentId },

    /// A disconnected player resumed their slot.
    PlayerReconnected { player: PersistentId },

    /// A player is gone for good (explicit leave or grace expiry).
    PlayerLeft { player: PersistentId },

    /// Terminal notification: the room is gone.
    RoomEnded { reason: EndReason, message: String },

    /// Board assignment failed (empty symbol pool); the room is stuck
    /// until re-triggered or reset.
    SetupError { message: String },

    /// A request from this connection was rejected. `code` follows
    /// HTTP-style conventions (400 bad request, 404 not found, 409
    /// conflict).
    Error { code: u16, message: String },
}

// =========================================================================
// Tests
// =========================================================================
