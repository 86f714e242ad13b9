//! Error types for the room layer.

use glyphmatch_protocol::{ConnectionId, RoomId};

/// Errors that can occur during room operations.
///
/// These are validation outcomes, not faults: every variant maps to a
/// structured rejection delivered to the single originating connection.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No template exists for the requested theme.
    #[error("no room template for theme {0:?}")]
    TemplateNotFound(String),

    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room is full — no more player slots available.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The room is past the lobby; fresh joins are no longer accepted.
    #[error("room {0} has already started")]
    AlreadyStarted(RoomId),

    /// The connection is already bound to a player in this room.
    #[error("connection {0} already holds a seat in this room")]
    DuplicateConnection(ConnectionId),

    /// The connection is already in some room (one room at a time).
    #[error("connection {0} is already in room {1}")]
    AlreadyInRoom(ConnectionId, RoomId),

    /// The connection is not in any room.
    #[error("connection {0} is not in a room")]
    NotInRoom(ConnectionId),

    /// The room task is gone or its command channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}

impl RoomError {
    /// HTTP-style code reported alongside the message on the wire.
    pub fn code(&self) -> u16 {
        match self {
            Self::TemplateNotFound(_) | Self::NotFound(_) => 404,
            Self::RoomFull(_)
            | Self::AlreadyStarted(_)
            | Self::AlreadyInRoom(..) => 409,
            Self::DuplicateConnection(_) | Self::NotInRoom(_) => 400,
            Self::Unavailable(_) => 503,
        }
    }
}
