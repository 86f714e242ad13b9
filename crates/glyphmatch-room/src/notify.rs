//! The boundary between the room core and the transport layer.

use glyphmatch_protocol::{ConnectionId, RoomId, ServerEvent};

/// Outbound delivery, as seen from the room core.
///
/// All methods are best-effort and fire-and-forget: a dead connection is
/// the transport's problem, never the state machine's. Implementations
/// live in the gateway (a channel-backed fan-out in production, a
/// recording stub in tests).
pub trait Notifier: Send + Sync + 'static {
    /// Delivers an event to one connection.
    fn send_to_connection(&self, conn: ConnectionId, event: &ServerEvent);

    /// Fans an event out to every connection subscribed to the room.
    fn send_to_room(&self, room: &RoomId, event: &ServerEvent);

    /// Adds a connection to the room's fan-out set.
    fn join_room_channel(&self, conn: ConnectionId, room: &RoomId);

    /// Removes a connection from the room's fan-out set.
    fn leave_room_channel(&self, conn: ConnectionId, room: &RoomId);
}
