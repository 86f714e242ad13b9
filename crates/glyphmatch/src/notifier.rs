//! The channel-backed notifier: fan-out from room tasks to sockets.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use glyphmatch_protocol::{ConnectionId, RoomId, ServerEvent};
use glyphmatch_room::Notifier;
use tokio::sync::mpsc;

/// Production [`Notifier`]: each connection registers an unbounded
/// sender at accept time; room channels are plain subscription sets.
///
/// The interior `Mutex` is a std one — every operation is a short map
/// touch with no awaits, so holding it across async boundaries never
/// comes up. Sends to a gone connection are dropped silently; cleanup
/// happens when the connection handler unregisters.
#[derive(Default)]
pub struct ChannelNotifier {
    inner: Mutex<NotifierInner>,
}

#[derive(Default)]
struct NotifierInner {
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl ChannelNotifier {
    /// Creates an empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection's outbound channel.
    pub fn register(
        &self,
        conn: ConnectionId,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) {
        self.inner.lock().unwrap().connections.insert(conn, tx);
    }

    /// Removes a connection everywhere: its channel and any room
    /// subscriptions it still holds.
    pub fn unregister(&self, conn: ConnectionId) {
        let mut inner = self.inner.lock().unwrap();
        inner.connections.remove(&conn);
        for subscribers in inner.rooms.values_mut() {
            subscribers.remove(&conn);
        }
        inner.rooms.retain(|_, subscribers| !subscribers.is_empty());
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.inner.lock().unwrap().connections.len()
    }
}

impl Notifier for ChannelNotifier {
    fn send_to_connection(&self, conn: ConnectionId, event: &ServerEvent) {
        let inner = self.inner.lock().unwrap();
        if let Some(tx) = inner.connections.get(&conn) {
            let _ = tx.send(event.clone());
        }
    }

    fn send_to_room(&self, room: &RoomId, event: &ServerEvent) {
        let inner = self.inner.lock().unwrap();
        let Some(subscribers) = inner.rooms.get(room) else {
            return;
        };
        for conn in subscribers {
            if let Some(tx) = inner.connections.get(conn) {
                let _ = tx.send(event.clone());
            }
        }
    }

    fn join_room_channel(&self, conn: ConnectionId, room: &RoomId) {
        self.inner
            .lock()
            .unwrap()
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(conn);
    }

    fn leave_room_channel(&self, conn: ConnectionId, room: &RoomId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(subscribers) = inner.rooms.get_mut(room) {
            subscribers.remove(&conn);
            if subscribers.is_empty() {
                inner.rooms.remove(room);
            }
        }
    }
}
