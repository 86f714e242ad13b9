//! The room registry: creates, tracks, and routes connections to rooms.
//!
//! An explicitly owned object, injected where needed — no module-level
//! globals. The registry owns every [`RoomHandle`] plus the
//! connection-to-room index; no room exists outside it. Rooms report
//! their own closure on the notice channel handed out at construction,
//! and a small reaper loop (the gateway runs one) feeds those notices
//! back into [`delete_room`](RoomRegistry::delete_room).

use std::collections::HashMap;
use std::sync::Arc;

use glyphmatch_catalog::ThemeCatalog;
use glyphmatch_protocol::{ConnectionId, EndReason, PersistentId, RoomId};
use rand::Rng;
use tokio::sync::mpsc;

use crate::driver::{spawn_room, JoinAck};
use crate::event::PlayerAction;
use crate::room::{Room, RoomInfo};
use crate::{Notifier, RoomError, RoomHandle, RoomSettings};

/// Default command channel size for room tasks.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Out-of-band notification from a room task to its registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomNotice {
    /// The room tore itself down and should be dropped from the index.
    Closed { room: RoomId, reason: EndReason },
}

/// Owns all active rooms and the connection-to-room index.
pub struct RoomRegistry {
    rooms: HashMap<RoomId, RoomHandle>,

    /// Which room each live connection is in. A connection can be in at
    /// most ONE room at a time (key invariant).
    connections: HashMap<ConnectionId, RoomId>,

    catalog: Arc<ThemeCatalog>,
    settings: RoomSettings,
    notifier: Arc<dyn Notifier>,
    notices: mpsc::UnboundedSender<RoomNotice>,
}

impl RoomRegistry {
    /// Creates an empty registry. The returned receiver carries room
    /// closure notices; feed them back into
    /// [`delete_room`](Self::delete_room).
    pub fn new(
        catalog: Arc<ThemeCatalog>,
        settings: RoomSettings,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, mpsc::UnboundedReceiver<RoomNotice>) {
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        (
            Self {
                rooms: HashMap::new(),
                connections: HashMap::new(),
                catalog,
                settings,
                notifier,
                notices: notices_tx,
            },
            notices_rx,
        )
    }

    /// Creates a new room from a theme template and returns its id.
    pub fn create_room(&mut self, theme: &str) -> Result<RoomId, RoomError> {
        let template = self
            .catalog
            .template(theme)
            .ok_or_else(|| RoomError::TemplateNotFound(theme.to_string()))?;
        let pool = self.catalog.symbols_for_theme(theme);
        let room_id = self.fresh_room_id();

        let room = Room::new(
            room_id.clone(),
            template.id.clone(),
            template.max_players,
            pool,
            self.settings.clone(),
        );
        let handle = spawn_room(
            room,
            Arc::clone(&self.notifier),
            self.notices.clone(),
            DEFAULT_CHANNEL_SIZE,
        );
        self.rooms.insert(room_id.clone(), handle);
        tracing::info!(%room_id, theme = %template.id, "room created");
        Ok(room_id)
    }

    /// Six-digit join codes, retried on collision.
    fn fresh_room_id(&self) -> RoomId {
        let mut rng = rand::rng();
        loop {
            let id =
                RoomId::new(format!("{:06}", rng.random_range(0..1_000_000)));
            if !self.rooms.contains_key(&id) {
                return id;
            }
        }
    }

    /// Looks up a room. A missing id is a normal outcome, not an error.
    pub fn find_room(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms.get(room_id).cloned()
    }

    /// Finds an existing lobby-phase room for the theme with spare
    /// capacity, for matchmaking flows. `None` means "create one".
    pub async fn find_joinable_room(&self, theme: &str) -> Option<RoomHandle> {
        for handle in self.rooms.values() {
            if let Ok(info) = handle.get_info().await {
                if info.theme.eq_ignore_ascii_case(theme)
                    && info.phase.is_joinable()
                    && info.player_count < info.max_players
                {
                    return Some(handle.clone());
                }
            }
        }
        None
    }

    /// Removes a room. Idempotent: deleting an unknown id is a no-op.
    pub async fn delete_room(&mut self, room_id: &RoomId) {
        let Some(handle) = self.rooms.remove(room_id) else {
            tracing::debug!(%room_id, "delete for unknown room, nothing to do");
            return;
        };
        let _ = handle.shutdown().await;
        self.connections.retain(|_, rid| rid != room_id);
        tracing::info!(%room_id, "room deleted");
    }

    /// Joins (or resumes) a connection into a specific room.
    pub async fn join_room(
        &mut self,
        conn: ConnectionId,
        room_id: &RoomId,
        resume: Option<PersistentId>,
        name: Option<String>,
    ) -> Result<JoinAck, RoomError> {
        if let Some(current) = self.connections.get(&conn) {
            return Err(RoomError::AlreadyInRoom(conn, current.clone()));
        }
        let handle = self
            .find_room(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;

        let ack = handle.join(conn, resume, name).await?;
        self.connections.insert(conn, room_id.clone());
        Ok(ack)
    }

    /// Finds a joinable room for the theme or creates one, then joins.
    ///
    /// If a candidate fills up between the info query and the join (a
    /// benign race), the scan continues.
    pub async fn quick_match(
        &mut self,
        conn: ConnectionId,
        theme: &str,
        name: Option<String>,
    ) -> Result<JoinAck, RoomError> {
        if let Some(current) = self.connections.get(&conn) {
            return Err(RoomError::AlreadyInRoom(conn, current.clone()));
        }

        for handle in self.rooms.values() {
            if let Ok(info) = handle.get_info().await {
                if info.theme.eq_ignore_ascii_case(theme)
                    && info.phase.is_joinable()
                    && info.player_count < info.max_players
                {
                    if let Ok(ack) =
                        handle.join(conn, None, name.clone()).await
                    {
                        self.connections.insert(conn, info.room_id.clone());
                        return Ok(ack);
                    }
                }
            }
        }

        let room_id = self.create_room(theme)?;
        let handle = self
            .rooms
            .get(&room_id)
            .expect("just created this room")
            .clone();
        let ack = handle.join(conn, None, name).await?;
        self.connections.insert(conn, room_id);
        Ok(ack)
    }

    /// Routes an in-room action to the sender's room.
    pub async fn route(
        &self,
        conn: ConnectionId,
        action: PlayerAction,
    ) -> Result<(), RoomError> {
        let room_id = self
            .connections
            .get(&conn)
            .ok_or(RoomError::NotInRoom(conn))?;
        let handle = self
            .rooms
            .get(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        handle.action(conn, action).await
    }

    /// Explicit leave: drops the binding and tells the room.
    pub async fn leave(
        &mut self,
        conn: ConnectionId,
    ) -> Result<(), RoomError> {
        let room_id = self
            .connections
            .remove(&conn)
            .ok_or(RoomError::NotInRoom(conn))?;
        if let Some(handle) = self.rooms.get(&room_id) {
            handle.action(conn, PlayerAction::Leave).await?;
        }
        Ok(())
    }

    /// Transport loss: drops the binding and starts the room's grace
    /// handling. Unknown connections are ignored.
    pub async fn disconnect(&mut self, conn: ConnectionId) {
        let Some(room_id) = self.connections.remove(&conn) else {
            return;
        };
        if let Some(handle) = self.rooms.get(&room_id) {
            let _ = handle.disconnect(conn).await;
        }
    }

    /// The room a connection is currently in, if any.
    pub fn room_of(&self, conn: ConnectionId) -> Option<&RoomId> {
        self.connections.get(&conn)
    }

    /// Number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// All active room ids.
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }

    /// Metadata for all joinable rooms. Rooms that fail to respond
    /// (shutting down) are silently skipped.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut infos = Vec::with_capacity(self.rooms.len());
        for handle in self.rooms.values() {
            if let Ok(info) = handle.get_info().await {
                if info.phase.is_joinable() {
                    infos.push(info);
                }
            }
        }
        infos
    }
}
