//! The per-room actor: one Tokio task that owns a [`Room`] and
//! interprets its effects.
//!
//! The outside world talks to a room through [`RoomHandle`], which
//! serializes every join, action, disconnect, and timer firing into a
//! single command channel. The task applies them one at a time against
//! the state machine, so no two events for the same room are ever
//! processed concurrently — the mutual-exclusion boundary is the channel
//! itself.

use std::collections::HashMap;
use std::sync::Arc;

use glyphmatch_protocol::{ConnectionId, PersistentId, RoomId};
use tokio::sync::{mpsc, oneshot};

use crate::event::{Effect, PlayerAction, TimerEvent};
use crate::registry::RoomNotice;
use crate::room::{Room, RoomInfo};
use crate::timer::TimerHandle;
use crate::{Notifier, RoomError};

/// Reply to a successful join, forwarded to the gateway caller.
#[derive(Debug, Clone)]
pub struct JoinAck {
    pub room_id: RoomId,
    pub player_id: PersistentId,
    pub reconnected: bool,
}

/// Commands sent to a room task through its channel.
pub(crate) enum RoomCommand {
    /// Add or resume a player.
    Join {
        conn: ConnectionId,
        resume: Option<PersistentId>,
        name: Option<String>,
        reply: oneshot::Sender<Result<JoinAck, RoomError>>,
    },

    /// An in-room player action (ready, loaded, select, leave, admin).
    Action {
        conn: ConnectionId,
        action: PlayerAction,
    },

    /// Transport loss for a connection.
    Disconnect { conn: ConnectionId },

    /// A timer firing, queued like any other event.
    Timer(TimerEvent),

    /// Request the current room metadata.
    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },

    /// Tear the room down (registry-driven).
    Shutdown,
}

/// Handle to a running room task. Cheap to clone.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// The room's id.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Sends a join (or resume) request and waits for the verdict.
    pub async fn join(
        &self,
        conn: ConnectionId,
        resume: Option<PersistentId>,
        name: Option<String>,
    ) -> Result<JoinAck, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Join {
                conn,
                resume,
                name,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?
    }

    /// Delivers a player action (fire-and-forget).
    pub async fn action(
        &self,
        conn: ConnectionId,
        action: PlayerAction,
    ) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Action { conn, action })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }

    /// Reports a transport loss for a connection.
    pub async fn disconnect(
        &self,
        conn: ConnectionId,
    ) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Disconnect { conn })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }

    /// Requests the current room metadata.
    pub async fn get_info(&self) -> Result<RoomInfo, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::GetInfo { reply: reply_tx })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }

    /// Tells the room to tear down.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }
}

/// The impure half of a room: timers, delivery, and the command loop.
struct RoomDriver {
    room: Room,
    notifier: Arc<dyn Notifier>,
    receiver: mpsc::Receiver<RoomCommand>,
    /// Handed to timers so firings re-enter the command queue.
    timer_tx: mpsc::Sender<RoomCommand>,
    notices: mpsc::UnboundedSender<RoomNotice>,
    countdown: Option<TimerHandle>,
    removals: HashMap<PersistentId, TimerHandle>,
    round_pause: Option<TimerHandle>,
}

impl RoomDriver {
    async fn run(mut self) {
        tracing::info!(room_id = %self.room.id(), "room task started");

        while let Some(cmd) = self.receiver.recv().await {
            let closed = match cmd {
                RoomCommand::Join {
                    conn,
                    resume,
                    name,
                    reply,
                } => match self.room.handle_join(conn, resume, name) {
                    Ok(outcome) => {
                        let ack = JoinAck {
                            room_id: self.room.id().clone(),
                            player_id: outcome.player_id.clone(),
                            reconnected: outcome.reconnected,
                        };
                        let closed = self.apply(outcome.effects);
                        let _ = reply.send(Ok(ack));
                        closed
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                        false
                    }
                },

                RoomCommand::Action { conn, action } => {
                    let effects = match action {
                        PlayerAction::SetReady { ready } => {
                            self.room.handle_ready(conn, ready)
                        }
                        PlayerAction::AssetsLoaded => {
                            self.room.handle_assets_loaded(conn)
                        }
                        PlayerAction::Select { symbol } => {
                            self.room.handle_select(conn, symbol)
                        }
                        PlayerAction::Leave => self.room.handle_leave(conn),
                        PlayerAction::ForceActivate => {
                            self.room.handle_force_activate(conn)
                        }
                        PlayerAction::ForceReset => {
                            self.room.handle_force_reset()
                        }
                    };
                    self.apply(effects)
                }

                RoomCommand::Disconnect { conn } => {
                    let effects = self.room.handle_disconnect(conn);
                    self.apply(effects)
                }

                RoomCommand::Timer(event) => {
                    self.clear_fired(&event);
                    let effects = self.room.handle_timer(event);
                    self.apply(effects)
                }

                RoomCommand::GetInfo { reply } => {
                    let _ = reply.send(self.room.info());
                    false
                }

                RoomCommand::Shutdown => {
                    // Deleting a live room is an operator action; players
                    // still get a terminal notification.
                    let effects = self.room.handle_force_reset();
                    self.apply(effects);
                    true
                }
            };

            if closed {
                break;
            }
        }

        tracing::info!(room_id = %self.room.id(), "room task stopped");
    }

    /// Drops the stored handle for a timer that just fired, so a later
    /// cancel doesn't abort an unrelated arm.
    fn clear_fired(&mut self, event: &TimerEvent) {
        match event {
            TimerEvent::CountdownElapsed { .. } => {
                self.countdown = None;
            }
            TimerEvent::RemovalElapsed { player } => {
                self.removals.remove(player);
            }
            TimerEvent::NextRoundDue { .. } => {
                self.round_pause = None;
            }
        }
    }

    /// Interprets effects. Returns `true` once the room has closed.
    fn apply(&mut self, effects: Vec<Effect>) -> bool {
        let mut closed = false;
        for effect in effects {
            match effect {
                Effect::Unicast { conn, event } => {
                    self.notifier.send_to_connection(conn, &event);
                }
                Effect::Broadcast { event } => {
                    self.notifier.send_to_room(self.room.id(), &event);
                }
                Effect::Subscribe { conn } => {
                    self.notifier.join_room_channel(conn, self.room.id());
                }
                Effect::Unsubscribe { conn } => {
                    self.notifier.leave_room_channel(conn, self.room.id());
                }
                Effect::ArmCountdown { generation, after } => {
                    if self.countdown.is_some() {
                        // One countdown per room, ever.
                        tracing::debug!(
                            room_id = %self.room.id(),
                            "countdown already armed, ignoring"
                        );
                        continue;
                    }
                    self.countdown = Some(TimerHandle::arm(
                        after,
                        self.timer_tx.clone(),
                        RoomCommand::Timer(TimerEvent::CountdownElapsed {
                            generation,
                        }),
                    ));
                }
                Effect::DisarmCountdown => {
                    self.countdown = None;
                }
                Effect::ArmRemoval { player, after } => {
                    // Insert replaces (and thereby aborts) any previous
                    // timer for the same seat.
                    self.removals.insert(
                        player.clone(),
                        TimerHandle::arm(
                            after,
                            self.timer_tx.clone(),
                            RoomCommand::Timer(TimerEvent::RemovalElapsed {
                                player,
                            }),
                        ),
                    );
                }
                Effect::CancelRemoval { player } => {
                    self.removals.remove(&player);
                }
                Effect::ArmRoundPause { round, after } => {
                    self.round_pause = Some(TimerHandle::arm(
                        after,
                        self.timer_tx.clone(),
                        RoomCommand::Timer(TimerEvent::NextRoundDue {
                            round,
                        }),
                    ));
                }
                Effect::CloseRoom { reason } => {
                    let _ = self.notices.send(RoomNotice::Closed {
                        room: self.room.id().clone(),
                        reason,
                    });
                    closed = true;
                }
            }
        }
        closed
    }
}

/// Spawns a room task and returns a handle to it.
pub(crate) fn spawn_room(
    room: Room,
    notifier: Arc<dyn Notifier>,
    notices: mpsc::UnboundedSender<RoomNotice>,
    channel_size: usize,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);
    let room_id = room.id().clone();

    let driver = RoomDriver {
        room,
        notifier,
        receiver: rx,
        timer_tx: tx.clone(),
        notices,
        countdown: None,
        removals: HashMap::new(),
        round_pause: None,
    };
    tokio::spawn(driver.run());

    RoomHandle {
        room_id,
        sender: tx,
    }
}
