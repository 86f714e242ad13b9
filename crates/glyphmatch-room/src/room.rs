//! The room state machine.
//!
//! `Room` is deliberately pure: handlers consume typed events and return
//! the [`Effect`]s they want performed, without touching sockets, clocks,
//! or tasks. The driver owns the impure half (timers, delivery). This
//! split is what makes every transition in this file testable with plain
//! synchronous asserts.
//!
//! A room moves through `Lobby → CountdownPending → AssetLoading →
//! Active → Ended`, tolerating disconnects at every step: a dropped
//! player keeps their seat for a grace window and can resume with the
//! persistent id minted at first join.

use std::collections::HashMap;

use glyphmatch_protocol::{
    ConnectionId, EndReason, PersistentId, Phase, RoomId, RosterEntry,
    RoundRole, RoundSummary, ServerEvent, Symbol, TurnPick,
};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use crate::event::{Effect, TimerEvent};
use crate::{resolver, GameVariant, RoomSettings, StartRule};

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One seat in a room.
///
/// Created on first successful join, held through disconnects (with
/// `connection` cleared) until the grace window lapses or the player
/// leaves for good. Never resurrected after removal.
#[derive(Debug, Clone)]
pub struct Player {
    pub(crate) persistent_id: PersistentId,
    pub(crate) connection: Option<ConnectionId>,
    pub(crate) name: String,
    pub(crate) ready: bool,
    pub(crate) assets_loaded: bool,
    /// Private card layout for the current session.
    pub(crate) layout: Vec<Symbol>,
}

impl Player {
    /// The player's stable identity.
    pub fn persistent_id(&self) -> &PersistentId {
        &self.persistent_id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `false` while the player is inside the reconnect grace window.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The player's private board layout (empty before assignment).
    pub fn layout(&self) -> &[Symbol] {
        &self.layout
    }
}

// ---------------------------------------------------------------------------
// RoundState
// ---------------------------------------------------------------------------

/// The single in-flight round, one variant per resolution strategy.
#[derive(Debug, Clone)]
pub enum RoundState {
    /// Simultaneous matching: one pick per connected player, resolved
    /// when everyone has picked.
    Matching {
        turn: u32,
        picks: HashMap<PersistentId, Symbol>,
        resolved: bool,
    },
    /// Relay: one source announces, one target presses.
    Relay {
        round: u32,
        source: PersistentId,
        target: PersistentId,
        expected: Symbol,
        expected_index: usize,
        active: bool,
    },
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// Result of a successful join, carrying the identity the caller must
/// remember for later resumes plus the effects to perform.
#[derive(Debug)]
pub struct JoinOutcome {
    pub player_id: PersistentId,
    pub reconnected: bool,
    pub effects: Vec<Effect>,
}

/// A snapshot of room metadata for listings and matchmaking.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub theme: String,
    pub phase: Phase,
    pub player_count: usize,
    pub connected_count: usize,
    pub max_players: usize,
}

/// The per-room state machine. One instance per active room; the only
/// mutable shared state in the system, owned by exactly one driver task.
pub struct Room {
    id: RoomId,
    theme: String,
    max_players: usize,
    settings: RoomSettings,
    /// The theme's symbol pool, snapshotted at creation.
    pool: Vec<Symbol>,
    phase: Phase,
    players: Vec<Player>,
    /// Shared symbol set for this session, drawn once per activation.
    board: Vec<Symbol>,
    /// Matched symbols (matching) or won pieces (relay).
    collected: Vec<Symbol>,
    round: Option<RoundState>,
    /// Last issued round/turn number; starts at 0, first round is 1.
    round_counter: u32,
    /// Round-robin cursor for relay target duty.
    next_target_cursor: usize,
    /// Bumped on every arm/cancel so a stale countdown firing is
    /// detectably old.
    countdown_generation: u64,
    rng: StdRng,
}

impl Room {
    /// Creates a room in the `Lobby` phase.
    pub fn new(
        id: RoomId,
        theme: impl Into<String>,
        max_players: usize,
        pool: Vec<Symbol>,
        settings: RoomSettings,
    ) -> Self {
        Self::with_rng(id, theme, max_players, pool, settings, StdRng::from_os_rng())
    }

    /// Like [`new`](Self::new) with an injected RNG, for deterministic
    /// simulations and tests.
    pub fn with_rng(
        id: RoomId,
        theme: impl Into<String>,
        max_players: usize,
        pool: Vec<Symbol>,
        settings: RoomSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            id,
            theme: theme.into(),
            max_players,
            settings,
            pool,
            phase: Phase::Lobby,
            players: Vec::new(),
            board: Vec::new(),
            collected: Vec::new(),
            round: None,
            round_counter: 0,
            next_target_cursor: 0,
            countdown_generation: 0,
            rng,
        }
    }

    // -- Accessors ---------------------------------------------------------

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn board(&self) -> &[Symbol] {
        &self.board
    }

    pub fn collected(&self) -> &[Symbol] {
        &self.collected
    }

    pub fn round(&self) -> Option<&RoundState> {
        self.round.as_ref()
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.id.clone(),
            theme: self.theme.clone(),
            phase: self.phase,
            player_count: self.players.len(),
            connected_count: self.connected_count(),
            max_players: self.max_players,
        }
    }

    /// The current roster, as sent to clients.
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.players
            .iter()
            .map(|p| RosterEntry {
                player: p.persistent_id.clone(),
                name: p.name.clone(),
                ready: p.ready,
                connected: p.is_connected(),
            })
            .collect()
    }

    // -- Join / resume -----------------------------------------------------

    /// Handles a join request.
    ///
    /// A `resume` id naming a seat still inside its grace window turns
    /// this into a reconnect: the connection is re-bound, the removal
    /// timer cancelled, and the phase-appropriate state replayed to the
    /// resuming connection only. Anything else is a fresh join, which
    /// mints a new identity; a resume id for a seat already removed is
    /// deliberately treated the same as no resume id at all.
    pub fn handle_join(
        &mut self,
        conn: ConnectionId,
        resume: Option<PersistentId>,
        name: Option<String>,
    ) -> Result<JoinOutcome, crate::RoomError> {
        if self.phase == Phase::Ended {
            return Err(crate::RoomError::Unavailable(self.id.clone()));
        }
        if self.players.iter().any(|p| p.connection == Some(conn)) {
            return Err(crate::RoomError::DuplicateConnection(conn));
        }

        if let Some(pid) = resume {
            if let Some(idx) = self
                .players
                .iter()
                .position(|p| p.persistent_id == pid && !p.is_connected())
            {
                return Ok(self.resume_player(idx, conn));
            }
        }

        if !self.phase.accepts_new_players() {
            return Err(crate::RoomError::AlreadyStarted(self.id.clone()));
        }
        if self.players.len() >= self.max_players {
            return Err(crate::RoomError::RoomFull(self.id.clone()));
        }

        let pid = mint_persistent_id(&mut self.rng);
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("player-{}", &pid.as_str()[..4]));
        self.players.push(Player {
            persistent_id: pid.clone(),
            connection: Some(conn),
            name,
            ready: false,
            assets_loaded: false,
            layout: Vec::new(),
        });
        tracing::info!(
            room_id = %self.id,
            player = %pid,
            players = self.players.len(),
            "player joined"
        );

        let mut effects = vec![
            Effect::Subscribe { conn },
            Effect::Unicast {
                conn,
                event: ServerEvent::RoomJoined {
                    room_id: self.id.clone(),
                    player_id: pid.clone(),
                    roster: self.roster(),
                },
            },
            Effect::Broadcast {
                event: ServerEvent::RosterUpdate {
                    roster: self.roster(),
                },
            },
        ];
        effects.extend(self.maybe_start_countdown());

        Ok(JoinOutcome {
            player_id: pid,
            reconnected: false,
            effects,
        })
    }

    fn resume_player(&mut self, idx: usize, conn: ConnectionId) -> JoinOutcome {
        self.players[idx].connection = Some(conn);
        let pid = self.players[idx].persistent_id.clone();
        tracing::info!(room_id = %self.id, player = %pid, "player reconnected");

        let snapshot = self.snapshot_for(idx);
        let effects = vec![
            Effect::CancelRemoval {
                player: pid.clone(),
            },
            Effect::Subscribe { conn },
            Effect::Unicast {
                conn,
                event: snapshot,
            },
            Effect::Broadcast {
                event: ServerEvent::PlayerReconnected {
                    player: pid.clone(),
                },
            },
        ];

        JoinOutcome {
            player_id: pid,
            reconnected: true,
            effects,
        }
    }

    /// Phase-appropriate replay state for one seat.
    fn snapshot_for(&self, idx: usize) -> ServerEvent {
        let player = &self.players[idx];
        let round = self.round.as_ref().and_then(|r| match r {
            RoundState::Matching { turn, resolved, .. } => {
                (!resolved).then_some(RoundSummary::Matching { turn: *turn })
            }
            RoundState::Relay {
                round,
                source,
                target,
                expected,
                expected_index,
                active,
            } => active.then(|| {
                let role = if player.persistent_id == *source {
                    RoundRole::Source
                } else if player.persistent_id == *target {
                    RoundRole::Target
                } else {
                    RoundRole::Bystander
                };
                RoundSummary::Relay {
                    round: *round,
                    role,
                    symbol: expected.clone(),
                    target_index: (role == RoundRole::Target)
                        .then_some(*expected_index),
                    bonus: self.is_bonus(*round),
                }
            }),
        });

        ServerEvent::RoomSnapshot {
            room_id: self.id.clone(),
            player_id: player.persistent_id.clone(),
            phase: self.phase,
            roster: self.roster(),
            layout: player.layout.clone(),
            collected: self.collected.clone(),
            round,
        }
    }

    // -- Lobby -------------------------------------------------------------

    /// Toggles a player's readiness.
    pub fn handle_ready(
        &mut self,
        conn: ConnectionId,
        ready: bool,
    ) -> Vec<Effect> {
        let Some(idx) = self.index_of_conn(conn) else {
            return self.reject(conn, 400, "not a member of this room");
        };
        if !matches!(self.phase, Phase::Lobby | Phase::CountdownPending) {
            return self.reject(conn, 409, "readiness only applies in the lobby");
        }

        self.players[idx].ready = ready;
        let pid = self.players[idx].persistent_id.clone();
        let mut effects = vec![Effect::Broadcast {
            event: ServerEvent::ReadyChanged {
                player: pid,
                ready,
            },
        }];

        if !ready && self.phase == Phase::CountdownPending {
            effects.extend(self.cancel_countdown("player_unready"));
        } else {
            effects.extend(self.maybe_start_countdown());
        }
        effects
    }

    fn start_condition_holds(&self) -> bool {
        match self.settings.start_rule {
            StartRule::AllReady => {
                self.players.len() >= 2
                    && self.players.iter().all(|p| p.ready)
            }
            StartRule::OnCapacity => self.players.len() == self.max_players,
        }
    }

    fn maybe_start_countdown(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Lobby || !self.start_condition_holds() {
            return Vec::new();
        }
        self.phase = Phase::CountdownPending;
        self.countdown_generation += 1;
        tracing::info!(room_id = %self.id, "start condition holds, countdown armed");
        vec![
            Effect::ArmCountdown {
                generation: self.countdown_generation,
                after: self.settings.countdown,
            },
            Effect::Broadcast {
                event: ServerEvent::CountdownStarted {
                    seconds: self.settings.countdown.as_secs(),
                },
            },
        ]
    }

    fn cancel_countdown(&mut self, reason: &str) -> Vec<Effect> {
        if self.phase != Phase::CountdownPending {
            return Vec::new();
        }
        self.phase = Phase::Lobby;
        self.countdown_generation += 1;
        tracing::info!(room_id = %self.id, reason, "countdown cancelled");
        vec![
            Effect::DisarmCountdown,
            Effect::Broadcast {
                event: ServerEvent::CountdownCancelled {
                    reason: reason.to_string(),
                },
            },
        ]
    }

    // -- Asset loading -----------------------------------------------------

    /// Marks a player's assets as loaded; the last connected report
    /// flips the room into `Active`.
    pub fn handle_assets_loaded(&mut self, conn: ConnectionId) -> Vec<Effect> {
        let Some(idx) = self.index_of_conn(conn) else {
            return self.reject(conn, 400, "not a member of this room");
        };
        if self.phase != Phase::AssetLoading {
            return self.reject(conn, 409, "no asset loading in progress");
        }
        if self.board.is_empty() {
            return self.reject(conn, 409, "boards were not assigned");
        }

        self.players[idx].assets_loaded = true;
        if self.all_connected_loaded() {
            self.begin_active()
        } else {
            Vec::new()
        }
    }

    fn all_connected_loaded(&self) -> bool {
        let mut any = false;
        for player in self.players.iter().filter(|p| p.is_connected()) {
            any = true;
            if !player.assets_loaded {
                return false;
            }
        }
        any
    }

    /// Enters `AssetLoading` and performs the one-time board assignment.
    fn enter_asset_loading(&mut self) -> Vec<Effect> {
        self.phase = Phase::AssetLoading;
        self.countdown_generation += 1;
        self.collected.clear();
        self.round = None;
        self.round_counter = 0;
        self.next_target_cursor = 0;
        for player in &mut self.players {
            player.assets_loaded = false;
        }

        let mut effects = vec![
            Effect::DisarmCountdown,
            Effect::Broadcast {
                event: ServerEvent::PhaseChanged {
                    phase: Phase::AssetLoading,
                },
            },
        ];

        if self.assign_boards() {
            for player in &self.players {
                if let Some(conn) = player.connection {
                    effects.push(Effect::Unicast {
                        conn,
                        event: ServerEvent::BoardAssigned {
                            symbols: player.layout.clone(),
                        },
                    });
                }
            }
        } else {
            tracing::error!(
                room_id = %self.id,
                theme = %self.theme,
                "symbol pool is empty, boards cannot be assigned"
            );
            effects.push(Effect::Broadcast {
                event: ServerEvent::SetupError {
                    message: "The symbol pool for this theme is empty."
                        .to_string(),
                },
            });
        }
        effects
    }

    /// Draws the session board and deals layouts. Returns `false` when
    /// the pool is empty (the fatal setup case).
    fn assign_boards(&mut self) -> bool {
        match self.settings.variant {
            GameVariant::Matching => {
                let Some(board) = resolver::draw_symbols(
                    &self.pool,
                    self.settings.board_size,
                    &mut self.rng,
                ) else {
                    return false;
                };
                for player in &mut self.players {
                    player.layout =
                        resolver::shuffled_layout(&board, &mut self.rng);
                }
                self.board = board;
            }
            GameVariant::Relay => {
                let hand = self.settings.hand_size;
                let need = self.players.len() * hand;
                let Some(drawn) =
                    resolver::draw_symbols(&self.pool, need, &mut self.rng)
                else {
                    return false;
                };
                for (i, player) in self.players.iter_mut().enumerate() {
                    player.layout = drawn[i * hand..(i + 1) * hand].to_vec();
                }
                self.board = drawn;
            }
        }
        true
    }

    fn begin_active(&mut self) -> Vec<Effect> {
        self.phase = Phase::Active;
        tracing::info!(
            room_id = %self.id,
            players = self.connected_count(),
            "room active"
        );
        let mut effects = vec![Effect::Broadcast {
            event: ServerEvent::PhaseChanged {
                phase: Phase::Active,
            },
        }];
        effects.extend(self.start_round());
        effects
    }

    // -- Rounds ------------------------------------------------------------

    fn start_round(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Active {
            return Vec::new();
        }
        if self.connected_count() < 2 {
            tracing::warn!(
                room_id = %self.id,
                "fewer than two connected players, ending room"
            );
            return self.end_room(EndReason::InsufficientPlayers);
        }

        self.round_counter += 1;
        match self.settings.variant {
            GameVariant::Matching => {
                self.round = Some(RoundState::Matching {
                    turn: self.round_counter,
                    picks: HashMap::new(),
                    resolved: false,
                });
                tracing::debug!(
                    room_id = %self.id,
                    turn = self.round_counter,
                    "turn started"
                );
                vec![Effect::Broadcast {
                    event: ServerEvent::TurnStarted {
                        turn: self.round_counter,
                    },
                }]
            }
            GameVariant::Relay => self.start_relay_round(),
        }
    }

    fn start_relay_round(&mut self) -> Vec<Effect> {
        let round_no = self.round_counter;
        let connected: Vec<usize> = self
            .players
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_connected())
            .map(|(i, _)| i)
            .collect();
        let source_idx = *connected
            .choose(&mut self.rng)
            .expect("start_round checked for two connected players");

        // Round-robin over the seat list, skipping the source and any
        // disconnected seats; the cursor parks just past the chosen
        // target so consecutive rounds spread target duty evenly.
        let n = self.players.len();
        let mut target_idx = None;
        for step in 0..n {
            let i = (self.next_target_cursor + step) % n;
            if i != source_idx && self.players[i].is_connected() {
                target_idx = Some(i);
                self.next_target_cursor = (i + 1) % n;
                break;
            }
        }
        let target_idx = match target_idx {
            Some(i) => i,
            None => {
                // Rotation came up empty; fall back to a uniform pick
                // among the other connected seats before giving up.
                let others: Vec<usize> = connected
                    .iter()
                    .copied()
                    .filter(|&i| i != source_idx)
                    .collect();
                match others.choose(&mut self.rng) {
                    Some(&i) => {
                        self.next_target_cursor = (i + 1) % n;
                        i
                    }
                    None => {
                        tracing::error!(
                            room_id = %self.id,
                            round = round_no,
                            "no eligible round target, ending room"
                        );
                        return self.end_room(EndReason::InternalError);
                    }
                }
            }
        };

        let hand_len = self.players[target_idx].layout.len();
        if hand_len == 0 {
            tracing::error!(
                room_id = %self.id,
                "target has no layout, ending room"
            );
            return self.end_room(EndReason::InternalError);
        }
        let expected_index = self.rng.random_range(0..hand_len);
        let expected = self.players[target_idx].layout[expected_index].clone();
        let source = self.players[source_idx].persistent_id.clone();
        let target = self.players[target_idx].persistent_id.clone();
        let bonus = self.is_bonus(round_no);

        self.round = Some(RoundState::Relay {
            round: round_no,
            source: source.clone(),
            target: target.clone(),
            expected: expected.clone(),
            expected_index,
            active: true,
        });
        tracing::info!(
            room_id = %self.id,
            round = round_no,
            source = %source,
            target = %target,
            bonus,
            "relay round started"
        );

        let mut effects = Vec::new();
        for player in &self.players {
            let Some(conn) = player.connection else {
                continue;
            };
            let role = if player.persistent_id == source {
                RoundRole::Source
            } else if player.persistent_id == target {
                RoundRole::Target
            } else {
                RoundRole::Bystander
            };
            effects.push(Effect::Unicast {
                conn,
                event: ServerEvent::RoundStarted {
                    round: round_no,
                    role,
                    symbol: expected.clone(),
                    target_index: (role == RoundRole::Target)
                        .then_some(expected_index),
                    bonus,
                },
            });
        }
        effects
    }

    fn is_bonus(&self, round: u32) -> bool {
        self.settings.bonus_interval != 0
            && round % self.settings.bonus_interval == 0
    }

    /// Handles a symbol selection (matching pick or relay press).
    pub fn handle_select(
        &mut self,
        conn: ConnectionId,
        symbol: Symbol,
    ) -> Vec<Effect> {
        let Some(idx) = self.index_of_conn(conn) else {
            return self.reject(conn, 400, "not a member of this room");
        };
        if self.phase != Phase::Active {
            return self.reject(conn, 409, "no round in progress");
        }
        match self.settings.variant {
            GameVariant::Matching => self.select_matching(conn, idx, symbol),
            GameVariant::Relay => self.press_relay(conn, idx, symbol),
        }
    }

    fn select_matching(
        &mut self,
        conn: ConnectionId,
        idx: usize,
        symbol: Symbol,
    ) -> Vec<Effect> {
        let pid = self.players[idx].persistent_id.clone();

        if matches!(
            &self.round,
            Some(RoundState::Matching { resolved: true, .. }) | None
        ) {
            return self.reject(conn, 409, "turn already resolved");
        }
        if self.collected.contains(&symbol) {
            return self.reject(conn, 409, "symbol already matched");
        }
        if !self.board.contains(&symbol) {
            return self.reject(conn, 400, "symbol is not on the board");
        }
        if matches!(
            &self.round,
            Some(RoundState::Matching { picks, .. }) if picks.contains_key(&pid)
        ) {
            return self.reject(conn, 409, "already picked this turn");
        }

        let connected = self.connected_count();
        let (turn_no, pick_count) = match self.round.as_mut() {
            Some(RoundState::Matching { turn, picks, .. }) => {
                picks.insert(pid.clone(), symbol);
                (*turn, picks.len())
            }
            _ => return self.reject(conn, 409, "no matching turn in progress"),
        };

        let mut effects = vec![Effect::Broadcast {
            event: ServerEvent::PickRegistered {
                player: pid,
                turn: turn_no,
            },
        }];
        if pick_count >= connected {
            effects.extend(self.resolve_matching_turn());
        }
        effects
    }

    fn resolve_matching_turn(&mut self) -> Vec<Effect> {
        let (turn_no, picks_map) = match self.round.as_mut() {
            Some(RoundState::Matching {
                turn,
                picks,
                resolved,
            }) => {
                *resolved = true;
                (*turn, picks.clone())
            }
            _ => return Vec::new(),
        };

        let mut effects = Vec::new();
        match resolver::unanimous_pick(&picks_map) {
            Some(symbol) => {
                self.collected.push(symbol.clone());
                tracing::info!(
                    room_id = %self.id,
                    turn = turn_no,
                    symbol = %symbol,
                    collected = self.collected.len(),
                    "turn matched"
                );
                effects.push(Effect::Broadcast {
                    event: ServerEvent::TurnMatched {
                        turn: turn_no,
                        symbol,
                        collected: self.collected.len(),
                    },
                });
                if self.collected.len() >= self.board.len() {
                    effects.extend(self.end_room(EndReason::Victory));
                    return effects;
                }
            }
            None => {
                tracing::debug!(
                    room_id = %self.id,
                    turn = turn_no,
                    "turn mismatched"
                );
                effects.push(Effect::Broadcast {
                    event: ServerEvent::TurnMismatched {
                        turn: turn_no,
                        picks: self.ordered_picks(&picks_map),
                    },
                });
            }
        }
        effects.push(Effect::ArmRoundPause {
            round: turn_no,
            after: self.settings.turn_pause,
        });
        effects
    }

    /// Picks in seat order, for a stable reveal on mismatch.
    fn ordered_picks(
        &self,
        picks: &HashMap<PersistentId, Symbol>,
    ) -> Vec<TurnPick> {
        self.players
            .iter()
            .filter_map(|p| {
                picks.get(&p.persistent_id).map(|symbol| TurnPick {
                    player: p.persistent_id.clone(),
                    symbol: symbol.clone(),
                })
            })
            .collect()
    }

    fn press_relay(
        &mut self,
        conn: ConnectionId,
        idx: usize,
        symbol: Symbol,
    ) -> Vec<Effect> {
        let pid = self.players[idx].persistent_id.clone();

        let (round_no, target, expected, active) = match &self.round {
            Some(RoundState::Relay {
                round,
                target,
                expected,
                active,
                ..
            }) => (*round, target.clone(), expected.clone(), *active),
            _ => return self.reject(conn, 409, "no relay round in progress"),
        };
        if !active {
            return self.reject(conn, 409, "round already resolved");
        }
        let bonus = self.is_bonus(round_no);

        // Correctness is only evaluated when the target acts; anyone
        // else is told off without ending the round — though on a bonus
        // round a stray press still forfeits a piece.
        if pid != target {
            tracing::debug!(
                room_id = %self.id,
                round = round_no,
                player = %pid,
                "press out of turn"
            );
            let mut effects = vec![Effect::Unicast {
                conn,
                event: ServerEvent::Feedback {
                    correct: false,
                    message: "Not your turn!".to_string(),
                },
            }];
            if bonus && self.collected.pop().is_some() {
                effects.push(Effect::Broadcast {
                    event: ServerEvent::PieceLost {
                        player: pid,
                        pieces: self.collected.len(),
                    },
                });
            }
            return effects;
        }

        if let Some(RoundState::Relay { active, .. }) = self.round.as_mut() {
            *active = false;
        }
        let correct = symbol == expected;
        let mut effects = vec![Effect::Unicast {
            conn,
            event: ServerEvent::Feedback {
                correct,
                message: if correct {
                    "Correct!".to_string()
                } else {
                    "Wrong symbol!".to_string()
                },
            },
        }];
        if bonus {
            if correct {
                self.collected.push(expected.clone());
            } else if self.collected.pop().is_some() {
                effects.push(Effect::Broadcast {
                    event: ServerEvent::PieceLost {
                        player: pid.clone(),
                        pieces: self.collected.len(),
                    },
                });
            }
        }
        tracing::info!(
            room_id = %self.id,
            round = round_no,
            player = %pid,
            correct,
            pieces = self.collected.len(),
            "relay round resolved"
        );
        effects.push(Effect::Broadcast {
            event: ServerEvent::RoundResolved {
                round: round_no,
                player: pid,
                correct,
                pieces: self.collected.len(),
            },
        });

        if bonus && correct && self.collected.len() >= self.settings.pieces_to_win
        {
            effects.extend(self.end_room(EndReason::Victory));
            return effects;
        }
        effects.push(Effect::ArmRoundPause {
            round: round_no,
            after: self.settings.round_pause,
        });
        effects
    }

    fn abandon_round(&mut self) -> Vec<Effect> {
        let round_no = self.round_counter;
        tracing::info!(room_id = %self.id, round = round_no, "round abandoned");
        self.round = None;
        vec![Effect::Broadcast {
            event: ServerEvent::RoundAbandoned { round: round_no },
        }]
    }

    // -- Departures --------------------------------------------------------

    /// Explicit leave: immediate permanent removal, no grace period.
    pub fn handle_leave(&mut self, conn: ConnectionId) -> Vec<Effect> {
        let Some(idx) = self.index_of_conn(conn) else {
            return Vec::new();
        };
        tracing::info!(
            room_id = %self.id,
            player = %self.players[idx].persistent_id,
            "player left"
        );
        self.remove_player(idx)
    }

    /// Transport loss: hold the seat and arm the removal timer.
    pub fn handle_disconnect(&mut self, conn: ConnectionId) -> Vec<Effect> {
        let Some(idx) = self.index_of_conn(conn) else {
            return Vec::new();
        };
        let pid = self.players[idx].persistent_id.clone();
        self.players[idx].connection = None;
        tracing::info!(
            room_id = %self.id,
            player = %pid,
            "player disconnected, grace period started"
        );

        let mut effects = vec![
            Effect::Unsubscribe { conn },
            Effect::ArmRemoval {
                player: pid.clone(),
                after: self.settings.reconnect_grace,
            },
            Effect::Broadcast {
                event: ServerEvent::PlayerDisconnected {
                    player: pid.clone(),
                },
            },
        ];

        match self.phase {
            Phase::CountdownPending => {
                effects.extend(self.cancel_countdown("player_disconnected"));
            }
            Phase::Active => {
                if self.pid_in_unresolved_round(&pid) {
                    effects.extend(self.abandon_round());
                    effects.extend(self.start_round());
                }
            }
            Phase::AssetLoading => {
                // The departure itself can complete the precondition.
                if !self.board.is_empty() && self.all_connected_loaded() {
                    effects.extend(self.begin_active());
                }
            }
            _ => {}
        }
        effects
    }

    fn pid_in_unresolved_round(&self, pid: &PersistentId) -> bool {
        match &self.round {
            Some(RoundState::Matching { resolved, .. }) => !*resolved,
            Some(RoundState::Relay {
                source,
                target,
                active,
                ..
            }) => *active && (source == pid || target == pid),
            None => false,
        }
    }

    /// Permanently removes the seat at `idx` and evaluates the
    /// departure consequences. Shared by explicit leaves and removal
    /// timer expiry.
    fn remove_player(&mut self, idx: usize) -> Vec<Effect> {
        let player = self.players.remove(idx);

        // Keep the rotation cursor pointed at the same seat.
        if self.next_target_cursor > idx {
            self.next_target_cursor -= 1;
        }
        if self.players.is_empty() {
            self.next_target_cursor = 0;
        } else {
            self.next_target_cursor %= self.players.len();
        }

        let mut effects = Vec::new();
        if let Some(conn) = player.connection {
            effects.push(Effect::Unsubscribe { conn });
        }
        effects.push(Effect::CancelRemoval {
            player: player.persistent_id.clone(),
        });
        effects.push(Effect::Broadcast {
            event: ServerEvent::PlayerLeft {
                player: player.persistent_id.clone(),
            },
        });
        effects.extend(self.departure_consequences(&player));
        effects
    }

    fn departure_consequences(&mut self, departed: &Player) -> Vec<Effect> {
        if self.players.is_empty() {
            tracing::info!(room_id = %self.id, "room empty, tearing down");
            self.phase = Phase::Ended;
            return vec![
                Effect::DisarmCountdown,
                Effect::CloseRoom {
                    reason: EndReason::InsufficientPlayers,
                },
            ];
        }

        match self.phase {
            Phase::Lobby => {
                let mut effects = vec![Effect::Broadcast {
                    event: ServerEvent::RosterUpdate {
                        roster: self.roster(),
                    },
                }];
                // The departed seat may have been the lone holdout.
                effects.extend(self.maybe_start_countdown());
                effects
            }
            Phase::CountdownPending => {
                let mut effects = self.cancel_countdown("player_left");
                effects.push(Effect::Broadcast {
                    event: ServerEvent::RosterUpdate {
                        roster: self.roster(),
                    },
                });
                effects
            }
            Phase::AssetLoading | Phase::Active => {
                if self.players.len() < 2 {
                    return self.end_room(EndReason::InsufficientPlayers);
                }
                if self.phase == Phase::Active
                    && self.pid_in_unresolved_round(&departed.persistent_id)
                {
                    let mut effects = self.abandon_round();
                    effects.extend(self.start_round());
                    return effects;
                }
                if self.phase == Phase::AssetLoading
                    && !self.board.is_empty()
                    && self.all_connected_loaded()
                {
                    return self.begin_active();
                }
                Vec::new()
            }
            Phase::Ended => Vec::new(),
        }
    }

    // -- Timers ------------------------------------------------------------

    /// Handles a timer firing. Every branch tolerates the guarded state
    /// having moved on — a stale firing is a silent no-op.
    pub fn handle_timer(&mut self, event: TimerEvent) -> Vec<Effect> {
        match event {
            TimerEvent::CountdownElapsed { generation } => {
                self.countdown_elapsed(generation)
            }
            TimerEvent::RemovalElapsed { player } => {
                self.removal_elapsed(player)
            }
            TimerEvent::NextRoundDue { round } => self.next_round_due(round),
        }
    }

    fn countdown_elapsed(&mut self, generation: u64) -> Vec<Effect> {
        if self.phase != Phase::CountdownPending
            || generation != self.countdown_generation
        {
            tracing::debug!(
                room_id = %self.id,
                "stale countdown firing ignored"
            );
            return Vec::new();
        }
        if self.start_condition_holds() {
            self.enter_asset_loading()
        } else {
            self.cancel_countdown("start_condition_lost")
        }
    }

    fn removal_elapsed(&mut self, player: PersistentId) -> Vec<Effect> {
        let Some(idx) = self
            .players
            .iter()
            .position(|p| p.persistent_id == player && !p.is_connected())
        else {
            // Reconnected in the meantime, or already removed.
            return Vec::new();
        };
        tracing::info!(
            room_id = %self.id,
            player = %player,
            "grace period elapsed, removing player"
        );
        self.remove_player(idx)
    }

    fn next_round_due(&mut self, round: u32) -> Vec<Effect> {
        if self.phase != Phase::Active || round != self.round_counter {
            return Vec::new();
        }
        let resolved = match &self.round {
            Some(RoundState::Matching { resolved, .. }) => *resolved,
            Some(RoundState::Relay { active, .. }) => !*active,
            None => true,
        };
        if !resolved {
            return Vec::new();
        }
        self.start_round()
    }

    // -- Operator controls -------------------------------------------------

    /// Starts play immediately, bypassing the ready gate. In
    /// `AssetLoading` after a setup error this re-triggers assignment.
    pub fn handle_force_activate(&mut self, conn: ConnectionId) -> Vec<Effect> {
        match self.phase {
            Phase::Lobby | Phase::CountdownPending => {
                if self.players.len() < 2 {
                    return self.reject(conn, 409, "need at least two players");
                }
                tracing::info!(
                    room_id = %self.id,
                    "force-activate, skipping the ready gate"
                );
                self.enter_asset_loading()
            }
            Phase::AssetLoading => {
                if !self.board.is_empty() {
                    return self.reject(conn, 409, "assets already assigned");
                }
                self.enter_asset_loading()
            }
            _ => self.reject(conn, 409, "room is already active"),
        }
    }

    /// Ends the room with an `admin_reset` reason.
    pub fn handle_force_reset(&mut self) -> Vec<Effect> {
        if self.phase == Phase::Ended {
            return Vec::new();
        }
        tracing::info!(room_id = %self.id, "force reset");
        self.end_room(EndReason::AdminReset)
    }

    // -- Teardown ----------------------------------------------------------

    fn end_room(&mut self, reason: EndReason) -> Vec<Effect> {
        self.phase = Phase::Ended;
        self.round = None;
        tracing::info!(room_id = %self.id, %reason, "room ended");

        let mut effects = vec![
            Effect::DisarmCountdown,
            Effect::Broadcast {
                event: ServerEvent::RoomEnded {
                    reason,
                    message: reason.describe().to_string(),
                },
            },
        ];
        for player in &self.players {
            effects.push(Effect::CancelRemoval {
                player: player.persistent_id.clone(),
            });
            if let Some(conn) = player.connection {
                effects.push(Effect::Unsubscribe { conn });
            }
        }
        effects.push(Effect::CloseRoom { reason });
        effects
    }

    // -- Helpers -----------------------------------------------------------

    fn index_of_conn(&self, conn: ConnectionId) -> Option<usize> {
        self.players
            .iter()
            .position(|p| p.connection == Some(conn))
    }

    fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_connected()).count()
    }

    fn reject(
        &self,
        conn: ConnectionId,
        code: u16,
        message: &str,
    ) -> Vec<Effect> {
        tracing::debug!(
            room_id = %self.id,
            %conn,
            code,
            message,
            "request rejected"
        );
        vec![Effect::Unicast {
            conn,
            event: ServerEvent::Error {
                code,
                message: message.to_string(),
            },
        }]
    }
}

/// Mints a fresh persistent identity: a 32-character hex token (128 bits
/// of entropy), the same scheme used for session resume tokens.
fn mint_persistent_id(rng: &mut StdRng) -> PersistentId {
    let bytes: [u8; 16] = rng.random();
    PersistentId::new(
        bytes.iter().map(|b| format!("{b:02x}")).collect::<String>(),
    )
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for the room state machine.
    //!
    //! Every test drives the pure `Room` directly: feed events, assert
    //! on the returned effects and the resulting state. Timer firings
    //! are simulated by calling `handle_timer` with the stamp captured
    //! from the corresponding arm effect, which is exactly what the
    //! driver does — minus the waiting.

    use super::*;

    // -- Helpers ----------------------------------------------------------

    fn conn(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    fn letter_pool(n: usize) -> Vec<Symbol> {
        (b'A'..=b'Z')
            .take(n)
            .map(|c| Symbol::new((c as char).to_string()))
            .collect()
    }

    fn room_with(
        max_players: usize,
        pool: Vec<Symbol>,
        settings: RoomSettings,
    ) -> Room {
        Room::with_rng(
            RoomId::new("123456"),
            "STUDIO",
            max_players,
            pool,
            settings,
            StdRng::seed_from_u64(7),
        )
    }

    /// A three-seat matching room over an ample pool, default timings.
    fn studio() -> Room {
        room_with(3, letter_pool(20), RoomSettings::default())
    }

    fn join(room: &mut Room, n: u64) -> PersistentId {
        room.handle_join(conn(n), None, None)
            .expect("join should succeed")
            .player_id
    }

    fn broadcasts(effects: &[Effect]) -> Vec<&ServerEvent> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Broadcast { event } => Some(event),
                _ => None,
            })
            .collect()
    }

    fn unicasts_to(effects: &[Effect], c: ConnectionId) -> Vec<&ServerEvent> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Unicast { conn, event } if *conn == c => Some(event),
                _ => None,
            })
            .collect()
    }

    fn armed_generation(effects: &[Effect]) -> Option<u64> {
        effects.iter().find_map(|e| match e {
            Effect::ArmCountdown { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    fn armed_pause(effects: &[Effect]) -> Option<u32> {
        effects.iter().find_map(|e| match e {
            Effect::ArmRoundPause { round, .. } => Some(*round),
            _ => None,
        })
    }

    fn close_reason(effects: &[Effect]) -> Option<EndReason> {
        effects.iter().find_map(|e| match e {
            Effect::CloseRoom { reason } => Some(*reason),
            _ => None,
        })
    }

    fn was_rejected(effects: &[Effect], c: ConnectionId) -> bool {
        unicasts_to(effects, c)
            .iter()
            .any(|e| matches!(e, ServerEvent::Error { .. }))
    }

    /// Joins `n` players, readies them all, runs the countdown, and
    /// reports everyone loaded. Returns (persistent ids, layouts per
    /// connection) with the room left in `Active`.
    fn activate(
        room: &mut Room,
        n: u64,
    ) -> (Vec<PersistentId>, HashMap<u64, Vec<Symbol>>) {
        let pids: Vec<_> = (1..=n).map(|i| join(room, i)).collect();

        let mut generation = None;
        for i in 1..=n {
            let fx = room.handle_ready(conn(i), true);
            if let Some(g) = armed_generation(&fx) {
                generation = Some(g);
            }
        }
        let fx = room.handle_timer(TimerEvent::CountdownElapsed {
            generation: generation.expect("countdown should have armed"),
        });
        assert_eq!(room.phase(), Phase::AssetLoading);

        let mut layouts = HashMap::new();
        for i in 1..=n {
            for event in unicasts_to(&fx, conn(i)) {
                if let ServerEvent::BoardAssigned { symbols } = event {
                    layouts.insert(i, symbols.clone());
                }
            }
        }

        for i in 1..=n {
            room.handle_assets_loaded(conn(i));
        }
        assert_eq!(room.phase(), Phase::Active);

        (pids, layouts)
    }

    /// All players pick the same symbol; returns the final effects.
    fn unanimous_turn(room: &mut Room, conns: &[u64], symbol: &Symbol) -> Vec<Effect> {
        let mut last = Vec::new();
        for &c in conns {
            last = room.handle_select(conn(c), symbol.clone());
        }
        last
    }

    // =====================================================================
    // Joining
    // =====================================================================

    #[test]
    fn test_join_assigns_distinct_persistent_ids() {
        let mut room = studio();

        let p1 = join(&mut room, 1);
        let p2 = join(&mut room, 2);
        let p3 = join(&mut room, 3);

        assert_eq!(room.players().len(), 3);
        assert_ne!(p1, p2);
        assert_ne!(p2, p3);
        assert_eq!(room.phase(), Phase::Lobby);
    }

    #[test]
    fn test_join_replies_with_room_joined_and_updates_roster() {
        let mut room = studio();

        let outcome = room.handle_join(conn(1), None, Some("ada".into())).unwrap();

        assert!(!outcome.reconnected);
        let unicast = unicasts_to(&outcome.effects, conn(1));
        assert!(matches!(
            unicast[0],
            ServerEvent::RoomJoined { roster, .. } if roster.len() == 1
        ));
        assert!(broadcasts(&outcome.effects)
            .iter()
            .any(|e| matches!(e, ServerEvent::RosterUpdate { .. })));
        assert_eq!(room.players()[0].name(), "ada");
    }

    #[test]
    fn test_join_full_room_rejected() {
        let mut room = studio();
        for i in 1..=3 {
            join(&mut room, i);
        }

        let result = room.handle_join(conn(4), None, None);

        assert!(matches!(result, Err(crate::RoomError::RoomFull(_))));
        assert_eq!(room.players().len(), 3);
    }

    #[test]
    fn test_join_duplicate_connection_rejected() {
        let mut room = studio();
        join(&mut room, 1);

        let result = room.handle_join(conn(1), None, None);

        assert!(matches!(
            result,
            Err(crate::RoomError::DuplicateConnection(_))
        ));
    }

    #[test]
    fn test_join_after_start_rejected() {
        let mut room = studio();
        activate(&mut room, 2);

        let result = room.handle_join(conn(9), None, None);

        assert!(matches!(result, Err(crate::RoomError::AlreadyStarted(_))));
    }

    #[test]
    fn test_blank_name_falls_back_to_generated() {
        let mut room = studio();
        room.handle_join(conn(1), None, Some("   ".into())).unwrap();
        assert!(room.players()[0].name().starts_with("player-"));
    }

    // =====================================================================
    // Lobby countdown
    // =====================================================================

    #[test]
    fn test_all_ready_arms_countdown() {
        let mut room = studio();
        join(&mut room, 1);
        join(&mut room, 2);

        room.handle_ready(conn(1), true);
        let fx = room.handle_ready(conn(2), true);

        assert_eq!(room.phase(), Phase::CountdownPending);
        assert!(armed_generation(&fx).is_some());
        assert!(broadcasts(&fx).iter().any(|e| matches!(
            e,
            ServerEvent::CountdownStarted { seconds: 10 }
        )));
    }

    #[test]
    fn test_single_ready_player_does_not_start_countdown() {
        let mut room = studio();
        join(&mut room, 1);

        let fx = room.handle_ready(conn(1), true);

        assert_eq!(room.phase(), Phase::Lobby);
        assert!(armed_generation(&fx).is_none());
    }

    #[test]
    fn test_unready_cancels_countdown_and_stale_timer_is_noop() {
        let mut room = studio();
        join(&mut room, 1);
        join(&mut room, 2);
        room.handle_ready(conn(1), true);
        let fx = room.handle_ready(conn(2), true);
        let generation = armed_generation(&fx).unwrap();

        let fx = room.handle_ready(conn(2), false);

        assert_eq!(room.phase(), Phase::Lobby);
        assert!(fx.contains(&Effect::DisarmCountdown));
        assert!(broadcasts(&fx)
            .iter()
            .any(|e| matches!(e, ServerEvent::CountdownCancelled { .. })));

        // The original timer firing afterwards must change nothing.
        let fx = room.handle_timer(TimerEvent::CountdownElapsed { generation });
        assert!(fx.is_empty());
        assert_eq!(room.phase(), Phase::Lobby);
    }

    #[test]
    fn test_countdown_revalidates_after_midcountdown_join() {
        let mut room = studio();
        join(&mut room, 1);
        join(&mut room, 2);
        room.handle_ready(conn(1), true);
        let fx = room.handle_ready(conn(2), true);
        let generation = armed_generation(&fx).unwrap();

        // Joins are still allowed during the countdown; the newcomer is
        // not ready, so the expiry check must revert to the lobby.
        join(&mut room, 3);
        let fx = room.handle_timer(TimerEvent::CountdownElapsed { generation });

        assert_eq!(room.phase(), Phase::Lobby);
        assert!(broadcasts(&fx).iter().any(|e| matches!(
            e,
            ServerEvent::CountdownCancelled { reason } if reason == "start_condition_lost"
        )));
    }

    #[test]
    fn test_leave_during_countdown_cancels_unconditionally() {
        let mut room = studio();
        join(&mut room, 1);
        join(&mut room, 2);
        join(&mut room, 3);
        for i in 1..=3 {
            room.handle_ready(conn(i), true);
        }
        assert_eq!(room.phase(), Phase::CountdownPending);

        let fx = room.handle_leave(conn(3));

        // Two ready players remain, which would satisfy the start rule,
        // but a departure cancels unconditionally; the next ready toggle
        // re-arms.
        assert!(broadcasts(&fx)
            .iter()
            .any(|e| matches!(e, ServerEvent::CountdownCancelled { .. })));
        assert_eq!(room.phase(), Phase::Lobby);
        assert!(armed_generation(&fx).is_none());

        let fx = room.handle_ready(conn(1), true);
        assert_eq!(room.phase(), Phase::CountdownPending);
        assert!(armed_generation(&fx).is_some());
    }

    #[test]
    fn test_departing_holdout_starts_countdown() {
        let mut room = studio();
        join(&mut room, 1);
        join(&mut room, 2);
        join(&mut room, 3);
        room.handle_ready(conn(1), true);
        room.handle_ready(conn(2), true);
        assert_eq!(room.phase(), Phase::Lobby);

        let fx = room.handle_leave(conn(3));

        assert_eq!(room.phase(), Phase::CountdownPending);
        assert!(armed_generation(&fx).is_some());
    }

    #[test]
    fn test_on_capacity_rule_arms_at_full_room() {
        let settings = RoomSettings {
            start_rule: StartRule::OnCapacity,
            ..RoomSettings::default()
        };
        let mut room = room_with(3, letter_pool(20), settings);
        join(&mut room, 1);
        join(&mut room, 2);
        assert_eq!(room.phase(), Phase::Lobby);

        let outcome = room.handle_join(conn(3), None, None).unwrap();

        assert_eq!(room.phase(), Phase::CountdownPending);
        assert!(armed_generation(&outcome.effects).is_some());
    }

    // =====================================================================
    // Asset loading
    // =====================================================================

    #[test]
    fn test_countdown_elapsed_assigns_boards() {
        let mut room = studio();
        join(&mut room, 1);
        join(&mut room, 2);
        join(&mut room, 3);
        let mut generation = None;
        for i in 1..=3 {
            let fx = room.handle_ready(conn(i), true);
            if let Some(g) = armed_generation(&fx) {
                generation = Some(g);
            }
        }

        let fx = room.handle_timer(TimerEvent::CountdownElapsed {
            generation: generation.unwrap(),
        });

        assert_eq!(room.phase(), Phase::AssetLoading);
        assert_eq!(room.board().len(), 9);
        for i in 1..=3 {
            let boards: Vec<_> = unicasts_to(&fx, conn(i))
                .into_iter()
                .filter_map(|e| match e {
                    ServerEvent::BoardAssigned { symbols } => Some(symbols),
                    _ => None,
                })
                .collect();
            assert_eq!(boards.len(), 1, "one board per player");
            assert_eq!(boards[0].len(), 9);
            // Each layout is a permutation of the shared board.
            let mut sorted = boards[0].clone();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            let mut expected = room.board().to_vec();
            expected.sort_by(|a, b| a.0.cmp(&b.0));
            assert_eq!(sorted, expected);
        }
    }

    #[test]
    fn test_all_loaded_enters_active_with_first_turn() {
        let mut room = studio();
        join(&mut room, 1);
        join(&mut room, 2);
        let mut generation = None;
        for i in 1..=2 {
            let fx = room.handle_ready(conn(i), true);
            if let Some(g) = armed_generation(&fx) {
                generation = Some(g);
            }
        }
        room.handle_timer(TimerEvent::CountdownElapsed {
            generation: generation.unwrap(),
        });

        room.handle_assets_loaded(conn(1));
        assert_eq!(room.phase(), Phase::AssetLoading);
        let fx = room.handle_assets_loaded(conn(2));

        assert_eq!(room.phase(), Phase::Active);
        assert!(broadcasts(&fx)
            .iter()
            .any(|e| matches!(e, ServerEvent::TurnStarted { turn: 1 })));
    }

    #[test]
    fn test_departure_completes_asset_loading() {
        let mut room = studio();
        join(&mut room, 1);
        join(&mut room, 2);
        join(&mut room, 3);
        let mut generation = None;
        for i in 1..=3 {
            let fx = room.handle_ready(conn(i), true);
            if let Some(g) = armed_generation(&fx) {
                generation = Some(g);
            }
        }
        room.handle_timer(TimerEvent::CountdownElapsed {
            generation: generation.unwrap(),
        });
        room.handle_assets_loaded(conn(1));
        room.handle_assets_loaded(conn(2));

        // The third player never loads; their departure completes the
        // precondition for everyone else.
        let fx = room.handle_leave(conn(3));

        assert_eq!(room.phase(), Phase::Active);
        assert!(broadcasts(&fx)
            .iter()
            .any(|e| matches!(e, ServerEvent::TurnStarted { turn: 1 })));
    }

    #[test]
    fn test_empty_pool_is_a_setup_error() {
        let mut room = room_with(3, Vec::new(), RoomSettings::default());
        join(&mut room, 1);
        join(&mut room, 2);
        let mut generation = None;
        for i in 1..=2 {
            let fx = room.handle_ready(conn(i), true);
            if let Some(g) = armed_generation(&fx) {
                generation = Some(g);
            }
        }

        let fx = room.handle_timer(TimerEvent::CountdownElapsed {
            generation: generation.unwrap(),
        });

        // Stuck in AssetLoading with no boards; loading reports are
        // rejected and the room cannot progress.
        assert_eq!(room.phase(), Phase::AssetLoading);
        assert!(room.board().is_empty());
        assert!(broadcasts(&fx)
            .iter()
            .any(|e| matches!(e, ServerEvent::SetupError { .. })));

        let fx = room.handle_assets_loaded(conn(1));
        assert!(was_rejected(&fx, conn(1)));

        // A force reset is still possible.
        let fx = room.handle_force_reset();
        assert_eq!(close_reason(&fx), Some(EndReason::AdminReset));
    }

    #[test]
    fn test_short_pool_extends_by_repeating() {
        let mut room = room_with(3, letter_pool(5), RoomSettings::default());
        activate(&mut room, 2);

        assert_eq!(room.board().len(), 9);
        assert!(room.players().iter().all(|p| p.layout().len() == 9));
    }

    // =====================================================================
    // Matching turns
    // =====================================================================

    #[test]
    fn test_unanimous_picks_collect_the_symbol() {
        let mut room = studio();
        activate(&mut room, 3);
        let symbol = room.board()[0].clone();

        let fx = unanimous_turn(&mut room, &[1, 2, 3], &symbol);

        assert_eq!(room.collected(), &[symbol.clone()]);
        assert!(broadcasts(&fx).iter().any(|e| matches!(
            e,
            ServerEvent::TurnMatched { turn: 1, collected: 1, .. }
        )));
        assert_eq!(armed_pause(&fx), Some(1));
    }

    #[test]
    fn test_mismatched_picks_reveal_choices_without_collecting() {
        let mut room = studio();
        activate(&mut room, 3);
        let a = room.board()[0].clone();
        let b = room.board()[1].clone();

        room.handle_select(conn(1), a.clone());
        room.handle_select(conn(2), b.clone());
        let fx = room.handle_select(conn(3), a.clone());

        assert!(room.collected().is_empty());
        let reveal = broadcasts(&fx)
            .into_iter()
            .find_map(|e| match e {
                ServerEvent::TurnMismatched { picks, .. } => Some(picks),
                _ => None,
            })
            .expect("mismatch must reveal picks");
        assert_eq!(reveal.len(), 3);
        assert_eq!(armed_pause(&fx), Some(1));
    }

    #[test]
    fn test_double_pick_is_rejected() {
        let mut room = studio();
        activate(&mut room, 3);
        let symbol = room.board()[0].clone();

        room.handle_select(conn(1), symbol.clone());
        let fx = room.handle_select(conn(1), symbol.clone());

        assert!(was_rejected(&fx, conn(1)));
    }

    #[test]
    fn test_late_pick_after_resolution_is_rejected() {
        let mut room = studio();
        activate(&mut room, 3);
        let symbol = room.board()[0].clone();
        unanimous_turn(&mut room, &[1, 2, 3], &symbol);

        // The turn is resolved but the pause hasn't elapsed; a straggler
        // pick must be rejected deterministically, not queued.
        let fx = room.handle_select(conn(1), room.board()[1].clone());

        assert!(was_rejected(&fx, conn(1)));
    }

    #[test]
    fn test_matched_symbol_cannot_contribute_again() {
        let mut room = studio();
        activate(&mut room, 3);
        let symbol = room.board()[0].clone();
        unanimous_turn(&mut room, &[1, 2, 3], &symbol);
        room.handle_timer(TimerEvent::NextRoundDue { round: 1 });

        let fx = room.handle_select(conn(1), symbol);

        assert!(was_rejected(&fx, conn(1)));
        assert_eq!(room.collected().len(), 1);
    }

    #[test]
    fn test_pick_off_the_board_is_rejected() {
        let mut room = studio();
        activate(&mut room, 3);

        let fx = room.handle_select(conn(1), Symbol::new("not-a-symbol"));

        assert!(was_rejected(&fx, conn(1)));
    }

    #[test]
    fn test_select_before_active_is_rejected() {
        let mut room = studio();
        join(&mut room, 1);

        let fx = room.handle_select(conn(1), Symbol::new("A"));

        assert!(was_rejected(&fx, conn(1)));
    }

    #[test]
    fn test_pause_elapsed_starts_next_turn() {
        let mut room = studio();
        activate(&mut room, 3);
        let symbol = room.board()[0].clone();
        unanimous_turn(&mut room, &[1, 2, 3], &symbol);

        let fx = room.handle_timer(TimerEvent::NextRoundDue { round: 1 });

        assert!(broadcasts(&fx)
            .iter()
            .any(|e| matches!(e, ServerEvent::TurnStarted { turn: 2 })));
    }

    #[test]
    fn test_stale_pause_timer_is_noop() {
        let mut room = studio();
        activate(&mut room, 3);
        let symbol = room.board()[0].clone();
        unanimous_turn(&mut room, &[1, 2, 3], &symbol);
        room.handle_timer(TimerEvent::NextRoundDue { round: 1 });

        // A duplicate firing for the already-superseded turn.
        let fx = room.handle_timer(TimerEvent::NextRoundDue { round: 1 });

        assert!(fx.is_empty());
    }

    #[test]
    fn test_studio_scenario_runs_to_victory() {
        // The full arc: 3 players, 9-symbol boards, one mismatch along
        // the way, nine distinct matches, victory.
        let mut room = studio();
        activate(&mut room, 3);
        let board = room.board().to_vec();
        assert_eq!(board.len(), 9);

        // Turn 1: "A","B","A" style mismatch leaves collected at 0.
        room.handle_select(conn(1), board[0].clone());
        room.handle_select(conn(2), board[1].clone());
        room.handle_select(conn(3), board[0].clone());
        assert!(room.collected().is_empty());
        room.handle_timer(TimerEvent::NextRoundDue { round: 1 });

        // Nine unanimous turns clear the board.
        let mut last = Vec::new();
        for (i, symbol) in board.iter().enumerate() {
            last = unanimous_turn(&mut room, &[1, 2, 3], symbol);
            let turn = 2 + i as u32;
            if i < 8 {
                assert_eq!(room.collected().len(), i + 1);
                room.handle_timer(TimerEvent::NextRoundDue { round: turn });
            }
        }

        assert_eq!(room.phase(), Phase::Ended);
        assert_eq!(room.collected().len(), 9);
        assert!(broadcasts(&last).iter().any(|e| matches!(
            e,
            ServerEvent::RoomEnded { reason: EndReason::Victory, .. }
        )));
        assert_eq!(close_reason(&last), Some(EndReason::Victory));

        // No further turn may start, and late selections are rejected.
        let fx = room.handle_timer(TimerEvent::NextRoundDue { round: 10 });
        assert!(fx.is_empty());
        let fx = room.handle_select(conn(1), board[0].clone());
        assert!(was_rejected(&fx, conn(1)));
    }

    // =====================================================================
    // Disconnects and reconnects
    // =====================================================================

    #[test]
    fn test_disconnect_mid_turn_abandons_and_restarts() {
        let mut room = studio();
        activate(&mut room, 3);
        room.handle_select(conn(1), room.board()[0].clone());

        let fx = room.handle_disconnect(conn(2));

        assert!(fx.iter().any(|e| matches!(e, Effect::ArmRemoval { .. })));
        assert!(broadcasts(&fx)
            .iter()
            .any(|e| matches!(e, ServerEvent::RoundAbandoned { round: 1 })));
        assert!(broadcasts(&fx)
            .iter()
            .any(|e| matches!(e, ServerEvent::TurnStarted { turn: 2 })));
        assert_eq!(room.players().len(), 3, "seat is held during grace");
    }

    #[test]
    fn test_reconnect_restores_seat_and_layout() {
        let mut room = studio();
        let (pids, layouts) = activate(&mut room, 3);
        room.handle_disconnect(conn(2));

        let outcome = room
            .handle_join(conn(9), Some(pids[1].clone()), None)
            .expect("resume should succeed");

        assert!(outcome.reconnected);
        assert_eq!(outcome.player_id, pids[1]);
        assert_eq!(room.players().len(), 3, "no duplicate seat");
        assert!(outcome.effects.iter().any(|e| matches!(
            e,
            Effect::CancelRemoval { player } if *player == pids[1]
        )));

        let snapshot = unicasts_to(&outcome.effects, conn(9))
            .into_iter()
            .find_map(|e| match e {
                ServerEvent::RoomSnapshot { layout, round, .. } => {
                    Some((layout.clone(), round.clone()))
                }
                _ => None,
            })
            .expect("resume must replay a snapshot");
        assert_eq!(&snapshot.0, &layouts[&2], "layout survives the drop");
        assert!(matches!(snapshot.1, Some(RoundSummary::Matching { .. })));
    }

    #[test]
    fn test_removal_after_reconnect_is_noop() {
        let mut room = studio();
        let (pids, _) = activate(&mut room, 3);
        room.handle_disconnect(conn(2));
        room.handle_join(conn(9), Some(pids[1].clone()), None).unwrap();

        let fx = room.handle_timer(TimerEvent::RemovalElapsed {
            player: pids[1].clone(),
        });

        assert!(fx.is_empty());
        assert_eq!(room.players().len(), 3);
    }

    #[test]
    fn test_grace_expiry_removes_player_permanently() {
        let mut room = studio();
        join(&mut room, 1);
        let p2 = join(&mut room, 2);
        join(&mut room, 3);
        room.handle_disconnect(conn(2));

        let fx = room.handle_timer(TimerEvent::RemovalElapsed {
            player: p2.clone(),
        });

        assert_eq!(room.players().len(), 2);
        assert!(broadcasts(&fx).iter().any(|e| matches!(
            e,
            ServerEvent::PlayerLeft { player } if *player == p2
        )));

        // A later join with the removed id is a brand-new player.
        let outcome = room.handle_join(conn(9), Some(p2.clone()), None).unwrap();
        assert!(!outcome.reconnected);
        assert_ne!(outcome.player_id, p2);
    }

    #[test]
    fn test_disconnect_during_countdown_cancels() {
        let mut room = studio();
        join(&mut room, 1);
        join(&mut room, 2);
        room.handle_ready(conn(1), true);
        room.handle_ready(conn(2), true);
        assert_eq!(room.phase(), Phase::CountdownPending);

        let fx = room.handle_disconnect(conn(1));

        assert_eq!(room.phase(), Phase::Lobby);
        assert!(broadcasts(&fx)
            .iter()
            .any(|e| matches!(e, ServerEvent::CountdownCancelled { .. })));
    }

    #[test]
    fn test_disconnect_completes_asset_loading() {
        let mut room = studio();
        join(&mut room, 1);
        join(&mut room, 2);
        join(&mut room, 3);
        let mut generation = None;
        for i in 1..=3 {
            let fx = room.handle_ready(conn(i), true);
            if let Some(g) = armed_generation(&fx) {
                generation = Some(g);
            }
        }
        room.handle_timer(TimerEvent::CountdownElapsed {
            generation: generation.unwrap(),
        });
        room.handle_assets_loaded(conn(1));
        room.handle_assets_loaded(conn(2));

        let fx = room.handle_disconnect(conn(3));

        assert_eq!(room.phase(), Phase::Active);
        assert!(broadcasts(&fx)
            .iter()
            .any(|e| matches!(e, ServerEvent::TurnStarted { turn: 1 })));
    }

    // =====================================================================
    // Leaving
    // =====================================================================

    #[test]
    fn test_leave_in_lobby_updates_roster() {
        let mut room = studio();
        join(&mut room, 1);
        let p2 = join(&mut room, 2);

        let fx = room.handle_leave(conn(2));

        assert_eq!(room.players().len(), 1);
        assert!(broadcasts(&fx).iter().any(|e| matches!(
            e,
            ServerEvent::PlayerLeft { player } if *player == p2
        )));
        assert!(broadcasts(&fx)
            .iter()
            .any(|e| matches!(e, ServerEvent::RosterUpdate { .. })));
    }

    #[test]
    fn test_leave_below_two_in_started_room_ends_it() {
        let mut room = studio();
        activate(&mut room, 2);

        let fx = room.handle_leave(conn(1));

        assert_eq!(room.phase(), Phase::Ended);
        assert!(broadcasts(&fx).iter().any(|e| matches!(
            e,
            ServerEvent::RoomEnded {
                reason: EndReason::InsufficientPlayers,
                ..
            }
        )));
        assert_eq!(close_reason(&fx), Some(EndReason::InsufficientPlayers));
    }

    #[test]
    fn test_last_player_leaving_tears_room_down() {
        let mut room = studio();
        join(&mut room, 1);

        let fx = room.handle_leave(conn(1));

        assert!(room.players().is_empty());
        assert!(close_reason(&fx).is_some());
    }

    #[test]
    fn test_leave_from_unknown_connection_is_ignored() {
        let mut room = studio();
        join(&mut room, 1);

        let fx = room.handle_leave(conn(99));

        assert!(fx.is_empty());
        assert_eq!(room.players().len(), 1);
    }

    // =====================================================================
    // Operator controls
    // =====================================================================

    #[test]
    fn test_force_activate_skips_ready_gate() {
        let mut room = studio();
        join(&mut room, 1);
        join(&mut room, 2);

        let fx = room.handle_force_activate(conn(1));

        assert_eq!(room.phase(), Phase::AssetLoading);
        assert!(!room.board().is_empty());
        assert!(!unicasts_to(&fx, conn(1)).is_empty());
    }

    #[test]
    fn test_force_activate_needs_two_players() {
        let mut room = studio();
        join(&mut room, 1);

        let fx = room.handle_force_activate(conn(1));

        assert!(was_rejected(&fx, conn(1)));
        assert_eq!(room.phase(), Phase::Lobby);
    }

    #[test]
    fn test_force_reset_ends_with_admin_reason() {
        let mut room = studio();
        activate(&mut room, 2);

        let fx = room.handle_force_reset();

        assert_eq!(room.phase(), Phase::Ended);
        assert!(broadcasts(&fx).iter().any(|e| matches!(
            e,
            ServerEvent::RoomEnded { reason: EndReason::AdminReset, .. }
        )));
    }

    // =====================================================================
    // Relay variant
    // =====================================================================

    fn relay_settings() -> RoomSettings {
        RoomSettings {
            variant: GameVariant::Relay,
            ..RoomSettings::default()
        }
    }

    /// Per-round view reconstructed from the role unicasts.
    struct RoundView {
        round: u32,
        source: u64,
        target: u64,
        target_index: usize,
        bonus: bool,
    }

    fn round_view(effects: &[Effect], conns: &[u64]) -> Option<RoundView> {
        let mut view: Option<RoundView> = None;
        let mut source = None;
        for &c in conns {
            for event in unicasts_to(effects, conn(c)) {
                if let ServerEvent::RoundStarted {
                    round,
                    role,
                    target_index,
                    bonus,
                    ..
                } = event
                {
                    match role {
                        RoundRole::Target => {
                            view = Some(RoundView {
                                round: *round,
                                source: 0,
                                target: c,
                                target_index: target_index
                                    .expect("target gets its index"),
                                bonus: *bonus,
                            });
                        }
                        RoundRole::Source => source = Some(c),
                        RoundRole::Bystander => {}
                    }
                }
            }
        }
        let mut view = view?;
        view.source = source?;
        Some(view)
    }

    fn activate_relay(
        room: &mut Room,
        n: u64,
    ) -> (HashMap<u64, Vec<Symbol>>, Vec<Effect>) {
        let pids: Vec<_> = (1..=n).map(|i| join(room, i)).collect();
        assert_eq!(pids.len() as u64, n);
        let mut generation = None;
        for i in 1..=n {
            let fx = room.handle_ready(conn(i), true);
            if let Some(g) = armed_generation(&fx) {
                generation = Some(g);
            }
        }
        let fx = room.handle_timer(TimerEvent::CountdownElapsed {
            generation: generation.unwrap(),
        });
        let mut layouts = HashMap::new();
        for i in 1..=n {
            for event in unicasts_to(&fx, conn(i)) {
                if let ServerEvent::BoardAssigned { symbols } = event {
                    layouts.insert(i, symbols.clone());
                }
            }
        }
        let mut last = Vec::new();
        for i in 1..=n {
            last = room.handle_assets_loaded(conn(i));
        }
        assert_eq!(room.phase(), Phase::Active);
        (layouts, last)
    }

    #[test]
    fn test_relay_hands_are_disjoint() {
        let mut room = room_with(3, letter_pool(20), relay_settings());
        let (layouts, _) = activate_relay(&mut room, 3);

        assert_eq!(layouts.len(), 3);
        let mut all: Vec<_> = layouts.values().flatten().collect();
        assert_eq!(all.len(), 12, "three hands of four");
        let before = all.len();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all.dedup();
        assert_eq!(all.len(), before, "hands must not share symbols");
    }

    #[test]
    fn test_relay_roles_are_disjoint_and_indexed() {
        let mut room = room_with(3, letter_pool(20), relay_settings());
        let (layouts, fx) = activate_relay(&mut room, 3);

        let view = round_view(&fx, &[1, 2, 3]).expect("round 1 roles");
        assert_eq!(view.round, 1);
        assert_ne!(view.source, view.target);

        // The announced symbol sits at the given index of the target's
        // own hand.
        let symbol = unicasts_to(&fx, conn(view.target))
            .into_iter()
            .find_map(|e| match e {
                ServerEvent::RoundStarted { symbol, .. } => {
                    Some(symbol.clone())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(layouts[&view.target][view.target_index], symbol);
    }

    #[test]
    fn test_relay_rotation_spreads_target_duty() {
        let mut room = room_with(3, letter_pool(20), relay_settings());
        let (layouts, mut fx) = activate_relay(&mut room, 3);

        let mut target_counts: HashMap<u64, usize> = HashMap::new();
        for round in 1..=30u32 {
            let view = round_view(&fx, &[1, 2, 3]).expect("round roles");
            assert_eq!(view.round, round);
            assert_ne!(
                view.source, view.target,
                "round {round} reused a player for both duties"
            );
            *target_counts.entry(view.target).or_default() += 1;

            // Press correct on plain rounds and wrong on bonus rounds so
            // the piece count never reaches the victory threshold.
            let hand = &layouts[&view.target];
            let press = if view.bonus {
                hand[(view.target_index + 1) % hand.len()].clone()
            } else {
                hand[view.target_index].clone()
            };
            room.handle_select(conn(view.target), press);
            fx = room.handle_timer(TimerEvent::NextRoundDue { round });
        }

        for c in 1..=3u64 {
            assert!(
                target_counts.get(&c).copied().unwrap_or(0) >= 2,
                "player {c} was target fewer than twice in 30 rounds"
            );
        }
    }

    #[test]
    fn test_relay_non_target_press_is_told_off() {
        let mut room = room_with(3, letter_pool(20), relay_settings());
        let (layouts, fx) = activate_relay(&mut room, 3);
        let view = round_view(&fx, &[1, 2, 3]).unwrap();
        let bystander = (1..=3u64)
            .find(|&c| c != view.source && c != view.target)
            .unwrap();

        let fx = room.handle_select(
            conn(bystander),
            layouts[&bystander][0].clone(),
        );

        let feedback = unicasts_to(&fx, conn(bystander));
        assert!(matches!(
            feedback[0],
            ServerEvent::Feedback { correct: false, .. }
        ));

        // The round is still live: the real target can resolve it.
        let fx = room.handle_select(
            conn(view.target),
            layouts[&view.target][view.target_index].clone(),
        );
        assert!(broadcasts(&fx).iter().any(|e| matches!(
            e,
            ServerEvent::RoundResolved { correct: true, .. }
        )));
    }

    #[test]
    fn test_relay_bonus_rounds_award_and_cost_pieces() {
        let mut room = room_with(3, letter_pool(20), relay_settings());
        let (layouts, mut fx) = activate_relay(&mut room, 3);

        // Rounds 1-2: plain, correct presses, no pieces.
        for round in 1..=2u32 {
            let view = round_view(&fx, &[1, 2, 3]).unwrap();
            assert!(!view.bonus);
            room.handle_select(
                conn(view.target),
                layouts[&view.target][view.target_index].clone(),
            );
            assert!(room.collected().is_empty());
            fx = room.handle_timer(TimerEvent::NextRoundDue { round });
        }

        // Round 3: bonus, correct press awards a piece.
        let view = round_view(&fx, &[1, 2, 3]).unwrap();
        assert!(view.bonus);
        let resolve = room.handle_select(
            conn(view.target),
            layouts[&view.target][view.target_index].clone(),
        );
        assert_eq!(room.collected().len(), 1);
        assert!(broadcasts(&resolve).iter().any(|e| matches!(
            e,
            ServerEvent::RoundResolved { correct: true, pieces: 1, .. }
        )));
        fx = room.handle_timer(TimerEvent::NextRoundDue { round: 3 });

        // Rounds 4-5: plain.
        for round in 4..=5u32 {
            let view = round_view(&fx, &[1, 2, 3]).unwrap();
            room.handle_select(
                conn(view.target),
                layouts[&view.target][view.target_index].clone(),
            );
            fx = room.handle_timer(TimerEvent::NextRoundDue { round });
        }

        // Round 6: bonus, wrong press forfeits the piece.
        let view = round_view(&fx, &[1, 2, 3]).unwrap();
        assert!(view.bonus);
        let hand = &layouts[&view.target];
        let wrong = hand[(view.target_index + 1) % hand.len()].clone();
        let resolve = room.handle_select(conn(view.target), wrong);
        assert!(room.collected().is_empty());
        assert!(broadcasts(&resolve)
            .iter()
            .any(|e| matches!(e, ServerEvent::PieceLost { pieces: 0, .. })));
    }

    #[test]
    fn test_relay_stray_press_on_bonus_round_costs_a_piece() {
        let mut room = room_with(3, letter_pool(20), relay_settings());
        let (layouts, mut fx) = activate_relay(&mut room, 3);

        // Earn a piece on round 3 first.
        for round in 1..=3u32 {
            let view = round_view(&fx, &[1, 2, 3]).unwrap();
            room.handle_select(
                conn(view.target),
                layouts[&view.target][view.target_index].clone(),
            );
            fx = room.handle_timer(TimerEvent::NextRoundDue { round });
        }
        assert_eq!(room.collected().len(), 1);

        // Rounds 4-5 plain.
        for round in 4..=5u32 {
            let view = round_view(&fx, &[1, 2, 3]).unwrap();
            room.handle_select(
                conn(view.target),
                layouts[&view.target][view.target_index].clone(),
            );
            fx = room.handle_timer(TimerEvent::NextRoundDue { round });
        }

        // Round 6 is a bonus round; a bystander press costs the piece
        // without resolving the round.
        let view = round_view(&fx, &[1, 2, 3]).unwrap();
        assert!(view.bonus);
        let bystander = (1..=3u64)
            .find(|&c| c != view.source && c != view.target)
            .unwrap();
        let stray = room.handle_select(
            conn(bystander),
            layouts[&bystander][0].clone(),
        );
        assert!(room.collected().is_empty());
        assert!(broadcasts(&stray)
            .iter()
            .any(|e| matches!(e, ServerEvent::PieceLost { pieces: 0, .. })));

        // Still the target's round to resolve.
        let resolve = room.handle_select(
            conn(view.target),
            layouts[&view.target][view.target_index].clone(),
        );
        assert!(broadcasts(&resolve).iter().any(|e| matches!(
            e,
            ServerEvent::RoundResolved { correct: true, .. }
        )));
    }

    #[test]
    fn test_relay_victory_at_four_pieces() {
        let mut room = room_with(3, letter_pool(20), relay_settings());
        let (layouts, mut fx) = activate_relay(&mut room, 3);

        // Correct presses throughout: pieces land on rounds 3, 6, 9 and
        // the fourth on round 12 ends the game.
        for round in 1..=12u32 {
            let view = round_view(&fx, &[1, 2, 3]).unwrap();
            let resolve = room.handle_select(
                conn(view.target),
                layouts[&view.target][view.target_index].clone(),
            );
            if round == 12 {
                assert_eq!(room.phase(), Phase::Ended);
                assert!(broadcasts(&resolve).iter().any(|e| matches!(
                    e,
                    ServerEvent::RoomEnded { reason: EndReason::Victory, .. }
                )));
                assert!(
                    armed_pause(&resolve).is_none(),
                    "no next round after victory"
                );
                return;
            }
            fx = room.handle_timer(TimerEvent::NextRoundDue { round });
        }
        panic!("victory should have been declared on round 12");
    }

    #[test]
    fn test_relay_source_disconnect_restarts_round() {
        let mut room = room_with(3, letter_pool(20), relay_settings());
        let (_, fx) = activate_relay(&mut room, 3);
        let view = round_view(&fx, &[1, 2, 3]).unwrap();

        let fx = room.handle_disconnect(conn(view.source));

        assert!(broadcasts(&fx)
            .iter()
            .any(|e| matches!(e, ServerEvent::RoundAbandoned { round: 1 })));
        let remaining: Vec<u64> = (1..=3u64)
            .filter(|&c| c != view.source)
            .collect();
        let next = round_view(&fx, &remaining).expect("round 2 roles");
        assert_eq!(next.round, 2);
    }

    #[test]
    fn test_relay_bystander_disconnect_keeps_round() {
        let mut room = room_with(3, letter_pool(20), relay_settings());
        let (layouts, fx) = activate_relay(&mut room, 3);
        let view = round_view(&fx, &[1, 2, 3]).unwrap();
        let bystander = (1..=3u64)
            .find(|&c| c != view.source && c != view.target)
            .unwrap();

        let fx = room.handle_disconnect(conn(bystander));

        assert!(!broadcasts(&fx)
            .iter()
            .any(|e| matches!(e, ServerEvent::RoundAbandoned { .. })));

        // Round 1 is still live for the target.
        let resolve = room.handle_select(
            conn(view.target),
            layouts[&view.target][view.target_index].clone(),
        );
        assert!(broadcasts(&resolve).iter().any(|e| matches!(
            e,
            ServerEvent::RoundResolved { round: 1, correct: true, .. }
        )));
    }
}
