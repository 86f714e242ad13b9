//! Room configuration: timings, variant selection, and the start rule.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which resolution strategy a room plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameVariant {
    /// Every connected player picks a symbol each turn; a turn succeeds
    /// when all picks agree. The canonical variant.
    Matching,
    /// One source announces, one target presses; targets rotate
    /// round-robin and every third round carries a piece stake.
    Relay,
}

/// When a lobby commits to starting the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartRule {
    /// All present players are ready and at least two are present.
    AllReady,
    /// The room reached template capacity.
    OnCapacity,
}

/// Per-room settings. Deployments override the defaults through the
/// server builder; rooms copy them at creation and never reread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSettings {
    /// Resolution strategy.
    pub variant: GameVariant,

    /// Lobby start condition.
    pub start_rule: StartRule,

    /// Length of the lobby countdown once the start condition holds.
    pub countdown: Duration,

    /// How long a disconnected player's slot is held before removal.
    pub reconnect_grace: Duration,

    /// Pause between resolved matching turns.
    pub turn_pause: Duration,

    /// Pause between resolved relay rounds.
    pub round_pause: Duration,

    /// Shared board size for the matching variant.
    pub board_size: usize,

    /// Private hand size per player for the relay variant.
    pub hand_size: usize,

    /// Pieces needed to win the relay variant.
    pub pieces_to_win: usize,

    /// Every Nth relay round carries a piece stake. 0 disables stakes.
    pub bonus_interval: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            variant: GameVariant::Matching,
            start_rule: StartRule::AllReady,
            countdown: Duration::from_secs(10),
            reconnect_grace: Duration::from_secs(20),
            turn_pause: Duration::from_secs(3),
            round_pause: Duration::from_millis(1500),
            board_size: 9,
            hand_size: 4,
            pieces_to_win: 4,
            bonus_interval: 3,
        }
    }
}
