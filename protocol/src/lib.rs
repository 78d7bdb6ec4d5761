use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// ---- Game rules shared by server and clients ----

/// A player whose score reaches this after a turn wins the game.
pub const WIN_SCORE: u32 = 365;
/// Dice a player may roll in a single turn before they must end it.
pub const MAX_DICE_PER_TURN: usize = 4;
/// Smallest roll that unlocks the Paren Maren multiplier action.
pub const PAREN_MAREN_MIN_ROLL: u32 = 4;
/// Die faces when the caller doesn't ask for anything exotic.
pub const DEFAULT_FACES: u32 = 6;

pub fn turn_score(dice: &[u32], multiplier: u32) -> u32 {
    dice.iter().sum::<u32>() * multiplier
}

pub fn qualifies_for_paren_maren(roll: u32) -> bool {
    roll >= PAREN_MAREN_MIN_ROLL
}

/// Four uppercase letters, the room-code convention used by clients.
/// The server accepts any non-empty string as a room id.
pub fn random_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..4).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect()
}

/// ---- Phases ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Playing,
    Ended,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Lobby => write!(f, "lobby"),
            Phase::Playing => write!(f, "playing"),
            Phase::Ended => write!(f, "ended"),
        }
    }
}

/// ---- Snapshots ----
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub id: String,
    pub name: String,
    pub ready: bool,
    pub connected: bool,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub id: String,
    pub created_at: String,
    pub host_id: Option<String>,
    pub players: Vec<PlayerSnapshot>,
    pub turn_order: Vec<String>,
    pub turn_index: usize,
    pub dice: Vec<u32>,
    pub multiplier: u32,
    pub can_paren_maren: bool,
    pub paren_maren_pressed: bool,
    pub phase: Phase,
    pub winner: Option<String>,
}

impl RoomSnapshot {
    /// Identifier of the player whose turn it is, if anyone's.
    pub fn current_player(&self) -> Option<&str> {
        self.turn_order.get(self.turn_index).map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientToServer {
    Join {
        room: String,
        player_id: String,
        name: String,
        create_if_missing: bool,
    },
    StartGame,
    RollDice {
        faces: Option<u32>,
    },
    RollParenMaren {
        faces: Option<u32>,
    },
    EndTurn,
    Leave,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerToClient {
    Hello {
        your_id: Uuid,
    },
    Joined {
        snapshot: RoomSnapshot,
    },
    RoomUpdated {
        snapshot: RoomSnapshot,
    },
    /// The last player left; stop rendering the room.
    RoomDeleted,
    Rolled {
        last: u32,
        dice: Vec<u32>,
        can_paren_maren: bool,
    },
    ParenMaren {
        multiplier: u32,
        paren_maren_pressed: bool,
    },
    TurnEnded {
        gained: u32,
        score: u32,
    },
    Error {
        message: String,
    },
    Info {
        message: String,
    },
}
