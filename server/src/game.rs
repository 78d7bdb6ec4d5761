use chrono::Utc;
use parenmaren_protocol::{
    qualifies_for_paren_maren, turn_score, Phase, PlayerSnapshot, RoomSnapshot, MAX_DICE_PER_TURN,
    WIN_SCORE,
};
use rand::Rng;
use std::collections::HashMap;

use crate::Tx;

/// Source of die rolls. Injectable so tests can script exact sequences.
pub trait DiceRoller: Send {
    /// Uniform integer in `[1, faces]`.
    fn roll(&mut self, faces: u32) -> u32;
}

pub struct ThreadRngDice;

impl DiceRoller for ThreadRngDice {
    fn roll(&mut self, faces: u32) -> u32 {
        rand::thread_rng().gen_range(1..=faces)
    }
}

/// Policy for StartGame. Both checks were present-but-disabled in one
/// version of the original game; kept as knobs rather than hard rules.
#[derive(Debug, Clone, Copy)]
pub struct StartRules {
    pub host_only: bool,
    pub min_players: usize,
}

impl Default for StartRules {
    fn default() -> Self {
        Self {
            host_only: true,
            min_players: 2,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GameError {
    #[error("room '{0}' already exists")]
    RoomAlreadyExists(String),
    #[error("room '{0}' not found")]
    RoomNotFound(String),
    #[error("player '{1}' is not in room '{0}'")]
    PlayerNotInRoom(String, String),
    #[error("only the host can start the game")]
    NotHost,
    #[error("need at least {0} players to start")]
    NotEnoughPlayers(usize),
    #[error("the game has already started")]
    NotInLobby,
    #[error("game is not in the playing phase")]
    NotPlaying,
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("no rolls left this turn, end it first")]
    TurnComplete,
}

/// A player's identity and per-connection channel as supplied by the caller.
pub struct NewPlayer {
    pub id: String,
    pub name: String,
    pub tx: Tx,
}

pub struct Player {
    pub id: String,
    pub name: String,
    pub ready: bool,
    pub connected: bool,
    pub score: u32,
    pub tx: Tx,
}

impl Player {
    fn new(joining: NewPlayer) -> Self {
        Player {
            id: joining.id,
            name: joining.name,
            ready: false,
            connected: true,
            score: 0,
            tx: joining.tx,
        }
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            ready: self.ready,
            connected: self.connected,
            score: self.score,
        }
    }
}

pub struct Room {
    pub id: String,
    pub created_at: String,
    pub host_id: Option<String>,
    pub players: HashMap<String, Player>,
    pub turn_order: Vec<String>,
    pub turn_index: usize,
    pub dice: Vec<u32>,
    pub multiplier: u32,
    pub can_paren_maren: bool,
    pub paren_maren_pressed: bool,
    pub phase: Phase,
    pub winner: Option<String>,
}

impl Room {
    fn new(id: String, host: NewPlayer) -> Self {
        let host_id = host.id.clone();
        let mut players = HashMap::new();
        players.insert(host_id.clone(), Player::new(host));
        Room {
            id,
            created_at: Utc::now().to_rfc3339(),
            host_id: Some(host_id.clone()),
            players,
            turn_order: vec![host_id],
            turn_index: 0,
            dice: Vec::new(),
            multiplier: 1,
            can_paren_maren: false,
            paren_maren_pressed: false,
            phase: Phase::Lobby,
            winner: None,
        }
    }

    pub fn current_player_id(&self) -> Option<&str> {
        self.turn_order.get(self.turn_index).map(String::as_str)
    }

    /// Immutable deep copy; the only view that ever leaves the engine.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id.clone(),
            created_at: self.created_at.clone(),
            host_id: self.host_id.clone(),
            players: self
                .turn_order
                .iter()
                .filter_map(|id| self.players.get(id))
                .map(Player::snapshot)
                .collect(),
            turn_order: self.turn_order.clone(),
            turn_index: self.turn_index,
            dice: self.dice.clone(),
            multiplier: self.multiplier,
            can_paren_maren: self.can_paren_maren,
            paren_maren_pressed: self.paren_maren_pressed,
            phase: self.phase,
            winner: self.winner.clone(),
        }
    }

    fn require_turn(&self, player_id: &str) -> Result<(), GameError> {
        if self.phase != Phase::Playing {
            return Err(GameError::NotPlaying);
        }
        if !self.players.contains_key(player_id) {
            return Err(GameError::PlayerNotInRoom(
                self.id.clone(),
                player_id.to_string(),
            ));
        }
        if self.current_player_id() != Some(player_id) {
            return Err(GameError::NotYourTurn);
        }
        Ok(())
    }

    fn reset_turn_state(&mut self) {
        self.dice.clear();
        self.multiplier = 1;
        self.can_paren_maren = false;
        self.paren_maren_pressed = false;
    }
}

#[derive(Debug)]
pub struct RollOutcome {
    pub last: u32,
    pub snapshot: RoomSnapshot,
}

#[derive(Debug)]
pub struct ParenMarenOutcome {
    pub multiplier: u32,
    pub snapshot: RoomSnapshot,
}

#[derive(Debug)]
pub struct TurnOutcome {
    pub gained: u32,
    pub score: u32,
    pub snapshot: RoomSnapshot,
}

pub enum LeaveOutcome {
    Updated(RoomSnapshot),
    Deleted,
}

/// Owns every live room. All mutation goes through the operations below;
/// callers only ever see snapshots. The server keeps one of these behind
/// a mutex, which serializes operations as the rules require.
pub struct Registry {
    rooms: HashMap<String, Room>,
    rules: StartRules,
    dice: Box<dyn DiceRoller>,
}

impl Registry {
    pub fn new(rules: StartRules, dice: Box<dyn DiceRoller>) -> Self {
        Registry {
            rooms: HashMap::new(),
            rules,
            dice,
        }
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    #[cfg(test)]
    pub fn room_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    pub fn create_room(&mut self, room_id: &str, host: NewPlayer) -> Result<RoomSnapshot, GameError> {
        if self.rooms.contains_key(room_id) {
            return Err(GameError::RoomAlreadyExists(room_id.to_string()));
        }
        let room = Room::new(room_id.to_string(), host);
        let snapshot = room.snapshot();
        self.rooms.insert(room_id.to_string(), room);
        Ok(snapshot)
    }

    /// New player ids are appended to the rotation; a known id is the
    /// reconnect path and keeps its score and turn slot.
    pub fn join_room(&mut self, room_id: &str, player: NewPlayer) -> Result<RoomSnapshot, GameError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| GameError::RoomNotFound(room_id.to_string()))?;

        match room.players.get_mut(&player.id) {
            Some(existing) => {
                if !player.name.is_empty() {
                    existing.name = player.name;
                }
                existing.connected = true;
                existing.tx = player.tx;
            }
            None => {
                room.turn_order.push(player.id.clone());
                room.players.insert(player.id.clone(), Player::new(player));
            }
        }
        Ok(room.snapshot())
    }

    /// Atomic create-or-join. The original split this into two calls and
    /// raced on concurrent first joins; a single registry operation can't.
    pub fn join_or_create(
        &mut self,
        room_id: &str,
        player: NewPlayer,
        create_if_missing: bool,
    ) -> Result<RoomSnapshot, GameError> {
        if self.rooms.contains_key(room_id) {
            return self.join_room(room_id, player);
        }
        if !create_if_missing {
            return Err(GameError::RoomNotFound(room_id.to_string()));
        }
        self.create_room(room_id, player)
    }

    pub fn start_game(&mut self, room_id: &str, requester_id: &str) -> Result<RoomSnapshot, GameError> {
        let rules = self.rules;
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| GameError::RoomNotFound(room_id.to_string()))?;

        if !room.players.contains_key(requester_id) {
            return Err(GameError::PlayerNotInRoom(
                room_id.to_string(),
                requester_id.to_string(),
            ));
        }
        if room.phase != Phase::Lobby {
            return Err(GameError::NotInLobby);
        }
        if rules.host_only && room.host_id.as_deref() != Some(requester_id) {
            return Err(GameError::NotHost);
        }
        if room.players.len() < rules.min_players {
            return Err(GameError::NotEnoughPlayers(rules.min_players));
        }

        room.phase = Phase::Playing;
        room.turn_index = 0;
        room.dice.clear();
        Ok(room.snapshot())
    }

    pub fn roll_dice(
        &mut self,
        room_id: &str,
        player_id: &str,
        faces: u32,
    ) -> Result<RollOutcome, GameError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| GameError::RoomNotFound(room_id.to_string()))?;
        room.require_turn(player_id)?;
        if room.dice.len() >= MAX_DICE_PER_TURN {
            return Err(GameError::TurnComplete);
        }

        let roll = self.dice.roll(faces);
        room.dice.push(roll);
        // Only the most recent die counts for the qualifier.
        room.can_paren_maren = qualifies_for_paren_maren(roll);
        Ok(RollOutcome {
            last: roll,
            snapshot: room.snapshot(),
        })
    }

    /// Rerolls the black die and makes it the turn's multiplier. A second
    /// press overwrites the first, it never stacks.
    pub fn roll_paren_maren(
        &mut self,
        room_id: &str,
        player_id: &str,
        faces: u32,
    ) -> Result<ParenMarenOutcome, GameError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| GameError::RoomNotFound(room_id.to_string()))?;
        room.require_turn(player_id)?;

        let roll = self.dice.roll(faces);
        room.multiplier = roll;
        room.paren_maren_pressed = true;
        room.can_paren_maren = false;
        Ok(ParenMarenOutcome {
            multiplier: roll,
            snapshot: room.snapshot(),
        })
    }

    pub fn end_turn(&mut self, room_id: &str, player_id: &str) -> Result<TurnOutcome, GameError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| GameError::RoomNotFound(room_id.to_string()))?;
        room.require_turn(player_id)?;

        let gained = turn_score(&room.dice, room.multiplier);
        let player = room
            .players
            .get_mut(player_id)
            .ok_or_else(|| GameError::PlayerNotInRoom(room_id.to_string(), player_id.to_string()))?;
        player.score += gained;
        let score = player.score;
        let name = player.name.clone();

        if score >= WIN_SCORE {
            // Game over: the turn does not advance past the winner.
            room.winner = Some(name);
            room.phase = Phase::Ended;
        } else {
            if !room.turn_order.is_empty() {
                room.turn_index = (room.turn_index + 1) % room.turn_order.len();
            }
            room.reset_turn_state();
        }
        Ok(TurnOutcome {
            gained,
            score,
            snapshot: room.snapshot(),
        })
    }

    pub fn leave_room(&mut self, room_id: &str, player_id: &str) -> Result<LeaveOutcome, GameError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| GameError::RoomNotFound(room_id.to_string()))?;

        if room.players.remove(player_id).is_none() {
            return Ok(LeaveOutcome::Updated(room.snapshot()));
        }
        room.turn_order.retain(|id| id != player_id);
        if room.players.is_empty() {
            self.rooms.remove(room_id);
            return Ok(LeaveOutcome::Deleted);
        }
        // Departure policy: an out-of-range index resets to 0 rather than
        // preserving relative rotation.
        if room.turn_index >= room.turn_order.len() {
            room.turn_index = 0;
        }
        if room.host_id.as_deref() == Some(player_id) {
            room.host_id = room.turn_order.first().cloned();
        }
        Ok(LeaveOutcome::Updated(room.snapshot()))
    }

    /// Disconnect notifications race with room teardown, so a missing
    /// room or player is not an error here.
    pub fn handle_disconnect(&mut self, room_id: &str, player_id: &str) -> Option<RoomSnapshot> {
        let room = self.rooms.get_mut(room_id)?;
        let player = room.players.get_mut(player_id)?;
        player.connected = false;
        Some(room.snapshot())
    }
}
