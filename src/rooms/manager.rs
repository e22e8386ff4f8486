//! Room bookkeeping: codes, seats, connections, rematch votes.
//!
//! Pure state. No timers and no network I/O; callers pass the current
//! server time in for the `updated_at_ms` idle bookkeeping.

use std::collections::{HashMap, HashSet};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::ws::hub::ConnId;
use crate::ws::protocol::{ErrorCode, InputFrame, PlayerId, PlayerPair, RoomPlayerInfo, RoomStatus};

use super::code::{generate_room_code, RoomCodeExhausted};

/// Longest nickname kept, in characters
pub const MAX_NICKNAME_CHARS: usize = 24;

/// One seat in a room
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub player_id: PlayerId,
    pub conn_id: Option<ConnId>,
    /// Reconnect credential, fixed for the lifetime of the room
    pub token: String,
    pub nickname: Option<String>,
    pub connected: bool,
    pub last_input: InputFrame,
}

impl PlayerSlot {
    fn new(player_id: PlayerId, conn_id: ConnId, nickname: Option<String>) -> Self {
        Self {
            player_id,
            conn_id: Some(conn_id),
            token: Uuid::new_v4().to_string(),
            nickname,
            connected: true,
            last_input: InputFrame::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub code: String,
    pub status: RoomStatus,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub players: PlayerPair<Option<PlayerSlot>>,
    pub rematch_votes: HashSet<PlayerId>,
}

impl Room {
    pub fn slot(&self, player_id: PlayerId) -> Option<&PlayerSlot> {
        self.players.get(player_id).as_ref()
    }

    pub fn is_full(&self) -> bool {
        self.players.p1.is_some() && self.players.p2.is_some()
    }

    pub fn both_players_connected(&self) -> bool {
        PlayerId::ALL
            .iter()
            .all(|id| self.slot(*id).map(|s| s.connected).unwrap_or(false))
    }

    pub fn any_connected(&self) -> bool {
        PlayerId::ALL
            .iter()
            .any(|id| self.slot(*id).map(|s| s.connected).unwrap_or(false))
    }

    /// Connection handles of every connected seat
    pub fn connected_peers(&self) -> Vec<(PlayerId, ConnId)> {
        PlayerId::ALL
            .iter()
            .filter_map(|id| {
                let slot = self.slot(*id)?;
                slot.conn_id.filter(|_| slot.connected).map(|conn| (*id, conn))
            })
            .collect()
    }

    pub fn roster(&self) -> Vec<RoomPlayerInfo> {
        PlayerId::ALL
            .iter()
            .filter_map(|id| self.slot(*id))
            .map(|slot| RoomPlayerInfo {
                player_id: slot.player_id,
                nickname: slot.nickname.clone(),
                connected: slot.connected,
            })
            .collect()
    }

    fn touch(&mut self, now_ms: u64) {
        self.updated_at_ms = now_ms;
    }
}

/// Which seat of which room a connection holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub room_code: String,
    pub player_id: PlayerId,
}

/// Result of taking a seat: everything the client needs to come back later
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub room_code: String,
    pub player_id: PlayerId,
    pub token: String,
}

/// Room manager errors
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Game code not found.")]
    NotFound,

    #[error("This game is already full.")]
    Full,

    #[error("This game cannot be joined right now.")]
    InvalidState,

    #[error("You are already in an active room.")]
    AlreadyInRoom,

    #[error("Unable to reconnect to this match.")]
    ReconnectFailed,

    #[error(transparent)]
    CodeSpaceExhausted(#[from] RoomCodeExhausted),
}

impl RoomError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RoomError::NotFound => ErrorCode::RoomNotFound,
            RoomError::Full => ErrorCode::RoomFull,
            RoomError::InvalidState | RoomError::CodeSpaceExhausted(_) => ErrorCode::InvalidState,
            RoomError::AlreadyInRoom => ErrorCode::AlreadyInRoom,
            RoomError::ReconnectFailed => ErrorCode::ReconnectFailed,
        }
    }

    /// Message shown to the client; internal failures stay vague
    pub fn client_message(&self) -> String {
        match self {
            RoomError::CodeSpaceExhausted(_) => "Unexpected server error.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Trim and cap a nickname; blank means none
pub fn sanitize_nickname(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_NICKNAME_CHARS).collect())
}

/// Registry of rooms and connection memberships
pub struct RoomManager {
    rooms: HashMap<String, Room>,
    memberships: HashMap<ConnId, Membership>,
    rng: ChaCha8Rng,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::with_rng(ChaCha8Rng::from_entropy())
    }

    /// Deterministic room codes, for tests
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(rng: ChaCha8Rng) -> Self {
        Self {
            rooms: HashMap::new(),
            memberships: HashMap::new(),
            rng,
        }
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Look up a room; codes are case-insensitive
    pub fn get(&self, code: &str) -> Option<&Room> {
        self.rooms.get(&code.to_ascii_uppercase())
    }

    pub fn membership(&self, conn_id: ConnId) -> Option<&Membership> {
        self.memberships.get(&conn_id)
    }

    pub fn create_room(
        &mut self,
        conn_id: ConnId,
        nickname: Option<&str>,
        now_ms: u64,
    ) -> Result<Seat, RoomError> {
        self.ensure_available(conn_id)?;

        let rooms = &self.rooms;
        let code = generate_room_code(&mut self.rng, |c| rooms.contains_key(c))?;
        let slot = PlayerSlot::new(PlayerId::P1, conn_id, sanitize_nickname(nickname));
        let seat = Seat {
            room_code: code.clone(),
            player_id: PlayerId::P1,
            token: slot.token.clone(),
        };

        self.rooms.insert(
            code.clone(),
            Room {
                code: code.clone(),
                status: RoomStatus::Waiting,
                created_at_ms: now_ms,
                updated_at_ms: now_ms,
                players: PlayerPair::new(Some(slot), None),
                rematch_votes: HashSet::new(),
            },
        );
        self.memberships.insert(
            conn_id,
            Membership {
                room_code: code,
                player_id: PlayerId::P1,
            },
        );

        Ok(seat)
    }

    pub fn join_room(
        &mut self,
        conn_id: ConnId,
        code: &str,
        nickname: Option<&str>,
        now_ms: u64,
    ) -> Result<Seat, RoomError> {
        self.ensure_available(conn_id)?;

        let code = code.to_ascii_uppercase();
        let room = self.rooms.get_mut(&code).ok_or(RoomError::NotFound)?;

        if room.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState);
        }
        if room.players.p2.is_some() {
            return Err(RoomError::Full);
        }

        let slot = PlayerSlot::new(PlayerId::P2, conn_id, sanitize_nickname(nickname));
        let token = slot.token.clone();
        room.players.p2 = Some(slot);
        room.touch(now_ms);

        self.memberships.insert(
            conn_id,
            Membership {
                room_code: code.clone(),
                player_id: PlayerId::P2,
            },
        );

        Ok(Seat {
            room_code: code,
            player_id: PlayerId::P2,
            token,
        })
    }

    /// Rebind a disconnected seat to a new connection using its token
    pub fn reconnect_player(
        &mut self,
        conn_id: ConnId,
        code: &str,
        token: &str,
        now_ms: u64,
    ) -> Result<Seat, RoomError> {
        self.ensure_available(conn_id)?;

        let code = code.to_ascii_uppercase();
        let room = self.rooms.get_mut(&code).ok_or(RoomError::NotFound)?;

        let player_id = PlayerId::ALL
            .into_iter()
            .find(|id| room.slot(*id).map(|s| s.token == token).unwrap_or(false))
            .ok_or(RoomError::ReconnectFailed)?;
        let Some(slot) = room.players.get_mut(player_id).as_mut() else {
            return Err(RoomError::ReconnectFailed);
        };

        // One connection per seat
        if slot.connected {
            return Err(RoomError::ReconnectFailed);
        }

        slot.conn_id = Some(conn_id);
        slot.connected = true;
        let token = slot.token.clone();
        room.touch(now_ms);

        self.memberships.insert(
            conn_id,
            Membership {
                room_code: code.clone(),
                player_id,
            },
        );

        Ok(Seat {
            room_code: code,
            player_id,
            token,
        })
    }

    /// Drop a connection's membership and mark its seat disconnected
    pub fn disconnect_conn(&mut self, conn_id: ConnId, now_ms: u64) -> Option<Membership> {
        let membership = self.memberships.remove(&conn_id)?;
        let room = self.rooms.get_mut(&membership.room_code)?;
        let slot = room.players.get_mut(membership.player_id).as_mut()?;

        slot.conn_id = None;
        slot.connected = false;
        room.touch(now_ms);

        Some(membership)
    }

    /// Delete a room and release every connection bound to it
    pub fn remove_room(&mut self, code: &str) -> Option<Room> {
        let room = self.rooms.remove(code)?;

        for (_, slot) in room.players.iter() {
            if let Some(conn_id) = slot.as_ref().and_then(|s| s.conn_id) {
                self.memberships.remove(&conn_id);
            }
        }

        Some(room)
    }

    pub fn set_room_status(&mut self, code: &str, status: RoomStatus, now_ms: u64) {
        if let Some(room) = self.rooms.get_mut(code) {
            room.status = status;
            room.touch(now_ms);
        }
    }

    /// Record a vote; returns the number of distinct voters so far
    pub fn add_rematch_vote(&mut self, code: &str, player_id: PlayerId, now_ms: u64) -> Option<usize> {
        let room = self.rooms.get_mut(code)?;
        room.rematch_votes.insert(player_id);
        room.touch(now_ms);
        Some(room.rematch_votes.len())
    }

    pub fn clear_rematch_votes(&mut self, code: &str, now_ms: u64) {
        if let Some(room) = self.rooms.get_mut(code) {
            room.rematch_votes.clear();
            room.touch(now_ms);
        }
    }

    /// Store a sanitized frame as the seat's latest input
    pub fn set_player_input_by_conn(&mut self, conn_id: ConnId, frame: InputFrame, now_ms: u64) -> bool {
        let Some(membership) = self.memberships.get(&conn_id) else {
            return false;
        };
        let Some(room) = self.rooms.get_mut(&membership.room_code) else {
            return false;
        };
        let Some(slot) = room.players.get_mut(membership.player_id).as_mut() else {
            return false;
        };

        slot.last_input = frame;
        room.touch(now_ms);
        true
    }

    fn ensure_available(&self, conn_id: ConnId) -> Result<(), RoomError> {
        if self.memberships.contains_key(&conn_id) {
            return Err(RoomError::AlreadyInRoom);
        }
        Ok(())
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}
