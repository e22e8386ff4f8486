//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One of the two fixed roles in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerId {
    P1,
    P2,
}

impl PlayerId {
    pub const ALL: [PlayerId; 2] = [PlayerId::P1, PlayerId::P2];

    pub fn opponent(self) -> Self {
        match self {
            PlayerId::P1 => PlayerId::P2,
            PlayerId::P2 => PlayerId::P1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlayerId::P1 => "P1",
            PlayerId::P2 => "P2",
        }
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly one value per role, addressable by `PlayerId`.
///
/// Serialized as a `{"P1": .., "P2": ..}` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerPair<T> {
    #[serde(rename = "P1")]
    pub p1: T,
    #[serde(rename = "P2")]
    pub p2: T,
}

impl<T> PlayerPair<T> {
    pub fn new(p1: T, p2: T) -> Self {
        Self { p1, p2 }
    }

    pub fn from_fn(mut f: impl FnMut(PlayerId) -> T) -> Self {
        Self {
            p1: f(PlayerId::P1),
            p2: f(PlayerId::P2),
        }
    }

    pub fn get(&self, id: PlayerId) -> &T {
        match id {
            PlayerId::P1 => &self.p1,
            PlayerId::P2 => &self.p2,
        }
    }

    pub fn get_mut(&mut self, id: PlayerId) -> &mut T {
        match id {
            PlayerId::P1 => &mut self.p1,
            PlayerId::P2 => &mut self.p2,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlayerId, &T)> {
        [(PlayerId::P1, &self.p1), (PlayerId::P2, &self.p2)].into_iter()
    }
}

/// Room / match lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Live,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Latest control state of one player. Only the newest frame is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFrame {
    /// Advisory sequence number, echoed back as the input ack
    pub seq: u64,
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub fire: bool,
    pub client_time_ms: i64,
}

/// One helicopter in a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleState {
    pub owner_id: PlayerId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub lives: u32,
    /// +1 facing right, -1 facing left
    pub facing: i8,
    pub invulnerable_until_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileState {
    pub id: String,
    pub owner: PlayerId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub expires_at_ms: u64,
}

/// Complete match snapshot exchanged over the wire.
///
/// Every copy handed out is an owned value; nothing is shared with the
/// authoritative state it was taken from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    pub room_code: String,
    pub status: RoomStatus,
    /// Milliseconds on the server clock (fractional once interpolated)
    pub server_time_ms: f64,
    pub vehicles: PlayerPair<VehicleState>,
    pub projectiles: Vec<ProjectileState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
}

/// Roster entry for `room:joined`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPlayerInfo {
    pub player_id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub connected: bool,
}

/// Error codes reported through `room:error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RoomNotFound,
    RoomFull,
    InvalidState,
    AlreadyInRoom,
    ReconnectFailed,
    BadRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseReason {
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// Opponent ran out of lives
    Lives,
    /// Opponent did not reconnect in time
    Forfeit,
}

/// In-match events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MatchEvent {
    Hit {
        by: PlayerId,
        target: PlayerId,
        #[serde(rename = "livesLeft")]
        lives_left: u32,
    },

    Respawn {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
    },

    Pause {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        reason: PauseReason,
    },

    Resume {
        #[serde(rename = "countdownMs")]
        countdown_ms: u64,
    },
}

// ============================================================================
// Server -> client
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreatedPayload {
    pub room_code: String,
    pub player_id: PlayerId,
    pub player_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinedPayload {
    pub room_code: String,
    pub player_id: PlayerId,
    pub players: Vec<RoomPlayerInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStartPayload {
    pub initial_state: MatchState,
    pub countdown_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshotPayload {
    pub state: MatchState,
    /// Seq of the last input frame stored for each occupied slot
    pub ack_seq_by_player: PlayerPair<Option<u64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEndPayload {
    pub winner: PlayerId,
    pub reason: EndReason,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMsg {
    #[serde(rename = "room:created")]
    RoomCreated(RoomCreatedPayload),

    #[serde(rename = "room:joined")]
    RoomJoined(RoomJoinedPayload),

    #[serde(rename = "room:error")]
    RoomError(RoomErrorPayload),

    #[serde(rename = "match:start")]
    MatchStart(MatchStartPayload),

    #[serde(rename = "match:snapshot")]
    MatchSnapshot(MatchSnapshotPayload),

    #[serde(rename = "match:event")]
    MatchEvent(MatchEvent),

    #[serde(rename = "match:end")]
    MatchEnd(MatchEndPayload),
}

impl ServerMsg {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMsg::RoomError(RoomErrorPayload {
            code,
            message: message.into(),
        })
    }

    /// Wire event name, for logging
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMsg::RoomCreated(_) => "room:created",
            ServerMsg::RoomJoined(_) => "room:joined",
            ServerMsg::RoomError(_) => "room:error",
            ServerMsg::MatchStart(_) => "match:start",
            ServerMsg::MatchSnapshot(_) => "match:snapshot",
            ServerMsg::MatchEvent(_) => "match:event",
            ServerMsg::MatchEnd(_) => "match:end",
        }
    }
}

// ============================================================================
// Client -> server
// ============================================================================

/// Messages sent from client to server.
///
/// Serialization is used by the client side; the server parses frames with
/// [`ClientMsg::parse`], which sanitizes input frames on the way in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMsg {
    #[serde(rename = "room:create")]
    RoomCreate(RoomCreatePayload),

    #[serde(rename = "room:join")]
    RoomJoin(RoomJoinPayload),

    #[serde(rename = "input:frame")]
    InputFrame(InputFrame),

    #[serde(rename = "match:rematch_request")]
    RematchRequest,

    #[serde(rename = "player:reconnect")]
    PlayerReconnect(PlayerReconnectPayload),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoomCreatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinPayload {
    pub room_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerReconnectPayload {
    pub room_code: String,
    pub player_token: String,
}

/// Frame envelope: `{"event": "...", "data": {...}}`
#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Untrusted `input:frame` payload; every field may hold any JSON value
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInputFrame {
    #[serde(default)]
    pub seq: Value,
    #[serde(default)]
    pub up: Value,
    #[serde(default)]
    pub down: Value,
    #[serde(default)]
    pub left: Value,
    #[serde(default)]
    pub right: Value,
    #[serde(default)]
    pub fire: Value,
    #[serde(default)]
    pub client_time_ms: Value,
}

impl RawInputFrame {
    /// Coerce into a trusted frame. Non-finite or missing client time is
    /// replaced by the server receipt time.
    pub fn sanitize(&self, received_at_ms: i64) -> InputFrame {
        let seq = finite_number(&self.seq)
            .map(|n| n.trunc().max(0.0) as u64)
            .unwrap_or(0);
        let client_time_ms = finite_number(&self.client_time_ms)
            .map(|n| n.trunc() as i64)
            .unwrap_or(received_at_ms);

        InputFrame {
            seq,
            up: truthy(&self.up),
            down: truthy(&self.down),
            left: truthy(&self.left),
            right: truthy(&self.right),
            fire: truthy(&self.fire),
            client_time_ms,
        }
    }
}

fn finite_number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|n| n.is_finite())
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Frame parsing errors. All of them are answered with BAD_REQUEST.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("invalid payload for {event}: {source}")]
    InvalidPayload {
        event: &'static str,
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Message shown to the client
    pub fn client_message(&self) -> &'static str {
        match self {
            ProtocolError::InvalidPayload { event: "room:join", .. } => {
                "A valid room code is required."
            }
            ProtocolError::InvalidPayload {
                event: "player:reconnect",
                ..
            } => "Valid reconnect credentials are required.",
            _ => "Malformed request.",
        }
    }
}

impl ClientMsg {
    /// Parse one text frame. `received_at_ms` backs missing client timestamps.
    pub fn parse(text: &str, received_at_ms: i64) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let data = match envelope.data {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        match envelope.event.as_str() {
            "room:create" => Ok(ClientMsg::RoomCreate(payload("room:create", data)?)),
            "room:join" => Ok(ClientMsg::RoomJoin(payload("room:join", data)?)),
            "input:frame" => {
                let raw: RawInputFrame = payload("input:frame", data)?;
                Ok(ClientMsg::InputFrame(raw.sanitize(received_at_ms)))
            }
            "match:rematch_request" => Ok(ClientMsg::RematchRequest),
            "player:reconnect" => Ok(ClientMsg::PlayerReconnect(payload(
                "player:reconnect",
                data,
            )?)),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(
    event: &'static str,
    data: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload { event, source })
}
