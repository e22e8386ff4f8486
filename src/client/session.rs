//! Client-side match session: credentials, roster, buffered render state

use crate::util::time::INPUT_SEND_RATE;
use crate::ws::protocol::{
    ClientMsg, InputFrame, MatchEndPayload, MatchEvent, MatchState, PlayerId, PlayerReconnectPayload,
    RoomErrorPayload, RoomPlayerInfo, RoomStatus, ServerMsg,
};

use super::snapshot_buffer::{SnapshotBuffer, RENDER_DELAY_MS};

/// Control keys held down this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Controls {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub fire: bool,
}

/// Everything a client tracks about its room and match.
///
/// Times passed in are the client's local monotonic clock in milliseconds.
#[derive(Debug, Default)]
pub struct ClientSession {
    room_code: Option<String>,
    player_id: Option<PlayerId>,
    player_token: Option<String>,
    players: Vec<RoomPlayerInfo>,
    buffer: SnapshotBuffer,
    live: bool,
    countdown_end_at_ms: Option<f64>,
    result: Option<MatchEndPayload>,
    last_error: Option<RoomErrorPayload>,
    input_seq: u64,
    last_input_sent_at_ms: Option<f64>,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room_code.as_deref()
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn players(&self) -> &[RoomPlayerInfo] {
        &self.players
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn result(&self) -> Option<MatchEndPayload> {
        self.result
    }

    pub fn last_error(&self) -> Option<&RoomErrorPayload> {
        self.last_error.as_ref()
    }

    /// Apply one server message received at `now_ms`
    pub fn apply(&mut self, msg: &ServerMsg, now_ms: f64) {
        match msg {
            ServerMsg::RoomCreated(p) => {
                self.room_code = Some(p.room_code.clone());
                self.player_id = Some(p.player_id);
                self.player_token = Some(p.player_token.clone());
            }
            ServerMsg::RoomJoined(p) => {
                self.room_code = Some(p.room_code.clone());
                self.player_id = Some(p.player_id);
                self.players = p.players.clone();
            }
            ServerMsg::RoomError(p) => {
                self.last_error = Some(p.clone());
            }
            ServerMsg::MatchStart(p) => {
                self.buffer.reset();
                self.buffer.push(&p.initial_state, now_ms);
                self.live = true;
                self.result = None;
                self.countdown_end_at_ms = Some(now_ms + p.countdown_ms as f64);
            }
            ServerMsg::MatchSnapshot(p) => {
                self.buffer.push(&p.state, now_ms);
            }
            ServerMsg::MatchEvent(MatchEvent::Pause { .. }) => {
                self.live = false;
            }
            ServerMsg::MatchEvent(MatchEvent::Resume { countdown_ms }) => {
                self.live = true;
                self.countdown_end_at_ms = Some(now_ms + *countdown_ms as f64);
            }
            ServerMsg::MatchEvent(_) => {}
            ServerMsg::MatchEnd(p) => {
                self.live = false;
                self.result = Some(*p);
            }
        }
    }

    /// `player:reconnect` for the stored credentials, if any
    pub fn reconnect_request(&self) -> Option<ClientMsg> {
        Some(ClientMsg::PlayerReconnect(PlayerReconnectPayload {
            room_code: self.room_code.clone()?,
            player_token: self.player_token.clone()?,
        }))
    }

    /// Time left on the announced countdown
    pub fn countdown_remaining_ms(&self, now_ms: f64) -> Option<f64> {
        self.countdown_end_at_ms
            .map(|end| end - now_ms)
            .filter(|remaining| *remaining > 0.0)
    }

    /// State to draw now: delayed for interpolation, else the newest
    pub fn render_state(&self, now_ms: f64) -> Option<MatchState> {
        self.buffer
            .sample(now_ms - RENDER_DELAY_MS)
            .or_else(|| self.buffer.latest())
    }

    /// Next input frame to send, rate limited and only during live play
    pub fn next_input(&mut self, controls: Controls, now_ms: f64, client_time_ms: i64) -> Option<ClientMsg> {
        if !self.live {
            return None;
        }
        let rendered_live = self
            .render_state(now_ms)
            .map(|s| s.status == RoomStatus::Live)
            .unwrap_or(false);
        if !rendered_live {
            return None;
        }

        let min_gap_ms = 1000.0 / INPUT_SEND_RATE as f64;
        if let Some(last) = self.last_input_sent_at_ms {
            if now_ms - last < min_gap_ms {
                return None;
            }
        }
        self.last_input_sent_at_ms = Some(now_ms);

        let frame = InputFrame {
            seq: self.input_seq,
            up: controls.up,
            down: controls.down,
            left: controls.left,
            right: controls.right,
            fire: controls.fire,
            client_time_ms,
        };
        self.input_seq += 1;

        Some(ClientMsg::InputFrame(frame))
    }
}
