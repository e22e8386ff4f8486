//! Match loop: room lifecycle, tick and snapshot scheduling
//!
//! One task owns every room, match runtime and reconnect timer. Client
//! messages, disconnects and timer firings all arrive as [`LoopEvent`]s on a
//! single channel, so game state needs no locks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::MatchTimings;
use crate::game::Simulation;
use crate::rooms::{RoomError, RoomManager, Seat};
use crate::util::time::{snapshot_interval, tick_delta_ms, tick_interval, ServerClock};
use crate::ws::hub::{ConnId, ConnectionHub};
use crate::ws::protocol::{
    ClientMsg, EndReason, ErrorCode, MatchEndPayload, MatchEvent, MatchSnapshotPayload,
    MatchStartPayload, PauseReason, PlayerId, PlayerPair, RoomCreatedPayload, RoomJoinedPayload,
    RoomStatus, ServerMsg,
};

use super::reconnect::ReconnectTimers;
use super::timers::{spawn_repeating, TaskGuard};

/// Match loop inbox depth
pub const EVENT_QUEUE_DEPTH: usize = 1024;

/// Everything the match loop reacts to
#[derive(Debug)]
pub enum LoopEvent {
    Client { conn_id: ConnId, msg: ClientMsg },
    Disconnected { conn_id: ConnId },
    Tick { room_code: String, epoch: u64 },
    Snapshot { room_code: String, epoch: u64 },
    ReconnectExpired {
        room_code: String,
        player_id: PlayerId,
        token: u64,
    },
}

/// Counters published by the match loop for health reporting
#[derive(Debug, Default)]
pub struct LoopStats {
    rooms: AtomicUsize,
    live_matches: AtomicUsize,
}

impl LoopStats {
    pub fn rooms(&self) -> usize {
        self.rooms.load(Ordering::Relaxed)
    }

    /// Matches with a running runtime, paused ones included
    pub fn live_matches(&self) -> usize {
        self.live_matches.load(Ordering::Relaxed)
    }
}

/// A match in progress. Dropping it stops both periodic timers.
struct RoomRuntime {
    simulation: Simulation,
    epoch: u64,
    countdown_until_ms: u64,
    paused_by: Option<PlayerId>,
    _tick: TaskGuard,
    _snapshot: TaskGuard,
}

pub struct MatchOrchestrator {
    rooms: RoomManager,
    runtimes: HashMap<String, RoomRuntime>,
    reconnects: ReconnectTimers<LoopEvent>,
    hub: ConnectionHub,
    clock: ServerClock,
    timings: MatchTimings,
    stats: Arc<LoopStats>,
    tx: mpsc::Sender<LoopEvent>,
    next_epoch: u64,
}

impl MatchOrchestrator {
    pub fn new(
        rooms: RoomManager,
        hub: ConnectionHub,
        timings: MatchTimings,
        stats: Arc<LoopStats>,
    ) -> (Self, mpsc::Receiver<LoopEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

        let orchestrator = Self {
            rooms,
            runtimes: HashMap::new(),
            reconnects: ReconnectTimers::new(tx.clone()),
            hub,
            clock: ServerClock::new(),
            timings,
            stats,
            tx,
            next_epoch: 0,
        };

        (orchestrator, rx)
    }

    /// Handle for connection tasks to post events
    pub fn sender(&self) -> mpsc::Sender<LoopEvent> {
        self.tx.clone()
    }

    /// Main loop. Also runs the idle-room sweep.
    pub async fn run(mut self, mut rx: mpsc::Receiver<LoopEvent>) {
        let period = self.timings.sweep_interval;
        let mut sweep = interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Match loop started");

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                _ = sweep.tick() => {
                    self.sweep_idle_rooms();
                    self.publish_stats();
                }
            }
        }

        info!("Match loop stopped");
    }

    pub fn handle(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Client { conn_id, msg } => self.handle_client(conn_id, msg),
            LoopEvent::Disconnected { conn_id } => self.handle_disconnect(conn_id),
            LoopEvent::Tick { room_code, epoch } => {
                if self.is_current(&room_code, epoch) {
                    self.tick_room(&room_code);
                }
            }
            LoopEvent::Snapshot { room_code, epoch } => {
                if self.is_current(&room_code, epoch) {
                    self.broadcast_snapshot(&room_code);
                }
            }
            LoopEvent::ReconnectExpired {
                room_code,
                player_id,
                token,
            } => {
                if self.reconnects.take_expired(&room_code, player_id, token) {
                    self.forfeit(&room_code, player_id);
                }
            }
        }

        self.publish_stats();
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    /// Countdown deadline of the running match, on the server clock
    pub fn countdown_until_ms(&self, room_code: &str) -> Option<u64> {
        self.runtimes.get(room_code).map(|r| r.countdown_until_ms)
    }

    /// Player whose disconnect paused the running match
    pub fn paused_by(&self, room_code: &str) -> Option<PlayerId> {
        self.runtimes.get(room_code).and_then(|r| r.paused_by)
    }

    pub fn has_runtime(&self, room_code: &str) -> bool {
        self.runtimes.contains_key(room_code)
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // ------------------------------------------------------------------
    // Client requests
    // ------------------------------------------------------------------

    fn handle_client(&mut self, conn_id: ConnId, msg: ClientMsg) {
        match msg {
            ClientMsg::RoomCreate(payload) => self.on_create(conn_id, payload.nickname.as_deref()),
            ClientMsg::RoomJoin(payload) => {
                self.on_join(conn_id, &payload.room_code, payload.nickname.as_deref())
            }
            ClientMsg::InputFrame(frame) => {
                let now = self.clock.now_ms();
                if !self.rooms.set_player_input_by_conn(conn_id, frame, now) {
                    debug!(conn_id = %conn_id, "Input from connection without a room");
                }
            }
            ClientMsg::RematchRequest => self.on_rematch(conn_id),
            ClientMsg::PlayerReconnect(payload) => {
                self.on_reconnect(conn_id, &payload.room_code, &payload.player_token)
            }
        }
    }

    fn on_create(&mut self, conn_id: ConnId, nickname: Option<&str>) {
        let now = self.clock.now_ms();

        match self.rooms.create_room(conn_id, nickname, now) {
            Ok(seat) => {
                info!(conn_id = %conn_id, room_code = %seat.room_code, "Room created");
                self.announce_seat(conn_id, &seat);
            }
            Err(err) => self.reject(conn_id, err),
        }
    }

    fn on_join(&mut self, conn_id: ConnId, room_code: &str, nickname: Option<&str>) {
        let now = self.clock.now_ms();

        match self.rooms.join_room(conn_id, room_code, nickname, now) {
            Ok(seat) => {
                info!(conn_id = %conn_id, room_code = %seat.room_code, player_id = %seat.player_id, "Player joined room");
                self.announce_seat(conn_id, &seat);

                if self.ready_to_start(&seat.room_code) {
                    self.start_match(&seat.room_code);
                }
            }
            Err(err) => self.reject(conn_id, err),
        }
    }

    fn on_reconnect(&mut self, conn_id: ConnId, room_code: &str, token: &str) {
        let now = self.clock.now_ms();

        let seat = match self.rooms.reconnect_player(conn_id, room_code, token, now) {
            Ok(seat) => seat,
            Err(err) => return self.reject(conn_id, err),
        };

        info!(conn_id = %conn_id, room_code = %seat.room_code, player_id = %seat.player_id, "Player reconnected");
        self.announce_seat(conn_id, &seat);

        if let Some(runtime) = self.runtimes.get(&seat.room_code) {
            self.hub.send(
                conn_id,
                ServerMsg::MatchStart(MatchStartPayload {
                    initial_state: runtime.simulation.state(),
                    countdown_ms: 0,
                }),
            );
        }

        let resume = self
            .rooms
            .get(&seat.room_code)
            .map(|room| room.status == RoomStatus::Paused && room.both_players_connected())
            .unwrap_or(false);

        if resume {
            self.resume_match(&seat.room_code);
        }
    }

    fn on_rematch(&mut self, conn_id: ConnId) {
        let Some(membership) = self.rooms.membership(conn_id).cloned() else {
            return;
        };
        let code = membership.room_code;

        let ended = self
            .rooms
            .get(&code)
            .map(|room| room.status == RoomStatus::Ended)
            .unwrap_or(false);
        if !ended {
            debug!(room_code = %code, "Rematch request outside ended state");
            return;
        }

        let now = self.clock.now_ms();
        let votes = self
            .rooms
            .add_rematch_vote(&code, membership.player_id, now)
            .unwrap_or(0);
        info!(room_code = %code, player_id = %membership.player_id, votes, "Rematch vote");

        if votes == PlayerId::ALL.len() && self.ready_to_start(&code) {
            self.start_match(&code);
        }
    }

    fn handle_disconnect(&mut self, conn_id: ConnId) {
        let now = self.clock.now_ms();
        let Some(membership) = self.rooms.disconnect_conn(conn_id, now) else {
            return;
        };
        let code = membership.room_code;

        info!(conn_id = %conn_id, room_code = %code, player_id = %membership.player_id, "Player disconnected");
        self.broadcast_roster(&code);

        let Some(room) = self.rooms.get(&code) else {
            return;
        };
        let status = room.status;
        let anyone_left = room.any_connected();

        match status {
            RoomStatus::Live => self.pause_match(&code, membership.player_id),
            RoomStatus::Waiting if !anyone_left => self.remove_room(&code),
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle transitions
    // ------------------------------------------------------------------

    fn start_match(&mut self, room_code: &str) {
        self.stop_runtime(room_code);

        let now = self.clock.now_ms();
        self.rooms.set_room_status(room_code, RoomStatus::Live, now);
        self.rooms.clear_rematch_votes(room_code, now);

        self.next_epoch += 1;
        let epoch = self.next_epoch;

        let simulation = Simulation::new(room_code, now);
        let initial_state = simulation.state();

        let tick_code = room_code.to_string();
        let tick = spawn_repeating(tick_interval(), self.tx.clone(), move || LoopEvent::Tick {
            room_code: tick_code.clone(),
            epoch,
        });
        let snapshot_code = room_code.to_string();
        let snapshot = spawn_repeating(snapshot_interval(), self.tx.clone(), move || {
            LoopEvent::Snapshot {
                room_code: snapshot_code.clone(),
                epoch,
            }
        });

        self.runtimes.insert(
            room_code.to_string(),
            RoomRuntime {
                simulation,
                epoch,
                countdown_until_ms: now + self.timings.countdown_ms,
                paused_by: None,
                _tick: tick,
                _snapshot: snapshot,
            },
        );

        info!(room_code = %room_code, epoch, "Match started");
        self.broadcast(
            room_code,
            ServerMsg::MatchStart(MatchStartPayload {
                initial_state,
                countdown_ms: self.timings.countdown_ms,
            }),
        );
    }

    fn tick_room(&mut self, room_code: &str) {
        let Some(room) = self.rooms.get(room_code) else {
            return;
        };
        if room.status != RoomStatus::Live {
            return;
        }
        let Some(runtime) = self.runtimes.get_mut(room_code) else {
            return;
        };

        for (player_id, slot) in room.players.iter() {
            if let Some(slot) = slot.as_ref().filter(|s| s.connected) {
                runtime.simulation.set_input(player_id, slot.last_input);
            }
        }

        let result = runtime.simulation.step(self.clock.now_ms(), tick_delta_ms());

        for event in result.events {
            self.broadcast(room_code, ServerMsg::MatchEvent(event));
        }

        if let Some(ended) = result.ended {
            self.end_match(room_code, ended.winner, ended.reason);
        }
    }

    fn broadcast_snapshot(&self, room_code: &str) {
        let (Some(room), Some(runtime)) = (self.rooms.get(room_code), self.runtimes.get(room_code))
        else {
            return;
        };

        let mut state = runtime.simulation.state();
        state.status = room.status;
        let ack_seq_by_player = PlayerPair::from_fn(|id| room.slot(id).map(|s| s.last_input.seq));

        self.broadcast(
            room_code,
            ServerMsg::MatchSnapshot(MatchSnapshotPayload {
                state,
                ack_seq_by_player,
            }),
        );
    }

    fn pause_match(&mut self, room_code: &str, player_id: PlayerId) {
        let live = self
            .rooms
            .get(room_code)
            .map(|room| room.status == RoomStatus::Live)
            .unwrap_or(false);
        let Some(runtime) = self.runtimes.get_mut(room_code).filter(|_| live) else {
            return;
        };

        runtime.simulation.set_status(RoomStatus::Paused);
        runtime.paused_by = Some(player_id);

        let now = self.clock.now_ms();
        self.rooms.set_room_status(room_code, RoomStatus::Paused, now);

        info!(room_code = %room_code, player_id = %player_id, "Match paused");
        self.broadcast(
            room_code,
            ServerMsg::MatchEvent(MatchEvent::Pause {
                player_id,
                reason: PauseReason::Disconnect,
            }),
        );

        let expired_code = room_code.to_string();
        self.reconnects.start(
            room_code,
            player_id,
            Duration::from_millis(self.timings.reconnect_window_ms),
            move |token| LoopEvent::ReconnectExpired {
                room_code: expired_code,
                player_id,
                token,
            },
        );
    }

    fn resume_match(&mut self, room_code: &str) {
        let paused = self
            .rooms
            .get(room_code)
            .map(|room| room.status == RoomStatus::Paused)
            .unwrap_or(false);
        let Some(runtime) = self.runtimes.get_mut(room_code).filter(|_| paused) else {
            return;
        };

        if let Some(player_id) = runtime.paused_by.take() {
            self.reconnects.cancel(room_code, player_id);
        }

        let now = self.clock.now_ms();
        runtime.simulation.set_status(RoomStatus::Live);
        runtime.countdown_until_ms = now + self.timings.countdown_ms;
        self.rooms.set_room_status(room_code, RoomStatus::Live, now);

        info!(room_code = %room_code, "Match resumed");
        self.broadcast(
            room_code,
            ServerMsg::MatchEvent(MatchEvent::Resume {
                countdown_ms: self.timings.countdown_ms,
            }),
        );
    }

    fn forfeit(&mut self, room_code: &str, absent: PlayerId) {
        if self.rooms.get(room_code).is_none() {
            return;
        }

        info!(room_code = %room_code, player_id = %absent, "Reconnect window expired");
        self.end_match(room_code, absent.opponent(), EndReason::Forfeit);
    }

    fn end_match(&mut self, room_code: &str, winner: PlayerId, reason: EndReason) {
        if let Some(runtime) = self.runtimes.get_mut(room_code) {
            runtime.simulation.force_end(winner);
        }

        let now = self.clock.now_ms();
        self.rooms.set_room_status(room_code, RoomStatus::Ended, now);
        self.rooms.clear_rematch_votes(room_code, now);

        self.broadcast_snapshot(room_code);
        self.broadcast(
            room_code,
            ServerMsg::MatchEnd(MatchEndPayload { winner, reason }),
        );

        info!(room_code = %room_code, winner = %winner, reason = ?reason, "Match ended");
        self.stop_runtime(room_code);
    }

    /// Drop the runtime (aborting its timers) and any reconnect timers
    fn stop_runtime(&mut self, room_code: &str) {
        self.runtimes.remove(room_code);
        self.reconnects.cancel_room(room_code);
    }

    fn remove_room(&mut self, room_code: &str) {
        let Some(room) = self.rooms.get(room_code) else {
            return;
        };
        let peers = room.connected_peers();

        self.stop_runtime(room_code);

        for (_, conn_id) in peers {
            self.hub.send(
                conn_id,
                ServerMsg::error(ErrorCode::InvalidState, "This room has been closed."),
            );
        }

        self.rooms.remove_room(room_code);
        info!(room_code = %room_code, "Room removed");
    }

    /// Close waiting rooms and ended rooms that sat untouched too long
    pub fn sweep_idle_rooms(&mut self) {
        let now = self.clock.now_ms();
        let timings = &self.timings;

        let stale: Vec<String> = self
            .rooms
            .rooms()
            .filter(|room| {
                let idle_ms = now.saturating_sub(room.updated_at_ms);
                match room.status {
                    RoomStatus::Waiting => idle_ms > timings.room_idle_ttl_ms,
                    RoomStatus::Ended => idle_ms > timings.room_ended_ttl_ms,
                    RoomStatus::Live | RoomStatus::Paused => false,
                }
            })
            .map(|room| room.code.clone())
            .collect();

        for code in stale {
            self.remove_room(&code);
        }
    }

    // ------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------

    /// `room:created` to the seat holder, then the roster to everyone
    fn announce_seat(&self, conn_id: ConnId, seat: &Seat) {
        self.hub.send(
            conn_id,
            ServerMsg::RoomCreated(RoomCreatedPayload {
                room_code: seat.room_code.clone(),
                player_id: seat.player_id,
                player_token: seat.token.clone(),
            }),
        );
        self.broadcast_roster(&seat.room_code);
    }

    fn broadcast_roster(&self, room_code: &str) {
        let Some(room) = self.rooms.get(room_code) else {
            return;
        };
        let players = room.roster();

        for (player_id, conn_id) in room.connected_peers() {
            self.hub.send(
                conn_id,
                ServerMsg::RoomJoined(RoomJoinedPayload {
                    room_code: room.code.clone(),
                    player_id,
                    players: players.clone(),
                }),
            );
        }
    }

    fn broadcast(&self, room_code: &str, msg: ServerMsg) {
        let Some(room) = self.rooms.get(room_code) else {
            return;
        };

        for (_, conn_id) in room.connected_peers() {
            self.hub.send(conn_id, msg.clone());
        }
    }

    fn reject(&self, conn_id: ConnId, err: RoomError) {
        match &err {
            RoomError::CodeSpaceExhausted(inner) => {
                error!(conn_id = %conn_id, error = %inner, "Room code space exhausted");
            }
            other => debug!(conn_id = %conn_id, error = %other, "Room request rejected"),
        }

        self.hub
            .send(conn_id, ServerMsg::error(err.code(), err.client_message()));
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn ready_to_start(&self, room_code: &str) -> bool {
        self.rooms
            .get(room_code)
            .map(|room| room.is_full() && room.both_players_connected())
            .unwrap_or(false)
    }

    /// Timer messages from a superseded runtime are ignored
    fn is_current(&self, room_code: &str, epoch: u64) -> bool {
        self.runtimes
            .get(room_code)
            .map(|runtime| runtime.epoch == epoch)
            .unwrap_or(false)
    }

    fn publish_stats(&self) {
        self.stats
            .rooms
            .store(self.rooms.room_count(), Ordering::Relaxed);
        self.stats
            .live_matches
            .store(self.runtimes.len(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{
        InputFrame, PlayerReconnectPayload, RoomCreatePayload, RoomJoinPayload,
    };
    use uuid::Uuid;

    struct Harness {
        orchestrator: MatchOrchestrator,
        inbox: mpsc::Receiver<LoopEvent>,
        hub: ConnectionHub,
        stats: Arc<LoopStats>,
    }

    struct Peer {
        conn_id: ConnId,
        rx: mpsc::Receiver<ServerMsg>,
    }

    impl Peer {
        fn drain(&mut self) -> Vec<ServerMsg> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn names(msgs: &[ServerMsg]) -> Vec<&'static str> {
        msgs.iter().map(|m| m.event_name()).collect()
    }

    impl Harness {
        fn new() -> Self {
            let hub = ConnectionHub::new();
            let stats = Arc::new(LoopStats::default());
            let (orchestrator, inbox) = MatchOrchestrator::new(
                RoomManager::with_seed(11),
                hub.clone(),
                MatchTimings::default(),
                stats.clone(),
            );

            Self {
                orchestrator,
                inbox,
                hub,
                stats,
            }
        }

        fn connect(&self) -> Peer {
            let conn_id = Uuid::new_v4();
            Peer {
                conn_id,
                rx: self.hub.register(conn_id),
            }
        }

        fn send(&mut self, peer: &Peer, msg: ClientMsg) {
            self.orchestrator.handle(LoopEvent::Client {
                conn_id: peer.conn_id,
                msg,
            });
        }

        fn disconnect(&mut self, peer: &Peer) {
            self.hub.unregister(peer.conn_id);
            self.orchestrator.handle(LoopEvent::Disconnected {
                conn_id: peer.conn_id,
            });
        }

        /// Move the clock forward and feed every timer firing to the loop
        async fn advance(&mut self, ms: u64) {
            tokio::time::advance(Duration::from_millis(ms)).await;
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            while let Ok(event) = self.inbox.try_recv() {
                self.orchestrator.handle(event);
            }
        }

        fn status(&self, code: &str) -> Option<RoomStatus> {
            self.orchestrator.rooms().get(code).map(|r| r.status)
        }

        /// Create a room with `a`, join with `b`; returns (code, b's token)
        fn start_duel(&mut self, a: &mut Peer, b: &mut Peer) -> (String, String) {
            self.send(a, ClientMsg::RoomCreate(RoomCreatePayload::default()));
            let code = match a.drain().first() {
                Some(ServerMsg::RoomCreated(p)) => p.room_code.clone(),
                other => panic!("expected room:created, got {:?}", other),
            };

            self.send(
                b,
                ClientMsg::RoomJoin(RoomJoinPayload {
                    room_code: code.clone(),
                    nickname: Some("Bravo".to_string()),
                }),
            );
            let token = match b.drain().first() {
                Some(ServerMsg::RoomCreated(p)) => p.player_token.clone(),
                other => panic!("expected room:created, got {:?}", other),
            };
            a.drain();

            (code, token)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_then_join_starts_match() {
        let mut h = Harness::new();
        let (mut a, mut b) = (h.connect(), h.connect());

        h.send(&a, ClientMsg::RoomCreate(RoomCreatePayload { nickname: Some(" Alpha ".into()) }));
        let msgs = a.drain();
        assert_eq!(names(&msgs), vec!["room:created", "room:joined"]);
        let code = match &msgs[0] {
            ServerMsg::RoomCreated(p) => {
                assert_eq!(p.player_id, PlayerId::P1);
                p.room_code.clone()
            }
            _ => unreachable!(),
        };
        assert_eq!(h.status(&code), Some(RoomStatus::Waiting));

        h.send(
            &b,
            ClientMsg::RoomJoin(RoomJoinPayload {
                room_code: code.to_lowercase(),
                nickname: None,
            }),
        );

        let to_b = b.drain();
        assert_eq!(names(&to_b), vec!["room:created", "room:joined", "match:start"]);
        match &to_b[1] {
            ServerMsg::RoomJoined(p) => {
                assert_eq!(p.player_id, PlayerId::P2);
                assert_eq!(p.players.len(), 2);
                assert_eq!(p.players[0].nickname.as_deref(), Some("Alpha"));
            }
            _ => unreachable!(),
        }
        match &to_b[2] {
            ServerMsg::MatchStart(p) => {
                assert_eq!(p.countdown_ms, 3_000);
                assert_eq!(p.initial_state.status, RoomStatus::Live);
                assert_eq!(p.initial_state.room_code, code);
            }
            _ => unreachable!(),
        }
        assert_eq!(names(&a.drain()), vec!["room:joined", "match:start"]);

        assert_eq!(h.status(&code), Some(RoomStatus::Live));
        assert_eq!(
            h.orchestrator.countdown_until_ms(&code),
            Some(h.orchestrator.now_ms() + 3_000)
        );
        assert_eq!(h.stats.rooms(), 1);
        assert_eq!(h.stats.live_matches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_reach_only_the_sender() {
        let mut h = Harness::new();
        let (mut a, mut b, mut c) = (h.connect(), h.connect(), h.connect());
        let (code, _) = h.start_duel(&mut a, &mut b);
        b.drain();

        h.send(
            &c,
            ClientMsg::RoomJoin(RoomJoinPayload {
                room_code: "ZZZZZZ".into(),
                nickname: None,
            }),
        );
        h.send(
            &c,
            ClientMsg::RoomJoin(RoomJoinPayload {
                room_code: code,
                nickname: None,
            }),
        );

        let codes: Vec<ErrorCode> = c
            .drain()
            .into_iter()
            .map(|m| match m {
                ServerMsg::RoomError(p) => p.code,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(codes, vec![ErrorCode::RoomNotFound, ErrorCode::InvalidState]);
        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());

        h.send(&a, ClientMsg::RoomCreate(RoomCreatePayload::default()));
        match a.drain().as_slice() {
            [ServerMsg::RoomError(p)] => assert_eq!(p.code, ErrorCode::AlreadyInRoom),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_carry_acked_input() {
        let mut h = Harness::new();
        let (mut a, mut b) = (h.connect(), h.connect());
        let (_code, _) = h.start_duel(&mut a, &mut b);
        b.drain();

        h.send(
            &a,
            ClientMsg::InputFrame(InputFrame {
                seq: 5,
                right: true,
                ..InputFrame::default()
            }),
        );
        h.advance(40).await;
        h.advance(30).await;

        let snapshot = a
            .drain()
            .into_iter()
            .find_map(|m| match m {
                ServerMsg::MatchSnapshot(p) => Some(p),
                _ => None,
            })
            .expect("snapshot within one snapshot period");

        assert_eq!(snapshot.ack_seq_by_player, PlayerPair::new(Some(5), Some(0)));
        assert_eq!(snapshot.state.status, RoomStatus::Live);
        assert!(snapshot.state.vehicles.p1.velocity.x > 0.0);
        assert!(!names(&b.drain()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_pauses_and_reconnect_resumes() {
        let mut h = Harness::new();
        let (mut a, mut b) = (h.connect(), h.connect());
        let (code, token) = h.start_duel(&mut a, &mut b);
        b.drain();

        h.disconnect(&b);
        let to_a = a.drain();
        assert_eq!(names(&to_a), vec!["room:joined", "match:event"]);
        assert_eq!(
            to_a[1],
            ServerMsg::MatchEvent(MatchEvent::Pause {
                player_id: PlayerId::P2,
                reason: PauseReason::Disconnect,
            })
        );
        assert_eq!(h.status(&code), Some(RoomStatus::Paused));
        assert_eq!(h.orchestrator.paused_by(&code), Some(PlayerId::P2));

        h.advance(10_000).await;

        let mut back = h.connect();
        h.send(
            &back,
            ClientMsg::PlayerReconnect(PlayerReconnectPayload {
                room_code: code.clone(),
                player_token: token.clone(),
            }),
        );

        let to_back = back.drain();
        assert_eq!(
            names(&to_back),
            vec!["room:created", "room:joined", "match:start", "match:event"]
        );
        match &to_back[2] {
            ServerMsg::MatchStart(p) => assert_eq!(p.countdown_ms, 0),
            _ => unreachable!(),
        }
        assert!(a
            .drain()
            .contains(&ServerMsg::MatchEvent(MatchEvent::Resume { countdown_ms: 3_000 })));

        assert_eq!(h.status(&code), Some(RoomStatus::Live));
        assert_eq!(h.orchestrator.paused_by(&code), None);
        assert_eq!(
            h.orchestrator.countdown_until_ms(&code),
            Some(h.orchestrator.now_ms() + 3_000)
        );

        // The cancelled reconnect window must not end the match later
        h.advance(25_000).await;
        assert_eq!(h.status(&code), Some(RoomStatus::Live));
        assert!(!names(&a.drain()).contains(&"match:end"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_window_expiry_forfeits() {
        let mut h = Harness::new();
        let (mut a, mut b) = (h.connect(), h.connect());
        let (code, _) = h.start_duel(&mut a, &mut b);

        h.disconnect(&b);
        a.drain();

        h.advance(29_000).await;
        assert_eq!(h.status(&code), Some(RoomStatus::Paused));

        h.advance(1_000).await;
        let to_a = a.drain();
        assert!(to_a.contains(&ServerMsg::MatchEnd(MatchEndPayload {
            winner: PlayerId::P1,
            reason: EndReason::Forfeit,
        })));

        let final_state = to_a
            .iter()
            .rev()
            .find_map(|m| match m {
                ServerMsg::MatchSnapshot(p) => Some(&p.state),
                _ => None,
            })
            .expect("final snapshot before match:end");
        assert_eq!(final_state.status, RoomStatus::Ended);
        assert_eq!(final_state.winner, Some(PlayerId::P1));

        assert_eq!(h.status(&code), Some(RoomStatus::Ended));
        assert!(!h.orchestrator.has_runtime(&code));
        assert_eq!(h.stats.live_matches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rematch_needs_both_votes() {
        let mut h = Harness::new();
        let (mut a, mut b) = (h.connect(), h.connect());
        let (code, token) = h.start_duel(&mut a, &mut b);

        h.disconnect(&b);
        h.advance(30_000).await;
        assert_eq!(h.status(&code), Some(RoomStatus::Ended));

        let mut back = h.connect();
        h.send(
            &back,
            ClientMsg::PlayerReconnect(PlayerReconnectPayload {
                room_code: code.clone(),
                player_token: token,
            }),
        );
        // No runtime after the match ended, so no match:start
        assert_eq!(names(&back.drain()), vec!["room:created", "room:joined"]);
        a.drain();

        h.send(&a, ClientMsg::RematchRequest);
        h.send(&a, ClientMsg::RematchRequest);
        assert_eq!(h.status(&code), Some(RoomStatus::Ended));
        assert!(a.drain().is_empty());

        h.send(&back, ClientMsg::RematchRequest);
        assert_eq!(h.status(&code), Some(RoomStatus::Live));
        assert_eq!(names(&a.drain()), vec!["match:start"]);
        assert_eq!(names(&back.drain()), vec!["match:start"]);
        assert!(h
            .orchestrator
            .rooms()
            .get(&code)
            .unwrap()
            .rematch_votes
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rematch_ignored_while_live() {
        let mut h = Harness::new();
        let (mut a, mut b) = (h.connect(), h.connect());
        let (code, _) = h.start_duel(&mut a, &mut b);

        h.send(&a, ClientMsg::RematchRequest);
        assert!(h.orchestrator.rooms().get(&code).unwrap().rematch_votes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_messages_are_ignored() {
        let mut h = Harness::new();
        let (mut a, mut b) = (h.connect(), h.connect());
        let (code, _) = h.start_duel(&mut a, &mut b);
        b.drain();

        // Epoch 1 belongs to the running match; anything else is stale
        h.orchestrator.handle(LoopEvent::Snapshot {
            room_code: code.clone(),
            epoch: 99,
        });
        h.orchestrator.handle(LoopEvent::ReconnectExpired {
            room_code: code.clone(),
            player_id: PlayerId::P2,
            token: 7,
        });
        assert!(a.drain().is_empty());
        assert_eq!(h.status(&code), Some(RoomStatus::Live));

        h.orchestrator.handle(LoopEvent::Snapshot {
            room_code: code,
            epoch: 1,
        });
        assert_eq!(names(&a.drain()), vec!["match:snapshot"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_room_removed_when_last_player_leaves() {
        let mut h = Harness::new();
        let mut a = h.connect();

        h.send(&a, ClientMsg::RoomCreate(RoomCreatePayload::default()));
        a.drain();
        assert_eq!(h.stats.rooms(), 1);

        h.disconnect(&a);
        assert_eq!(h.orchestrator.rooms().room_count(), 0);
        assert_eq!(h.stats.rooms(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sweep_closes_stale_rooms() {
        let mut h = Harness::new();
        let mut a = h.connect();

        h.send(&a, ClientMsg::RoomCreate(RoomCreatePayload::default()));
        a.drain();

        h.advance(14 * 60 * 1_000).await;
        h.orchestrator.sweep_idle_rooms();
        assert_eq!(h.orchestrator.rooms().room_count(), 1);

        h.advance(60 * 1_000 + 1).await;
        h.orchestrator.sweep_idle_rooms();
        assert_eq!(h.orchestrator.rooms().room_count(), 0);

        match a.drain().as_slice() {
            [ServerMsg::RoomError(p)] => {
                assert_eq!(p.code, ErrorCode::InvalidState);
                assert_eq!(p.message, "This room has been closed.");
            }
            other => panic!("unexpected {:?}", other),
        }

        // The connection is free to host again
        h.send(&a, ClientMsg::RoomCreate(RoomCreatePayload::default()));
        assert_eq!(names(&a.drain()), vec!["room:created", "room:joined"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_live_matches() {
        let mut h = Harness::new();
        let (mut a, mut b) = (h.connect(), h.connect());
        let (code, _) = h.start_duel(&mut a, &mut b);

        h.advance(20 * 60 * 1_000).await;
        h.orchestrator.sweep_idle_rooms();
        assert_eq!(h.status(&code), Some(RoomStatus::Live));
    }
}
