//! Authoritative fixed-step simulation for one match

use crate::ws::protocol::{
    EndReason, InputFrame, MatchEndPayload, MatchEvent, MatchState, PlayerId, PlayerPair,
    RoomStatus, Vec2, VehicleState,
};

use super::collision::projectile_hits_vehicle;
use super::combat::{projectile_id, CombatSystem, WeaponStats};
use super::physics::{initial_facing, spawn_point, PhysicsSystem, VehicleStats, STARTING_LIVES};

/// Outcome of one simulation step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepResult {
    /// Hit / respawn events produced this step, in order
    pub events: Vec<MatchEvent>,
    /// Set at most once per match, on the step that takes the last life
    pub ended: Option<MatchEndPayload>,
}

/// One match worth of helicopters and projectiles.
///
/// The engine never changes its own status except `live -> ended` when a
/// helicopter loses its last life; everything else goes through
/// [`Simulation::set_status`] and [`Simulation::force_end`].
pub struct Simulation {
    state: MatchState,
    latest_input: PlayerPair<InputFrame>,
    last_fire_at_ms: PlayerPair<Option<u64>>,
    projectile_counters: PlayerPair<u64>,
    vehicle_stats: VehicleStats,
    weapon: WeaponStats,
}

impl Simulation {
    pub fn new(room_code: impl Into<String>, now_ms: u64) -> Self {
        Self {
            state: MatchState {
                room_code: room_code.into(),
                status: RoomStatus::Live,
                server_time_ms: now_ms as f64,
                vehicles: PlayerPair::from_fn(initial_vehicle),
                projectiles: Vec::new(),
                winner: None,
            },
            latest_input: PlayerPair::default(),
            last_fire_at_ms: PlayerPair::default(),
            projectile_counters: PlayerPair::default(),
            vehicle_stats: VehicleStats::HELICOPTER,
            weapon: WeaponStats::CANNON,
        }
    }

    pub fn status(&self) -> RoomStatus {
        self.state.status
    }

    pub fn set_status(&mut self, status: RoomStatus) {
        self.state.status = status;
    }

    /// Replace the stored input. Last write wins, regardless of `seq`.
    pub fn set_input(&mut self, player_id: PlayerId, frame: InputFrame) {
        *self.latest_input.get_mut(player_id) = frame;
    }

    /// Seq of the input currently applied for each player
    pub fn ack_seq_by_player(&self) -> PlayerPair<u64> {
        PlayerPair::from_fn(|id| self.latest_input.get(id).seq)
    }

    pub fn force_end(&mut self, winner: PlayerId) {
        self.state.winner = Some(winner);
        self.state.status = RoomStatus::Ended;
    }

    /// Owned copy of the full match state
    pub fn state(&self) -> MatchState {
        self.state.clone()
    }

    /// Run one step. Does nothing but refresh the server time unless live.
    pub fn step(&mut self, now_ms: u64, delta_ms: f64) -> StepResult {
        let mut result = StepResult::default();

        if self.state.status != RoomStatus::Live {
            self.state.server_time_ms = now_ms as f64;
            return result;
        }

        let dt = (delta_ms / 1000.0) as f32;

        for player_id in PlayerId::ALL {
            PhysicsSystem::update_vehicle(
                self.state.vehicles.get_mut(player_id),
                self.latest_input.get(player_id),
                dt,
                &self.vehicle_stats,
            );
        }

        for player_id in PlayerId::ALL {
            self.maybe_fire(player_id, now_ms);
        }

        let mut pending = std::mem::take(&mut self.state.projectiles).into_iter();
        let mut remaining = Vec::with_capacity(pending.len());

        while let Some(mut projectile) = pending.next() {
            CombatSystem::integrate_projectile(&mut projectile, dt);

            if projectile.expires_at_ms <= now_ms
                || PhysicsSystem::is_out_of_bounds(projectile.position, self.weapon.projectile_radius)
            {
                continue;
            }

            let target_id = projectile.owner.opponent();
            let target = self.state.vehicles.get_mut(target_id);

            if CombatSystem::is_invulnerable(target, now_ms)
                || !projectile_hits_vehicle(&projectile, target, &self.weapon, &self.vehicle_stats)
            {
                remaining.push(projectile);
                continue;
            }

            let lives_left = CombatSystem::apply_hit(target);
            result.events.push(MatchEvent::Hit {
                by: projectile.owner,
                target: target_id,
                lives_left,
            });

            if lives_left == 0 {
                self.state.status = RoomStatus::Ended;
                self.state.winner = Some(projectile.owner);
                // Projectiles not yet processed this step are dropped
                self.state.projectiles = remaining;
                self.state.server_time_ms = now_ms as f64;

                result.ended = Some(MatchEndPayload {
                    winner: projectile.owner,
                    reason: EndReason::Lives,
                });
                return result;
            }

            CombatSystem::respawn(target, spawn_point(target_id), now_ms);
            result.events.push(MatchEvent::Respawn {
                player_id: target_id,
            });
        }

        self.state.projectiles = remaining;
        self.state.server_time_ms = now_ms as f64;

        result
    }

    fn maybe_fire(&mut self, player_id: PlayerId, now_ms: u64) {
        if !self.latest_input.get(player_id).fire {
            return;
        }

        let last_fire = self.last_fire_at_ms.get_mut(player_id);
        if !CombatSystem::can_fire(*last_fire, now_ms, &self.weapon) {
            return;
        }
        *last_fire = Some(now_ms);

        let counter = self.projectile_counters.get_mut(player_id);
        let id = projectile_id(player_id, *counter);
        *counter += 1;

        let projectile = CombatSystem::spawn_projectile(
            id,
            self.state.vehicles.get(player_id),
            now_ms,
            &self.weapon,
            &self.vehicle_stats,
        );
        self.state.projectiles.push(projectile);
    }
}

fn initial_vehicle(player_id: PlayerId) -> VehicleState {
    VehicleState {
        owner_id: player_id,
        position: spawn_point(player_id),
        velocity: Vec2::ZERO,
        lives: STARTING_LIVES,
        facing: initial_facing(player_id),
        invulnerable_until_ms: 0,
    }
}
