//! Helicopter movement and arena constraints

use crate::ws::protocol::{InputFrame, PlayerId, Vec2, VehicleState};

/// Arena size in world units
pub const ARENA_WIDTH: f32 = 1280.0;
pub const ARENA_HEIGHT: f32 = 720.0;

/// Lives each helicopter starts a match with
pub const STARTING_LIVES: u32 = 3;

/// Helicopter handling constants
#[derive(Debug, Clone, Copy)]
pub struct VehicleStats {
    /// Footprint width (axis-aligned)
    pub width: f32,
    /// Footprint height (axis-aligned)
    pub height: f32,
    /// Horizontal speed cap
    pub max_speed_x: f32,
    /// Vertical speed cap
    pub max_speed_y: f32,
    /// Horizontal acceleration per second
    pub accel_x: f32,
    /// Vertical acceleration per second
    pub accel_y: f32,
    /// Velocity multiplier applied every tick
    pub damping: f32,
}

impl VehicleStats {
    pub const HELICOPTER: VehicleStats = VehicleStats {
        width: 84.0,
        height: 32.0,
        max_speed_x: 260.0,
        max_speed_y: 220.0,
        accel_x: 520.0,
        accel_y: 420.0,
        damping: 0.9,
    };
}

/// Fixed spawn point per role
pub fn spawn_point(player_id: PlayerId) -> Vec2 {
    match player_id {
        PlayerId::P1 => Vec2::new(180.0, ARENA_HEIGHT * 0.33),
        PlayerId::P2 => Vec2::new(ARENA_WIDTH - 180.0, ARENA_HEIGHT * 0.33),
    }
}

/// P1 starts facing right, P2 facing left
pub fn initial_facing(player_id: PlayerId) -> i8 {
    match player_id {
        PlayerId::P1 => 1,
        PlayerId::P2 => -1,
    }
}

/// Physics system for updating helicopter positions and velocities
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance one helicopter by `dt` seconds under the given input
    pub fn update_vehicle(vehicle: &mut VehicleState, input: &InputFrame, dt: f32, stats: &VehicleStats) {
        // Opposing flags cancel out
        let x_dir = axis(input.left, input.right);
        let y_dir = axis(input.up, input.down);

        let mut vel_x = vehicle.velocity.x + x_dir * stats.accel_x * dt;
        let mut vel_y = vehicle.velocity.y + y_dir * stats.accel_y * dt;

        vel_x *= stats.damping;
        vel_y *= stats.damping;

        vel_x = vel_x.clamp(-stats.max_speed_x, stats.max_speed_x);
        vel_y = vel_y.clamp(-stats.max_speed_y, stats.max_speed_y);

        let half_w = stats.width / 2.0;
        let half_h = stats.height / 2.0;

        vehicle.velocity = Vec2::new(vel_x, vel_y);
        vehicle.position = Vec2::new(
            (vehicle.position.x + vel_x * dt).clamp(half_w, ARENA_WIDTH - half_w),
            (vehicle.position.y + vel_y * dt).clamp(half_h, ARENA_HEIGHT - half_h),
        );

        // Facing only changes with horizontal input
        if x_dir > 0.0 {
            vehicle.facing = 1;
        } else if x_dir < 0.0 {
            vehicle.facing = -1;
        }
    }

    /// Check if a point lies outside the arena grown by `margin` on every side
    pub fn is_out_of_bounds(point: Vec2, margin: f32) -> bool {
        point.x < -margin
            || point.x > ARENA_WIDTH + margin
            || point.y < -margin
            || point.y > ARENA_HEIGHT + margin
    }
}

fn axis(negative: bool, positive: bool) -> f32 {
    (positive as i8 - negative as i8) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(player_id: PlayerId) -> VehicleState {
        VehicleState {
            owner_id: player_id,
            position: spawn_point(player_id),
            velocity: Vec2::ZERO,
            lives: STARTING_LIVES,
            facing: initial_facing(player_id),
            invulnerable_until_ms: 0,
        }
    }

    #[test]
    fn test_opposing_flags_cancel() {
        let mut v = vehicle(PlayerId::P1);
        let input = InputFrame {
            left: true,
            right: true,
            up: true,
            down: true,
            ..InputFrame::default()
        };

        PhysicsSystem::update_vehicle(&mut v, &input, 1.0 / 30.0, &VehicleStats::HELICOPTER);

        assert_eq!(v.velocity, Vec2::ZERO);
        assert_eq!(v.position, spawn_point(PlayerId::P1));
        assert_eq!(v.facing, 1);
    }

    #[test]
    fn test_speed_capped_per_axis() {
        let stats = VehicleStats::HELICOPTER;
        let mut v = vehicle(PlayerId::P1);
        let input = InputFrame {
            right: true,
            down: true,
            ..InputFrame::default()
        };

        for _ in 0..600 {
            PhysicsSystem::update_vehicle(&mut v, &input, 1.0 / 30.0, &stats);
            assert!(v.velocity.x.abs() <= stats.max_speed_x);
            assert!(v.velocity.y.abs() <= stats.max_speed_y);
        }

        // Pinned against the bottom-right wall
        assert_eq!(v.position.x, ARENA_WIDTH - stats.width / 2.0);
        assert_eq!(v.position.y, ARENA_HEIGHT - stats.height / 2.0);
    }

    #[test]
    fn test_facing_follows_horizontal_input_and_persists() {
        let mut v = vehicle(PlayerId::P1);
        let left = InputFrame {
            left: true,
            ..InputFrame::default()
        };
        PhysicsSystem::update_vehicle(&mut v, &left, 0.033, &VehicleStats::HELICOPTER);
        assert_eq!(v.facing, -1);

        let climb = InputFrame {
            up: true,
            ..InputFrame::default()
        };
        PhysicsSystem::update_vehicle(&mut v, &climb, 0.033, &VehicleStats::HELICOPTER);
        assert_eq!(v.facing, -1);
    }

    #[test]
    fn test_out_of_bounds_uses_margin() {
        assert!(!PhysicsSystem::is_out_of_bounds(Vec2::new(-3.0, 10.0), 4.0));
        assert!(PhysicsSystem::is_out_of_bounds(Vec2::new(-5.0, 10.0), 4.0));
        assert!(PhysicsSystem::is_out_of_bounds(Vec2::new(100.0, ARENA_HEIGHT + 4.5), 4.0));
    }
}
