//! Combat system - cannon, projectiles, respawn

use crate::ws::protocol::{PlayerId, ProjectileState, Vec2, VehicleState};

use super::physics::VehicleStats;

/// Invulnerability window granted after a respawn (ms)
pub const RESPAWN_INVULN_MS: u64 = 1_000;

/// Cannon stats shared by both helicopters
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Projectile speed (units per second)
    pub projectile_speed: f32,
    /// Projectile half-size for hit tests and bounds margin
    pub projectile_radius: f32,
    /// Minimum time between shots (ms)
    pub cooldown_ms: u64,
    /// Projectile lifetime (ms)
    pub projectile_ttl_ms: u64,
}

impl WeaponStats {
    pub const CANNON: WeaponStats = WeaponStats {
        projectile_speed: 560.0,
        projectile_radius: 4.0,
        cooldown_ms: 250,
        projectile_ttl_ms: 2_200,
    };

    /// Distance from the helicopter center to the spawn point of a shot
    pub fn muzzle_offset(&self, vehicle: &VehicleStats) -> f32 {
        vehicle.width / 2.0 + self.projectile_radius + 2.0
    }
}

/// Combat system for cooldowns and projectile spawning
pub struct CombatSystem;

impl CombatSystem {
    /// Check if a player can fire (absolute-time cooldown)
    pub fn can_fire(last_fire_at_ms: Option<u64>, now_ms: u64, stats: &WeaponStats) -> bool {
        match last_fire_at_ms {
            Some(last) => now_ms.saturating_sub(last) >= stats.cooldown_ms,
            None => true,
        }
    }

    /// Spawn a projectile at the muzzle, travelling in the facing direction
    pub fn spawn_projectile(
        id: String,
        shooter: &VehicleState,
        now_ms: u64,
        weapon: &WeaponStats,
        vehicle_stats: &VehicleStats,
    ) -> ProjectileState {
        let facing = shooter.facing as f32;
        let offset = weapon.muzzle_offset(vehicle_stats);

        ProjectileState {
            id,
            owner: shooter.owner_id,
            position: Vec2::new(shooter.position.x + facing * offset, shooter.position.y),
            velocity: Vec2::new(facing * weapon.projectile_speed, 0.0),
            expires_at_ms: now_ms + weapon.projectile_ttl_ms,
        }
    }

    /// Advance a projectile by `dt` seconds
    pub fn integrate_projectile(projectile: &mut ProjectileState, dt: f32) {
        projectile.position.x += projectile.velocity.x * dt;
        projectile.position.y += projectile.velocity.y * dt;
    }

    /// Remove one life, never going below zero. Returns lives left.
    pub fn apply_hit(target: &mut VehicleState) -> u32 {
        target.lives = target.lives.saturating_sub(1);
        target.lives
    }

    /// Put a hit helicopter back on its spawn point with a grace window
    pub fn respawn(target: &mut VehicleState, spawn: Vec2, now_ms: u64) {
        target.position = spawn;
        target.velocity = Vec2::ZERO;
        target.invulnerable_until_ms = now_ms + RESPAWN_INVULN_MS;
    }

    pub fn is_invulnerable(target: &VehicleState, now_ms: u64) -> bool {
        target.invulnerable_until_ms > now_ms
    }
}

/// Projectile ids are `<owner>-<n>` with a per-owner counter
pub fn projectile_id(owner: PlayerId, counter: u64) -> String {
    format!("{}-{}", owner, counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shooter(facing: i8) -> VehicleState {
        VehicleState {
            owner_id: PlayerId::P2,
            position: Vec2::new(600.0, 300.0),
            velocity: Vec2::new(50.0, 0.0),
            lives: 3,
            facing,
            invulnerable_until_ms: 0,
        }
    }

    #[test]
    fn test_cooldown_is_absolute_time() {
        let stats = WeaponStats::CANNON;
        assert!(CombatSystem::can_fire(None, 0, &stats));
        assert!(!CombatSystem::can_fire(Some(1_000), 1_249, &stats));
        assert!(CombatSystem::can_fire(Some(1_000), 1_250, &stats));
    }

    #[test]
    fn test_spawn_in_facing_direction() {
        let weapon = WeaponStats::CANNON;
        let stats = VehicleStats::HELICOPTER;
        let projectile =
            CombatSystem::spawn_projectile(projectile_id(PlayerId::P2, 7), &shooter(-1), 500, &weapon, &stats);

        assert_eq!(projectile.id, "P2-7");
        assert_eq!(projectile.owner, PlayerId::P2);
        assert_eq!(projectile.position, Vec2::new(600.0 - 48.0, 300.0));
        assert_eq!(projectile.velocity, Vec2::new(-560.0, 0.0));
        assert_eq!(projectile.expires_at_ms, 2_700);
    }

    #[test]
    fn test_hit_and_respawn() {
        let mut target = shooter(1);
        target.lives = 1;

        assert_eq!(CombatSystem::apply_hit(&mut target), 0);
        assert_eq!(CombatSystem::apply_hit(&mut target), 0);

        CombatSystem::respawn(&mut target, Vec2::new(1.0, 2.0), 4_000);
        assert_eq!(target.velocity, Vec2::ZERO);
        assert!(CombatSystem::is_invulnerable(&target, 4_999));
        assert!(!CombatSystem::is_invulnerable(&target, 5_000));
    }
}
