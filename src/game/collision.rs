//! Axis-aligned overlap tests

use crate::ws::protocol::{ProjectileState, VehicleState};

use super::combat::WeaponStats;
use super::physics::VehicleStats;

/// Center/extent AABB overlap: strict on both axes, so touching edges miss
pub fn aabb_overlap(ax: f32, ay: f32, aw: f32, ah: f32, bx: f32, by: f32, bw: f32, bh: f32) -> bool {
    (ax - bx).abs() * 2.0 < aw + bw && (ay - by).abs() * 2.0 < ah + bh
}

/// Check a projectile's square footprint against a helicopter's footprint
pub fn projectile_hits_vehicle(
    projectile: &ProjectileState,
    vehicle: &VehicleState,
    weapon: &WeaponStats,
    stats: &VehicleStats,
) -> bool {
    let size = weapon.projectile_radius * 2.0;
    aabb_overlap(
        projectile.position.x,
        projectile.position.y,
        size,
        size,
        vehicle.position.x,
        vehicle.position.y,
        stats.width,
        stats.height,
    )
}
