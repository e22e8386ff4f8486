//! Client-side snapshot buffer with render-time interpolation

use std::collections::{HashMap, VecDeque};

use crate::ws::protocol::{MatchState, PlayerPair, ProjectileState, Vec2, VehicleState};

/// Max snapshots kept; the oldest is evicted first
pub const BUFFER_CAPACITY: usize = 90;

/// How far rendering lags behind the newest snapshot
pub const RENDER_DELAY_MS: f64 = 100.0;

#[derive(Debug, Clone)]
struct SnapshotSample {
    received_at_ms: f64,
    state: MatchState,
}

/// Time-ordered ring of received match states.
///
/// States go in and come out by value, so nothing handed to the renderer
/// aliases the buffer's storage.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuffer {
    samples: VecDeque<SnapshotSample>,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Store a copy of `state` received at local time `received_at_ms`
    pub fn push(&mut self, state: &MatchState, received_at_ms: f64) {
        self.samples.push_back(SnapshotSample {
            received_at_ms,
            state: state.clone(),
        });

        while self.samples.len() > BUFFER_CAPACITY {
            self.samples.pop_front();
        }
    }

    /// Most recent state, ignoring the render delay
    pub fn latest(&self) -> Option<MatchState> {
        self.samples.back().map(|s| s.state.clone())
    }

    /// State at local time `render_at_ms`.
    ///
    /// Clamps to the oldest / newest sample outside the buffered range and
    /// never extrapolates.
    pub fn sample(&self, render_at_ms: f64) -> Option<MatchState> {
        let first = self.samples.front()?;
        let last = self.samples.back()?;

        if self.samples.len() == 1 || render_at_ms <= first.received_at_ms {
            return Some(first.state.clone());
        }
        if render_at_ms >= last.received_at_ms {
            return Some(last.state.clone());
        }

        if render_at_ms.is_nan() {
            return Some(last.state.clone());
        }

        // First sample received after render time; always in 1..len
        let newer_idx = self
            .samples
            .partition_point(|s| s.received_at_ms <= render_at_ms);
        let older = &self.samples[newer_idx - 1];
        let newer = &self.samples[newer_idx];

        let span = newer.received_at_ms - older.received_at_ms;
        let span = if span == 0.0 { 1.0 } else { span };
        let blend = (render_at_ms - older.received_at_ms) / span;

        Some(interpolate_state(&older.state, &newer.state, blend))
    }
}

/// Blend numeric fields; everything discrete comes from `newer`
fn interpolate_state(older: &MatchState, newer: &MatchState, blend: f64) -> MatchState {
    let t = blend.clamp(0.0, 1.0);

    MatchState {
        room_code: newer.room_code.clone(),
        status: newer.status,
        server_time_ms: lerp_f64(older.server_time_ms, newer.server_time_ms, t),
        vehicles: PlayerPair::from_fn(|id| {
            interpolate_vehicle(older.vehicles.get(id), newer.vehicles.get(id), t)
        }),
        projectiles: interpolate_projectiles(&older.projectiles, &newer.projectiles, t),
        winner: newer.winner,
    }
}

fn interpolate_vehicle(older: &VehicleState, newer: &VehicleState, t: f64) -> VehicleState {
    VehicleState {
        position: lerp_vec(older.position, newer.position, t),
        velocity: lerp_vec(older.velocity, newer.velocity, t),
        ..newer.clone()
    }
}

/// Projectiles are matched by id; ones new in `newer` appear as-is
fn interpolate_projectiles(
    older: &[ProjectileState],
    newer: &[ProjectileState],
    t: f64,
) -> Vec<ProjectileState> {
    let older_by_id: HashMap<&str, &ProjectileState> =
        older.iter().map(|p| (p.id.as_str(), p)).collect();

    newer
        .iter()
        .map(|current| match older_by_id.get(current.id.as_str()) {
            Some(previous) => ProjectileState {
                position: lerp_vec(previous.position, current.position, t),
                velocity: lerp_vec(previous.velocity, current.velocity, t),
                ..current.clone()
            },
            None => current.clone(),
        })
        .collect()
}

fn lerp_f64(start: f64, end: f64, t: f64) -> f64 {
    start + (end - start) * t
}

fn lerp_vec(start: Vec2, end: Vec2, t: f64) -> Vec2 {
    let t = t as f32;
    Vec2::new(start.x + (end.x - start.x) * t, start.y + (end.y - start.y) * t)
}
