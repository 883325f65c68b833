//! Flocking update kernels.
//!
//! Both kernels read one immutable agent buffer and write a second one, one
//! output agent per input agent, so every agent sees the same snapshot of its
//! neighbours regardless of update order.
//!
//! Per visible neighbour (inside the visual range and the field of view):
//!
//! * inside the protected range it pushes the agent away, weighted by
//!   inverse squared distance (separation);
//! * outside it, it contributes to the local centroid (cohesion) and mean
//!   velocity (alignment).

use glam::Vec3;
use rayon::prelude::*;

use crate::agent::Agent;
use crate::settings::StepParams;

/// Running sums for one agent's neighbourhood.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Neighbourhood {
    pub separation: Vec3,
    pub position_sum: Vec3,
    pub velocity_sum: Vec3,
    /// Neighbours outside the protected range.
    pub flockmates: u32,
    /// All visible neighbours.
    pub neighbours: u32,
}

impl Neighbourhood {
    /// Fold one candidate into the sums. `heading` is the agent's normalized
    /// velocity, or zero when it is not moving.
    #[inline]
    pub fn consider(&mut self, agent: &Agent, heading: Vec3, other: &Agent, params: &StepParams) {
        let offset = other.position - agent.position;
        let dist_sq = offset.length_squared();
        if dist_sq >= params.visual_range_sq || !in_view(heading, offset, params) {
            return;
        }

        self.neighbours += 1;
        if dist_sq < params.protected_range_sq {
            if dist_sq > 0.0 {
                self.separation -= offset / dist_sq;
            }
        } else {
            self.position_sum += other.position;
            self.velocity_sum += other.velocity;
            self.flockmates += 1;
        }
    }
}

/// Field-of-view test. Everything is visible with a full field of view, to a
/// motionless agent, or at zero offset.
#[inline]
pub fn in_view(heading: Vec3, offset: Vec3, params: &StepParams) -> bool {
    if params.sees_all_around() || heading == Vec3::ZERO {
        return true;
    }
    let dir = offset.normalize_or_zero();
    dir == Vec3::ZERO || heading.dot(dir) >= params.fov_cos
}

/// Apply the accumulated forces, boundary steering and speed limits, then
/// integrate the position.
pub fn steer(agent: &Agent, hood: &Neighbourhood, params: &StepParams) -> Agent {
    let dt = params.delta_time;
    let p = agent.position;
    let mut v = agent.velocity;

    let mut accel = params.separation * params.max_speed * hood.separation;
    if hood.flockmates > 0 {
        let inv = 1.0 / hood.flockmates as f32;
        accel += params.cohesion * (hood.position_sum * inv - p);
        accel += params.alignment * (hood.velocity_sum * inv - v);
    }
    accel.y -= params.gravity;
    if let Some(attractor) = params.attractor {
        accel += (attractor.position - p).normalize_or_zero() * attractor.strength;
    }
    v += accel * dt;

    let turn = params.turn_speed * params.max_speed * dt;
    let low = params.min_pos + Vec3::splat(params.turn_margin);
    let high = params.max_pos - Vec3::splat(params.turn_margin);
    for axis in 0..3 {
        if p[axis] < low[axis] {
            v[axis] += turn;
        }
        if p[axis] > high[axis] {
            v[axis] -= turn;
        }
    }

    let speed = v.length();
    if speed > 0.0 {
        // `clamp` panics when min > max.
        v *= speed.max(params.min_speed).min(params.max_speed) / speed;
    }

    Agent {
        position: p + v * dt,
        cell_index: agent.cell_index,
        velocity: v,
        neighbours: hood.neighbours,
    }
}

/// Grid-accelerated update over a sorted buffer.
///
/// Each agent only looks at its own cell and the adjacent cells, found
/// through the memoized `cell_index` and the bucket `offsets`.
pub fn update_gridded(sorted: &[Agent], offsets: &[u32], params: &StepParams, out: &mut [Agent]) {
    let grid = &params.grid;
    out.par_iter_mut().enumerate().for_each(|(i, dst)| {
        let agent = &sorted[i];
        let heading = agent.velocity.normalize_or_zero();
        let mut hood = Neighbourhood::default();
        grid.for_each_neighbour_cell(agent.cell_index, |cell| {
            let start = offsets[cell as usize] as usize;
            let end = offsets[cell as usize + 1] as usize;
            for (j, other) in sorted[start..end].iter().enumerate() {
                if start + j != i {
                    hood.consider(agent, heading, other, params);
                }
            }
        });
        *dst = steer(agent, &hood, params);
    });
}

/// All-pairs update used when gridding is off.
pub fn update_brute_force(agents: &[Agent], params: &StepParams, out: &mut [Agent]) {
    out.par_iter_mut().enumerate().for_each(|(i, dst)| {
        let agent = &agents[i];
        let heading = agent.velocity.normalize_or_zero();
        let mut hood = Neighbourhood::default();
        for (j, other) in agents.iter().enumerate() {
            if j != i {
                hood.consider(agent, heading, other, params);
            }
        }
        *dst = steer(agent, &hood, params);
    });
}
