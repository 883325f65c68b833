//! Deterministic agent spawning.
//!
//! Every agent gets its own RNG seeded from the simulation seed and its
//! index, so the arena can be filled in parallel and the same seed always
//! yields the same agents regardless of thread count.

use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::f32::consts::{PI, TAU};

use crate::agent::Agent;
use crate::settings::SimulationSettings;

/// Per-agent random source handed out by [`Spawner`].
pub struct SpawnContext {
    /// Index of the agent being spawned.
    pub index: usize,
    rng: SmallRng,
}

impl SpawnContext {
    pub fn new(seed: u64, index: usize) -> Self {
        // Spread consecutive indices across the seed space.
        let mixed = seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Self {
            index,
            rng: SmallRng::seed_from_u64(mixed),
        }
    }

    /// Random f32 between 0.0 and 1.0.
    #[inline]
    pub fn random(&mut self) -> f32 {
        self.rng.gen()
    }

    /// Random f32 in `[min, max)`, or `min` when the range is empty.
    #[inline]
    pub fn random_range(&mut self, min: f32, max: f32) -> f32 {
        if max > min {
            self.rng.gen_range(min..max)
        } else {
            min
        }
    }

    /// Uniform point inside an axis-aligned box.
    pub fn random_in_box(&mut self, min: Vec3, max: Vec3) -> Vec3 {
        Vec3::new(
            self.random_range(min.x, max.x),
            self.random_range(min.y, max.y),
            self.random_range(min.z, max.z),
        )
    }

    /// Uniform unit vector.
    pub fn random_direction(&mut self) -> Vec3 {
        let theta = self.rng.gen_range(0.0..TAU);
        let phi = (1.0 - 2.0 * self.random()).acos().clamp(0.0, PI);
        Vec3::new(phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos())
    }
}

/// Fills agent buffers from a seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Spawner {
    seed: u64,
}

impl Spawner {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Spawn one agent: anywhere inside the turn margin, heading in a random
    /// direction at a speed between the speed limits.
    pub fn spawn_one(&self, index: usize, settings: &SimulationSettings) -> Agent {
        let mut ctx = SpawnContext::new(self.seed, index);
        let inset = Vec3::splat(settings.turn_margin.max(0.0));
        let mut min = settings.min_pos + inset;
        let mut max = settings.max_pos - inset;
        if min.cmpgt(max).any() {
            min = settings.min_pos;
            max = settings.max_pos;
        }
        let position = ctx.random_in_box(min, max);
        let speed = ctx.random_range(settings.min_speed, settings.max_speed);
        Agent::new(position, ctx.random_direction() * speed)
    }

    /// Fill `out` entirely, one agent per slot.
    pub fn fill(&self, settings: &SimulationSettings, out: &mut [Agent]) {
        out.par_iter_mut()
            .enumerate()
            .for_each(|(i, slot)| *slot = self.spawn_one(i, settings));
    }

    /// Spawn `count` agents.
    pub fn spawn(&self, count: usize, settings: &SimulationSettings) -> Vec<Agent> {
        let mut agents = vec![Agent::default(); count];
        self.fill(settings, &mut agents);
        agents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_agents() {
        let settings = SimulationSettings::default();
        let a = Spawner::new(7).spawn(1_000, &settings);
        let b = Spawner::new(7).spawn(1_000, &settings);
        let c = Spawner::new(8).spawn(1_000, &settings);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_prefix_is_stable() {
        let settings = SimulationSettings::default();
        let small = Spawner::new(3).spawn(10, &settings);
        let large = Spawner::new(3).spawn(100, &settings);
        assert_eq!(small[..], large[..10]);
    }

    #[test]
    fn test_spawn_within_bounds_and_speeds() {
        let settings = SimulationSettings::default();
        for agent in Spawner::new(1).spawn(2_000, &settings) {
            assert!(agent.position.cmpge(settings.min_pos).all());
            assert!(agent.position.cmple(settings.max_pos).all());
            let speed = agent.velocity.length();
            assert!(speed >= settings.min_speed - 1e-3 && speed <= settings.max_speed + 1e-3);
        }
    }

    #[test]
    fn test_random_direction_is_unit() {
        let mut ctx = SpawnContext::new(5, 0);
        for _ in 0..100 {
            assert!((ctx.random_direction().length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_tiny_bounds_ignore_margin() {
        let settings = SimulationSettings {
            min_pos: Vec3::ZERO,
            max_pos: Vec3::ONE,
            turn_margin: 5.0,
            ..Default::default()
        };
        let agent = Spawner::new(0).spawn_one(0, &settings);
        assert!(agent.position.cmpge(Vec3::ZERO).all());
        assert!(agent.position.cmple(Vec3::ONE).all());
    }
}
