//! Simulation builder and stepping facade.
//!
//! ```ignore
//! use flockgrid::prelude::*;
//!
//! let mut sim = Simulation::builder()
//!     .with_settings(SimulationSettings { agent_count: 20_000, ..Default::default() })
//!     .with_seed(7)
//!     .build()?;
//!
//! match sim.step(1.0 / 60.0) {
//!     StepOutcome::Completed => {}
//!     StepOutcome::Skipped(reason) => eprintln!("halted: {reason}"),
//! }
//! let agents = sim.agent_snapshot()?;
//! ```

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::agent::{Agent, AgentStore};
use crate::capacity::{Capacity, MAX_CELLS};
use crate::error::SimulationError;
use crate::gpu::{GpuContext, GpuPipeline};
use crate::halt::{HaltReason, SettingsIssue};
use crate::pipeline::CpuPipeline;
use crate::settings::{SimulationSettings, StepParams};
use crate::spawn::Spawner;
use crate::time::FrameMonitor;

/// Where the step pipeline runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    /// Rayon data-parallel passes.
    #[default]
    Cpu,
    /// WGSL compute passes on a headless device.
    Gpu,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Cpu => write!(f, "cpu"),
            Backend::Gpu => write!(f, "gpu"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Backend::Cpu),
            "gpu" => Ok(Backend::Gpu),
            other => Err(format!("unknown backend '{}', expected 'cpu' or 'gpu'", other)),
        }
    }
}

/// Result of [`Simulation::step`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepOutcome {
    /// The whole pipeline ran and the buffers were swapped.
    Completed,
    /// Nothing ran; the agents are unchanged.
    Skipped(HaltReason),
}

/// Grid figures for the current settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridStats {
    pub cell_count: u64,
    pub agent_count: usize,
}

enum Engine {
    Cpu {
        store: AgentStore,
        pipeline: CpuPipeline,
    },
    Gpu {
        ctx: GpuContext,
        pipeline: GpuPipeline,
    },
}

/// Configures and builds a [`Simulation`].
///
/// Use method chaining to configure, then call `.build()`.
pub struct SimulationBuilder {
    settings: SimulationSettings,
    capacity: Option<Capacity>,
    seed: u64,
    backend: Backend,
    monitor: FrameMonitor,
}

impl Default for SimulationBuilder {
    fn default() -> Self {
        Self {
            settings: SimulationSettings::default(),
            capacity: None,
            seed: 0,
            backend: Backend::Cpu,
            monitor: FrameMonitor::default(),
        }
    }
}

impl SimulationBuilder {
    /// Parameters for the first step and the initial spawn.
    pub fn with_settings(mut self, settings: SimulationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set buffer capacity explicitly. Defaults to exactly what the initial
    /// settings need.
    pub fn with_capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Seed for agent spawning.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Run on the CPU or the GPU. Defaults to the CPU.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Frame-rate floor and sampling window.
    pub fn with_frame_monitor(mut self, monitor: FrameMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    /// Allocate every buffer and spawn the initial agents.
    pub fn build(self) -> Result<Simulation, SimulationError> {
        let capacity = self.capacity.unwrap_or_else(|| {
            let cells = usize::try_from(self.settings.grid().cell_count()).unwrap_or(MAX_CELLS);
            Capacity::new(self.settings.agent_count, cells)
        });

        let engine = match self.backend {
            Backend::Cpu => Engine::Cpu {
                store: AgentStore::with_capacity(capacity.max_agents),
                pipeline: CpuPipeline::new(&capacity),
            },
            Backend::Gpu => {
                let ctx = GpuContext::new()?;
                let pipeline = GpuPipeline::new(&ctx, capacity)?;
                Engine::Gpu { ctx, pipeline }
            }
        };

        tracing::info!(
            backend = %self.backend,
            max_agents = capacity.max_agents,
            max_cells = capacity.max_cells,
            seed = self.seed,
            "simulation created"
        );

        let agent_count = self.settings.agent_count;
        let mut sim = Simulation {
            settings: self.settings,
            capacity,
            spawner: Spawner::new(self.seed),
            monitor: self.monitor,
            engine,
            backend: self.backend,
            status: None,
            low_frame_rate: None,
            active: 0,
            steps: 0,
        };
        sim.reset(agent_count)?;
        Ok(sim)
    }
}

/// A running flock.
///
/// Each [`step`](Self::step) either runs the complete pipeline or nothing.
pub struct Simulation {
    settings: SimulationSettings,
    capacity: Capacity,
    spawner: Spawner,
    monitor: FrameMonitor,
    engine: Engine,
    backend: Backend,
    /// Why the last step was skipped, if it was.
    status: Option<HaltReason>,
    /// Latched by the frame monitor, cleared only by reset.
    low_frame_rate: Option<HaltReason>,
    /// Agents in the front buffer.
    active: usize,
    steps: u64,
}

impl Simulation {
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder::default()
    }

    /// Replace the parameters. Takes effect on the next step.
    pub fn configure(&mut self, settings: SimulationSettings) {
        tracing::debug!(agents = settings.agent_count, gridding = settings.gridding, "settings replaced");
        self.settings = settings;
    }

    /// Re-spawn every agent slot, set the active count, and clear all halts
    /// and frame-rate measurements.
    ///
    /// Buffers grow first when the current settings need more agents or
    /// cells than were allocated, up to [`MAX_AGENTS`](crate::MAX_AGENTS) and [`MAX_CELLS`].
    /// They never shrink.
    pub fn reset(&mut self, agent_count: usize) -> Result<(), SimulationError> {
        self.settings.agent_count = agent_count;
        self.grow(agent_count)?;

        let arena = self.spawner.spawn(self.capacity.max_agents, &self.settings);
        let active = agent_count.min(self.capacity.max_agents);
        match &mut self.engine {
            Engine::Cpu { store, pipeline } => {
                store.fill(&arena, active);
                pipeline.forget_offsets();
            }
            Engine::Gpu { ctx, pipeline } => pipeline.upload(&ctx.queue, &arena),
        }
        self.active = active;
        self.monitor.reset();
        self.low_frame_rate = None;
        self.status = None;
        self.steps = 0;
        tracing::info!(agents = agent_count, "simulation reset");
        Ok(())
    }

    /// Reallocate the engine if `agent_count` or the current grid outgrows
    /// the capacity.
    fn grow(&mut self, agent_count: usize) -> Result<(), SimulationError> {
        let cells = if self.settings.gridding {
            usize::try_from(self.settings.grid().cell_count()).unwrap_or(MAX_CELLS)
        } else {
            0
        };
        let needed = Capacity::new(
            self.capacity.max_agents.max(agent_count),
            self.capacity.max_cells.max(cells),
        );
        if needed == self.capacity {
            return Ok(());
        }

        match &mut self.engine {
            Engine::Cpu { store, pipeline } => {
                *store = AgentStore::with_capacity(needed.max_agents);
                *pipeline = CpuPipeline::new(&needed);
            }
            Engine::Gpu { ctx, pipeline } => *pipeline = GpuPipeline::new(ctx, needed)?,
        }
        tracing::info!(
            max_agents = needed.max_agents,
            max_cells = needed.max_cells,
            "buffers grown"
        );
        self.capacity = needed;
        Ok(())
    }

    /// Advance by `delta_time` seconds.
    pub fn step(&mut self, delta_time: f32) -> StepOutcome {
        if let Some(reason) = self.check(delta_time) {
            self.set_status(Some(reason));
            return StepOutcome::Skipped(reason);
        }

        let params = StepParams::new(&self.settings, delta_time);
        match &mut self.engine {
            Engine::Cpu { store, pipeline } => {
                store.set_len(params.agent_count);
                pipeline.run(store, &params);
            }
            Engine::Gpu { ctx, pipeline } => pipeline.run(ctx, &params),
        }
        self.active = params.agent_count;
        self.steps += 1;
        self.set_status(None);
        tracing::trace!(step = self.steps, agents = params.agent_count, "step completed");
        StepOutcome::Completed
    }

    fn check(&self, delta_time: f32) -> Option<HaltReason> {
        if let Some(reason) = self.low_frame_rate {
            return Some(reason);
        }
        if delta_time == 0.0 {
            return Some(HaltReason::ZeroDeltaTime);
        }
        if !delta_time.is_finite() {
            return Some(HaltReason::InvalidSettings(SettingsIssue::NonFiniteParameter));
        }
        self.settings.validate(&self.capacity)
    }

    fn set_status(&mut self, status: Option<HaltReason>) {
        if status == self.status {
            return;
        }
        match (&self.status, &status) {
            (_, Some(reason)) => tracing::warn!(%reason, "simulation halted"),
            (Some(previous), None) => tracing::info!(%previous, "simulation resumed"),
            (None, None) => {}
        }
        self.status = status;
    }

    /// Feed the frame monitor with the wall-clock duration of one frame.
    /// Returns the sampled frame rate when a window closed.
    pub fn record_frame(&mut self, frame_time: Duration) -> Option<f32> {
        let fps = self.monitor.record_frame(frame_time);
        if let (Some(fps), true, None) = (fps, self.monitor.is_tripped(), self.low_frame_rate) {
            let reason = HaltReason::LowFrameRate { fps };
            tracing::warn!(fps, min_fps = self.monitor.min_fps(), "frame rate below floor, halting until reset");
            self.low_frame_rate = Some(reason);
        }
        fps
    }

    /// Agents of the last completed step (the initial spawn before any step).
    pub fn agent_snapshot(&self) -> Result<Cow<'_, [Agent]>, SimulationError> {
        match &self.engine {
            Engine::Cpu { store, .. } => Ok(Cow::Borrowed(store.front())),
            Engine::Gpu { ctx, pipeline } => Ok(Cow::Owned(pipeline.read_agents(ctx, self.active)?)),
        }
    }

    /// Bucket offsets of the last gridded step: `cell_count + 1` entries,
    /// the agents of cell `c` sit at `offsets[c]..offsets[c + 1]`. Empty if
    /// the last step brute-forced or no step ran yet.
    pub fn cell_offsets(&self) -> Result<Cow<'_, [u32]>, SimulationError> {
        match &self.engine {
            Engine::Cpu { pipeline, .. } => Ok(Cow::Borrowed(pipeline.offsets())),
            Engine::Gpu { ctx, pipeline } => Ok(Cow::Owned(pipeline.read_offsets(ctx)?)),
        }
    }

    /// Cell and agent counts the current settings describe.
    pub fn grid_stats(&self) -> GridStats {
        GridStats {
            cell_count: self.settings.grid().cell_count(),
            agent_count: self.settings.agent_count,
        }
    }

    /// Why the last step was skipped, or `None` if it ran. A latched low frame
    /// rate is reported even before the next step.
    pub fn status(&self) -> Option<HaltReason> {
        self.low_frame_rate.or(self.status)
    }

    #[inline]
    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    #[inline]
    pub fn capacity(&self) -> &Capacity {
        &self.capacity
    }

    #[inline]
    pub fn backend_kind(&self) -> Backend {
        self.backend
    }

    #[inline]
    pub fn frame_monitor(&self) -> &FrameMonitor {
        &self.monitor
    }

    /// Completed steps since the last reset.
    #[inline]
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn small_settings(agent_count: usize) -> SimulationSettings {
        SimulationSettings {
            agent_count,
            min_pos: Vec3::splat(-50.0),
            max_pos: Vec3::splat(50.0),
            ..Default::default()
        }
    }

    fn build(agent_count: usize) -> Simulation {
        Simulation::builder()
            .with_settings(small_settings(agent_count))
            .with_seed(11)
            .build()
            .unwrap()
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("cpu".parse::<Backend>(), Ok(Backend::Cpu));
        assert_eq!("GPU".parse::<Backend>(), Ok(Backend::Gpu));
        assert!("tpu".parse::<Backend>().is_err());
        assert_eq!(Backend::Gpu.to_string(), "gpu");
    }

    #[test]
    fn test_default_capacity_fits_settings() {
        let sim = build(300);
        assert_eq!(sim.capacity().max_agents, 300);
        assert_eq!(sim.capacity().max_cells, 1000);
        assert_eq!(sim.backend_kind(), Backend::Cpu);
        assert_eq!(sim.agent_snapshot().unwrap().len(), 300);
    }

    #[test]
    fn test_step_completes_and_counts() {
        let mut sim = build(300);
        assert_eq!(sim.step(0.016), StepOutcome::Completed);
        assert_eq!(sim.steps(), 1);
        assert_eq!(sim.status(), None);
        assert_eq!(sim.cell_offsets().unwrap().len(), 1001);
        assert_eq!(sim.cell_offsets().unwrap()[1000], 300);
    }

    #[test]
    fn test_zero_delta_skips_without_change() {
        let mut sim = build(50);
        let before = sim.agent_snapshot().unwrap().into_owned();
        assert_eq!(sim.step(0.0), StepOutcome::Skipped(HaltReason::ZeroDeltaTime));
        assert_eq!(sim.agent_snapshot().unwrap().as_ref(), &before[..]);
        assert_eq!(sim.status(), Some(HaltReason::ZeroDeltaTime));

        assert_eq!(sim.step(0.016), StepOutcome::Completed);
        assert_eq!(sim.status(), None);
    }

    #[test]
    fn test_grid_stats_follow_configure() {
        let mut sim = build(10);
        assert_eq!(
            sim.grid_stats(),
            GridStats {
                cell_count: 1000,
                agent_count: 10
            }
        );
        sim.configure(SimulationSettings {
            cell_size_mult: 2.0,
            ..small_settings(5)
        });
        assert_eq!(sim.grid_stats().cell_count, 125);
        assert_eq!(sim.grid_stats().agent_count, 5);
    }

    #[test]
    fn test_record_frame_latches_low_fps() {
        let mut sim = build(10);
        for _ in 0..2 {
            sim.record_frame(Duration::from_millis(600));
        }
        assert!(matches!(sim.status(), Some(HaltReason::LowFrameRate { .. })));
        assert!(matches!(sim.step(0.016), StepOutcome::Skipped(HaltReason::LowFrameRate { .. })));

        sim.reset(10).unwrap();
        assert_eq!(sim.status(), None);
        assert_eq!(sim.step(0.016), StepOutcome::Completed);
    }
}
