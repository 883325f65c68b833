//! # flockgrid
//!
//! Grid-partitioned boid flocking. Every step sorts the agents into a uniform
//! grid with a parallel counting sort, then updates each agent from the
//! agents in its 27 surrounding cells. The same pipeline runs on the CPU
//! (rayon) or as WGSL compute passes on a headless wgpu device.
//!
//! ## Quick Start
//!
//! ```ignore
//! use flockgrid::prelude::*;
//!
//! let settings = SimulationSettings {
//!     agent_count: 50_000,
//!     min_pos: Vec3::splat(-200.0),
//!     max_pos: Vec3::splat(200.0),
//!     ..Default::default()
//! };
//!
//! let mut sim = Simulation::builder()
//!     .with_settings(settings)
//!     .with_backend(Backend::Cpu)
//!     .with_seed(42)
//!     .build()?;
//!
//! for _ in 0..600 {
//!     if let StepOutcome::Skipped(reason) = sim.step(1.0 / 60.0) {
//!         eprintln!("step skipped: {reason}");
//!     }
//! }
//! ```
//!
//! ## The Step
//!
//! ```text
//! clear ─▶ count ─▶ copy counts ─▶ scan ─▶ seed cursors ─▶ scatter ─▶ flock ─▶ swap
//! ```
//!
//! - **count** memoizes each agent's cell index and builds a histogram.
//! - **scan** is a blocked inclusive prefix sum, 512 elements per block, as
//!   many levels as the cell count needs. See [`scan::ScanPlan`].
//! - **scatter** places agents at `offsets[cell] + k` through atomic cursors.
//!   The order inside a cell is unspecified.
//! - **flock** reads the sorted buffer and writes the back buffer.
//!
//! With [`SimulationSettings::gridding`] off the step is a single all-pairs
//! flocking pass, kept as a reference for small flocks.
//!
//! ## Halting
//!
//! A step that cannot run safely does nothing and reports a [`HaltReason`].
//! Most halts clear themselves on the next good step. A low frame rate
//! latches until [`Simulation::reset`].

mod agent;
mod capacity;
pub mod counting;
mod error;
pub mod flocking;
pub mod gpu;
mod grid;
mod halt;
pub mod pipeline;
pub mod scan;
pub mod scatter;
mod settings;
mod simulation;
mod spawn;
mod time;

pub use agent::{Agent, AgentStore, AGENT_WGSL};
pub use capacity::{Capacity, MAX_AGENTS, MAX_AGENTS_PER_CELL, MAX_CELLS};
pub use error::{GpuError, SettingsError, SimulationError};
pub use grid::{GridDescriptor, GRID_WGSL};
pub use halt::{HaltReason, ResourceIssue, SettingsIssue};
pub use settings::{Attractor, SimulationSettings, StepParams};
pub use simulation::{Backend, GridStats, Simulation, SimulationBuilder, StepOutcome};
pub use spawn::{SpawnContext, Spawner};
pub use time::{FrameMonitor, DEFAULT_MIN_FPS, DEFAULT_SAMPLE_INTERVAL};

pub use bytemuck;
pub use glam::{IVec3, UVec3, Vec3};

/// Everything needed to configure and run a flock.
pub mod prelude {
    pub use crate::capacity::Capacity;
    pub use crate::halt::{HaltReason, ResourceIssue, SettingsIssue};
    pub use crate::settings::{Attractor, SimulationSettings};
    pub use crate::simulation::{Backend, GridStats, Simulation, StepOutcome};
    pub use crate::time::FrameMonitor;
    pub use crate::{Agent, Vec3};
}
