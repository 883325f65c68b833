//! Reasons a step is skipped.
//!
//! A halted simulation keeps its last completed agent state and performs no
//! pass at all. Settings and resource halts are recomputed on every step and
//! lift as soon as the parameters allow it; a low frame rate halt stays until
//! the simulation is reset.

use std::fmt;

/// Why [`Simulation::step`](crate::simulation::Simulation::step) did nothing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HaltReason {
    /// The caller passed a delta time of zero.
    ZeroDeltaTime,
    /// The parameters cannot describe a valid step.
    InvalidSettings(SettingsIssue),
    /// The parameters need more than the allocated or absolute capacity.
    ResourceCeiling(ResourceIssue),
    /// Throughput fell below the monitor's floor. Sticky until reset.
    LowFrameRate { fps: f32 },
}

impl HaltReason {
    /// Whether only a reset clears this halt.
    pub fn is_sticky(&self) -> bool {
        matches!(self, HaltReason::LowFrameRate { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SettingsIssue {
    /// Bounds are not finite or enclose no volume.
    DegenerateBounds,
    /// `visual_range * cell_size_mult` is not a positive finite number.
    InvalidCellSize,
    /// The grid has no cells.
    EmptyGrid,
    /// A flocking parameter is NaN or infinite.
    NonFiniteParameter,
    /// Gridding is on and the average cell holds too many agents.
    TooDense { agents_per_cell: u64 },
    /// Gridding is off and the all-pairs update would visit too many agents.
    TooManyForBruteForce { agent_count: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceIssue {
    TooManyCells { cell_count: u64, limit: u64 },
    TooManyAgents { agent_count: u64, limit: u64 },
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::ZeroDeltaTime => write!(f, "delta time is zero"),
            HaltReason::InvalidSettings(issue) => write!(f, "invalid settings: {}", issue),
            HaltReason::ResourceCeiling(issue) => write!(f, "resource ceiling reached: {}", issue),
            HaltReason::LowFrameRate { fps } => write!(f, "frame rate dropped to {:.1} FPS", fps),
        }
    }
}

impl fmt::Display for SettingsIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsIssue::DegenerateBounds => write!(f, "bounds enclose no volume"),
            SettingsIssue::InvalidCellSize => write!(f, "cell size must be positive"),
            SettingsIssue::EmptyGrid => write!(f, "grid has no cells"),
            SettingsIssue::NonFiniteParameter => write!(f, "a parameter is not finite"),
            SettingsIssue::TooDense { agents_per_cell } => {
                write!(f, "{} agents per cell on average", agents_per_cell)
            }
            SettingsIssue::TooManyForBruteForce { agent_count } => {
                write!(f, "{} agents is too many without gridding", agent_count)
            }
        }
    }
}

impl fmt::Display for ResourceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceIssue::TooManyCells { cell_count, limit } => {
                write!(f, "{} cells (limit {})", cell_count, limit)
            }
            ResourceIssue::TooManyAgents { agent_count, limit } => {
                write!(f, "{} agents (limit {})", agent_count, limit)
            }
        }
    }
}
