//! Uniform grid over the simulation bounds.
//!
//! The grid is recomputed from the settings at the start of every step. Cells
//! are addressed by a single linear index in row-major order
//! (`x + dims.x * (y + dims.y * z)`), which is the key the counting sort
//! buckets agents by.

use glam::{IVec3, UVec3, Vec3};

use crate::capacity::{Capacity, MAX_AGENTS, MAX_AGENTS_PER_CELL, MAX_CELLS};
use crate::halt::{HaltReason, ResourceIssue, SettingsIssue};

/// Grid dimensions derived from the bounds and a cell size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridDescriptor {
    pub min: Vec3,
    pub max: Vec3,
    pub cell_size: f32,
    /// Cells per axis, `ceil(extent / cell_size)`.
    pub dims: UVec3,
    cell_count: u64,
}

impl GridDescriptor {
    /// Compute the grid covering `[min, max]` with cubic cells of `cell_size`.
    ///
    /// Never fails. Degenerate inputs produce a descriptor that
    /// [`validate`](Self::validate) rejects.
    pub fn new(min: Vec3, max: Vec3, cell_size: f32) -> Self {
        let extent = max - min;
        let usable = extent.is_finite()
            && extent.min_element() > 0.0
            && cell_size.is_finite()
            && cell_size > 0.0;

        let dims = if usable {
            // `as` saturates, so a huge ratio lands on u32::MAX and shows up
            // as a cell count far above the ceiling.
            let d = (extent / cell_size).ceil();
            UVec3::new(d.x as u32, d.y as u32, d.z as u32)
        } else {
            UVec3::ZERO
        };

        let cell_count = (dims.x as u64)
            .checked_mul(dims.y as u64)
            .and_then(|xy| xy.checked_mul(dims.z as u64))
            .unwrap_or(u64::MAX);

        Self {
            min,
            max,
            cell_size,
            dims,
            cell_count,
        }
    }

    /// Total number of cells, computed without overflow.
    #[inline]
    pub fn cell_count(&self) -> u64 {
        self.cell_count
    }

    /// Integer cell coordinates of a position. Not clamped: positions outside
    /// the bounds yield coordinates outside `[0, dims)`.
    #[inline]
    pub fn cell_coords_of(&self, position: Vec3) -> IVec3 {
        let c = ((position - self.min) / self.cell_size).floor();
        IVec3::new(c.x as i32, c.y as i32, c.z as i32)
    }

    /// Linear cell index of a position.
    ///
    /// Coordinates are linearized with wrapping `u32` arithmetic and the
    /// result is reduced modulo the cell count, so a position outside the
    /// bounds still maps to some valid cell. Only call this on a grid that
    /// passed [`validate`](Self::validate).
    #[inline]
    pub fn cell_index_of(&self, position: Vec3) -> u32 {
        let c = self.cell_coords_of(position);
        let linear = (c.x as u32).wrapping_add(
            self.dims
                .x
                .wrapping_mul((c.y as u32).wrapping_add(self.dims.y.wrapping_mul(c.z as u32))),
        );
        match self.cell_count {
            0 => 0,
            n => linear % n as u32,
        }
    }

    /// Row-major linear index of in-grid coordinates.
    #[inline]
    pub fn linearize(&self, coords: UVec3) -> u32 {
        coords.x + self.dims.x * (coords.y + self.dims.y * coords.z)
    }

    /// Coordinates of a linear cell index.
    #[inline]
    pub fn cell_coords(&self, index: u32) -> UVec3 {
        UVec3::new(
            index % self.dims.x,
            (index / self.dims.x) % self.dims.y,
            index / (self.dims.x * self.dims.y),
        )
    }

    /// Visit the cell and every adjacent cell that lies inside the grid.
    ///
    /// Up to 27 cells; fewer at the grid faces.
    pub fn for_each_neighbour_cell(&self, index: u32, mut visit: impl FnMut(u32)) {
        let centre = self.cell_coords(index).as_ivec3();
        let dims = self.dims.as_ivec3();
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let c = centre + IVec3::new(dx, dy, dz);
                    if c.cmplt(IVec3::ZERO).any() || c.cmpge(dims).any() {
                        continue;
                    }
                    visit(self.linearize(c.as_uvec3()));
                }
            }
        }
    }

    /// Check whether a step can run on this grid.
    ///
    /// Returns the first reason found. Bounds and the agent ceiling are
    /// checked first, then either the all-pairs limit or the grid itself.
    pub fn validate(&self, agent_count: usize, gridding: bool, capacity: &Capacity) -> Option<HaltReason> {
        let extent = self.max - self.min;
        if !extent.is_finite() || extent.min_element() <= 0.0 {
            return Some(HaltReason::InvalidSettings(SettingsIssue::DegenerateBounds));
        }

        let agent_limit = capacity.max_agents.min(MAX_AGENTS);
        if agent_count > agent_limit {
            return Some(HaltReason::ResourceCeiling(ResourceIssue::TooManyAgents {
                agent_count: agent_count as u64,
                limit: agent_limit as u64,
            }));
        }

        if !gridding {
            if agent_count > MAX_AGENTS_PER_CELL {
                return Some(HaltReason::InvalidSettings(SettingsIssue::TooManyForBruteForce {
                    agent_count: agent_count as u64,
                }));
            }
            return None;
        }

        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Some(HaltReason::InvalidSettings(SettingsIssue::InvalidCellSize));
        }
        if self.cell_count == 0 {
            return Some(HaltReason::InvalidSettings(SettingsIssue::EmptyGrid));
        }

        let cell_limit = capacity.max_cells.min(MAX_CELLS) as u64;
        if self.cell_count > cell_limit {
            return Some(HaltReason::ResourceCeiling(ResourceIssue::TooManyCells {
                cell_count: self.cell_count,
                limit: cell_limit,
            }));
        }

        let agents_per_cell = agent_count as u64 / self.cell_count;
        if agents_per_cell > MAX_AGENTS_PER_CELL as u64 {
            return Some(HaltReason::InvalidSettings(SettingsIssue::TooDense { agents_per_cell }));
        }

        None
    }
}

/// WGSL helpers mirroring [`GridDescriptor::cell_index_of`] and
/// [`GridDescriptor::cell_coords`]. Expects a `params` uniform exposing
/// `min_pos`, `cell_size`, `grid_dims` and `cell_count`.
pub const GRID_WGSL: &str = r#"
fn cell_index_of(pos: vec3<f32>) -> u32 {
    let c = vec3<i32>(floor((pos - params.min_pos) / params.cell_size));
    let u = vec3<u32>(c);
    let linear = u.x + params.grid_dims.x * (u.y + params.grid_dims.y * u.z);
    return linear % params.cell_count;
}

fn cell_coords(index: u32) -> vec3<i32> {
    let dx = params.grid_dims.x;
    let dy = params.grid_dims.y;
    return vec3<i32>(vec3<u32>(index % dx, (index / dx) % dy, index / (dx * dy)));
}

fn linearize(c: vec3<i32>) -> u32 {
    let u = vec3<u32>(c);
    return u.x + params.grid_dims.x * (u.y + params.grid_dims.y * u.z);
}
"#;
