//! Hard ceilings and per-simulation buffer capacity.

/// Absolute ceiling on simulated agents.
pub const MAX_AGENTS: usize = 10_000_000;

/// Absolute ceiling on grid cells.
///
/// Also keeps every scan index below `u32::MAX` on the GPU: with a 512-wide
/// block the coarsest level never addresses past `MAX_CELLS + 512 * 512^2`.
pub const MAX_CELLS: usize = 100_000_000;

/// Density limit. With gridding on, `agents / cells` above this halts the
/// simulation; with gridding off, the agent count itself is held to it since
/// every agent visits every other one.
pub const MAX_AGENTS_PER_CELL: usize = 50_000;

/// Buffer sizes a simulation allocates up front.
///
/// Every buffer is sized from this at construction and regrown only by a
/// reset. A step never grows a buffer; settings that need more than was
/// allocated halt until the next reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capacity {
    pub max_agents: usize,
    pub max_cells: usize,
}

impl Capacity {
    /// Capacity clamped to the hard ceilings.
    pub fn new(max_agents: usize, max_cells: usize) -> Self {
        Self {
            max_agents: max_agents.min(MAX_AGENTS),
            max_cells: max_cells.clamp(1, MAX_CELLS),
        }
    }
}

impl Default for Capacity {
    fn default() -> Self {
        // Room for the default 500k agents in the default 120x60x60 grid.
        Self::new(1_000_000, 1 << 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_clamps_to_ceilings() {
        let cap = Capacity::new(usize::MAX, usize::MAX);
        assert_eq!(cap.max_agents, MAX_AGENTS);
        assert_eq!(cap.max_cells, MAX_CELLS);

        let cap = Capacity::new(10, 0);
        assert_eq!(cap.max_cells, 1);
    }
}
