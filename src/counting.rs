//! Counting pass: per-cell agent histogram.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use crate::agent::Agent;
use crate::grid::GridDescriptor;

/// Zero the histogram entries of the active cells.
pub fn clear(histogram: &[AtomicU32]) {
    histogram.par_iter().for_each(|count| count.store(0, Ordering::Relaxed));
}

/// Compute every agent's cell, memoize it into the agent, and count it.
///
/// `histogram` must hold at least `grid.cell_count()` entries and be cleared.
pub fn count_cells(agents: &mut [Agent], grid: &GridDescriptor, histogram: &[AtomicU32]) {
    agents.par_iter_mut().for_each(|agent| {
        let cell = grid.cell_index_of(agent.position);
        agent.cell_index = cell;
        histogram[cell as usize].fetch_add(1, Ordering::Relaxed);
    });
}

/// Copy the histogram into `offsets[1..=n]` and set `offsets[0] = 0`, ready
/// for an inclusive scan of `offsets[1..]`.
pub fn copy_counts(histogram: &[AtomicU32], offsets: &mut [u32]) {
    debug_assert_eq!(offsets.len(), histogram.len() + 1);
    offsets[0] = 0;
    offsets[1..]
        .par_iter_mut()
        .zip(histogram.par_iter())
        .for_each(|(slot, count)| *slot = count.load(Ordering::Relaxed));
}
