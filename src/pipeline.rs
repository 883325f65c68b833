//! The CPU step pipeline.
//!
//! One step is a fixed sequence of data-parallel passes. Each pass is a
//! single rayon dispatch and returns only when every item is done, which is
//! the barrier the next pass relies on:
//!
//! ```text
//! clear ─▶ count ─▶ copy counts ─▶ scan levels ─▶ seed cursors ─▶ scatter ─▶ gather ─▶ flock
//! ```
//!
//! With gridding off the step is just the all-pairs flocking pass. Either way
//! the result lands in the back buffer, and the store is swapped.

use std::sync::atomic::AtomicU32;

use crate::agent::{Agent, AgentStore};
use crate::capacity::Capacity;
use crate::counting;
use crate::flocking;
use crate::scan::ScanPlan;
use crate::scatter;
use crate::settings::StepParams;

/// Working buffers of the CPU pipeline, allocated once from a [`Capacity`].
#[derive(Debug)]
pub struct CpuPipeline {
    histogram: Vec<AtomicU32>,
    offsets: Vec<u32>,
    cursors: Vec<AtomicU32>,
    sorted_indices: Vec<AtomicU32>,
    sorted: Vec<Agent>,
    scan_scratch: Vec<u32>,
    /// Cells used by the last gridded step, 0 if it was brute-forced.
    last_cell_count: usize,
}

fn atomic_zeroes(len: usize) -> Vec<AtomicU32> {
    (0..len).map(|_| AtomicU32::new(0)).collect()
}

impl CpuPipeline {
    pub fn new(capacity: &Capacity) -> Self {
        Self {
            histogram: atomic_zeroes(capacity.max_cells),
            offsets: vec![0; capacity.max_cells + 1],
            cursors: atomic_zeroes(capacity.max_cells),
            sorted_indices: atomic_zeroes(capacity.max_agents),
            sorted: vec![Agent::default(); capacity.max_agents],
            scan_scratch: Vec::new(),
            last_cell_count: 0,
        }
    }

    /// Run one complete step on `store` and swap it.
    ///
    /// `params` must have passed validation against the capacity this
    /// pipeline was built with.
    pub fn run(&mut self, store: &mut AgentStore, params: &StepParams) {
        if params.gridding {
            self.sort(store, params);
            let len = store.len();
            let n = self.last_cell_count;
            let (_, back) = store.split();
            flocking::update_gridded(&self.sorted[..len], &self.offsets[..=n], params, back);
        } else {
            self.last_cell_count = 0;
            let (front, back) = store.split();
            flocking::update_brute_force(front, params, back);
        }
        store.swap();
    }

    /// Counting sort of the front buffer into `sorted`, leaving bucket
    /// offsets in `offsets[..=cell_count]`.
    fn sort(&mut self, store: &mut AgentStore, params: &StepParams) {
        let n = params.grid.cell_count() as usize;
        let len = store.len();
        let front = store.front_mut();

        counting::clear(&self.histogram[..n]);
        counting::count_cells(front, &params.grid, &self.histogram[..n]);
        counting::copy_counts(&self.histogram[..n], &mut self.offsets[..=n]);
        ScanPlan::new(n).run(&mut self.offsets[1..=n], &mut self.scan_scratch);

        scatter::seed_cursors(&self.offsets[..n], &self.cursors[..n]);
        scatter::scatter(front, &self.cursors[..n], &self.sorted_indices[..len]);
        scatter::gather(front, &self.sorted_indices[..len], &mut self.sorted[..len]);

        self.last_cell_count = n;
        tracing::trace!(cells = n, agents = len, "sorted agents into grid");
    }

    /// Bucket offsets of the last gridded step, `cell_count + 1` entries.
    /// Empty after a brute-force step.
    pub fn offsets(&self) -> &[u32] {
        match self.last_cell_count {
            0 => &[],
            n => &self.offsets[..=n],
        }
    }

    /// Drop the offsets of the last step, e.g. after the agents were replaced.
    pub fn forget_offsets(&mut self) {
        self.last_cell_count = 0;
    }

    /// The sorted agents of the last gridded step.
    pub fn sorted(&self, len: usize) -> &[Agent] {
        &self.sorted[..len]
    }
}
