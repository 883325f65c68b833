//! Scatter pass: place agents into their cell's bucket.
//!
//! After the scan, `offsets[c]..offsets[c + 1]` is the bucket of cell `c`.
//! Each agent claims the next free slot of its bucket with an atomic
//! increment on a per-cell cursor. Order inside a bucket is whatever the
//! increments happened to produce.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use crate::agent::Agent;

/// Start every cursor at its cell's bucket offset.
pub fn seed_cursors(offsets: &[u32], cursors: &[AtomicU32]) {
    cursors
        .par_iter()
        .zip(offsets.par_iter())
        .for_each(|(cursor, &offset)| cursor.store(offset, Ordering::Relaxed));
}

/// Claim a slot for every agent and record the agent's index there.
///
/// `agents` must carry the cell indices memoized by the counting pass of the
/// same step, and `cursors` must have been seeded from that step's offsets.
pub fn scatter(agents: &[Agent], cursors: &[AtomicU32], sorted_indices: &[AtomicU32]) {
    agents.par_iter().enumerate().for_each(|(i, agent)| {
        let slot = cursors[agent.cell_index as usize].fetch_add(1, Ordering::Relaxed);
        sorted_indices[slot as usize].store(i as u32, Ordering::Relaxed);
    });
}

/// Copy agents into sorted order.
pub fn gather(agents: &[Agent], sorted_indices: &[AtomicU32], sorted: &mut [Agent]) {
    sorted
        .par_iter_mut()
        .zip(sorted_indices.par_iter())
        .for_each(|(dst, index)| *dst = agents[index.load(Ordering::Relaxed) as usize]);
}
