//! Hierarchical prefix sum.
//!
//! The scan works in levels. Level `k` looks at every `W^k`-th element of the
//! data (its *coverage*): level element `j` lives at index
//! `(j + 1) * coverage - 1`. Each level is cut into blocks of
//! [`SCAN_BLOCK_WIDTH`] elements that are scanned independently, leaving each
//! block's total at its last slot, which is exactly where the next level's
//! elements are. Once the coarsest level fits in one block, propagation walks
//! back down adding every block's preceding total to its members.
//!
//! ```text
//! up-sweep    level 0 blocks ─▶ level 1 blocks ─▶ ... ─▶ single block
//! propagate   ... ─▶ level 1 ─▶ level 0
//! ```
//!
//! Each pass touches disjoint blocks, so a level is one parallel dispatch on
//! the CPU and one compute pass on the GPU. The same level list drives both.

use rayon::prelude::*;

/// Elements scanned by one block (one 256-thread workgroup, two per thread).
pub const SCAN_BLOCK_WIDTH: usize = 512;

/// One level of the hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanLevel {
    /// Stride between this level's elements in the data.
    pub coverage: usize,
    /// Stride of the next level, `coverage * SCAN_BLOCK_WIDTH`. Also the span
    /// of data covered by one block of this level.
    pub next_coverage: usize,
}

impl ScanLevel {
    fn new(coverage: usize) -> Self {
        Self {
            coverage,
            next_coverage: coverage * SCAN_BLOCK_WIDTH,
        }
    }

    /// Number of level elements inside `len` data elements.
    #[inline]
    pub fn element_count(&self, len: usize) -> usize {
        len / self.coverage
    }

    /// Number of blocks needed for this level over `len` data elements.
    #[inline]
    pub fn block_count(&self, len: usize) -> usize {
        self.element_count(len).div_ceil(SCAN_BLOCK_WIDTH)
    }
}

/// The levels needed to scan `len` elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanPlan {
    len: usize,
    levels: Vec<ScanLevel>,
}

impl ScanPlan {
    /// Plan the levels for `len` elements.
    pub fn new(len: usize) -> Self {
        let mut levels = Vec::new();
        if len > 1 {
            let mut level = ScanLevel::new(1);
            loop {
                levels.push(level);
                if level.element_count(len) <= SCAN_BLOCK_WIDTH {
                    break;
                }
                level = ScanLevel::new(level.next_coverage);
            }
        }
        Self { len, levels }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Levels from finest to coarsest.
    #[inline]
    pub fn levels(&self) -> &[ScanLevel] {
        &self.levels
    }

    /// Levels that need a propagation pass, coarsest first. The coarsest
    /// level is a single block and needs none.
    pub fn propagate_levels(&self) -> impl Iterator<Item = &ScanLevel> {
        let n = self.levels.len().saturating_sub(1);
        self.levels[..n].iter().rev()
    }

    /// Turn `data` into its inclusive prefix sum in place.
    ///
    /// `data` must be exactly as long as the plan.
    pub fn run(&self, data: &mut [u32], scratch: &mut Vec<u32>) {
        debug_assert_eq!(data.len(), self.len);
        for level in &self.levels {
            up_sweep(data, level);
        }
        for level in self.propagate_levels() {
            propagate(data, level, scratch);
        }
    }
}

/// Inclusive scan of every block of one level, in place.
///
/// Slots past the end of the data count as zero and are never written.
pub fn up_sweep(data: &mut [u32], level: &ScanLevel) {
    let coverage = level.coverage;
    data.par_chunks_mut(level.next_coverage).for_each(|block| {
        let mut sum = 0u32;
        let mut idx = coverage - 1;
        while idx < block.len() {
            sum += block[idx];
            block[idx] = sum;
            idx += coverage;
        }
    });
}

/// Add each block's preceding total to its members, except the block-end
/// element which already holds a complete sum from the coarser level.
///
/// `scratch` receives the block bases and is reused across calls.
pub fn propagate(data: &mut [u32], level: &ScanLevel, scratch: &mut Vec<u32>) {
    let coverage = level.coverage;
    let span = level.next_coverage;

    scratch.clear();
    scratch.extend((1..data.len().div_ceil(span)).map(|b| data[b * span - 1]));

    data.par_chunks_mut(span)
        .skip(1)
        .zip(scratch.par_iter())
        .for_each(|(block, &base)| {
            let mut idx = coverage - 1;
            // The last slot of a full block is the block-end element.
            let end = block.len().min(span - 1);
            while idx < end {
                block[idx] += base;
                idx += coverage;
            }
        });
}

/// Inclusive prefix sum of `data` in place.
pub fn inclusive_scan(data: &mut [u32]) {
    ScanPlan::new(data.len()).run(data, &mut Vec::new());
}

/// Exclusive prefix sum with a trailing total: `n + 1` entries, the first is
/// zero and the last is the sum of `values`.
pub fn exclusive_scan(values: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(values.len() + 1);
    out.push(0);
    out.extend_from_slice(values);
    inclusive_scan(&mut out[1..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn reference_inclusive(values: &[u32]) -> Vec<u32> {
        values
            .iter()
            .scan(0u32, |acc, &v| {
                *acc += v;
                Some(*acc)
            })
            .collect()
    }

    fn random_values(len: usize, seed: u64) -> Vec<u32> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(0..8)).collect()
    }

    fn check(len: usize) {
        let values = random_values(len, len as u64);
        let mut data = values.clone();
        inclusive_scan(&mut data);
        assert_eq!(data, reference_inclusive(&values), "len {len}");
    }

    #[test]
    fn test_plan_levels() {
        assert!(ScanPlan::new(0).levels().is_empty());
        assert!(ScanPlan::new(1).levels().is_empty());
        assert_eq!(ScanPlan::new(2).levels().len(), 1);
        assert_eq!(ScanPlan::new(SCAN_BLOCK_WIDTH).levels().len(), 1);
        assert_eq!(ScanPlan::new(SCAN_BLOCK_WIDTH + 1).levels().len(), 2);

        let plan = ScanPlan::new(300_000);
        assert_eq!(
            plan.levels(),
            &[
                ScanLevel { coverage: 1, next_coverage: 512 },
                ScanLevel { coverage: 512, next_coverage: 512 * 512 },
                ScanLevel { coverage: 512 * 512, next_coverage: 512 * 512 * 512 },
            ]
        );
        assert_eq!(plan.propagate_levels().count(), 2);
        assert_eq!(plan.propagate_levels().next().map(|l| l.coverage), Some(512));
    }

    #[test]
    fn test_level_counts() {
        let level = ScanLevel::new(512);
        assert_eq!(level.element_count(1023), 1);
        assert_eq!(level.element_count(1024), 2);
        assert_eq!(level.block_count(1024), 1);
        assert_eq!(ScanLevel::new(1).block_count(513), 2);
    }

    #[test]
    fn test_single_element() {
        let mut data = vec![7];
        inclusive_scan(&mut data);
        assert_eq!(data, vec![7]);
        assert_eq!(exclusive_scan(&[7]), vec![0, 7]);
    }

    #[test]
    fn test_exactly_one_block() {
        check(SCAN_BLOCK_WIDTH);
    }

    #[test]
    fn test_one_past_a_block() {
        check(SCAN_BLOCK_WIDTH + 1);
    }

    #[test]
    fn test_two_levels_uneven() {
        check(SCAN_BLOCK_WIDTH * 37 + 11);
        check(SCAN_BLOCK_WIDTH * SCAN_BLOCK_WIDTH + 1);
    }

    #[test]
    fn test_three_levels() {
        check(300_000);
        check(SCAN_BLOCK_WIDTH * SCAN_BLOCK_WIDTH * 2 + 5);
    }

    #[test]
    fn test_exclusive_scan_total() {
        let values = random_values(4_000, 9);
        let out = exclusive_scan(&values);
        assert_eq!(out.len(), values.len() + 1);
        assert_eq!(out[0], 0);
        assert_eq!(*out.last().unwrap(), values.iter().sum::<u32>());
        for i in 0..values.len() {
            assert_eq!(out[i + 1] - out[i], values[i]);
        }
    }

    #[test]
    fn test_all_ones() {
        let mut data = vec![1u32; 5_000];
        inclusive_scan(&mut data);
        assert!(data.iter().enumerate().all(|(i, &v)| v == i as u32 + 1));
    }
}
