//! Agent representation and the double-buffered agent store.
//!
//! Agents are plain values laid out exactly like the GPU struct, so the same
//! slice can be uploaded with `bytemuck::cast_slice` without a conversion step.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// WGSL definition matching [`Agent`] byte for byte.
///
/// `vec3<f32>` is 16-byte aligned in WGSL, so each vector is followed by the
/// `u32` that fills its padding slot. Total stride is 32 bytes.
pub const AGENT_WGSL: &str = r#"
struct Agent {
    position: vec3<f32>,
    cell_index: u32,
    velocity: vec3<f32>,
    neighbours: u32,
};
"#;

/// A single boid.
///
/// Identity is positional: once the grid sort runs, an agent's index changes
/// every step.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Agent {
    pub position: Vec3,
    /// Cell memoized by the counting pass of the step that produced this agent.
    pub cell_index: u32,
    pub velocity: Vec3,
    /// Visible neighbours found during the last flocking update.
    pub neighbours: u32,
}

impl Agent {
    /// An agent with no cell and no neighbours yet.
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position,
            cell_index: 0,
            velocity,
            neighbours: 0,
        }
    }
}

/// Two equally sized agent buffers with a front/back designation.
///
/// The front buffer holds the agents of the last completed step. A step reads
/// the front, writes the back, and then [`swap`](AgentStore::swap) flips the
/// designation without copying. Both buffers are allocated once at the
/// configured capacity; only the active prefix `[0, len)` is simulated.
#[derive(Debug)]
pub struct AgentStore {
    buffers: [Vec<Agent>; 2],
    front: usize,
    len: usize,
}

impl AgentStore {
    /// Allocate both buffers at `capacity`, zero-filled.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffers: [vec![Agent::zeroed(); capacity], vec![Agent::zeroed(); capacity]],
            front: 0,
            len: 0,
        }
    }

    /// Number of slots in each buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffers[0].len()
    }

    /// Number of active agents.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Change the active agent count. Slots beyond the old count keep whatever
    /// the last [`fill`](AgentStore::fill) put there.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the capacity; callers validate first.
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.capacity(), "agent count {len} exceeds store capacity {}", self.capacity());
        self.len = len;
    }

    /// Overwrite every slot of the front buffer with `agents` and make the
    /// first `active` of them live.
    pub fn fill(&mut self, agents: &[Agent], active: usize) {
        let front = self.front;
        self.buffers[front].copy_from_slice(agents);
        self.buffers[1 - front].copy_from_slice(agents);
        self.set_len(active);
    }

    /// Active agents of the last completed step.
    #[inline]
    pub fn front(&self) -> &[Agent] {
        &self.buffers[self.front][..self.len]
    }

    /// Mutable view of the active front agents (used to memoize cell indices).
    #[inline]
    pub fn front_mut(&mut self) -> &mut [Agent] {
        let len = self.len;
        &mut self.buffers[self.front][..len]
    }

    /// Borrow the active front agents immutably and the back buffer mutably.
    pub fn split(&mut self) -> (&[Agent], &mut [Agent]) {
        let len = self.len;
        let (a, b) = self.buffers.split_at_mut(1);
        if self.front == 0 {
            (&a[0][..len], &mut b[0][..len])
        } else {
            (&b[0][..len], &mut a[0][..len])
        }
    }

    /// Make the back buffer the new front.
    #[inline]
    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }

    /// Index of the current front buffer (0 or 1).
    #[inline]
    pub fn front_index(&self) -> usize {
        self.front
    }
}
