//! WGSL sources of the GPU pipeline.
//!
//! One shader module per kernel. Pipelines use auto layout, so every kernel
//! declares exactly the bindings its entry point touches and nothing else.
//!
//! Per-item kernels run 256 threads per workgroup. When a dispatch needs more
//! than 65 535 workgroups it is folded into two dimensions, and kernels
//! recover the flat index from `num_workgroups`.

use crate::agent::AGENT_WGSL;
use crate::grid::GRID_WGSL;

/// Threads per workgroup for every kernel.
pub const WORKGROUP_SIZE: u32 = 256;

/// Uniform shared by all per-agent and per-cell kernels. Mirrors
/// [`FlockParams`](super::pipeline::FlockParams).
pub const PARAMS_WGSL: &str = r#"
struct FlockParams {
    min_pos: vec3<f32>,
    turn_margin: f32,
    max_pos: vec3<f32>,
    turn_speed: f32,
    grid_dims: vec3<u32>,
    cell_size: f32,
    attractor: vec3<f32>,
    attraction: f32,
    cell_count: u32,
    agent_count: u32,
    delta_time: f32,
    visual_range_sq: f32,
    protected_range_sq: f32,
    fov_fraction: f32,
    fov_cos: f32,
    cohesion: f32,
    separation: f32,
    alignment: f32,
    gravity: f32,
    max_speed: f32,
    min_speed: f32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
};
"#;

/// Uniform of one scan level. Mirrors
/// [`ScanParams`](super::pipeline::ScanParams).
pub const SCAN_PARAMS_WGSL: &str = r#"
struct ScanParams {
    coverage: u32,
    next_coverage: u32,
    len: u32,
    _pad: u32,
};
"#;

const FLAT_INDEX_WGSL: &str = r#"
fn flat_index(gid: vec3<u32>, groups: vec3<u32>) -> u32 {
    return gid.x + gid.y * groups.x * 256u;
}
"#;

/// Neighbourhood accumulation and steering, identical in meaning to
/// `flocking::Neighbourhood::consider` and `flocking::steer`.
const FLOCK_WGSL: &str = r#"
struct Hood {
    separation: vec3<f32>,
    position_sum: vec3<f32>,
    velocity_sum: vec3<f32>,
    flockmates: u32,
    neighbours: u32,
};

fn safe_normalize(v: vec3<f32>) -> vec3<f32> {
    let len_sq = dot(v, v);
    if len_sq > 0.0 {
        return v * inverseSqrt(len_sq);
    }
    return vec3<f32>(0.0);
}

fn in_view(heading: vec3<f32>, offset: vec3<f32>) -> bool {
    if params.fov_fraction >= 1.0 || all(heading == vec3<f32>(0.0)) {
        return true;
    }
    let dir = safe_normalize(offset);
    return all(dir == vec3<f32>(0.0)) || dot(heading, dir) >= params.fov_cos;
}

fn consider(hood: ptr<function, Hood>, agent: Agent, heading: vec3<f32>, other: Agent) {
    let offset = other.position - agent.position;
    let dist_sq = dot(offset, offset);
    if dist_sq >= params.visual_range_sq || !in_view(heading, offset) {
        return;
    }

    (*hood).neighbours += 1u;
    if dist_sq < params.protected_range_sq {
        if dist_sq > 0.0 {
            (*hood).separation -= offset / dist_sq;
        }
    } else {
        (*hood).position_sum += other.position;
        (*hood).velocity_sum += other.velocity;
        (*hood).flockmates += 1u;
    }
}

fn empty_hood() -> Hood {
    return Hood(vec3<f32>(0.0), vec3<f32>(0.0), vec3<f32>(0.0), 0u, 0u);
}

fn steer(agent: Agent, hood: Hood) -> Agent {
    let dt = params.delta_time;
    let p = agent.position;
    var v = agent.velocity;

    var accel = params.separation * params.max_speed * hood.separation;
    if hood.flockmates > 0u {
        let inv = 1.0 / f32(hood.flockmates);
        accel += params.cohesion * (hood.position_sum * inv - p);
        accel += params.alignment * (hood.velocity_sum * inv - v);
    }
    accel.y -= params.gravity;
    accel += safe_normalize(params.attractor - p) * params.attraction;
    v += accel * dt;

    let turn = vec3<f32>(params.turn_speed * params.max_speed * dt);
    let low = params.min_pos + vec3<f32>(params.turn_margin);
    let high = params.max_pos - vec3<f32>(params.turn_margin);
    v += select(vec3<f32>(0.0), turn, p < low);
    v -= select(vec3<f32>(0.0), turn, p > high);

    let speed = length(v);
    if speed > 0.0 {
        v *= min(max(speed, params.min_speed), params.max_speed) / speed;
    }

    var updated: Agent;
    updated.position = p + v * dt;
    updated.cell_index = agent.cell_index;
    updated.velocity = v;
    updated.neighbours = hood.neighbours;
    return updated;
}
"#;

const CLEAR_COUNTS_BODY: &str = r#"
@group(0) @binding(0) var<storage, read_write> counts: array<u32>;
@group(0) @binding(1) var<uniform> params: FlockParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = flat_index(gid, groups);
    if i >= params.cell_count {
        return;
    }
    counts[i] = 0u;
}
"#;

const COUNT_CELLS_BODY: &str = r#"
@group(0) @binding(0) var<storage, read_write> agents: array<Agent>;
@group(0) @binding(1) var<storage, read_write> counts: array<atomic<u32>>;
@group(0) @binding(2) var<uniform> params: FlockParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = flat_index(gid, groups);
    if i >= params.agent_count {
        return;
    }
    let cell = cell_index_of(agents[i].position);
    agents[i].cell_index = cell;
    atomicAdd(&counts[cell], 1u);
}
"#;

const COPY_COUNTS_BODY: &str = r#"
@group(0) @binding(0) var<storage, read> counts: array<u32>;
@group(0) @binding(1) var<storage, read_write> offsets: array<u32>;
@group(0) @binding(2) var<uniform> params: FlockParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = flat_index(gid, groups);
    if i >= params.cell_count {
        return;
    }
    if i == 0u {
        offsets[0] = 0u;
    }
    offsets[i + 1u] = counts[i];
}
"#;

// The scan runs over offsets[1..], so level index `k` lives at data[k + 1].
const SCAN_UP_SWEEP_BODY: &str = r#"
@group(0) @binding(0) var<storage, read_write> data: array<u32>;
@group(0) @binding(1) var<uniform> scan: ScanParams;

var<workgroup> tile: array<u32, 512>;

fn slot_index(block_id: u32, t: u32) -> u32 {
    return block_id * scan.next_coverage + (t + 1u) * scan.coverage - 1u;
}

@compute @workgroup_size(256)
fn main(
    @builtin(local_invocation_id) lid: vec3<u32>,
    @builtin(workgroup_id) wid: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {
    let block_id = wid.x + wid.y * groups.x;
    let t0 = lid.x * 2u;
    let t1 = t0 + 1u;
    let i0 = slot_index(block_id, t0);
    let i1 = slot_index(block_id, t1);

    var v0 = 0u;
    var v1 = 0u;
    if i0 < scan.len {
        v0 = data[i0 + 1u];
    }
    if i1 < scan.len {
        v1 = data[i1 + 1u];
    }
    tile[t0] = v0;
    tile[t1] = v1;
    workgroupBarrier();

    for (var stride = 1u; stride < 512u; stride = stride * 2u) {
        var a0 = 0u;
        var a1 = 0u;
        if t0 >= stride {
            a0 = tile[t0 - stride];
        }
        if t1 >= stride {
            a1 = tile[t1 - stride];
        }
        workgroupBarrier();
        tile[t0] += a0;
        tile[t1] += a1;
        workgroupBarrier();
    }

    if i0 < scan.len {
        data[i0 + 1u] = tile[t0];
    }
    if i1 < scan.len {
        data[i1 + 1u] = tile[t1];
    }
}
"#;

const SCAN_PROPAGATE_BODY: &str = r#"
@group(0) @binding(0) var<storage, read_write> data: array<u32>;
@group(0) @binding(1) var<uniform> scan: ScanParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let j = flat_index(gid, groups);
    if j >= scan.len / scan.coverage {
        return;
    }
    let block_id = j / 512u;
    if block_id == 0u || j % 512u == 511u {
        return;
    }
    let idx = (j + 1u) * scan.coverage - 1u;
    data[idx + 1u] += data[block_id * scan.next_coverage];
}
"#;

const SEED_CURSORS_BODY: &str = r#"
@group(0) @binding(0) var<storage, read> offsets: array<u32>;
@group(0) @binding(1) var<storage, read_write> cursors: array<u32>;
@group(0) @binding(2) var<uniform> params: FlockParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = flat_index(gid, groups);
    if i >= params.cell_count {
        return;
    }
    cursors[i] = offsets[i];
}
"#;

const SCATTER_BODY: &str = r#"
@group(0) @binding(0) var<storage, read> agents: array<Agent>;
@group(0) @binding(1) var<storage, read_write> cursors: array<atomic<u32>>;
@group(0) @binding(2) var<storage, read_write> sorted: array<Agent>;
@group(0) @binding(3) var<uniform> params: FlockParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = flat_index(gid, groups);
    if i >= params.agent_count {
        return;
    }
    let agent = agents[i];
    let slot = atomicAdd(&cursors[agent.cell_index], 1u);
    sorted[slot] = agent;
}
"#;

const FLOCK_GRIDDED_BODY: &str = r#"
@group(0) @binding(0) var<storage, read> sorted: array<Agent>;
@group(0) @binding(1) var<storage, read> offsets: array<u32>;
@group(0) @binding(2) var<storage, read_write> updated_agents: array<Agent>;
@group(0) @binding(3) var<uniform> params: FlockParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = flat_index(gid, groups);
    if i >= params.agent_count {
        return;
    }
    let agent = sorted[i];
    let heading = safe_normalize(agent.velocity);
    var hood = empty_hood();

    let centre = cell_coords(agent.cell_index);
    let dims = vec3<i32>(params.grid_dims);
    for (var dz = -1; dz <= 1; dz++) {
        for (var dy = -1; dy <= 1; dy++) {
            for (var dx = -1; dx <= 1; dx++) {
                let c = centre + vec3<i32>(dx, dy, dz);
                if any(c < vec3<i32>(0)) || any(c >= dims) {
                    continue;
                }
                let cell = linearize(c);
                let start = offsets[cell];
                let end = offsets[cell + 1u];
                for (var j = start; j < end; j++) {
                    if j != i {
                        consider(&hood, agent, heading, sorted[j]);
                    }
                }
            }
        }
    }

    updated_agents[i] = steer(agent, hood);
}
"#;

const FLOCK_BRUTE_BODY: &str = r#"
@group(0) @binding(0) var<storage, read> agents: array<Agent>;
@group(0) @binding(1) var<storage, read_write> updated_agents: array<Agent>;
@group(0) @binding(2) var<uniform> params: FlockParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = flat_index(gid, groups);
    if i >= params.agent_count {
        return;
    }
    let agent = agents[i];
    let heading = safe_normalize(agent.velocity);
    var hood = empty_hood();
    for (var j = 0u; j < params.agent_count; j++) {
        if j != i {
            consider(&hood, agent, heading, agents[j]);
        }
    }
    updated_agents[i] = steer(agent, hood);
}
"#;

pub fn clear_counts() -> String {
    [PARAMS_WGSL, FLAT_INDEX_WGSL, CLEAR_COUNTS_BODY].concat()
}

pub fn count_cells() -> String {
    [AGENT_WGSL, PARAMS_WGSL, FLAT_INDEX_WGSL, GRID_WGSL, COUNT_CELLS_BODY].concat()
}

pub fn copy_counts() -> String {
    [PARAMS_WGSL, FLAT_INDEX_WGSL, COPY_COUNTS_BODY].concat()
}

pub fn scan_up_sweep() -> String {
    [SCAN_PARAMS_WGSL, SCAN_UP_SWEEP_BODY].concat()
}

pub fn scan_propagate() -> String {
    [SCAN_PARAMS_WGSL, FLAT_INDEX_WGSL, SCAN_PROPAGATE_BODY].concat()
}

pub fn seed_cursors() -> String {
    [PARAMS_WGSL, FLAT_INDEX_WGSL, SEED_CURSORS_BODY].concat()
}

pub fn scatter() -> String {
    [AGENT_WGSL, PARAMS_WGSL, FLAT_INDEX_WGSL, SCATTER_BODY].concat()
}

pub fn flock_gridded() -> String {
    [AGENT_WGSL, PARAMS_WGSL, FLAT_INDEX_WGSL, GRID_WGSL, FLOCK_WGSL, FLOCK_GRIDDED_BODY].concat()
}

pub fn flock_brute() -> String {
    [AGENT_WGSL, PARAMS_WGSL, FLAT_INDEX_WGSL, FLOCK_WGSL, FLOCK_BRUTE_BODY].concat()
}
