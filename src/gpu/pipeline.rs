//! GPU step pipeline: buffers, pipelines, bind groups and pass recording.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::shaders::{self, WORKGROUP_SIZE};
use super::GpuContext;
use crate::agent::Agent;
use crate::capacity::Capacity;
use crate::error::GpuError;
use crate::scan::{ScanLevel, ScanPlan};
use crate::settings::StepParams;

/// Hardware limit on workgroups per dispatch dimension.
const MAX_WORKGROUPS_PER_DIM: u32 = 65_535;

/// Mirror of the WGSL `FlockParams` uniform. Every `vec3` is followed by the
/// scalar that fills its padding slot.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FlockParams {
    pub min_pos: [f32; 3],
    pub turn_margin: f32,
    pub max_pos: [f32; 3],
    pub turn_speed: f32,
    pub grid_dims: [u32; 3],
    pub cell_size: f32,
    pub attractor: [f32; 3],
    pub attraction: f32,
    pub cell_count: u32,
    pub agent_count: u32,
    pub delta_time: f32,
    pub visual_range_sq: f32,
    pub protected_range_sq: f32,
    pub fov_fraction: f32,
    pub fov_cos: f32,
    pub cohesion: f32,
    pub separation: f32,
    pub alignment: f32,
    pub gravity: f32,
    pub max_speed: f32,
    pub min_speed: f32,
    pub _pad: [u32; 3],
}

impl FlockParams {
    pub fn new(params: &StepParams) -> Self {
        let (attractor, attraction) = params
            .attractor
            .map_or(([0.0; 3], 0.0), |a| (a.position.to_array(), a.strength));
        let cell_count = if params.gridding {
            params.grid.cell_count() as u32
        } else {
            0
        };
        Self {
            min_pos: params.min_pos.to_array(),
            turn_margin: params.turn_margin,
            max_pos: params.max_pos.to_array(),
            turn_speed: params.turn_speed,
            grid_dims: params.grid.dims.to_array(),
            cell_size: params.grid.cell_size,
            attractor,
            attraction,
            cell_count,
            agent_count: params.agent_count as u32,
            delta_time: params.delta_time,
            visual_range_sq: params.visual_range_sq,
            protected_range_sq: params.protected_range_sq,
            fov_fraction: params.fov_fraction,
            fov_cos: params.fov_cos,
            cohesion: params.cohesion,
            separation: params.separation,
            alignment: params.alignment,
            gravity: params.gravity,
            max_speed: params.max_speed,
            min_speed: params.min_speed,
            _pad: [0; 3],
        }
    }
}

/// Mirror of the WGSL `ScanParams` uniform.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ScanParams {
    pub coverage: u32,
    pub next_coverage: u32,
    pub len: u32,
    pub _pad: u32,
}

impl ScanParams {
    fn new(level: &ScanLevel, len: usize) -> Self {
        Self {
            coverage: level.coverage as u32,
            next_coverage: level.next_coverage as u32,
            len: len as u32,
            _pad: 0,
        }
    }
}

/// Workgroup grid for `workgroups` groups, folded into two dimensions when it
/// exceeds the per-dimension limit. Never launches fewer groups than asked.
pub fn dispatch_size(workgroups: u32) -> (u32, u32) {
    if workgroups <= MAX_WORKGROUPS_PER_DIM {
        return (workgroups, 1);
    }
    let y = workgroups.div_ceil(MAX_WORKGROUPS_PER_DIM);
    (workgroups.div_ceil(y), y)
}

fn groups_for(items: usize) -> u32 {
    (items as u32).div_ceil(WORKGROUP_SIZE)
}

struct Kernels {
    clear_counts: wgpu::ComputePipeline,
    count_cells: wgpu::ComputePipeline,
    copy_counts: wgpu::ComputePipeline,
    scan_up_sweep: wgpu::ComputePipeline,
    scan_propagate: wgpu::ComputePipeline,
    seed_cursors: wgpu::ComputePipeline,
    scatter: wgpu::ComputePipeline,
    flock_gridded: wgpu::ComputePipeline,
    flock_brute: wgpu::ComputePipeline,
}

impl Kernels {
    fn new(device: &wgpu::Device) -> Self {
        Self {
            clear_counts: create_compute_pipeline(device, &shaders::clear_counts(), "Clear Counts"),
            count_cells: create_compute_pipeline(device, &shaders::count_cells(), "Count Cells"),
            copy_counts: create_compute_pipeline(device, &shaders::copy_counts(), "Copy Counts"),
            scan_up_sweep: create_compute_pipeline(device, &shaders::scan_up_sweep(), "Scan Up-Sweep"),
            scan_propagate: create_compute_pipeline(device, &shaders::scan_propagate(), "Scan Propagate"),
            seed_cursors: create_compute_pipeline(device, &shaders::seed_cursors(), "Seed Cursors"),
            scatter: create_compute_pipeline(device, &shaders::scatter(), "Scatter"),
            flock_gridded: create_compute_pipeline(device, &shaders::flock_gridded(), "Flock Gridded"),
            flock_brute: create_compute_pipeline(device, &shaders::flock_brute(), "Flock Brute Force"),
        }
    }
}

/// Bind groups, with a pair for every kernel that touches the agent buffers:
/// index `f` is used while agent buffer `f` is the front.
struct BindGroups {
    clear_counts: wgpu::BindGroup,
    count_cells: [wgpu::BindGroup; 2],
    copy_counts: wgpu::BindGroup,
    scan_up_sweep: Vec<wgpu::BindGroup>,
    scan_propagate: Vec<wgpu::BindGroup>,
    seed_cursors: wgpu::BindGroup,
    scatter: [wgpu::BindGroup; 2],
    flock_gridded: [wgpu::BindGroup; 2],
    flock_brute: [wgpu::BindGroup; 2],
}

/// GPU resources for the whole step.
#[allow(dead_code)] // Buffers are referenced through the bind groups
pub struct GpuPipeline {
    agents: [wgpu::Buffer; 2],
    sorted: wgpu::Buffer,
    counts: wgpu::Buffer,
    offsets: wgpu::Buffer,
    cursors: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    /// One uniform per scan level, since every queue write lands before the
    /// step's single submission runs.
    scan_params: Vec<wgpu::Buffer>,
    kernels: Kernels,
    groups: BindGroups,
    capacity: Capacity,
    front: usize,
    last_cell_count: usize,
}

impl GpuPipeline {
    pub fn new(ctx: &GpuContext, capacity: Capacity) -> Result<Self, GpuError> {
        let device = &ctx.device;
        let limit = ctx.max_storage_binding();

        // Zero-sized bindings are invalid, so every buffer holds at least one element.
        let agent_bytes = (capacity.max_agents.max(1) * std::mem::size_of::<Agent>()) as u64;
        let cell_bytes = (capacity.max_cells * std::mem::size_of::<u32>()) as u64;
        let offset_bytes = cell_bytes + std::mem::size_of::<u32>() as u64;
        for (buffer, required) in [("agents", agent_bytes), ("offsets", offset_bytes)] {
            if required > limit {
                return Err(GpuError::CapacityExceedsLimits { buffer, required, limit });
            }
        }

        let storage = |label: &str, size: u64, extra: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | extra,
                mapped_at_creation: false,
            })
        };

        let agents = [
            storage("Agents A", agent_bytes, wgpu::BufferUsages::COPY_DST),
            storage("Agents B", agent_bytes, wgpu::BufferUsages::COPY_DST),
        ];
        let sorted = storage("Sorted Agents", agent_bytes, wgpu::BufferUsages::empty());
        let counts = storage("Cell Counts", cell_bytes, wgpu::BufferUsages::empty());
        let offsets = storage("Cell Offsets", offset_bytes, wgpu::BufferUsages::empty());
        let cursors = storage("Cell Cursors", cell_bytes, wgpu::BufferUsages::empty());

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Flock Params"),
            contents: bytemuck::cast_slice(&[FlockParams::default()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let max_levels = ScanPlan::new(capacity.max_cells).levels().len();
        let scan_params: Vec<wgpu::Buffer> = (0..max_levels)
            .map(|k| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("Scan Params {k}")),
                    size: std::mem::size_of::<ScanParams>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        let kernels = Kernels::new(device);

        let groups = BindGroups {
            clear_counts: create_bind_group(device, &kernels.clear_counts, "Clear Counts", &[&counts, &params_buffer]),
            count_cells: [0, 1].map(|f| {
                create_bind_group(device, &kernels.count_cells, "Count Cells", &[&agents[f], &counts, &params_buffer])
            }),
            copy_counts: create_bind_group(device, &kernels.copy_counts, "Copy Counts", &[&counts, &offsets, &params_buffer]),
            scan_up_sweep: scan_params
                .iter()
                .map(|p| create_bind_group(device, &kernels.scan_up_sweep, "Scan Up-Sweep", &[&offsets, p]))
                .collect(),
            scan_propagate: scan_params
                .iter()
                .map(|p| create_bind_group(device, &kernels.scan_propagate, "Scan Propagate", &[&offsets, p]))
                .collect(),
            seed_cursors: create_bind_group(device, &kernels.seed_cursors, "Seed Cursors", &[&offsets, &cursors, &params_buffer]),
            scatter: [0, 1].map(|f| {
                create_bind_group(device, &kernels.scatter, "Scatter", &[&agents[f], &cursors, &sorted, &params_buffer])
            }),
            flock_gridded: [0, 1].map(|f| {
                create_bind_group(
                    device,
                    &kernels.flock_gridded,
                    "Flock Gridded",
                    &[&sorted, &offsets, &agents[1 - f], &params_buffer],
                )
            }),
            flock_brute: [0, 1].map(|f| {
                create_bind_group(device, &kernels.flock_brute, "Flock Brute Force", &[&agents[f], &agents[1 - f], &params_buffer])
            }),
        };

        tracing::debug!(
            max_agents = capacity.max_agents,
            max_cells = capacity.max_cells,
            scan_levels = max_levels,
            "GPU pipeline allocated"
        );

        Ok(Self {
            agents,
            sorted,
            counts,
            offsets,
            cursors,
            params_buffer,
            scan_params,
            kernels,
            groups,
            capacity,
            front: 0,
            last_cell_count: 0,
        })
    }

    #[inline]
    pub fn capacity(&self) -> &Capacity {
        &self.capacity
    }

    /// Overwrite both agent buffers with `agents` and make buffer A the front.
    pub fn upload(&mut self, queue: &wgpu::Queue, agents: &[Agent]) {
        debug_assert!(agents.len() <= self.capacity.max_agents);
        let bytes = bytemuck::cast_slice(agents);
        queue.write_buffer(&self.agents[0], 0, bytes);
        queue.write_buffer(&self.agents[1], 0, bytes);
        self.front = 0;
        self.last_cell_count = 0;
    }

    /// Record and submit one full step, then swap the agent buffers.
    ///
    /// `params` must have passed validation against this pipeline's capacity.
    pub fn run(&mut self, ctx: &GpuContext, params: &StepParams) {
        let uniforms = FlockParams::new(params);
        ctx.queue.write_buffer(&self.params_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let f = self.front;
        let agent_groups = groups_for(params.agent_count);
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Step Encoder"),
        });

        if params.gridding {
            let n = params.grid.cell_count() as usize;
            let cell_groups = groups_for(n);
            let plan = ScanPlan::new(n);
            for (level, buffer) in plan.levels().iter().zip(&self.scan_params) {
                ctx.queue
                    .write_buffer(buffer, 0, bytemuck::cast_slice(&[ScanParams::new(level, n)]));
            }

            compute_pass(&mut encoder, "Clear Counts", &self.kernels.clear_counts, &self.groups.clear_counts, cell_groups);
            compute_pass(&mut encoder, "Count Cells", &self.kernels.count_cells, &self.groups.count_cells[f], agent_groups);
            compute_pass(&mut encoder, "Copy Counts", &self.kernels.copy_counts, &self.groups.copy_counts, cell_groups);

            for (k, level) in plan.levels().iter().enumerate() {
                compute_pass(
                    &mut encoder,
                    "Scan Up-Sweep",
                    &self.kernels.scan_up_sweep,
                    &self.groups.scan_up_sweep[k],
                    level.block_count(n) as u32,
                );
            }
            for k in (0..plan.levels().len().saturating_sub(1)).rev() {
                let level = &plan.levels()[k];
                compute_pass(
                    &mut encoder,
                    "Scan Propagate",
                    &self.kernels.scan_propagate,
                    &self.groups.scan_propagate[k],
                    groups_for(level.element_count(n)),
                );
            }

            compute_pass(&mut encoder, "Seed Cursors", &self.kernels.seed_cursors, &self.groups.seed_cursors, cell_groups);
            compute_pass(&mut encoder, "Scatter", &self.kernels.scatter, &self.groups.scatter[f], agent_groups);
            compute_pass(&mut encoder, "Flock Gridded", &self.kernels.flock_gridded, &self.groups.flock_gridded[f], agent_groups);
            self.last_cell_count = n;
        } else {
            compute_pass(&mut encoder, "Flock Brute Force", &self.kernels.flock_brute, &self.groups.flock_brute[f], agent_groups);
            self.last_cell_count = 0;
        }

        ctx.queue.submit(Some(encoder.finish()));
        self.front = 1 - f;
    }

    /// Active agents of the last completed step.
    pub fn read_agents(&self, ctx: &GpuContext, len: usize) -> Result<Vec<Agent>, GpuError> {
        ctx.read_buffer(&self.agents[self.front], 0, len)
    }

    /// Bucket offsets of the last gridded step, or nothing after a brute-force step.
    pub fn read_offsets(&self, ctx: &GpuContext) -> Result<Vec<u32>, GpuError> {
        match self.last_cell_count {
            0 => Ok(Vec::new()),
            n => ctx.read_buffer(&self.offsets, 0, n + 1),
        }
    }
}

fn compute_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    workgroups: u32,
) {
    if workgroups == 0 {
        return;
    }
    let (x, y) = dispatch_size(workgroups);
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.dispatch_workgroups(x, y, 1);
}

fn create_compute_pipeline(device: &wgpu::Device, source: &str, label: &str) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: None, // Auto layout
        module: &module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Bind `buffers` to bindings `0..n` of group 0.
fn create_bind_group(
    device: &wgpu::Device,
    pipeline: &wgpu::ComputePipeline,
    label: &str,
    buffers: &[&wgpu::Buffer],
) -> wgpu::BindGroup {
    let layout = pipeline.get_bind_group_layout(0);
    let entries: Vec<wgpu::BindGroupEntry> = buffers
        .iter()
        .enumerate()
        .map(|(i, buffer)| wgpu::BindGroupEntry {
            binding: i as u32,
            resource: buffer.as_entire_binding(),
        })
        .collect();
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &layout,
        entries: &entries,
    })
}
