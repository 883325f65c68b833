//! Properties of one CPU grid step: the sort is a permutation, the offsets
//! bracket every cell, and gridding finds exactly the neighbours the
//! all-pairs update finds.

use flockgrid::pipeline::CpuPipeline;
use flockgrid::scan::{exclusive_scan, ScanPlan, SCAN_BLOCK_WIDTH};
use flockgrid::{Agent, AgentStore, Capacity, SimulationSettings, Spawner, StepParams, Vec3};

fn settings(agent_count: usize) -> SimulationSettings {
    SimulationSettings {
        agent_count,
        min_pos: Vec3::new(-60.0, -40.0, -30.0),
        max_pos: Vec3::new(60.0, 40.0, 30.0),
        visual_range: 8.0,
        protected_range: 2.0,
        ..Default::default()
    }
}

fn key(agent: &Agent) -> [u32; 6] {
    [
        agent.position.x.to_bits(),
        agent.position.y.to_bits(),
        agent.position.z.to_bits(),
        agent.velocity.x.to_bits(),
        agent.velocity.y.to_bits(),
        agent.velocity.z.to_bits(),
    ]
}

/// Spawn, run one gridded step, and hand back the input plus the pipeline.
fn sorted_step(agent_count: usize, seed: u64) -> (Vec<Agent>, CpuPipeline, StepParams) {
    let settings = settings(agent_count);
    let params = StepParams::new(&settings, 0.02);
    let cells = params.grid.cell_count() as usize;
    let agents = Spawner::new(seed).spawn(agent_count, &settings);

    let mut store = AgentStore::with_capacity(agent_count);
    store.fill(&agents, agent_count);
    let mut pipeline = CpuPipeline::new(&Capacity::new(agent_count, cells));
    pipeline.run(&mut store, &params);
    (agents, pipeline, params)
}

#[test]
fn test_sort_is_a_permutation() {
    let (agents, pipeline, _) = sorted_step(5_000, 3);

    let mut before: Vec<_> = agents.iter().map(key).collect();
    let mut after: Vec<_> = pipeline.sorted(agents.len()).iter().map(key).collect();
    before.sort_unstable();
    after.sort_unstable();
    assert_eq!(before, after);
}

#[test]
fn test_offsets_bracket_cells() {
    let (agents, pipeline, params) = sorted_step(5_000, 4);
    let offsets = pipeline.offsets();
    let sorted = pipeline.sorted(agents.len());

    assert_eq!(offsets.len() as u64, params.grid.cell_count() + 1);
    assert_eq!(offsets[0], 0);
    assert_eq!(*offsets.last().unwrap() as usize, agents.len());
    assert!(offsets.windows(2).all(|w| w[0] <= w[1]));

    for cell in 0..offsets.len() - 1 {
        for agent in &sorted[offsets[cell] as usize..offsets[cell + 1] as usize] {
            assert_eq!(agent.cell_index as usize, cell);
            assert_eq!(agent.cell_index, params.grid.cell_index_of(agent.position));
        }
    }
}

#[test]
fn test_offsets_match_reference_histogram() {
    let (agents, pipeline, params) = sorted_step(2_000, 5);
    let mut counts = vec![0u32; params.grid.cell_count() as usize];
    for agent in &agents {
        counts[params.grid.cell_index_of(agent.position) as usize] += 1;
    }
    assert_eq!(pipeline.offsets(), exclusive_scan(&counts).as_slice());
}

#[test]
fn test_gridded_neighbours_match_brute_force() {
    let agent_count = 1_500;
    let gridded = settings(agent_count);
    let brute = SimulationSettings {
        gridding: false,
        ..gridded.clone()
    };
    let agents = Spawner::new(9).spawn(agent_count, &gridded);
    let cells = gridded.grid().cell_count() as usize;

    let run = |settings: &SimulationSettings| {
        let mut store = AgentStore::with_capacity(agent_count);
        store.fill(&agents, agent_count);
        let mut pipeline = CpuPipeline::new(&Capacity::new(agent_count, cells));
        pipeline.run(&mut store, &StepParams::new(settings, 0.02));
        let mut counts: Vec<u32> = store.front().iter().map(|a| a.neighbours).collect();
        counts.sort_unstable();
        counts
    };

    let from_grid = run(&gridded);
    let from_pairs = run(&brute);
    assert_eq!(from_grid, from_pairs);
    assert!(from_grid.iter().any(|&n| n > 0));
}

#[test]
fn test_four_agents_in_two_cells() {
    let settings = SimulationSettings {
        agent_count: 4,
        min_pos: Vec3::ZERO,
        max_pos: Vec3::new(20.0, 10.0, 10.0),
        visual_range: 10.0,
        ..Default::default()
    };
    let params = StepParams::new(&settings, 0.01);
    assert_eq!(params.grid.cell_count(), 2);

    let agents: Vec<Agent> = [
        Vec3::new(11.0, 1.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(12.0, 2.0, 2.0),
        Vec3::new(2.0, 2.0, 2.0),
    ]
    .into_iter()
    .map(|p| Agent::new(p, Vec3::X))
    .collect();
    let mut store = AgentStore::with_capacity(4);
    store.fill(&agents, 4);
    let mut pipeline = CpuPipeline::new(&Capacity::new(4, 2));
    pipeline.run(&mut store, &params);

    assert_eq!(pipeline.offsets(), &[0, 2, 4]);
    let sorted = pipeline.sorted(4);
    let mut low: Vec<f32> = sorted[..2].iter().map(|a| a.position.x).collect();
    let mut high: Vec<f32> = sorted[2..].iter().map(|a| a.position.x).collect();
    low.sort_by(f32::total_cmp);
    high.sort_by(f32::total_cmp);
    assert_eq!(low, vec![1.0, 2.0]);
    assert_eq!(high, vec![11.0, 12.0]);
}

#[test]
fn test_multi_level_scan_matches_serial() {
    let len = SCAN_BLOCK_WIDTH * SCAN_BLOCK_WIDTH + 7;
    let plan = ScanPlan::new(len);
    assert_eq!(plan.levels().len(), 2);

    let mut data: Vec<u32> = (0..len as u32).map(|i| i % 5).collect();
    let mut expected = data.clone();
    for i in 1..len {
        expected[i] += expected[i - 1];
    }
    let mut scratch = Vec::new();
    plan.run(&mut data, &mut scratch);
    assert_eq!(data, expected);
}
