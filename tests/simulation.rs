//! End-to-end behaviour of [`Simulation`] on the CPU backend: halting and
//! recovery, settings files, spawning and the active agent count.

use std::fs;
use std::time::Duration;

use flockgrid::prelude::*;
use flockgrid::{Spawner, MAX_AGENTS_PER_CELL};

fn settings(agent_count: usize) -> SimulationSettings {
    SimulationSettings {
        agent_count,
        min_pos: Vec3::splat(-50.0),
        max_pos: Vec3::splat(50.0),
        ..Default::default()
    }
}

fn build(agent_count: usize) -> Simulation {
    Simulation::builder()
        .with_settings(settings(agent_count))
        .with_seed(21)
        .build()
        .unwrap()
}

/// Apply `broken`, expect `reason`, then restore and expect a completed step.
fn assert_halts_and_recovers(sim: &mut Simulation, broken: SimulationSettings, reason: HaltReason) {
    let good = sim.settings().clone();
    let before = sim.agent_snapshot().unwrap().into_owned();

    sim.configure(broken);
    assert_eq!(sim.step(0.016), StepOutcome::Skipped(reason));
    assert_eq!(sim.status(), Some(reason));
    assert_eq!(sim.agent_snapshot().unwrap().as_ref(), &before[..]);

    sim.configure(good);
    assert_eq!(sim.step(0.016), StepOutcome::Completed);
    assert_eq!(sim.status(), None);
}

// ============================================================================
// Halts
// ============================================================================

#[test]
fn test_degenerate_bounds_halt() {
    let mut sim = build(200);
    let broken = SimulationSettings {
        max_pos: Vec3::new(50.0, -50.0, 50.0),
        ..settings(200)
    };
    let reason = HaltReason::InvalidSettings(SettingsIssue::DegenerateBounds);
    assert_halts_and_recovers(&mut sim, broken, reason);
}

#[test]
fn test_invalid_cell_size_halt() {
    let mut sim = build(200);
    let broken = SimulationSettings {
        cell_size_mult: 0.0,
        ..settings(200)
    };
    let reason = HaltReason::InvalidSettings(SettingsIssue::InvalidCellSize);
    assert_halts_and_recovers(&mut sim, broken, reason);
}

#[test]
fn test_non_finite_parameter_halt() {
    let mut sim = build(200);
    let broken = SimulationSettings {
        cohesion: f32::NAN,
        ..settings(200)
    };
    let reason = HaltReason::InvalidSettings(SettingsIssue::NonFiniteParameter);
    assert_halts_and_recovers(&mut sim, broken, reason);

    assert_eq!(sim.step(f32::INFINITY), StepOutcome::Skipped(reason));
    assert_eq!(sim.step(0.016), StepOutcome::Completed);
}

#[test]
fn test_cell_ceiling_halt() {
    let mut sim = build(200);
    let broken = SimulationSettings {
        cell_size_mult: 0.5,
        ..settings(200)
    };
    let reason = HaltReason::ResourceCeiling(ResourceIssue::TooManyCells {
        cell_count: 8000,
        limit: 1000,
    });
    assert_halts_and_recovers(&mut sim, broken, reason);
}

#[test]
fn test_agent_ceiling_halt() {
    let mut sim = build(200);
    let reason = HaltReason::ResourceCeiling(ResourceIssue::TooManyAgents {
        agent_count: 201,
        limit: 200,
    });
    assert_halts_and_recovers(&mut sim, settings(201), reason);
}

#[test]
fn test_density_and_brute_force_limits() {
    let crowd = MAX_AGENTS_PER_CELL + 1;
    let mut sim = Simulation::builder()
        .with_settings(settings(100))
        .with_capacity(Capacity::new(crowd, 1000))
        .build()
        .unwrap();

    // A 1x1x1 box with a visual range of 10 is a single cell.
    let packed = SimulationSettings {
        agent_count: crowd,
        min_pos: Vec3::ZERO,
        max_pos: Vec3::ONE,
        ..Default::default()
    };
    let reason = HaltReason::InvalidSettings(SettingsIssue::TooDense {
        agents_per_cell: crowd as u64,
    });
    assert_halts_and_recovers(&mut sim, packed.clone(), reason);

    let pairs = SimulationSettings {
        gridding: false,
        ..packed
    };
    let reason = HaltReason::InvalidSettings(SettingsIssue::TooManyForBruteForce {
        agent_count: crowd as u64,
    });
    assert_halts_and_recovers(&mut sim, pairs, reason);
}

#[test]
fn test_low_frame_rate_is_sticky() {
    let mut sim = Simulation::builder()
        .with_settings(settings(100))
        .with_frame_monitor(FrameMonitor::new(30.0, Duration::from_millis(100)))
        .build()
        .unwrap();

    let fps = sim.record_frame(Duration::from_millis(100)).unwrap();
    assert!(fps < 30.0);
    let halted = sim.step(0.016);
    assert!(matches!(halted, StepOutcome::Skipped(HaltReason::LowFrameRate { .. })));

    // Neither fresh settings nor fast frames lift it.
    sim.configure(settings(100));
    for _ in 0..10 {
        sim.record_frame(Duration::from_millis(1));
    }
    assert!(matches!(sim.step(0.016), StepOutcome::Skipped(HaltReason::LowFrameRate { .. })));
    assert_eq!(sim.steps(), 0);

    sim.reset(100).unwrap();
    assert_eq!(sim.status(), None);
    assert_eq!(sim.frame_monitor().frame(), 0);
    assert_eq!(sim.step(0.016), StepOutcome::Completed);
}

// ============================================================================
// Stepping
// ============================================================================

#[test]
fn test_agents_stay_within_speed_limits() {
    let mut sim = build(400);
    for _ in 0..30 {
        assert_eq!(sim.step(0.02), StepOutcome::Completed);
    }

    let s = sim.settings().clone();
    for agent in sim.agent_snapshot().unwrap().iter() {
        assert!(agent.position.is_finite());
        let speed = agent.velocity.length();
        assert!(speed <= s.max_speed * 1.001, "speed {speed} above max");
        assert!(speed >= s.min_speed * 0.999, "speed {speed} below min");
    }
}

#[test]
fn test_active_count_follows_settings() {
    let mut sim = build(300);
    sim.configure(settings(120));
    assert_eq!(sim.step(0.016), StepOutcome::Completed);
    assert_eq!(sim.agent_snapshot().unwrap().len(), 120);
    assert_eq!(sim.cell_offsets().unwrap().last(), Some(&120));

    sim.configure(settings(300));
    assert_eq!(sim.step(0.016), StepOutcome::Completed);
    assert_eq!(sim.agent_snapshot().unwrap().len(), 300);
}

#[test]
fn test_brute_force_step_has_no_offsets() {
    let mut sim = build(300);
    assert_eq!(sim.step(0.016), StepOutcome::Completed);
    assert!(!sim.cell_offsets().unwrap().is_empty());

    sim.configure(SimulationSettings {
        gridding: false,
        ..settings(300)
    });
    assert_eq!(sim.step(0.016), StepOutcome::Completed);
    assert!(sim.cell_offsets().unwrap().is_empty());
}

#[test]
fn test_empty_flock_steps() {
    let mut sim = build(0);
    assert_eq!(sim.step(0.016), StepOutcome::Completed);
    assert!(sim.agent_snapshot().unwrap().is_empty());
    let offsets = sim.cell_offsets().unwrap();
    assert_eq!(offsets.len(), 1001);
    assert!(offsets.iter().all(|&o| o == 0));
}

// ============================================================================
// Spawning
// ============================================================================

#[test]
fn test_same_seed_same_flock() {
    let a = build(250);
    let b = build(250);
    assert_eq!(a.agent_snapshot().unwrap(), b.agent_snapshot().unwrap());

    let other = Simulation::builder()
        .with_settings(settings(250))
        .with_seed(22)
        .build()
        .unwrap();
    assert_ne!(a.agent_snapshot().unwrap(), other.agent_snapshot().unwrap());
}

#[test]
fn test_reset_respawns_from_seed() {
    let mut sim = build(250);
    let initial = sim.agent_snapshot().unwrap().into_owned();
    for _ in 0..5 {
        sim.step(0.016);
    }
    sim.reset(250).unwrap();
    assert_eq!(sim.steps(), 0);
    assert_eq!(sim.agent_snapshot().unwrap().as_ref(), &initial[..]);
}

#[test]
fn test_reset_grows_agent_buffers() {
    let mut sim = build(100);
    assert_eq!(sim.capacity().max_agents, 100);

    sim.reset(200).unwrap();
    assert!(sim.capacity().max_agents >= 200);
    assert_eq!(sim.agent_snapshot().unwrap().len(), 200);
    assert_eq!(sim.step(0.016), StepOutcome::Completed);
    assert_eq!(sim.agent_snapshot().unwrap().len(), 200);
    assert_eq!(sim.cell_offsets().unwrap().last(), Some(&200));
}

#[test]
fn test_reset_grows_grid_buffers() {
    let mut sim = build(100);
    sim.configure(SimulationSettings {
        visual_range: 5.0,
        ..settings(100)
    });
    assert!(matches!(
        sim.step(0.016),
        StepOutcome::Skipped(HaltReason::ResourceCeiling(_))
    ));

    sim.reset(100).unwrap();
    assert_eq!(sim.capacity().max_cells, 8000);
    assert_eq!(sim.step(0.016), StepOutcome::Completed);
    assert_eq!(sim.cell_offsets().unwrap().len(), 8001);
}

#[test]
fn test_spawn_inside_turn_margin() {
    let s = settings(1000);
    let inset = Vec3::splat(s.turn_margin);
    for agent in Spawner::new(5).spawn(1000, &s) {
        assert!(agent.position.cmpge(s.min_pos + inset).all());
        assert!(agent.position.cmple(s.max_pos - inset).all());
    }
}

// ============================================================================
// Settings files
// ============================================================================

#[test]
fn test_settings_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    let saved = SimulationSettings {
        agent_count: 1234,
        gravity: 2.5,
        attractor: Some(Attractor {
            position: Vec3::new(1.0, 2.0, 3.0),
            strength: -4.0,
        }),
        ..Default::default()
    };
    saved.save(&path).unwrap();
    assert_eq!(SimulationSettings::load(&path).unwrap(), saved);
}

#[test]
fn test_classic_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("classic.json");
    fs::write(
        &path,
        r#"{ "boidCount": 42, "griddingOn": false, "turnMagin": 7.5, "minPos": [-10, -10, -10] }"#,
    )
    .unwrap();

    let loaded = SimulationSettings::load(&path).unwrap();
    assert_eq!(loaded.agent_count, 42);
    assert!(!loaded.gridding);
    assert_eq!(loaded.turn_margin, 7.5);
    assert_eq!(loaded.min_pos, Vec3::splat(-10.0));
    assert_eq!(loaded.max_pos, SimulationSettings::default().max_pos);
}

#[test]
fn test_missing_settings_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(SimulationSettings::load(dir.path().join("absent.json")).is_err());
}
