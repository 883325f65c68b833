//! Simulation parameters and their JSON persistence.
//!
//! [`SimulationSettings`] is the user-facing parameter set. Field names on
//! disk are the camelCase keys of the classic settings file, so an existing
//! `simulationSettings.json` loads as-is; unknown keys (graphics, player
//! controls) are ignored and missing keys take their defaults.
//!
//! Every step derives an immutable [`StepParams`] from the settings and the
//! frame's delta time. Kernels only ever see `StepParams`.

use std::f32::consts::PI;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::capacity::Capacity;
use crate::error::SettingsError;
use crate::grid::GridDescriptor;
use crate::halt::{HaltReason, SettingsIssue};

/// A point that pulls agents toward it, or pushes them away when `strength`
/// is negative.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attractor {
    pub position: Vec3,
    pub strength: f32,
}

/// Parameters of the flocking simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    #[serde(rename = "boidCount")]
    pub agent_count: usize,
    /// Use the grid pipeline. When off, every agent is compared with every other.
    #[serde(rename = "griddingOn")]
    pub gridding: bool,
    /// Cell edge length as a multiple of `visual_range`.
    #[serde(rename = "cellSizeMult")]
    pub cell_size_mult: f32,
    /// Constant downward acceleration.
    pub gravity: f32,
    #[serde(rename = "visualRange")]
    pub visual_range: f32,
    #[serde(rename = "protectedRange")]
    pub protected_range: f32,
    /// Full viewing angle in degrees; 360 sees everything.
    #[serde(rename = "fieldOfView")]
    pub field_of_view: f32,
    #[serde(rename = "cohesionFactor")]
    pub cohesion: f32,
    #[serde(rename = "separationFactor")]
    pub separation: f32,
    #[serde(rename = "alignmentFactor")]
    pub alignment: f32,
    #[serde(rename = "maxSpeed")]
    pub max_speed: f32,
    #[serde(rename = "minSpeed")]
    pub min_speed: f32,
    #[serde(rename = "turnSpeed")]
    pub turn_speed: f32,
    // The classic file misspells this key.
    #[serde(rename = "turnMagin", alias = "turnMargin")]
    pub turn_margin: f32,
    #[serde(rename = "minPos")]
    pub min_pos: Vec3,
    #[serde(rename = "maxPos")]
    pub max_pos: Vec3,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attractor: Option<Attractor>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            agent_count: 500_000,
            gridding: true,
            cell_size_mult: 1.0,
            gravity: 0.0,
            visual_range: 10.0,
            protected_range: 4.5,
            field_of_view: 270.0,
            cohesion: 2.0,
            separation: 1.0,
            alignment: 5.0,
            max_speed: 21.0,
            min_speed: 14.0,
            turn_speed: 3.2,
            turn_margin: 5.0,
            min_pos: Vec3::new(-600.0, -300.0, -300.0),
            max_pos: Vec3::new(600.0, 300.0, 300.0),
            attractor: None,
        }
    }
}

impl SimulationSettings {
    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write settings as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.visual_range * self.cell_size_mult
    }

    /// The grid these settings describe.
    pub fn grid(&self) -> GridDescriptor {
        GridDescriptor::new(self.min_pos, self.max_pos, self.cell_size())
    }

    /// Reason these settings cannot run a step, if any.
    pub fn validate(&self, capacity: &Capacity) -> Option<HaltReason> {
        let scalars = [
            self.cell_size_mult,
            self.gravity,
            self.visual_range,
            self.protected_range,
            self.field_of_view,
            self.cohesion,
            self.separation,
            self.alignment,
            self.max_speed,
            self.min_speed,
            self.turn_speed,
            self.turn_margin,
        ];
        let attractor_ok = self
            .attractor
            .map_or(true, |a| a.position.is_finite() && a.strength.is_finite());
        if !scalars.iter().all(|v| v.is_finite()) || !attractor_ok {
            return Some(HaltReason::InvalidSettings(SettingsIssue::NonFiniteParameter));
        }

        self.grid().validate(self.agent_count, self.gridding, capacity)
    }
}

/// Everything one step reads, derived once per step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepParams {
    pub grid: GridDescriptor,
    pub agent_count: usize,
    pub gridding: bool,
    pub delta_time: f32,
    pub visual_range_sq: f32,
    pub protected_range_sq: f32,
    /// `field_of_view / 360`.
    pub fov_fraction: f32,
    /// Smallest accepted cosine between heading and direction to a candidate.
    pub fov_cos: f32,
    pub cohesion: f32,
    pub separation: f32,
    pub alignment: f32,
    pub gravity: f32,
    pub max_speed: f32,
    pub min_speed: f32,
    pub turn_speed: f32,
    pub turn_margin: f32,
    pub min_pos: Vec3,
    pub max_pos: Vec3,
    pub attractor: Option<Attractor>,
}

impl StepParams {
    pub fn new(settings: &SimulationSettings, delta_time: f32) -> Self {
        let fov_fraction = settings.field_of_view / 360.0;
        Self {
            grid: settings.grid(),
            agent_count: settings.agent_count,
            gridding: settings.gridding,
            delta_time,
            visual_range_sq: settings.visual_range * settings.visual_range,
            protected_range_sq: settings.protected_range * settings.protected_range,
            fov_fraction,
            fov_cos: (fov_fraction * PI).cos(),
            cohesion: settings.cohesion,
            separation: settings.separation,
            alignment: settings.alignment,
            gravity: settings.gravity,
            max_speed: settings.max_speed,
            min_speed: settings.min_speed,
            turn_speed: settings.turn_speed,
            turn_margin: settings.turn_margin,
            min_pos: settings.min_pos,
            max_pos: settings.max_pos,
            attractor: settings.attractor,
        }
    }

    /// Whether the field of view covers every direction.
    #[inline]
    pub fn sees_all_around(&self) -> bool {
        self.fov_fraction >= 1.0
    }
}
