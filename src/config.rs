//! Environment configuration.

use crate::error::{Error, Result};
use crate::observation::ObservationMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How far `detection_length / cell_length` may stray from a whole number.
const CELL_TOLERANCE: f64 = 1e-9;

/// The configuration of an [IntersectionEnv](crate::IntersectionEnv).
///
/// Every field has a default, so a JSON document only needs to name the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// The ID of the controlled junction in the simulator.
    pub junction_id: String,
    /// The observation layout.
    pub mode: ObservationMode,
    /// Only buses and connected vehicles are observed.
    pub cv_only: bool,
    /// The number of ticks simulated before the first decision.
    pub warmup_ticks: u32,
    /// The number of ticks after warmup at which the episode is truncated.
    pub horizon_ticks: u32,
    /// The caller hold time passed to the controller with each switch, in ticks.
    pub green_hold_ticks: u32,
    /// The quantity whose decrease is rewarded.
    pub reward: RewardSource,
    pub timing: SignalTiming,
    pub grid: GridGeometry,
    pub occupancy: OccupancyWeights,
}

/// Durations of the clearance intervals and minimum greens, in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalTiming {
    pub yellow: u32,
    pub red: u32,
    pub min_through_green: u32,
    pub min_left_green: u32,
}

/// The spatial layout of the observation grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridGeometry {
    /// The length of one grid cell in m.
    pub cell_length: f64,
    /// The distance upstream of the stop line that is observed, in m.
    pub detection_length: f64,
    /// The queue length that maps to 1 in the vector observation.
    pub queue_capacity: f64,
}

/// The number of persons each vehicle class is assumed to carry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OccupancyWeights {
    pub car: f64,
    pub bus: f64,
    pub cv: f64,
}

/// The total whose decrease between decisions is the reward.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardSource {
    /// Occupancy weighted timeloss of vehicles upstream of the stop line.
    #[default]
    PersonDelay,
    /// The number of halted vehicles on the incoming lanes.
    HaltedVehicles,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            junction_id: "J1".to_string(),
            mode: ObservationMode::Image,
            cv_only: false,
            warmup_ticks: 600,
            horizon_ticks: 4400,
            green_hold_ticks: 0,
            reward: RewardSource::PersonDelay,
            timing: Default::default(),
            grid: Default::default(),
            occupancy: Default::default(),
        }
    }
}

impl Default for SignalTiming {
    fn default() -> Self {
        Self {
            yellow: 3,
            red: 2,
            min_through_green: 12,
            min_left_green: 5,
        }
    }
}

impl Default for GridGeometry {
    fn default() -> Self {
        Self {
            cell_length: 7.0,
            detection_length: 350.0,
            queue_capacity: 50.0,
        }
    }
}

impl GridGeometry {
    /// The number of cells along each lane.
    pub fn height(&self) -> usize {
        (self.detection_length / self.cell_length).round() as usize
    }
}

impl Default for OccupancyWeights {
    fn default() -> Self {
        Self {
            car: 1.0,
            bus: 1.0,
            cv: 1.0,
        }
    }
}

impl EnvConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Checks the configuration for values the controller cannot work with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(Error::Config(msg.to_string()));
        let grid = &self.grid;
        if !(grid.cell_length > 0.0) {
            return fail("grid.cell_length must be positive");
        }
        let cells = grid.detection_length / grid.cell_length;
        if !(cells >= 1.0) || (cells - cells.round()).abs() > CELL_TOLERANCE {
            return fail("grid.detection_length must be a positive multiple of grid.cell_length");
        }
        if !(grid.queue_capacity > 0.0) {
            return fail("grid.queue_capacity must be positive");
        }
        if self.timing.yellow == 0 || self.timing.red == 0 {
            return fail("timing.yellow and timing.red must be at least one tick");
        }
        let weights = &self.occupancy;
        if [weights.car, weights.bus, weights.cv].iter().any(|w| !(*w >= 0.0)) {
            return fail("occupancy weights must be non-negative");
        }
        if self.horizon_ticks == 0 {
            return fail("horizon_ticks must be positive");
        }
        Ok(())
    }
}
