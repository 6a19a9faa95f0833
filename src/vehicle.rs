use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The class of a vehicle, which determines its occupancy weight.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    /// A passenger car without connectivity.
    Car,
    /// A bus.
    Bus,
    /// A connected vehicle.
    Cv,
}

impl VehicleClass {
    /// Whether vehicles of this class are detected in connected-vehicle-only mode.
    pub fn is_connected(self) -> bool {
        matches!(self, VehicleClass::Cv | VehicleClass::Bus)
    }
}

/// The telemetry of one vehicle at a decision step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    /// The simulator's vehicle ID.
    pub id: String,
    /// The vehicle class.
    pub class: VehicleClass,
    /// The lane the vehicle is on, as `<edge>_<index>`.
    pub lane_id: String,
    /// The distance to the next signal's stop line in m,
    /// or `None` if there is no signal ahead.
    pub distance: Option<f64>,
    /// The speed in m/s.
    pub speed: f64,
    /// The time lost to driving below the desired speed so far in s.
    pub timeloss: f64,
}

/// A lane reference parsed from a lane ID.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct LaneRef<'a> {
    /// The edge ID.
    pub edge: &'a str,
    /// The lane index, 0 being the rightmost lane.
    pub index: usize,
}

/// A lane ID that cannot be split into an edge and a lane index.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[error("malformed lane ID {0:?}")]
pub struct LaneError(pub String);

impl VehicleSnapshot {
    /// Gets the signed distance to the stop line; `-1` when the vehicle
    /// has no signal ahead, ie. has already crossed the stop line.
    pub fn distance_to_stop_line(&self) -> f64 {
        self.distance.unwrap_or(-1.0)
    }

    /// Whether the vehicle is still upstream of the stop line.
    pub fn is_approaching(&self) -> bool {
        self.distance_to_stop_line() > 0.0
    }

    /// Parses the vehicle's lane ID.
    pub fn lane(&self) -> Result<LaneRef<'_>, LaneError> {
        let malformed = || LaneError(self.lane_id.clone());
        let (edge, index) = self.lane_id.rsplit_once('_').ok_or_else(malformed)?;
        if edge.is_empty() {
            return Err(malformed());
        }
        let index = index.parse().map_err(|_| malformed())?;
        Ok(LaneRef { edge, index })
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VehicleClass::Car => "car",
            VehicleClass::Bus => "bus",
            VehicleClass::Cv => "cv",
        })
    }
}
