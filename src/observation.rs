use crate::config::{GridGeometry, OccupancyWeights};
use crate::plan::{SignalPlan, NUM_LANES};
use crate::util::{to_u8, Interval};
use crate::vehicle::{VehicleClass, VehicleSnapshot};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The number of per-vehicle channels: occupancy and speed.
pub const VEHICLE_CHANNELS: usize = 2;

/// The layout of the observation handed to the policy.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationMode {
    /// The occupancy and speed grid.
    Image,
    /// The normalised per-lane queue vector.
    Vector,
    /// The grid with an extra channel whose first row holds the queue counts.
    Combined,
}

impl ObservationMode {
    /// Gets the shape of observations produced in this mode.
    pub fn shape(self, grid: &GridGeometry) -> Vec<usize> {
        match self {
            ObservationMode::Image => vec![VEHICLE_CHANNELS, grid.height(), NUM_LANES],
            ObservationMode::Vector => vec![NUM_LANES],
            ObservationMode::Combined => vec![VEHICLE_CHANNELS + 1, grid.height(), NUM_LANES],
        }
    }
}

/// A dense `[channel, height, width]` array.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Grid<T> {
    shape: [usize; 3],
    data: Vec<T>,
}

impl<T: Copy + Default> Grid<T> {
    /// Creates a grid filled with the default value.
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self {
            shape: [channels, height, width],
            data: vec![T::default(); channels * height * width],
        }
    }

    /// Gets the `[channel, height, width]` shape.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    fn offset(&self, channel: usize, row: usize, col: usize) -> Option<usize> {
        let [c, h, w] = self.shape;
        (channel < c && row < h && col < w).then(|| (channel * h + row) * w + col)
    }

    /// Gets the value of a cell.
    pub fn get(&self, channel: usize, row: usize, col: usize) -> Option<T> {
        self.offset(channel, row, col).map(|idx| self.data[idx])
    }

    /// Sets the value of a cell. Out of range writes are ignored.
    pub fn set(&mut self, channel: usize, row: usize, col: usize, value: T) {
        if let Some(idx) = self.offset(channel, row, col) {
            self.data[idx] = value;
        }
    }

    /// Gets the data in row-major order.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Applies a function to every cell.
    pub fn map<U>(&self, f: impl Fn(T) -> U) -> Grid<U> {
        Grid {
            shape: self.shape,
            data: self.data.iter().map(|v| f(*v)).collect(),
        }
    }
}

/// An observation in one of the [ObservationMode] layouts.
#[derive(Debug, PartialEq, Clone, Serialize)]
#[serde(tag = "mode", content = "data", rename_all = "lowercase")]
pub enum Observation {
    Image(Grid<u8>),
    Vector(Vec<f64>),
    Combined(Grid<u8>),
}

impl Observation {
    /// Gets the shape of the observation.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Observation::Image(grid) | Observation::Combined(grid) => grid.shape().to_vec(),
            Observation::Vector(vec) => vec![vec.len()],
        }
    }
}

/// Halted vehicle counts keyed by lane ID.
pub type QueueCounts = HashMap<String, u32>;

/// The result of encoding one snapshot.
#[derive(Debug, PartialEq, Clone)]
pub struct Encoding {
    pub observation: Observation,
    /// The queue counts in observation column order.
    pub queues: [u32; NUM_LANES],
    /// The sum of halted vehicles across all incoming lanes.
    pub halted_total: u32,
    /// The number of vehicles left off the grid because of a malformed lane.
    pub skipped: usize,
}

/// Builds observations from vehicle telemetry and lane queue counts.
#[derive(Debug, Clone)]
pub struct ObservationEncoder {
    plan: &'static SignalPlan,
    grid: GridGeometry,
    occupancy: OccupancyWeights,
}

impl ObservationEncoder {
    /// Creates an encoder.
    pub fn new(plan: &'static SignalPlan, grid: GridGeometry, occupancy: OccupancyWeights) -> Self {
        Self {
            plan,
            grid,
            occupancy,
        }
    }

    /// Encodes a snapshot.
    ///
    /// # Parameters
    /// * `vehicles` - The vehicles in the network
    /// * `queues` - Halted vehicle counts per lane; lanes absent from the map count as empty
    /// * `mode` - The observation layout
    /// * `cv_only` - Only place buses and connected vehicles on the grid
    pub fn encode(
        &self,
        vehicles: &[VehicleSnapshot],
        queues: &QueueCounts,
        mode: ObservationMode,
        cv_only: bool,
    ) -> Encoding {
        let (grid, skipped) = self.vehicle_grid(vehicles, cv_only);

        let mut queue_vec = [0u32; NUM_LANES];
        for (lane_id, col) in self.plan.lanes() {
            queue_vec[col] = queues.get(&lane_id).copied().unwrap_or(0);
        }
        let halted_total = queue_vec.iter().sum();

        let observation = match mode {
            ObservationMode::Image => Observation::Image(grid.map(to_u8)),
            ObservationMode::Vector => Observation::Vector(
                queue_vec
                    .iter()
                    .map(|q| f64::min(*q as f64 / self.grid.queue_capacity, 1.0))
                    .collect(),
            ),
            ObservationMode::Combined => {
                let [_, height, width] = grid.shape();
                let mut combined = Grid::zeros(VEHICLE_CHANNELS + 1, height, width);
                for (c, row, col) in itertools::iproduct!(0..VEHICLE_CHANNELS, 0..height, 0..width) {
                    if let Some(value) = grid.get(c, row, col) {
                        combined.set(c, row, col, to_u8(value));
                    }
                }
                for (col, q) in queue_vec.iter().enumerate() {
                    combined.set(VEHICLE_CHANNELS, 0, col, to_u8(*q as f64));
                }
                Observation::Combined(combined)
            }
        };

        Encoding {
            observation,
            queues: queue_vec,
            halted_total,
            skipped,
        }
    }

    /// Builds the occupancy/speed grid. Vehicles sharing a cell overwrite
    /// each other in input order.
    fn vehicle_grid(&self, vehicles: &[VehicleSnapshot], cv_only: bool) -> (Grid<f64>, usize) {
        let mut grid = Grid::zeros(VEHICLE_CHANNELS, self.grid.height(), NUM_LANES);
        let detection = Interval::new(0.0, self.grid.detection_length);
        let mut skipped = 0;

        for vehicle in included(vehicles, cv_only) {
            let distance = vehicle.distance_to_stop_line();
            if !detection.contains_open(distance) {
                continue;
            }
            let col = match vehicle.lane() {
                Ok(lane) => self.plan.column(lane.edge, lane.index),
                Err(err) => {
                    debug!("vehicle {}: {}, left off the grid", vehicle.id, err);
                    skipped += 1;
                    continue;
                }
            };
            let Some(col) = col else {
                debug!(
                    "vehicle {}: lane {} is not an incoming lane, left off the grid",
                    vehicle.id, vehicle.lane_id
                );
                skipped += 1;
                continue;
            };
            let row = (distance / self.grid.cell_length) as usize;
            grid.set(0, row, col, weight(&self.occupancy, vehicle.class));
            grid.set(1, row, col, vehicle.speed);
        }

        (grid, skipped)
    }
}

/// Iterates over the vehicles that are observed and counted toward delay.
pub(crate) fn included(
    vehicles: &[VehicleSnapshot],
    cv_only: bool,
) -> impl Iterator<Item = &VehicleSnapshot> {
    vehicles
        .iter()
        .filter(move |vehicle| !cv_only || vehicle.class.is_connected())
}

/// Gets the occupancy weight of a vehicle class.
pub(crate) fn weight(weights: &OccupancyWeights, class: VehicleClass) -> f64 {
    match class {
        VehicleClass::Car => weights.car,
        VehicleClass::Bus => weights.bus,
        VehicleClass::Cv => weights.cv,
    }
}
