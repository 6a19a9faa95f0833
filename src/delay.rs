use crate::config::OccupancyWeights;
use crate::observation::{included, weight};
use crate::vehicle::VehicleSnapshot;

/// Sums occupancy weighted timeloss over the vehicles approaching the stop line.
#[derive(Debug, Clone, Copy)]
pub struct DelayAggregator {
    occupancy: OccupancyWeights,
}

impl DelayAggregator {
    /// Creates a delay aggregator.
    pub fn new(occupancy: OccupancyWeights) -> Self {
        Self { occupancy }
    }

    /// Gets the person delay of a single vehicle.
    ///
    /// A vehicle past the stop line contributes nothing, whatever
    /// timeloss it accumulated before crossing.
    pub fn person_delay(&self, vehicle: &VehicleSnapshot) -> f64 {
        let delay = if vehicle.is_approaching() {
            vehicle.timeloss
        } else {
            0.0
        };
        delay * weight(&self.occupancy, vehicle.class)
    }

    /// Computes the total person delay of a snapshot.
    pub fn total(&self, vehicles: &[VehicleSnapshot], cv_only: bool) -> f64 {
        included(vehicles, cv_only)
            .map(|vehicle| self.person_delay(vehicle))
            .sum()
    }
}
