use crate::error::SimulatorError;
use crate::phase::PhaseString;
use crate::vehicle::VehicleSnapshot;

/// A microscopic traffic simulator session that the environment drives.
///
/// One tick is one second of simulated time.
pub trait Simulator {
    /// Starts a new session, replacing any previous one.
    fn start(&mut self, seed: Option<u64>) -> Result<(), SimulatorError>;

    /// Advances the session by `ticks` ticks.
    fn step(&mut self, ticks: u32) -> Result<(), SimulatorError>;

    /// Closes the session and releases its resources.
    fn close(&mut self) -> Result<(), SimulatorError>;

    /// Gets the telemetry of every vehicle in the network.
    fn vehicles(&self) -> Result<Vec<VehicleSnapshot>, SimulatorError>;

    /// Gets the number of halted vehicles on a lane during the last tick.
    fn lane_halt_count(&self, lane_id: &str) -> Result<u32, SimulatorError>;

    /// Gets the signal state string of a junction.
    fn signal_state(&self, junction_id: &str) -> Result<String, SimulatorError>;

    /// Sets the signal state of a junction.
    fn set_signal_state(
        &mut self,
        junction_id: &str,
        state: &PhaseString,
    ) -> Result<(), SimulatorError>;
}
