pub use config::{EnvConfig, GridGeometry, OccupancyWeights, RewardSource, SignalTiming};
pub use controller::{PhaseController, PlanStep, StepKind, TransitionPlan};
pub use delay::DelayAggregator;
pub use env::{
    EnvState, EpisodeHistory, EpisodeState, EpisodeSummary, IntersectionEnv, Step, StepInfo,
};
pub use error::{Error, Result, SimulatorError};
pub use observation::{
    Encoding, Grid, Observation, ObservationEncoder, ObservationMode, QueueCounts,
    VEHICLE_CHANNELS,
};
pub use phase::{PhaseString, SignalState, NUM_SIGNAL_GROUPS};
pub use plan::{
    Action, Approach, MovementClass, SignalPlan, LANES_PER_APPROACH, NUM_ACTIONS, NUM_APPROACHES,
    NUM_LANES,
};
pub use simulator::Simulator;
pub use synthetic::{SyntheticParams, SyntheticSimulator};
pub use util::Interval;
pub use vehicle::{LaneError, LaneRef, VehicleClass, VehicleSnapshot};

mod config;
mod controller;
mod delay;
mod env;
mod error;
mod observation;
mod phase;
mod plan;
mod simulator;
mod synthetic;
mod util;
mod vehicle;
