//! A lightweight in-process simulator of the standard intersection.

use crate::error::SimulatorError;
use crate::phase::PhaseString;
use crate::plan::{Action, SignalPlan};
use crate::simulator::Simulator;
use crate::vehicle::{VehicleClass, VehicleSnapshot};
use rand::distributions::{Bernoulli, Distribution};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

new_key_type! {
    /// Unique ID of a simulated vehicle.
    struct SimVehicleId;
}

/// Vehicles slower than this are halted, in m/s.
const HALT_SPEED: f64 = 0.1;

/// Vehicles stopped by a signal wait this far before the stop line, in m.
const STOP_POS: f64 = 0.5;

/// Vehicles further than this past the stop line leave the network, in m.
const EXIT_DISTANCE: f64 = -30.0;

/// The parameters of a [SyntheticSimulator].
#[derive(Debug, Clone)]
pub struct SyntheticParams {
    /// The probability of a vehicle arriving on each lane in each tick.
    pub arrival_rate: f64,
    /// The fraction of arrivals that are buses.
    pub bus_share: f64,
    /// The fraction of arrivals that are connected vehicles.
    pub cv_share: f64,
    /// The mean desired speed in m/s.
    pub speed_mean: f64,
    /// The standard deviation of the desired speed in m/s.
    pub speed_stddev: f64,
    /// The maximum speed gain per tick in m/s.
    pub max_acc: f64,
    /// The distance upstream of the stop line at which vehicles appear, in m.
    pub spawn_distance: f64,
    /// The minimum distance between consecutive vehicles in a lane, in m.
    pub min_gap: f64,
    /// The actions cycled by the built-in fixed-time program, which runs
    /// until the signals are set externally.
    pub program: Vec<Action>,
    /// The green time of each action in the fixed-time program, in ticks.
    pub program_green: u32,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            arrival_rate: 0.06,
            bus_share: 0.05,
            cv_share: 0.3,
            speed_mean: 13.9,
            speed_stddev: 1.5,
            max_acc: 2.6,
            spawn_distance: 450.0,
            min_gap: 7.5,
            program: [2, 0, 6, 4].into_iter().map(|a| Action::new(a).unwrap_or_default()).collect(),
            program_green: 30,
        }
    }
}

/// A simulated vehicle.
#[derive(Debug, Clone)]
struct SimVehicle {
    name: String,
    class: VehicleClass,
    /// Signed distance to the stop line in m.
    distance: f64,
    speed: f64,
    desired_speed: f64,
    timeloss: f64,
}

/// A simulated incoming lane.
#[derive(Debug, Clone)]
struct SimLane {
    id: String,
    /// The signal group controlling the lane.
    group: usize,
    /// The vehicles on the lane, front first.
    vehicles: Vec<SimVehicleId>,
}

/// The state of a running session.
struct Session {
    rng: StdRng,
    arrivals: Bernoulli,
    desired_speed: Normal<f64>,
    vehicles: SlotMap<SimVehicleId, SimVehicle>,
    lanes: Vec<SimLane>,
    signal: PhaseString,
    /// The fixed-time program as (phase, ticks) pairs, until overridden.
    program: Option<Vec<(PhaseString, u32)>>,
    frame: u64,
    seq: u64,
}

/// A queue-based simulator of the standard four-approach intersection.
///
/// Vehicles arrive at random on every incoming lane, drive toward the stop
/// line at their desired speed, keep a minimum gap to their leader and stop
/// at the line unless their signal group is green.
pub struct SyntheticSimulator {
    params: SyntheticParams,
    session: Option<Session>,
}

impl SyntheticSimulator {
    /// Creates a simulator with no active session.
    pub fn new(params: SyntheticParams) -> Self {
        Self {
            params,
            session: None,
        }
    }

    /// Whether a session is active.
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Gets the current simulation frame, or `None` without a session.
    pub fn frame(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.frame)
    }

    fn session(&self) -> Result<&Session, SimulatorError> {
        self.session.as_ref().ok_or(SimulatorError::NoSession)
    }

    fn session_mut(&mut self) -> Result<&mut Session, SimulatorError> {
        self.session.as_mut().ok_or(SimulatorError::NoSession)
    }
}

impl Default for SyntheticSimulator {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl Simulator for SyntheticSimulator {
    fn start(&mut self, seed: Option<u64>) -> Result<(), SimulatorError> {
        let params = &self.params;
        let arrivals = Bernoulli::new(params.arrival_rate)
            .map_err(|err| SimulatorError::Start(format!("arrival rate: {}", err)))?;
        let desired_speed = Normal::new(params.speed_mean, params.speed_stddev)
            .map_err(|err| SimulatorError::Start(format!("speed distribution: {}", err)))?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let plan = SignalPlan::standard();
        let lanes = plan
            .lanes()
            .map(|(id, col)| {
                let approach = &plan.approaches()[col / crate::plan::LANES_PER_APPROACH];
                SimLane {
                    id,
                    group: approach.groups.min + col % crate::plan::LANES_PER_APPROACH,
                    vehicles: vec![],
                }
            })
            .collect();

        let program = fixed_time_program(plan, &params.program, params.program_green);
        let signal = program
            .first()
            .map(|(phase, _)| *phase)
            .unwrap_or(*plan.phase(Action::default()));

        self.session = Some(Session {
            rng,
            arrivals,
            desired_speed,
            vehicles: SlotMap::with_key(),
            lanes,
            signal,
            program: (!program.is_empty()).then_some(program),
            frame: 0,
            seq: 0,
        });
        Ok(())
    }

    fn step(&mut self, ticks: u32) -> Result<(), SimulatorError> {
        let Self { params, session } = self;
        let session = session.as_mut().ok_or(SimulatorError::NoSession)?;
        for _ in 0..ticks {
            session.step(params);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SimulatorError> {
        self.session.take().map(|_| ()).ok_or(SimulatorError::NoSession)
    }

    fn vehicles(&self) -> Result<Vec<VehicleSnapshot>, SimulatorError> {
        let session = self.session()?;
        Ok(session
            .lanes
            .iter()
            .flat_map(|lane| {
                lane.vehicles.iter().map(|id| {
                    let veh = &session.vehicles[*id];
                    VehicleSnapshot {
                        id: veh.name.clone(),
                        class: veh.class,
                        lane_id: lane.id.clone(),
                        distance: (veh.distance > 0.0).then_some(veh.distance),
                        speed: veh.speed,
                        timeloss: veh.timeloss,
                    }
                })
            })
            .collect())
    }

    fn lane_halt_count(&self, lane_id: &str) -> Result<u32, SimulatorError> {
        let session = self.session()?;
        let lane = session
            .lanes
            .iter()
            .find(|lane| lane.id == lane_id)
            .ok_or_else(|| SimulatorError::Query(format!("unknown lane {}", lane_id)))?;
        Ok(lane
            .vehicles
            .iter()
            .map(|id| &session.vehicles[*id])
            .filter(|veh| veh.distance > 0.0 && veh.speed < HALT_SPEED)
            .count() as u32)
    }

    fn signal_state(&self, _junction_id: &str) -> Result<String, SimulatorError> {
        Ok(self.session()?.signal.to_string())
    }

    fn set_signal_state(
        &mut self,
        _junction_id: &str,
        state: &PhaseString,
    ) -> Result<(), SimulatorError> {
        let session = self.session_mut()?;
        session.program = None;
        session.signal = *state;
        Ok(())
    }
}

impl Session {
    /// Advances the session by one tick.
    fn step(&mut self, params: &SyntheticParams) {
        self.update_program();
        self.move_vehicles(params);
        self.spawn_vehicles(params);
        self.frame += 1;
    }

    /// Applies the fixed-time program's phase for the current frame.
    fn update_program(&mut self) {
        let Some(program) = &self.program else {
            return;
        };
        let cycle: u64 = program.iter().map(|(_, ticks)| *ticks as u64).sum();
        if cycle == 0 {
            return;
        }
        let mut t = self.frame % cycle;
        for (phase, ticks) in program {
            if t < *ticks as u64 {
                self.signal = *phase;
                return;
            }
            t -= *ticks as u64;
        }
    }

    /// Moves every vehicle toward and past the stop line, then removes
    /// the vehicles that have left the network.
    fn move_vehicles(&mut self, params: &SyntheticParams) {
        let mut exited = SmallVec::<[SimVehicleId; 8]>::new();

        for lane in &mut self.lanes {
            let green = self.signal.get(lane.group).map_or(false, |s| s.is_green());
            let mut leader: Option<f64> = None;

            for id in &lane.vehicles {
                let veh = &mut self.vehicles[*id];

                // The closest position the vehicle may reach this tick
                let mut limit = leader.map_or(f64::NEG_INFINITY, |pos| pos + params.min_gap);
                if veh.distance > 0.0 && !green {
                    limit = f64::max(limit, f64::min(STOP_POS, veh.distance));
                }

                let speed = f64::min(veh.desired_speed, veh.speed + params.max_acc);
                let speed = f64::max(f64::min(speed, veh.distance - limit), 0.0);
                veh.speed = speed;
                veh.distance -= speed;
                veh.timeloss += f64::max(1.0 - speed / veh.desired_speed, 0.0);
                leader = Some(veh.distance);

                if veh.distance < EXIT_DISTANCE {
                    exited.push(*id);
                }
            }
        }

        for id in exited {
            self.vehicles.remove(id);
        }
        let vehicles = &self.vehicles;
        for lane in &mut self.lanes {
            lane.vehicles.retain(|id| vehicles.contains_key(*id));
        }
    }

    /// Adds new vehicles at the upstream end of each lane.
    fn spawn_vehicles(&mut self, params: &SyntheticParams) {
        for lane in &mut self.lanes {
            if !self.arrivals.sample(&mut self.rng) {
                continue;
            }
            let blocked = lane.vehicles.last().map_or(false, |id| {
                self.vehicles[*id].distance > params.spawn_distance - params.min_gap
            });
            if blocked {
                continue;
            }

            let roll: f64 = self.rng.gen();
            let class = if roll < params.bus_share {
                VehicleClass::Bus
            } else if roll < params.bus_share + params.cv_share {
                VehicleClass::Cv
            } else {
                VehicleClass::Car
            };
            let desired_speed = self.desired_speed.sample(&mut self.rng).clamp(
                0.75 * params.speed_mean,
                1.25 * params.speed_mean,
            );

            self.seq += 1;
            let id = self.vehicles.insert(SimVehicle {
                name: format!("veh{}", self.seq),
                class,
                distance: params.spawn_distance,
                speed: desired_speed,
                desired_speed,
                timeloss: 0.0,
            });
            lane.vehicles.push(id);
        }
    }
}

/// Expands a cycle of actions into green, yellow and red phases.
fn fixed_time_program(plan: &SignalPlan, actions: &[Action], green: u32) -> Vec<(PhaseString, u32)> {
    let mut program = vec![];
    for (idx, action) in actions.iter().enumerate() {
        let phase = *plan.phase(*action);
        let next = *plan.phase(actions[(idx + 1) % actions.len()]);
        program.push((phase, green));
        if next != phase {
            let yellow = phase.yellow_towards(&next);
            program.push((yellow, 3));
            program.push((yellow.red_after_yellow(), 2));
        }
    }
    program
}
