//! Tests that drive whole episodes through a scripted simulator.

use std::cell::RefCell;
use std::rc::Rc;

use assert_approx_eq::assert_approx_eq;
use signal_control::{
    Action, EnvConfig, EnvState, Error, IntersectionEnv, Observation, ObservationMode,
    PhaseString, RewardSource, SignalPlan, Simulator, SimulatorError, VehicleClass,
    VehicleSnapshot,
};

/// Everything the scripted simulator was asked to do.
#[derive(Default, Debug)]
struct Log {
    /// The argument of every `step` call.
    steps: Vec<u32>,
    /// Every signal state set, with the tick at which it was set.
    signals: Vec<(u32, String)>,
    starts: u32,
    closes: u32,
}

/// A simulator with one approaching vehicle whose timeloss equals the
/// current tick, and halted counts given by a script.
struct ScriptedSim {
    log: Rc<RefCell<Log>>,
    tick: u32,
    running: bool,
    initial_signal: String,
    signal: String,
    /// Halted vehicles on lane `E0_0` as a function of the tick.
    halted: fn(u32) -> u32,
    /// Fail any `step` call that would pass this tick.
    fail_after: Option<u32>,
    /// Fail every `close` call.
    fail_close: bool,
    /// Vehicles reported alongside the scripted car and bus.
    extra: Vec<VehicleSnapshot>,
}

impl ScriptedSim {
    fn new(initial_signal: &str) -> (Self, Rc<RefCell<Log>>) {
        let log = Rc::new(RefCell::new(Log::default()));
        let sim = Self {
            log: log.clone(),
            tick: 0,
            running: false,
            initial_signal: initial_signal.to_string(),
            signal: String::new(),
            halted: |_| 0,
            fail_after: None,
            fail_close: false,
            extra: vec![],
        };
        (sim, log)
    }
}

impl Simulator for ScriptedSim {
    fn start(&mut self, _seed: Option<u64>) -> Result<(), SimulatorError> {
        self.log.borrow_mut().starts += 1;
        self.tick = 0;
        self.running = true;
        self.signal = self.initial_signal.clone();
        Ok(())
    }

    fn step(&mut self, ticks: u32) -> Result<(), SimulatorError> {
        if !self.running {
            return Err(SimulatorError::NoSession);
        }
        if self.fail_after.map_or(false, |t| self.tick + ticks > t) {
            return Err(SimulatorError::Step("connection lost".into()));
        }
        self.log.borrow_mut().steps.push(ticks);
        self.tick += ticks;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SimulatorError> {
        self.log.borrow_mut().closes += 1;
        if !self.running {
            return Err(SimulatorError::NoSession);
        }
        self.running = false;
        if self.fail_close {
            return Err(SimulatorError::Close("connection lost".into()));
        }
        Ok(())
    }

    fn vehicles(&self) -> Result<Vec<VehicleSnapshot>, SimulatorError> {
        let scripted = [
            VehicleSnapshot {
                id: "veh0".into(),
                class: VehicleClass::Car,
                lane_id: "E0_1".into(),
                distance: Some(50.0),
                speed: 0.0,
                timeloss: self.tick as f64,
            },
            VehicleSnapshot {
                id: "veh1".into(),
                class: VehicleClass::Bus,
                lane_id: ":J1_2_0".into(),
                distance: None,
                speed: 10.0,
                timeloss: 1000.0,
            },
        ];
        Ok(scripted.into_iter().chain(self.extra.clone()).collect())
    }

    fn lane_halt_count(&self, lane_id: &str) -> Result<u32, SimulatorError> {
        Ok(if lane_id == "E0_0" {
            (self.halted)(self.tick)
        } else {
            0
        })
    }

    fn signal_state(&self, _junction_id: &str) -> Result<String, SimulatorError> {
        Ok(self.signal.clone())
    }

    fn set_signal_state(
        &mut self,
        _junction_id: &str,
        state: &PhaseString,
    ) -> Result<(), SimulatorError> {
        self.signal = state.to_string();
        self.log.borrow_mut().signals.push((self.tick, self.signal.clone()));
        Ok(())
    }
}

fn phase_of(action: u32) -> String {
    SignalPlan::standard()
        .phase(Action::new(action).unwrap())
        .to_string()
}

fn small_config() -> EnvConfig {
    EnvConfig {
        warmup_ticks: 10,
        horizon_ticks: 100,
        ..Default::default()
    }
}

/// Test that `[0, 0, 3]` from action 0 holds twice, then clears into action 3.
#[test]
fn hold_then_switch() {
    let (sim, log) = ScriptedSim::new(&phase_of(0));
    let mut env = IntersectionEnv::new(sim, EnvConfig::default()).unwrap();
    env.reset(Some(1)).unwrap();
    assert_eq!(env.state(), EnvState::Running);
    assert_eq!(env.episode().unwrap().last_action, Action::new(0).unwrap());

    let first = env.step(0).unwrap();
    let second = env.step(0).unwrap();
    assert!(!first.info.transitioned && !second.info.transitioned);
    assert!(log.borrow().signals.is_empty());

    let third = env.step(3).unwrap();
    assert!(third.info.transitioned);
    {
        let log = log.borrow();
        assert_eq!(log.steps, vec![600, 1, 1, 3, 2, 5]);
        assert_eq!(
            log.signals,
            vec![
                (602, "grrrgrrGGgrrrgrrYY".to_string()),
                (605, "grrrgrrGGgrrrgrrrr".to_string()),
                (607, "grrrgGGGGgrrrgrrrr".to_string()),
            ]
        );
    }

    // Timeloss grows by one per tick, so delay rises and every reward is negative
    assert_approx_eq!(first.reward, -1.0);
    assert_approx_eq!(second.reward, -1.0);
    assert_approx_eq!(third.reward, -10.0);
    let ep = env.episode().unwrap();
    assert_approx_eq!(ep.reward, -12.0);
    assert_eq!(ep.ticks, 12);
    assert_eq!(ep.decision_steps, 3);
    assert_eq!(ep.last_action, Action::new(3).unwrap());
    assert_eq!(ep.phase.to_string(), phase_of(3));
    assert_approx_eq!(third.info.person_delay, 612.0);
}

/// Test that an unknown post-warmup signal state seeds action 0.
#[test]
fn unmatched_signal_seeds_action_zero() {
    let (sim, log) = ScriptedSim::new("rrrrrrrrrrrrrrrrrr");
    let mut env = IntersectionEnv::new(sim, small_config()).unwrap();
    env.reset(None).unwrap();
    assert_eq!(env.episode().unwrap().last_action, Action::new(0).unwrap());
    assert_eq!(env.episode().unwrap().phase.to_string(), phase_of(0));

    // Action 0 is treated as already being served
    env.step(0).unwrap();
    assert!(log.borrow().signals.is_empty());

    // The clearance is computed from action 0's phase, not the simulator's
    env.step(1).unwrap();
    assert_eq!(log.borrow().signals[0].1, "grrrgrrYYgrrrgrrGG");
}

#[test]
fn matched_signal_seeds_that_action() {
    let (sim, log) = ScriptedSim::new(&phase_of(5));
    let mut env = IntersectionEnv::new(sim, small_config()).unwrap();
    env.reset(None).unwrap();
    assert_eq!(env.episode().unwrap().last_action, Action::new(5).unwrap());
    env.step(5).unwrap();
    assert!(log.borrow().signals.is_empty());
}

#[test]
fn invalid_action_changes_nothing() {
    let (sim, log) = ScriptedSim::new(&phase_of(0));
    let mut env = IntersectionEnv::new(sim, small_config()).unwrap();
    env.reset(None).unwrap();
    env.step(2).unwrap();
    let before = env.episode().cloned();
    let steps_before = log.borrow().steps.len();

    assert!(matches!(env.step(8), Err(Error::InvalidAction(8))));
    assert!(matches!(env.step(100), Err(Error::InvalidAction(100))));
    assert_eq!(env.episode().cloned(), before);
    assert_eq!(log.borrow().steps.len(), steps_before);
    assert_eq!(env.state(), EnvState::Running);
}

/// Test that the horizon is reached exactly, whatever the decisions.
#[test]
fn horizon_is_exact() {
    for actions in [vec![2, 6], vec![0], vec![1, 1, 4, 7, 7, 7, 3]] {
        let (sim, log) = ScriptedSim::new(&phase_of(0));
        let mut env = IntersectionEnv::new(sim, small_config()).unwrap();
        env.reset(None).unwrap();

        let mut decisions = 0;
        let last = loop {
            let step = env.step(actions[decisions % actions.len()]).unwrap();
            decisions += 1;
            assert!(!step.terminated);
            if step.truncated {
                break step;
            }
            assert!(step.info.ticks < 100);
        };

        assert_eq!(last.info.ticks, 100);
        assert_eq!(log.borrow().steps.iter().sum::<u32>(), 110);
        assert_eq!(env.state(), EnvState::Terminated);
        assert!(env.episode().is_none());
        assert!(!env.simulator().running);
        assert_eq!(log.borrow().closes, 1);

        let history = env.history().episodes();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].ticks, 100);
        assert_eq!(history[0].decision_steps as usize, decisions);
        if actions == vec![0] {
            assert_eq!(decisions, 100);
        }

        assert!(matches!(env.step(0), Err(Error::NotRunning)));
    }
}

#[test]
fn step_before_reset_fails() {
    let (sim, _) = ScriptedSim::new(&phase_of(0));
    let mut env = IntersectionEnv::new(sim, small_config()).unwrap();
    assert!(matches!(env.step(0), Err(Error::NotRunning)));
    assert_eq!(env.state(), EnvState::Idle);
}

#[test]
fn rewards_archive_across_episodes() {
    let (sim, log) = ScriptedSim::new(&phase_of(0));
    let mut env = IntersectionEnv::new(sim, small_config()).unwrap();
    for _ in 0..3 {
        env.reset(None).unwrap();
        while !env.step(0).unwrap().truncated {}
    }
    assert_eq!(log.borrow().starts, 3);
    // Person delay rises by one each tick over the horizon
    let rewards = env.history().rewards().collect::<Vec<_>>();
    assert_eq!(rewards.len(), 3);
    for reward in &rewards {
        assert_approx_eq!(*reward, -100.0);
    }

    let mut csv = vec![];
    env.history().write_csv(&mut csv).unwrap();
    assert_eq!(String::from_utf8(csv).unwrap(), "-100\n-100\n-100\n");
}

#[test]
fn reset_closes_running_session() {
    let (sim, log) = ScriptedSim::new(&phase_of(0));
    let mut env = IntersectionEnv::new(sim, small_config()).unwrap();
    env.reset(None).unwrap();
    env.step(4).unwrap();
    env.reset(None).unwrap();
    assert_eq!(log.borrow().closes, 1);
    assert_eq!(log.borrow().starts, 2);
    assert_eq!(env.episode().unwrap().ticks, 0);
}

#[test]
fn simulator_failure_releases_session() {
    let (mut sim, log) = ScriptedSim::new(&phase_of(0));
    sim.fail_after = Some(40);
    let mut env = IntersectionEnv::new(sim, small_config()).unwrap();
    env.reset(None).unwrap();
    env.step(2).unwrap();

    let result = env.step(6);
    assert!(matches!(
        result,
        Err(Error::SimulatorUnavailable(SimulatorError::Step(_)))
    ));
    assert_eq!(env.state(), EnvState::Idle);
    assert!(env.episode().is_none());
    assert!(!env.simulator().running);
    assert_eq!(log.borrow().closes, 1);
    assert!(matches!(env.step(6), Err(Error::NotRunning)));

    drop(env);
    assert_eq!(log.borrow().closes, 1);
}

#[test]
fn drop_closes_session() {
    let (sim, log) = ScriptedSim::new(&phase_of(0));
    let mut env = IntersectionEnv::new(sim, small_config()).unwrap();
    env.reset(None).unwrap();
    env.step(1).unwrap();
    drop(env);
    assert_eq!(log.borrow().closes, 1);
}

#[test]
fn halted_vehicle_reward() {
    let (mut sim, _) = ScriptedSim::new(&phase_of(0));
    sim.halted = |tick| tick / 10;
    let config = EnvConfig {
        reward: RewardSource::HaltedVehicles,
        mode: ObservationMode::Vector,
        ..EnvConfig::default()
    };
    let mut env = IntersectionEnv::new(sim, config).unwrap();
    let (obs, info) = env.reset(None).unwrap();
    assert_eq!(info.halted_vehicles, 60);
    assert_eq!(obs, {
        let mut v = vec![0.0; 16];
        v[8] = 1.0;
        Observation::Vector(v)
    });

    let hold = env.step(0).unwrap();
    assert_approx_eq!(hold.reward, 0.0);
    let switch = env.step(2).unwrap();
    assert_eq!(switch.info.halted_vehicles, 61);
    assert_approx_eq!(switch.reward, -1.0);
    // Person delay is still reported
    assert_approx_eq!(switch.info.person_delay, 618.0);
}

#[test]
fn combined_observation_shape() {
    let (sim, _) = ScriptedSim::new(&phase_of(0));
    let config = EnvConfig {
        mode: ObservationMode::Combined,
        ..small_config()
    };
    let mut env = IntersectionEnv::new(sim, config).unwrap();
    assert_eq!(env.observation_shape(), vec![3, 50, 16]);
    let (obs, info) = env.reset(None).unwrap();
    assert_eq!(obs.shape(), vec![3, 50, 16]);
    assert_eq!(info.skipped_vehicles, 0);
    let Observation::Combined(grid) = obs else {
        panic!("expected a combined observation");
    };
    // The car on E0_1 at 50 m sits in row 7 of column 9
    assert_eq!(grid.get(0, 7, 9), Some(1));
    assert_eq!(grid.get(1, 7, 9), Some(0));
}

#[test]
fn rejects_invalid_config() {
    let (sim, _) = ScriptedSim::new(&phase_of(0));
    let config = EnvConfig {
        horizon_ticks: 0,
        ..small_config()
    };
    assert!(matches!(
        IntersectionEnv::new(sim, config),
        Err(Error::Config(_))
    ));
}

/// Test that the final step is still reported when closing the session at
/// the horizon fails.
#[test]
fn horizon_survives_close_failure() {
    let (mut sim, log) = ScriptedSim::new(&phase_of(0));
    sim.fail_close = true;
    let config = EnvConfig {
        horizon_ticks: 3,
        ..small_config()
    };
    let mut env = IntersectionEnv::new(sim, config).unwrap();
    env.reset(None).unwrap();

    env.step(0).unwrap();
    env.step(0).unwrap();
    let last = env.step(0).unwrap();
    assert!(last.truncated);
    assert_eq!(last.info.ticks, 3);
    assert_approx_eq!(last.reward, -1.0);

    assert_eq!(env.state(), EnvState::Terminated);
    let history = env.history().episodes();
    assert_eq!(history.len(), 1);
    assert_approx_eq!(history[0].reward, -3.0);
    assert_eq!(history[0].decision_steps, 3);
    assert_eq!(log.borrow().closes, 1);

    // The failed session is not closed again
    drop(env);
    assert_eq!(log.borrow().closes, 1);
}

/// Test that a vehicle on a malformed lane is left off the grid but still
/// counts toward delay.
#[test]
fn malformed_lane_is_skipped_but_delayed() {
    let (mut sim, _) = ScriptedSim::new(&phase_of(0));
    sim.extra.push(VehicleSnapshot {
        id: "veh2".into(),
        class: VehicleClass::Car,
        lane_id: "E0".into(),
        distance: Some(20.0),
        speed: 3.0,
        timeloss: 5.0,
    });
    let mut env = IntersectionEnv::new(sim, small_config()).unwrap();

    let (obs, info) = env.reset(None).unwrap();
    assert_eq!(info.skipped_vehicles, 1);
    assert_approx_eq!(info.person_delay, 15.0);
    let Observation::Image(grid) = obs else {
        panic!("expected an image observation");
    };
    // Only the scripted car on E0_1 is placed
    assert_eq!(grid.as_slice().iter().filter(|v| **v != 0).count(), 1);
    assert_eq!(grid.get(0, 7, 9), Some(1));

    let step = env.step(0).unwrap();
    assert_eq!(step.info.skipped_vehicles, 1);
    assert_approx_eq!(step.info.person_delay, 16.0);
}

#[test]
fn config_is_kept() {
    let (sim, _) = ScriptedSim::new(&phase_of(0));
    let env = IntersectionEnv::new(sim, small_config()).unwrap();
    assert_eq!(env.config(), &small_config());
}
