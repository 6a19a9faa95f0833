use crate::config::{EnvConfig, RewardSource};
use crate::controller::{PhaseController, StepKind};
use crate::delay::DelayAggregator;
use crate::error::{Error, Result, SimulatorError};
use crate::observation::{Encoding, Observation, ObservationEncoder, QueueCounts};
use crate::phase::PhaseString;
use crate::plan::{Action, SignalPlan};
use crate::simulator::Simulator;
use log::{debug, info, warn};
use serde::Serialize;
use std::io::Write;

/// The lifecycle of an [IntersectionEnv].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EnvState {
    /// No session is running.
    Idle,
    /// The simulator is advancing before the first decision.
    Warmup,
    /// Decisions are being taken.
    Running,
    /// The horizon was reached and the session closed.
    Terminated,
}

/// The mutable control state of one episode.
#[derive(Debug, PartialEq, Clone)]
pub struct EpisodeState {
    /// The action currently being served.
    pub last_action: Action,
    /// The phase most recently applied for `last_action`.
    pub phase: PhaseString,
    /// The reward total observed after the previous decision.
    pub previous_total: f64,
    /// The number of decisions taken.
    pub decision_steps: u32,
    /// The number of ticks simulated since warmup.
    pub ticks: u32,
    /// The accumulated reward.
    pub reward: f64,
}

/// Per-step diagnostics.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct StepInfo {
    pub episode_step: u32,
    pub ticks: u32,
    pub halted_vehicles: u32,
    pub person_delay: f64,
    pub skipped_vehicles: usize,
    /// Whether a clearance interval and a new green were applied.
    pub transitioned: bool,
}

/// The outcome of one decision.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Step {
    pub observation: Observation,
    pub reward: f64,
    /// Always false: episodes end on time only.
    pub terminated: bool,
    /// Set once the horizon is reached.
    pub truncated: bool,
    pub info: StepInfo,
}

/// A finished episode.
#[derive(Debug, PartialEq, Clone, Copy, Serialize)]
pub struct EpisodeSummary {
    pub reward: f64,
    pub decision_steps: u32,
    pub ticks: u32,
}

/// The summaries of every finished episode.
#[derive(Debug, Default, PartialEq, Clone, Serialize)]
pub struct EpisodeHistory {
    episodes: Vec<EpisodeSummary>,
}

impl EpisodeHistory {
    /// Gets the finished episodes in order.
    pub fn episodes(&self) -> &[EpisodeSummary] {
        &self.episodes
    }

    /// Gets the total reward of each finished episode.
    pub fn rewards(&self) -> impl Iterator<Item = f64> + '_ {
        self.episodes.iter().map(|ep| ep.reward)
    }

    /// Writes the episode rewards, one per line.
    pub fn write_csv(&self, mut out: impl Write) -> Result<()> {
        for reward in self.rewards() {
            writeln!(out, "{}", reward)?;
        }
        Ok(())
    }
}

/// A single signalised intersection driven through a simulator session.
pub struct IntersectionEnv<S: Simulator> {
    sim: S,
    config: EnvConfig,
    controller: PhaseController,
    encoder: ObservationEncoder,
    delay: DelayAggregator,
    state: EnvState,
    episode: Option<EpisodeState>,
    history: EpisodeHistory,
    /// The number of episodes started.
    episodes: u32,
    /// Whether the simulator may be holding a session.
    session_open: bool,
}

impl<S: Simulator> IntersectionEnv<S> {
    /// Creates an environment using the standard signal plan.
    pub fn new(sim: S, config: EnvConfig) -> Result<Self> {
        config.validate()?;
        let plan = SignalPlan::standard();
        Ok(Self {
            sim,
            controller: PhaseController::new(plan, config.timing),
            encoder: ObservationEncoder::new(plan, config.grid, config.occupancy),
            delay: DelayAggregator::new(config.occupancy),
            config,
            state: EnvState::Idle,
            episode: None,
            history: Default::default(),
            episodes: 0,
            session_open: false,
        })
    }

    /// Gets the lifecycle state.
    pub fn state(&self) -> EnvState {
        self.state
    }

    /// Gets the running episode's control state.
    pub fn episode(&self) -> Option<&EpisodeState> {
        self.episode.as_ref()
    }

    /// Gets the finished episodes.
    pub fn history(&self) -> &EpisodeHistory {
        &self.history
    }

    /// Gets the configuration.
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Gets the simulator.
    pub fn simulator(&self) -> &S {
        &self.sim
    }

    /// Gets the shape of the observations this environment produces.
    pub fn observation_shape(&self) -> Vec<usize> {
        self.config.mode.shape(&self.config.grid)
    }

    /// Starts a new episode: opens a session, runs the warmup and
    /// infers the action being served from the simulator's signals.
    pub fn reset(&mut self, seed: Option<u64>) -> Result<(Observation, StepInfo)> {
        self.episodes += 1;
        self.episode = None;
        if self.session_open {
            if let Err(err) = self.sim.close() {
                warn!("closing previous session: {}", err);
            }
        }

        self.state = EnvState::Warmup;
        self.session_open = true;
        let started = self.sim.start(seed);
        self.checked(started)?;
        if self.config.warmup_ticks > 0 {
            let stepped = self.sim.step(self.config.warmup_ticks);
            self.checked(stepped)?;
        }

        let (encoding, person_delay) = self.observe()?;
        let signal = self.sim.signal_state(&self.config.junction_id);
        let signal = self.checked(signal)?;

        let plan = self.controller.plan();
        let last_action = plan.find_action(&signal).unwrap_or_else(|| {
            warn!(
                "signal state {:?} of {} is not in the action table, assuming action 0",
                signal, self.config.junction_id
            );
            Action::default()
        });

        self.episode = Some(EpisodeState {
            last_action,
            phase: *plan.phase(last_action),
            previous_total: self.reward_total(&encoding, person_delay),
            decision_steps: 0,
            ticks: 0,
            reward: 0.0,
        });
        self.state = EnvState::Running;
        info!(
            "episode {} started serving action {} ({})",
            self.episodes,
            last_action,
            plan.label(last_action)
        );

        let info = StepInfo {
            episode_step: 0,
            ticks: 0,
            halted_vehicles: encoding.halted_total,
            person_delay,
            skipped_vehicles: encoding.skipped,
            transitioned: false,
        };
        Ok((encoding.observation, info))
    }

    /// Serves `action` for one decision and observes the result.
    ///
    /// Fails without changing any state if the action is not in `0..=7`
    /// or no episode is running.
    pub fn step(&mut self, action: u32) -> Result<Step> {
        let (last_action, phase, mut ticks) = match (&self.state, &self.episode) {
            (EnvState::Running, Some(ep)) => (ep.last_action, ep.phase, ep.ticks),
            _ => return Err(Error::NotRunning),
        };
        let transition = self.controller.transition(
            last_action,
            &phase,
            action,
            self.config.green_hold_ticks,
        )?;
        let action = Action::new(action)?;

        let horizon = self.config.horizon_ticks;
        for step in transition.steps() {
            let remaining = horizon.saturating_sub(ticks);
            if remaining == 0 {
                break;
            }
            if step.kind != StepKind::Hold {
                let set = self.sim.set_signal_state(&self.config.junction_id, &step.phase);
                self.checked(set)?;
            } else {
                debug!("holding action {}", action);
            }
            let n = u32::min(step.ticks, remaining);
            let stepped = self.sim.step(n);
            self.checked(stepped)?;
            ticks += n;
        }

        let (encoding, person_delay) = self.observe()?;
        let total = self.reward_total(&encoding, person_delay);

        let Some(ep) = self.episode.as_mut() else {
            return Err(Error::NotRunning);
        };
        let reward = ep.previous_total - total;
        ep.last_action = action;
        ep.phase = *transition.final_phase();
        ep.previous_total = total;
        ep.decision_steps += 1;
        ep.ticks = ticks;
        ep.reward += reward;

        let info = StepInfo {
            episode_step: ep.decision_steps,
            ticks,
            halted_vehicles: encoding.halted_total,
            person_delay,
            skipped_vehicles: encoding.skipped,
            transitioned: !transition.is_hold(),
        };

        let truncated = ticks >= horizon;
        if truncated {
            self.finish();
        }

        Ok(Step {
            observation: encoding.observation,
            reward,
            terminated: false,
            truncated,
            info,
        })
    }

    /// Closes the simulator session, abandoning any running episode.
    pub fn close(&mut self) -> Result<()> {
        self.episode = None;
        self.state = EnvState::Idle;
        if self.session_open {
            self.session_open = false;
            self.sim.close()?;
        }
        Ok(())
    }

    /// Ends the running episode at the horizon and archives it. The episode
    /// counts as finished even if the session fails to close.
    fn finish(&mut self) {
        self.state = EnvState::Terminated;
        if let Some(ep) = self.episode.take() {
            info!(
                "episode {} finished after {} decisions and {} ticks, total reward {}",
                self.episodes, ep.decision_steps, ep.ticks, ep.reward
            );
            self.history.episodes.push(EpisodeSummary {
                reward: ep.reward,
                decision_steps: ep.decision_steps,
                ticks: ep.ticks,
            });
        }
        self.session_open = false;
        if let Err(err) = self.sim.close() {
            warn!("closing session at the horizon: {}", err);
        }
    }

    /// Reads the simulator's telemetry and encodes it.
    fn observe(&mut self) -> Result<(Encoding, f64)> {
        let vehicles = self.sim.vehicles();
        let vehicles = self.checked(vehicles)?;

        let mut queues = QueueCounts::new();
        for (lane_id, _) in self.controller.plan().lanes() {
            let count = self.sim.lane_halt_count(&lane_id);
            let count = self.checked(count)?;
            queues.insert(lane_id, count);
        }

        let encoding = self
            .encoder
            .encode(&vehicles, &queues, self.config.mode, self.config.cv_only);
        let delay = self.delay.total(&vehicles, self.config.cv_only);
        Ok((encoding, delay))
    }

    /// The total whose decrease is rewarded.
    fn reward_total(&self, encoding: &Encoding, person_delay: f64) -> f64 {
        match self.config.reward {
            RewardSource::PersonDelay => person_delay,
            RewardSource::HaltedVehicles => encoding.halted_total as f64,
        }
    }

    /// Passes a simulator result through, abandoning the episode and
    /// releasing the session if it failed.
    fn checked<T>(&mut self, result: std::result::Result<T, SimulatorError>) -> Result<T> {
        result.map_err(|err| {
            self.abort();
            err.into()
        })
    }

    fn abort(&mut self) {
        self.episode = None;
        self.state = EnvState::Idle;
        if self.session_open {
            self.session_open = false;
            if let Err(err) = self.sim.close() {
                warn!("releasing session after failure: {}", err);
            }
        }
    }
}

impl<S: Simulator> Drop for IntersectionEnv<S> {
    fn drop(&mut self) {
        if self.session_open {
            if let Err(err) = self.sim.close() {
                warn!("closing session on drop: {}", err);
            }
        }
    }
}
