use crate::config::SignalTiming;
use crate::error::Result;
use crate::phase::PhaseString;
use crate::plan::{Action, MovementClass, SignalPlan};
use arrayvec::ArrayVec;
use log::debug;

/// Converts control decisions into lawful sequences of signal states.
#[derive(Debug, Clone)]
pub struct PhaseController {
    plan: &'static SignalPlan,
    timing: SignalTiming,
}

/// What a step of a [TransitionPlan] does.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StepKind {
    /// Keep the current phase; nothing is sent to the signal actuator.
    Hold,
    /// Yellow clearance for groups losing a protected green.
    Yellow,
    /// Red clearance following the yellow.
    Red,
    /// The green phase of the new action.
    Green,
}

/// One signal state and how long it must be held.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PlanStep {
    pub kind: StepKind,
    pub phase: PhaseString,
    /// The hold time in ticks.
    pub ticks: u32,
}

/// The ordered signal states to apply for one decision.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TransitionPlan {
    steps: ArrayVec<PlanStep, 3>,
}

impl TransitionPlan {
    /// Gets the steps, in the order they must be applied.
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Whether this plan keeps the current phase without a clearance interval.
    pub fn is_hold(&self) -> bool {
        matches!(self.steps.as_slice(), [PlanStep { kind: StepKind::Hold, .. }])
    }

    /// The total number of ticks the plan takes.
    pub fn total_ticks(&self) -> u32 {
        self.steps.iter().map(|step| step.ticks).sum()
    }

    /// The phase in force once the plan completes.
    pub fn final_phase(&self) -> &PhaseString {
        // Plans always have at least one step
        &self.steps[self.steps.len() - 1].phase
    }
}

impl PhaseController {
    /// Creates a controller for the given plan and timings.
    pub fn new(plan: &'static SignalPlan, timing: SignalTiming) -> Self {
        Self { plan, timing }
    }

    /// Gets the signal plan.
    pub fn plan(&self) -> &'static SignalPlan {
        self.plan
    }

    /// The minimum green time of an action.
    pub fn min_green(&self, action: Action) -> u32 {
        match self.plan.class(action) {
            MovementClass::Through => self.timing.min_through_green,
            MovementClass::LeftTurn => self.timing.min_left_green,
        }
    }

    /// Computes the signal states needed to serve `requested`.
    ///
    /// # Parameters
    /// * `current` - The action currently being served
    /// * `current_phase` - The phase currently displayed
    /// * `requested` - The requested action, which must be in `0..=7`
    /// * `hold` - The caller's desired green time for a new action, in ticks
    pub fn transition(
        &self,
        current: Action,
        current_phase: &PhaseString,
        requested: u32,
        hold: u32,
    ) -> Result<TransitionPlan> {
        let requested = Action::new(requested)?;
        let mut steps = ArrayVec::new();

        if requested == current {
            steps.push(PlanStep {
                kind: StepKind::Hold,
                phase: *current_phase,
                ticks: 1,
            });
            return Ok(TransitionPlan { steps });
        }

        let green = *self.plan.phase(requested);
        let yellow = current_phase.yellow_towards(&green);
        let red = yellow.red_after_yellow();
        let green_ticks = u32::max(self.min_green(requested), hold);

        debug!(
            "switching {} -> {} ({}): yellow {} red {} green {} for {} ticks",
            current,
            requested,
            self.plan.label(requested),
            yellow,
            red,
            green,
            green_ticks
        );

        steps.push(PlanStep {
            kind: StepKind::Yellow,
            phase: yellow,
            ticks: self.timing.yellow,
        });
        steps.push(PlanStep {
            kind: StepKind::Red,
            phase: red,
            ticks: self.timing.red,
        });
        steps.push(PlanStep {
            kind: StepKind::Green,
            phase: green,
            ticks: green_ticks,
        });
        Ok(TransitionPlan { steps })
    }
}
