use crate::error::{Error, Result};
use crate::phase::PhaseString;
use crate::util::Interval;
use itertools::iproduct;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::fmt;

/// The number of discrete control actions.
pub const NUM_ACTIONS: usize = 8;

/// The number of approaches to the intersection.
pub const NUM_APPROACHES: usize = 4;

/// The number of lanes on each approach.
pub const LANES_PER_APPROACH: usize = 4;

/// The number of (approach, lane) columns in an observation.
pub const NUM_LANES: usize = NUM_APPROACHES * LANES_PER_APPROACH;

/// A control decision: a pair of non-conflicting movements given right of way.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Serialize)]
pub struct Action(u8);

impl Action {
    /// Creates an action, checking it is in `0..=7`.
    pub fn new(value: u32) -> Result<Self> {
        if (value as usize) < NUM_ACTIONS {
            Ok(Self(value as u8))
        } else {
            Err(Error::InvalidAction(value))
        }
    }

    /// Gets the action's index into the phase table.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterates over every action.
    pub fn all() -> impl Iterator<Item = Action> + Clone {
        (0..NUM_ACTIONS as u8).map(Action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Determines which minimum green time applies to an action.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum MovementClass {
    Through,
    LeftTurn,
}

/// One approach to the intersection.
#[derive(Debug, Clone)]
pub struct Approach {
    /// A human readable name.
    pub name: &'static str,
    /// The ID of the incoming edge; its lanes are named `<edge>_<index>`.
    pub edge: String,
    /// The observation column of lane 0 on this approach.
    pub offset: usize,
    /// The signal groups belonging to this approach, inclusive.
    pub groups: Interval<usize>,
}

/// One entry of the action table.
#[derive(Debug, Clone, Copy)]
struct PhaseEntry {
    /// The movements served, for logging.
    label: &'static str,
    /// The green phase.
    phase: PhaseString,
    /// The class of movement served.
    class: MovementClass,
}

/// The static signal plan of the intersection: the action table and the
/// lane geometry shared by the controller and the encoder.
#[derive(Debug, Clone)]
pub struct SignalPlan {
    entries: [PhaseEntry; NUM_ACTIONS],
    approaches: [Approach; NUM_APPROACHES],
}

const fn entry(label: &'static str, phase: &[u8; 18], class: MovementClass) -> PhaseEntry {
    PhaseEntry {
        label,
        phase: PhaseString::from_ascii(phase),
        class,
    }
}

const STANDARD_ENTRIES: [PhaseEntry; NUM_ACTIONS] = {
    use MovementClass::*;
    [
        entry("WL EL", b"grrrgrrGGgrrrgrrGG", LeftTurn),
        entry("WL WT", b"grrrgrrrrgrrrgGGGG", LeftTurn),
        entry("WT ET", b"grrrgGGrrgrrrgGGrr", Through),
        entry("EL ET", b"grrrgGGGGgrrrgrrrr", LeftTurn),
        entry("SL NL", b"grrGgrrrrgrrGgrrrr", LeftTurn),
        entry("SL ST", b"grrrgrrrrgGGGgrrrr", LeftTurn),
        entry("ST NT", b"gGGrgrrrrgGGrgrrrr", Through),
        entry("NL NT", b"gGGGgrrrrgrrrgrrrr", LeftTurn),
    ]
};

static STANDARD: Lazy<SignalPlan> = Lazy::new(|| {
    let approach = |name, edge: &str, offset, groups: (usize, usize)| Approach {
        name,
        edge: edge.to_string(),
        offset,
        groups: Interval::new(groups.0, groups.1),
    };
    SignalPlan {
        entries: STANDARD_ENTRIES,
        approaches: [
            approach("east", "-E2", 0, (4, 8)),
            approach("south", "-E3", 4, (9, 12)),
            approach("west", "E0", 8, (13, 17)),
            approach("north", "E1", 12, (0, 3)),
        ],
    }
});

impl SignalPlan {
    /// Gets the standard four-approach, eighteen-group plan.
    pub fn standard() -> &'static SignalPlan {
        &STANDARD
    }

    /// Gets the green phase of an action.
    pub fn phase(&self, action: Action) -> &PhaseString {
        &self.entries[action.index()].phase
    }

    /// Gets the movement class of an action.
    pub fn class(&self, action: Action) -> MovementClass {
        self.entries[action.index()].class
    }

    /// Gets the movements served by an action.
    pub fn label(&self, action: Action) -> &'static str {
        self.entries[action.index()].label
    }

    /// Finds the action whose green phase exactly matches a signal string.
    pub fn find_action(&self, signal_state: &str) -> Option<Action> {
        Action::all().find(|action| self.phase(*action).to_string() == signal_state)
    }

    /// Gets the approaches.
    pub fn approaches(&self) -> &[Approach] {
        &self.approaches
    }

    /// Finds the approach fed by the given edge.
    pub fn approach(&self, edge: &str) -> Option<&Approach> {
        self.approaches.iter().find(|approach| approach.edge == edge)
    }

    /// Finds the approach a signal group belongs to.
    pub fn approach_of_group(&self, group: usize) -> Option<&Approach> {
        self.approaches
            .iter()
            .find(|approach| approach.groups.contains(group))
    }

    /// Gets the observation column of a lane, if the lane is on an approach.
    pub fn column(&self, edge: &str, lane_index: usize) -> Option<usize> {
        if lane_index >= LANES_PER_APPROACH {
            return None;
        }
        self.approach(edge).map(|approach| approach.offset + lane_index)
    }

    /// Iterates over every incoming lane as `(lane ID, observation column)`.
    pub fn lanes(&self) -> impl Iterator<Item = (String, usize)> + '_ {
        iproduct!(self.approaches.iter(), 0..LANES_PER_APPROACH)
            .map(|(approach, idx)| (format!("{}_{}", approach.edge, idx), approach.offset + idx))
    }
}
