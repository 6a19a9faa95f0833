use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The number of signal groups at the intersection.
pub const NUM_SIGNAL_GROUPS: usize = 18;

/// The state of a single signal group.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum SignalState {
    /// Protected green, `G`.
    Green,
    /// Permitted green, `g`. Vehicles must yield to conflicting movements.
    Permitted,
    /// Yellow clearance, `Y`.
    Yellow,
    /// Red, `r`.
    Red,
}

impl SignalState {
    /// Gets the character used for this state in a phase string.
    pub const fn as_char(self) -> char {
        match self {
            SignalState::Green => 'G',
            SignalState::Permitted => 'g',
            SignalState::Yellow => 'Y',
            SignalState::Red => 'r',
        }
    }

    /// Parses a phase string character.
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'G' => Some(SignalState::Green),
            'g' => Some(SignalState::Permitted),
            'Y' => Some(SignalState::Yellow),
            'r' => Some(SignalState::Red),
            _ => None,
        }
    }

    /// Whether vehicles controlled by this group may enter the intersection.
    pub fn is_green(self) -> bool {
        matches!(self, SignalState::Green | SignalState::Permitted)
    }
}

/// The state of every signal group, one character per group.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct PhaseString([SignalState; NUM_SIGNAL_GROUPS]);

impl PhaseString {
    /// Builds a phase string from an ASCII literal, failing at compile time
    /// when used in a const context with a bad literal.
    pub const fn from_ascii(s: &[u8; NUM_SIGNAL_GROUPS]) -> Self {
        let mut states = [SignalState::Red; NUM_SIGNAL_GROUPS];
        let mut i = 0;
        while i < NUM_SIGNAL_GROUPS {
            states[i] = match SignalState::from_char(s[i] as char) {
                Some(state) => state,
                None => panic!("invalid signal state character"),
            };
            i += 1;
        }
        Self(states)
    }

    /// Gets the state of one signal group.
    pub fn get(&self, group: usize) -> Option<SignalState> {
        self.0.get(group).copied()
    }

    /// Builds the yellow clearance phase for a switch from `self` to `next`.
    ///
    /// Only groups showing a protected green that changes receive yellow.
    /// A permitted green losing right of way is passed through unchanged.
    pub fn yellow_towards(&self, next: &PhaseString) -> PhaseString {
        let mut states = self.0;
        for (state, next) in states.iter_mut().zip(next.0) {
            if *state == SignalState::Green && next != SignalState::Green {
                *state = SignalState::Yellow;
            }
        }
        PhaseString(states)
    }

    /// Builds the red clearance phase that follows this (yellow) phase.
    pub fn red_after_yellow(&self) -> PhaseString {
        PhaseString(self.0.map(|state| match state {
            SignalState::Yellow => SignalState::Red,
            state => state,
        }))
    }

    /// Iterates over the indices of groups holding a protected green.
    pub fn protected_greens(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, state)| **state == SignalState::Green)
            .map(|(idx, _)| idx)
    }
}

impl FromStr for PhaseString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidPhase {
            input: s.to_string(),
            reason,
        };
        if s.chars().count() != NUM_SIGNAL_GROUPS {
            return Err(invalid("expected 18 signal groups"));
        }
        let mut states = [SignalState::Red; NUM_SIGNAL_GROUPS];
        for (state, c) in states.iter_mut().zip(s.chars()) {
            *state = SignalState::from_char(c).ok_or_else(|| invalid("expected one of G, g, Y, r"))?;
        }
        Ok(Self(states))
    }
}

impl fmt::Display for PhaseString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|state| write!(f, "{}", state.as_char()))
    }
}

impl Serialize for PhaseString {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
