//! Fully resolved machine graph, as produced by the compiler.
//!
//! Everything here is immutable after compilation.  Transition targets are
//! plain state indices, so the engine never touches names or symbol lookups
//! on a hot path.  The runtime keeps all mutable book-keeping (current
//! state, armed channels, soft levels) in [`crate::engine`]; this module is
//! just the shape of the machine.

use std::time::Duration;

/// Index of a state in declaration order.  Only meaningful together with
/// the [`CompiledMachine`] that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(pub(crate) usize);

impl StateId {
    /// Position of the state in the description's declaration order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Which array an output signal drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// A caller-supplied output line.
    Real,
    /// A line on the machine's virtual soft chip.
    Soft,
}

/// One level to apply on state entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSignal {
    pub kind: SignalKind,
    pub index: u16,
    pub value: bool,
}

/// One level-match edge out of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    /// Offset into the input array (real) or the soft chip (soft).
    pub index: u16,
    /// Level that triggers the transition.
    pub value: bool,
    pub target: StateId,
}

/// One timed edge out of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    pub target: StateId,
    pub after: Duration,
}

/// A single compiled state.
#[derive(Debug, PartialEq, Eq)]
pub struct State {
    pub name: String,
    /// Applied in declaration order on every entry.
    pub signals: Vec<OutputSignal>,
    /// Real-input edges, scanned and armed on entry.
    pub input_events: Vec<InputEvent>,
    /// Soft-line edges, scanned on entry and on every soft write.
    pub soft_events: Vec<InputEvent>,
    /// At most one delay edge per state.
    pub delay: Option<TimedEvent>,
    /// At most one shutdown edge per state.  A terminal state points this
    /// at itself with a zero delay.
    pub shutdown: Option<TimedEvent>,
}

/// The whole machine: states plus the global facts the engine needs.
#[derive(Debug, PartialEq, Eq)]
pub struct CompiledMachine {
    pub(crate) states: Vec<State>,
    pub(crate) start: StateId,
    pub(crate) shutdown_state: Option<StateId>,
    pub(crate) input_count: usize,
    pub(crate) output_count: usize,
    pub(crate) soft_count: usize,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) verbosity: u8,
}

impl CompiledMachine {
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Find a state by its declared name.
    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.states.iter().position(|s| s.name == name).map(StateId)
    }

    pub fn state_name(&self, id: StateId) -> &str {
        &self.states[id.0].name
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    /// The state made current by a forced shutdown, if the description
    /// marked one.
    pub fn shutdown_state(&self) -> Option<StateId> {
        self.shutdown_state
    }

    /// A state is terminal when its shutdown edge loops back to itself.
    pub fn is_terminal(&self, id: StateId) -> bool {
        self.states[id.0].shutdown.map(|t| t.target) == Some(id)
    }

    pub fn soft_count(&self) -> usize {
        self.soft_count
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub(crate) fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    pub(crate) fn chatty(&self) -> bool {
        self.verbosity >= 1
    }
}
