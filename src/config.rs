//! Machine description as handed to the compiler.
//!
//! This is the untyped, declarative form: a flat list of named state nodes,
//! each carrying named records of packed `u32` cells.  Nothing here is
//! validated here: the description deserializes from JSON (or is built in
//! code) and all meaning is assigned by [`crate::compiler::compile`].

use serde::{Deserialize, Serialize};

/// Shutdown wait bound applied when a description does not set one.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// One named record inside a state node.
///
/// The name decides the record's role: `set` introduces signals, the two
/// marker names flag start/terminal states, and any other name is a
/// transition target.  The cells are (kind+index, parameter) pairs packed
/// per [`crate::tokens`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub name: String,
    #[serde(default)]
    pub cells: Vec<u32>,
}

impl PropertyRecord {
    pub fn new(name: impl Into<String>, cells: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    /// A bare marker record (`start_state`, `shutdown_state`).
    pub fn marker(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }
}

/// One state node: a unique name plus its records in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateNode {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<PropertyRecord>,
}

impl StateNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Append a record, builder style.  Declaration order is significant:
    /// signals apply in order and transition records scan in order.
    pub fn record(mut self, name: impl Into<String>, cells: Vec<u32>) -> Self {
        self.properties.push(PropertyRecord::new(name, cells));
        self
    }

    /// Append a bare marker record.
    pub fn mark(self, name: impl Into<String>) -> Self {
        self.record(name, Vec::new())
    }
}

/// A whole machine description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// How many soft lines the machine's virtual chip exposes.
    #[serde(default)]
    pub soft_count: usize,
    /// Upper bound on the shutdown wait, in milliseconds.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// 0 = quiet, 1 = log transitions, 2 = also dump the compiled machine.
    #[serde(default)]
    pub verbosity: u8,
    /// State nodes in declaration order.
    pub states: Vec<StateNode>,
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

impl MachineConfig {
    pub fn new(soft_count: usize) -> Self {
        Self {
            soft_count,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            verbosity: 0,
            states: Vec::new(),
        }
    }

    /// Append a state node, builder style.
    pub fn state(mut self, node: StateNode) -> Self {
        self.states.push(node);
        self
    }
}
