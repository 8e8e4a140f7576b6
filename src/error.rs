//! Unified error types for the linefsm crate.
//!
//! Follows the same convention throughout: a plain enum per failure domain
//! with a manual `Display` impl, so errors render as one terse line the way
//! a driver would log them.  Compile errors carry the offending state and
//! record names because the machine description is user-supplied data and
//! "something was wrong" is useless without them.

use core::fmt;

use crate::tokens::IoKind;

// ---------------------------------------------------------------------------
// Configuration compile errors
// ---------------------------------------------------------------------------

/// Every way a machine description can be rejected before the engine starts.
///
/// Compilation is all-or-nothing: the first error aborts the build and no
/// engine resources are created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The description contains no state nodes at all.
    NoStatesDeclared,
    /// Two states share one name.
    DuplicateState { state: String },
    /// A state is named after a reserved word.
    InvalidName { state: String },
    /// A signal list's length is not a whole number of (line, value) pairs,
    /// or a pair names a line kind that cannot be driven.
    MalformedSignalList { state: String },
    /// A signal pair indexes past the end of the named line array.
    InvalidSignalIndex {
        state: String,
        kind: IoKind,
        index: u32,
    },
    /// A signal pair carries a value other than 0 or 1.
    InvalidSignalValue { state: String, value: u32 },
    /// A transition list's length is not a whole number of (event, param)
    /// pairs, or a pair names an unknown event kind.
    MalformedTransitionList { state: String, record: String },
    /// An edge event indexes past the end of the input or soft line array.
    InvalidInputIndex {
        state: String,
        record: String,
        kind: IoKind,
        index: u32,
    },
    /// An edge event expects a level other than 0 or 1.
    InvalidInputValue {
        state: String,
        record: String,
        kind: IoKind,
        value: u32,
    },
    /// A state declares more than one delay event.
    DuplicateDelay { state: String },
    /// A state declares more than one shutdown event.
    DuplicateShutdown { state: String },
    /// The shutdown terminal state itself declares a shutdown event.
    ShutdownLoopInvalid { state: String },
    /// No state carries the start marker.
    InvalidStartState,
    /// More than one state carries the start marker.
    DuplicateStartState { state: String },
    /// A transition names a state that is never defined.
    UndefinedState { name: String },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStatesDeclared => write!(f, "no states declared"),
            Self::DuplicateState { state } => write!(f, "state {state} already defined"),
            Self::InvalidName { state } => write!(f, "'{state}' is not a valid state name"),
            Self::MalformedSignalList { state } => write!(f, "malformed set in state {state}"),
            Self::InvalidSignalIndex { state, kind, index } => {
                write!(f, "invalid {kind} number {index} in state {state}")
            }
            Self::InvalidSignalValue { state, value } => {
                write!(f, "invalid set value {value} in state {state}")
            }
            Self::MalformedTransitionList { state, record } => {
                write!(f, "malformed transitions from state {state} to state {record}")
            }
            Self::InvalidInputIndex {
                state,
                record,
                kind,
                index,
            } => write!(
                f,
                "invalid {kind} {index} in transitions from state {state} to state {record}"
            ),
            Self::InvalidInputValue {
                state,
                record,
                kind,
                value,
            } => write!(
                f,
                "invalid {kind} value {value} in transitions from state {state} to state {record}"
            ),
            Self::DuplicateDelay { state } => {
                write!(f, "state {state} has multiple delay events")
            }
            Self::DuplicateShutdown { state } => {
                write!(f, "state {state} has multiple shutdown events")
            }
            Self::ShutdownLoopInvalid { state } => {
                write!(f, "shutdown state {state} has a shutdown event")
            }
            Self::InvalidStartState => write!(f, "no start state defined"),
            Self::DuplicateStartState { state } => {
                write!(f, "multiple start states ({state} is the second)")
            }
            Self::UndefinedState { name } => write!(f, "state {name} not defined"),
        }
    }
}

impl std::error::Error for CompileError {}

// ---------------------------------------------------------------------------
// Soft-line consumer errors
// ---------------------------------------------------------------------------

/// Rejected request on the virtual soft-line chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftIoError {
    /// The offset the caller asked for.
    pub index: usize,
    /// How many soft lines the machine actually has.
    pub count: usize,
}

impl fmt::Display for SoftIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "soft line {} out of range (chip has {})",
            self.index, self.count
        )
    }
}

impl std::error::Error for SoftIoError {}

impl embedded_hal::digital::Error for SoftIoError {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}
