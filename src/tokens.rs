//! Wire vocabulary of the machine description.
//!
//! Single source of truth: the compiler, the diagnostics dump and every
//! test build their records from this module rather than hand-packing bits.
//!
//! A description cell is one `u32`: the low 16 bits select the line kind,
//! the high 16 bits carry the line index.  Delay and shutdown events ignore
//! the index half.
//!
//! ```text
//!  31            16 15             0
//! ┌────────────────┬────────────────┐
//! │     index      │      kind      │
//! └────────────────┴────────────────┘
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Line / event kinds
// ---------------------------------------------------------------------------

/// What the low half of a description cell selects.
///
/// In a signal pair only `Output` and `Soft` are drivable; in a transition
/// pair `Input` and `Soft` are edge sources while `Delay` and `Shutdown`
/// are timed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoKind {
    /// A real input line, read-only, edge-monitored.
    Input,
    /// A real output line, driven on state entry.
    Output,
    /// A soft line on the machine's virtual chip.
    Soft,
    /// A timed transition out of the state.
    Delay,
    /// A timed transition used only while shutting down.
    Shutdown,
}

impl IoKind {
    /// The on-wire code for this kind.
    pub const fn code(self) -> u32 {
        match self {
            Self::Input => 0,
            Self::Output => 1,
            Self::Soft => 2,
            Self::Delay => 3,
            Self::Shutdown => 4,
        }
    }

    /// Decode the low half of a cell.  Unknown codes are `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Input),
            1 => Some(Self::Output),
            2 => Some(Self::Soft),
            3 => Some(Self::Delay),
            4 => Some(Self::Shutdown),
            _ => None,
        }
    }
}

impl fmt::Display for IoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
            Self::Soft => write!(f, "soft"),
            Self::Delay => write!(f, "delay"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Cell packing
// ---------------------------------------------------------------------------

/// Pack a kind and a line index into one description cell.
pub const fn cell(kind: IoKind, index: u32) -> u32 {
    kind.code() | (index << 16)
}

/// The kind half of a cell, still raw so bad codes survive to the compiler.
pub const fn cell_kind(cell: u32) -> u32 {
    cell & 0xffff
}

/// The index half of a cell.
pub const fn cell_index(cell: u32) -> u32 {
    cell >> 16
}

/// Edge on input line `index`.  Pair it with the level to match on.
pub const fn input(index: u32) -> u32 {
    cell(IoKind::Input, index)
}

/// Drive or watch soft line `index`.
pub const fn soft(index: u32) -> u32 {
    cell(IoKind::Soft, index)
}

/// Drive real output line `index`.
pub const fn output(index: u32) -> u32 {
    cell(IoKind::Output, index)
}

/// Timed transition.  Pair it with the delay in milliseconds.
pub const fn delay() -> u32 {
    cell(IoKind::Delay, 0)
}

/// Shutdown-only timed transition.  Pair it with the delay in milliseconds.
pub const fn shutdown() -> u32 {
    cell(IoKind::Shutdown, 0)
}

// ---------------------------------------------------------------------------
// Reserved record names
// ---------------------------------------------------------------------------

/// Record name that is skipped during parsing (node metadata).
pub const REC_NAME: &str = "name";
/// Record name introducing a state's signal list.
pub const REC_SET: &str = "set";
/// Marker record: this state is entered at bring-up.
pub const REC_START: &str = "start_state";
/// Marker record: this state is the shutdown terminal.
pub const REC_SHUTDOWN: &str = "shutdown_state";

/// All names a state cannot take for itself.
pub const RESERVED_NAMES: [&str; 4] = [REC_NAME, REC_SET, REC_START, REC_SHUTDOWN];
