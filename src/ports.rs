//! Line ports: the boundary between the engine and whatever owns the pins.
//!
//! ```text
//!   Adapter (HAL / chardev / mock) ──▶ Port trait ──▶ Engine
//! ```
//!
//! The engine is generic over where its lines live: a HAL pin, a character
//! device, a relay board behind an expander, or a test double.  Adapters
//! implement these traits; the engine stores them as shared trait objects
//! because the delay timer, the worker and interrupt producers all touch
//! them from their own threads.
//!
//! Levels are *logical* throughout: an adapter for an active-low line
//! reports and accepts the asserted/deasserted view and only
//! [`InputLinePort::is_active_low`] exposes the inversion, which the engine
//! needs to translate a wanted level into a physical edge direction.

use core::fmt;

// ───────────────────────────────────────────────────────────────
// Levels and edges
// ───────────────────────────────────────────────────────────────

/// Logical line level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn from_bool(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }

    pub fn is_high(self) -> bool {
        self == Self::High
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "0"),
            Self::High => write!(f, "1"),
        }
    }
}

/// Physical edge direction for an input trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

// ───────────────────────────────────────────────────────────────
// Input port (adapter → engine)
// ───────────────────────────────────────────────────────────────

/// A real input line the engine watches for edges.
///
/// Contract for adapters:
/// - [`level`](Self::level) must be callable at any time and return the
///   current logical level without blocking for long.
/// - [`set_trigger`](Self::set_trigger)`(None)` disables event delivery and
///   discards anything latched; re-enabling with `Some(edge)` must only
///   deliver edges observed from that point on.  The engine relies on this
///   disable/enable pair to clear stale events while re-arming.
/// - Delivered edges are reported by calling the engine's interrupt entry
///   point with this line's index, from any thread.
pub trait InputLinePort: Send + Sync {
    /// Current logical level.
    fn level(&self) -> Level;

    /// Whether the physical line inverts the logical view.  The engine
    /// picks rising or falling triggers based on this.
    fn is_active_low(&self) -> bool {
        false
    }

    /// Reconfigure edge delivery.  `None` disables the trigger.
    fn set_trigger(&self, trigger: Option<Edge>);
}

// ───────────────────────────────────────────────────────────────
// Output port (engine → adapter)
// ───────────────────────────────────────────────────────────────

/// A real output line the engine drives on state entry.
///
/// `set_level` may sleep (expander behind I2C, relay settle time); the
/// engine guarantees it is never called with an internal lock held.
pub trait OutputLinePort: Send + Sync {
    fn set_level(&self, level: Level);
}
