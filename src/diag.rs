//! Diagnostics: human-readable machine dumps and the transition trace.
//!
//! The dump is the debugging story for mis-written descriptions: it shows
//! the machine exactly as compiled, every signal and every edge with its
//! resolved target name, so a wrong transition is visible without
//! instrumenting anything.  Engines render it at bring-up when verbosity
//! is at least 2, and on demand through [`crate::engine::Engine::dump`].

use core::fmt::Write;

use crate::engine::chip::{Direction, SoftLine};
use crate::graph::{CompiledMachine, SignalKind, StateId};

/// Entries kept in the transition trace ring.
pub const TRACE_DEPTH: usize = 32;

/// Raw ring entry; resolved to a name when read out.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TraceEntry {
    pub(crate) seq: u64,
    pub(crate) state: StateId,
}

/// One resolved trace row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceItem {
    /// Entry counter value when the state was entered, starting at 1.
    pub seq: u64,
    pub state: String,
}

/// Snapshot of the engine's runtime counters.
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// Completed state entries since bring-up.
    pub entries: u64,
    /// Transition requests dropped because one was already pending.
    pub dropped_requests: u64,
    /// Current state name.
    pub current: Option<String>,
    /// Most recent entries, oldest first, at most [`TRACE_DEPTH`].
    pub recent: Vec<TraceItem>,
}

/// Render a machine that is not (or not yet) running: soft lines are
/// shown at their bring-up defaults.
pub fn render_machine(m: &CompiledMachine) -> String {
    let defaults = vec![SoftLine::default(); m.soft_count()];
    render_live(m, &defaults, None)
}

/// Render a machine together with live soft-line state.
pub(crate) fn render_live(
    m: &CompiledMachine,
    soft: &[SoftLine],
    current: Option<StateId>,
) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "input lines: {}", m.input_count);
    let _ = writeln!(out, "output lines: {}", m.output_count);
    let _ = writeln!(out, "soft lines:");
    for (i, line) in soft.iter().enumerate() {
        let dir = match line.dir {
            Direction::In => "in",
            Direction::Out => "out",
        };
        let _ = writeln!(out, "  {}: {} {}", i, dir, u8::from(line.value));
    }
    let _ = writeln!(out, "start state: {}", m.state_name(m.start));
    let _ = writeln!(out, "shutdown timeout: {} ms", m.shutdown_timeout.as_millis());

    for (i, state) in m.states.iter().enumerate() {
        let id = StateId(i);
        let _ = writeln!(out, "state {}:", state.name);
        if m.is_terminal(id) {
            let _ = writeln!(out, "  shutdown state");
        }

        let _ = writeln!(out, "  signals:");
        for (j, sig) in state.signals.iter().enumerate() {
            let kind = match sig.kind {
                SignalKind::Real => "output",
                SignalKind::Soft => "soft",
            };
            let _ = writeln!(out, "    {}: {} {}={}", j, kind, sig.index, u8::from(sig.value));
        }

        let _ = writeln!(out, "  input events:");
        for (j, ev) in state.input_events.iter().enumerate() {
            let _ = writeln!(
                out,
                "    {}: {}={} -> {}",
                j,
                ev.index,
                u8::from(ev.value),
                m.state_name(ev.target)
            );
        }

        let _ = writeln!(out, "  soft events:");
        for (j, ev) in state.soft_events.iter().enumerate() {
            let _ = writeln!(
                out,
                "    {}: {}={} -> {}",
                j,
                ev.index,
                u8::from(ev.value),
                m.state_name(ev.target)
            );
        }

        if let Some(d) = state.delay {
            let _ = writeln!(
                out,
                "  delay: {} ms -> {}",
                d.after.as_millis(),
                m.state_name(d.target)
            );
        }
        if let Some(sd) = state.shutdown {
            if sd.target != id {
                let _ = writeln!(
                    out,
                    "  shutdown: {} ms -> {}",
                    sd.after.as_millis(),
                    m.state_name(sd.target)
                );
            }
        }
    }

    if let Some(cur) = current {
        let _ = writeln!(out, "current state: {}", m.state_name(cur));
    }

    out
}
