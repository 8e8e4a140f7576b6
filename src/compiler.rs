//! Translates a raw [`MachineConfig`] into a [`CompiledMachine`].
//!
//! Two passes over the description:
//!
//! 1. Walk the state nodes in order.  Each node defines its name in the
//!    symbol table and classifies its records by name: `set` is a signal
//!    list, the two markers flag start/terminal states, `name` is skipped
//!    and every other record is a transition list whose name is the target
//!    state, looked up (and declared if unseen) in the symbol table.
//! 2. Resolve every transition target to a state index.  Anything still
//!    undefined is a dangling forward reference and fails the compile.
//!
//! Compilation is strict: the first violation aborts with an error naming
//! the state (and record) at fault, and nothing of the machine survives.
//! The symbol table is discarded once resolution succeeds.

use std::time::Duration;

use crate::config::{MachineConfig, PropertyRecord, StateNode};
use crate::error::CompileError;
use crate::graph::{CompiledMachine, InputEvent, OutputSignal, SignalKind, State, StateId, TimedEvent};
use crate::symtab::{DefineError, Keyword, SymId, SymValue, SymbolTable};
use crate::tokens::{self, IoKind};

/// A transition edge waiting for its target to be resolved.
#[derive(Clone, Copy)]
struct DraftEvent {
    index: u16,
    value: bool,
    target: SymId,
}

/// A timed edge waiting for resolution.
#[derive(Clone, Copy)]
struct DraftTimed {
    target: SymId,
    after_ms: u32,
}

/// Shutdown role of a state while parsing.
#[derive(Clone, Copy)]
enum DraftShutdown {
    /// Marked with `shutdown_state`: the edge loops back to the state itself.
    Terminal,
    /// Ordinary shutdown edge to another state.
    Edge(DraftTimed),
}

#[derive(Default)]
struct DraftState {
    signals: Vec<OutputSignal>,
    input_events: Vec<DraftEvent>,
    soft_events: Vec<DraftEvent>,
    delay: Option<DraftTimed>,
    shutdown: Option<DraftShutdown>,
}

/// Compile `config` against the line arrays the engine will run with.
///
/// `input_count` and `output_count` are the lengths of the caller's real
/// line arrays; the soft line count comes from the description itself.
pub fn compile(
    config: &MachineConfig,
    input_count: usize,
    output_count: usize,
) -> Result<CompiledMachine, CompileError> {
    if config.states.is_empty() {
        return Err(CompileError::NoStatesDeclared);
    }

    let mut symtab = SymbolTable::with_reserved();
    let mut drafts: Vec<DraftState> = Vec::with_capacity(config.states.len());
    let mut start: Option<StateId> = None;
    let mut shutdown_state: Option<StateId> = None;

    for (i, node) in config.states.iter().enumerate() {
        let draft = parse_state(
            node,
            StateId(i),
            &mut symtab,
            &mut start,
            &mut shutdown_state,
            Counts {
                inputs: input_count,
                outputs: output_count,
                softs: config.soft_count,
            },
        )?;
        drafts.push(draft);
    }

    let Some(start) = start else {
        return Err(CompileError::InvalidStartState);
    };

    // Pass 2: swap symbols for state indices.
    let mut states = Vec::with_capacity(drafts.len());
    for (i, (draft, node)) in drafts.into_iter().zip(&config.states).enumerate() {
        let resolve_events = |events: Vec<DraftEvent>| -> Result<Vec<InputEvent>, CompileError> {
            events
                .into_iter()
                .map(|ev| {
                    Ok(InputEvent {
                        index: ev.index,
                        value: ev.value,
                        target: resolve(&symtab, ev.target)?,
                    })
                })
                .collect()
        };

        let input_events = resolve_events(draft.input_events)?;
        let soft_events = resolve_events(draft.soft_events)?;
        let delay = draft
            .delay
            .map(|t| resolve_timed(&symtab, t))
            .transpose()?;
        let shutdown = match draft.shutdown {
            None => None,
            Some(DraftShutdown::Terminal) => Some(TimedEvent {
                target: StateId(i),
                after: Duration::ZERO,
            }),
            Some(DraftShutdown::Edge(t)) => Some(resolve_timed(&symtab, t)?),
        };

        states.push(State {
            name: node.name.clone(),
            signals: draft.signals,
            input_events,
            soft_events,
            delay,
            shutdown,
        });
    }

    Ok(CompiledMachine {
        states,
        start,
        shutdown_state,
        input_count,
        output_count,
        soft_count: config.soft_count,
        shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
        verbosity: config.verbosity,
    })
}

#[derive(Clone, Copy)]
struct Counts {
    inputs: usize,
    outputs: usize,
    softs: usize,
}

fn parse_state(
    node: &StateNode,
    id: StateId,
    symtab: &mut SymbolTable,
    start: &mut Option<StateId>,
    shutdown_state: &mut Option<StateId>,
    counts: Counts,
) -> Result<DraftState, CompileError> {
    symtab
        .define(&node.name, SymValue::State(id.0))
        .map_err(|e| match e {
            DefineError::Reserved => CompileError::InvalidName {
                state: node.name.clone(),
            },
            DefineError::AlreadyDefined => CompileError::DuplicateState {
                state: node.name.clone(),
            },
        })?;

    let mut draft = DraftState::default();

    for rec in &node.properties {
        let sym = symtab.lookup(&rec.name);
        match symtab.value_of(sym) {
            Some(SymValue::Reserved(Keyword::Set)) => {
                parse_signals(&mut draft, &node.name, rec, counts)?;
            }
            Some(SymValue::Reserved(Keyword::Start)) => {
                if start.is_some() {
                    return Err(CompileError::DuplicateStartState {
                        state: node.name.clone(),
                    });
                }
                *start = Some(id);
            }
            Some(SymValue::Reserved(Keyword::Shutdown)) => {
                if matches!(draft.shutdown, Some(DraftShutdown::Edge(_))) {
                    return Err(CompileError::ShutdownLoopInvalid {
                        state: node.name.clone(),
                    });
                }
                draft.shutdown = Some(DraftShutdown::Terminal);
                *shutdown_state = Some(id);
            }
            Some(SymValue::Reserved(Keyword::Name)) => {}
            // Anything else names a target state, defined or not yet.
            Some(SymValue::State(_)) | None => {
                parse_events(&mut draft, &node.name, rec, sym, counts)?;
            }
        }
    }

    Ok(draft)
}

/// Parse a `set` record: (line cell, value) pairs applied on entry.
/// Repeated `set` records extend the list in declaration order.
fn parse_signals(
    draft: &mut DraftState,
    state: &str,
    rec: &PropertyRecord,
    counts: Counts,
) -> Result<(), CompileError> {
    if rec.cells.len() % 2 != 0 {
        return Err(CompileError::MalformedSignalList {
            state: state.to_owned(),
        });
    }

    for pair in rec.cells.chunks_exact(2) {
        let kind = IoKind::from_code(tokens::cell_kind(pair[0]));
        let index = tokens::cell_index(pair[0]);
        let value = pair[1];

        let (kind, limit) = match kind {
            Some(IoKind::Output) => (IoKind::Output, counts.outputs),
            Some(IoKind::Soft) => (IoKind::Soft, counts.softs),
            _ => {
                return Err(CompileError::MalformedSignalList {
                    state: state.to_owned(),
                });
            }
        };
        if index as usize >= limit {
            return Err(CompileError::InvalidSignalIndex {
                state: state.to_owned(),
                kind,
                index,
            });
        }
        if value > 1 {
            return Err(CompileError::InvalidSignalValue {
                state: state.to_owned(),
                value,
            });
        }

        draft.signals.push(OutputSignal {
            kind: if kind == IoKind::Output {
                SignalKind::Real
            } else {
                SignalKind::Soft
            },
            index: index as u16,
            value: value == 1,
        });
    }

    Ok(())
}

/// Parse a transition record: (event cell, param) pairs all leading to the
/// state named by the record.
fn parse_events(
    draft: &mut DraftState,
    state: &str,
    rec: &PropertyRecord,
    target: SymId,
    counts: Counts,
) -> Result<(), CompileError> {
    let malformed = || CompileError::MalformedTransitionList {
        state: state.to_owned(),
        record: rec.name.clone(),
    };

    if rec.cells.len() % 2 != 0 {
        return Err(malformed());
    }

    for pair in rec.cells.chunks_exact(2) {
        let kind = IoKind::from_code(tokens::cell_kind(pair[0]));
        let index = tokens::cell_index(pair[0]);
        let param = pair[1];

        match kind {
            Some(kind @ (IoKind::Input | IoKind::Soft)) => {
                let limit = if kind == IoKind::Input {
                    counts.inputs
                } else {
                    counts.softs
                };
                if index as usize >= limit {
                    return Err(CompileError::InvalidInputIndex {
                        state: state.to_owned(),
                        record: rec.name.clone(),
                        kind,
                        index,
                    });
                }
                if param > 1 {
                    return Err(CompileError::InvalidInputValue {
                        state: state.to_owned(),
                        record: rec.name.clone(),
                        kind,
                        value: param,
                    });
                }
                let ev = DraftEvent {
                    index: index as u16,
                    value: param == 1,
                    target,
                };
                if kind == IoKind::Input {
                    draft.input_events.push(ev);
                } else {
                    draft.soft_events.push(ev);
                }
            }
            Some(IoKind::Delay) => {
                if draft.delay.is_some() {
                    return Err(CompileError::DuplicateDelay {
                        state: state.to_owned(),
                    });
                }
                draft.delay = Some(DraftTimed {
                    target,
                    after_ms: param,
                });
            }
            Some(IoKind::Shutdown) => match draft.shutdown {
                Some(DraftShutdown::Terminal) => {
                    return Err(CompileError::ShutdownLoopInvalid {
                        state: state.to_owned(),
                    });
                }
                Some(DraftShutdown::Edge(_)) => {
                    return Err(CompileError::DuplicateShutdown {
                        state: state.to_owned(),
                    });
                }
                None => {
                    draft.shutdown = Some(DraftShutdown::Edge(DraftTimed {
                        target,
                        after_ms: param,
                    }));
                }
            },
            Some(IoKind::Output) | None => return Err(malformed()),
        }
    }

    Ok(())
}

fn resolve(symtab: &SymbolTable, sym: SymId) -> Result<StateId, CompileError> {
    match symtab.value_of(sym) {
        Some(SymValue::State(i)) => Ok(StateId(i)),
        _ => Err(CompileError::UndefinedState {
            name: symtab.name_of(sym).to_owned(),
        }),
    }
}

fn resolve_timed(symtab: &SymbolTable, t: DraftTimed) -> Result<TimedEvent, CompileError> {
    Ok(TimedEvent {
        target: resolve(symtab, t.target)?,
        after: Duration::from_millis(u64::from(t.after_ms)),
    })
}
