//! The running state machine.
//!
//! Producers (input interrupts, soft-line writes, the delay timer) never
//! mutate machine state themselves.  They *request* a transition; one
//! worker thread performs every state entry, so the entry sequence never
//! races with itself:
//!
//! ```text
//!  interrupt ──┐
//!  soft write ─┼─▶ go_to ──▶ pending slot ──▶ kick ──▶ worker ──▶ enter_state
//!  timer ──────┘              (first wins)   channel
//! ```
//!
//! `go_to` is the arbitration point: while a transition is pending, later
//! requests are dropped (counted, not queued).  Accepting a request also
//! disarms the current state's input channels so a stale edge cannot
//! re-request.  The worker picks the pending target, fully disarms the
//! previous state's channels, then runs the entry sequence; entry may
//! itself request the next transition (chained soft edges, levels that
//! already match), which lands in the pending slot for the next pass.
//!
//! One mutex guards all mutable runtime state.  It is never held across a
//! line driver, timer or channel call.

mod timer;

pub mod chip;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, info, warn};

use crate::config::MachineConfig;
use crate::diag::{self, EngineStats, TraceEntry, TraceItem};
use crate::error::CompileError;
use crate::graph::{CompiledMachine, SignalKind, StateId};
use crate::ports::{Edge, InputLinePort, Level, OutputLinePort};
use chip::{SoftLine, VirtualChip};

/// Worker wake-ups coalesce, so the queue only needs a little slack.
const KICK_DEPTH: usize = 4;

/// Book-keeping for one real input line.
#[derive(Clone, Copy, Default)]
struct Watch {
    /// Where a delivered edge goes.  `None` means disarmed.
    target: Option<StateId>,
    /// Level the armed edge leads to, kept for logging.
    value: bool,
    /// Whether the hardware trigger is live.
    enabled: bool,
}

/// Everything mutable, under the one lock.
struct Control {
    current: Option<StateId>,
    /// Accepted-but-not-executed transition request.
    pending_next: Option<StateId>,
    /// Target of the armed delay timer.  Doubles as the fallback the
    /// worker consumes if a timer fire lost the race to a kick.
    pending_delay: Option<StateId>,
    soft: Vec<SoftLine>,
    watches: Vec<Watch>,
    /// Absolute deadline recorded at the last entry of a state with a
    /// shutdown edge; the shutdown sequencer arms the timer with it.
    shutdown_deadline: Option<Instant>,
    /// Completed state entries, for bring-up and shutdown waits.
    entries: u64,
}

struct InputChannel {
    line: Arc<dyn InputLinePort>,
    /// Cached at bring-up; decides rising vs falling per wanted level.
    active_low: bool,
}

pub(crate) struct Core {
    machine: CompiledMachine,
    control: Mutex<Control>,
    entry_cv: Condvar,
    shutting_down: AtomicBool,
    stop_worker: AtomicBool,
    kick: Channel<CriticalSectionRawMutex, (), KICK_DEPTH>,
    timer: timer::DelayTimer,
    inputs: Vec<InputChannel>,
    outputs: Vec<Arc<dyn OutputLinePort>>,
    dropped: AtomicU64,
    trace: Mutex<heapless::HistoryBuffer<TraceEntry, { diag::TRACE_DEPTH }>>,
}

impl Core {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn name(&self, id: StateId) -> &str {
        self.machine.state_name(id)
    }

    /// Request a transition.  First request wins; the rest are dropped
    /// until the worker executes the pending one.
    fn go_to(&self, target: StateId) {
        debug!("go_to({})", self.name(target));
        {
            let mut c = self.control();
            if c.pending_next.is_some() {
                drop(c);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("go_to({}): already pending, dropped", self.name(target));
                return;
            }
            c.pending_next = Some(target);
            c.pending_delay = None;
            // A stale edge on the outgoing state must not re-request.
            if let Some(cur) = c.current {
                for ev in &self.machine.state(cur).input_events {
                    c.watches[ev.index as usize].target = None;
                }
            }
        }
        // A full queue already guarantees a pending pass.
        let _ = self.kick.try_send(());
    }

    /// One worker pass: consume the pending request, fully disarm the
    /// previous state's channels, enter the new state.
    fn run_deferred(&self) {
        let mut to_disable: Vec<usize> = Vec::new();
        let next = {
            let mut c = self.control();
            let queued = c.pending_next.take();
            let fallback = c.pending_delay.take();
            if let Some(prev) = c.current {
                for ev in &self.machine.state(prev).input_events {
                    let w = &mut c.watches[ev.index as usize];
                    if w.enabled {
                        w.enabled = false;
                        w.target = None;
                        to_disable.push(ev.index as usize);
                    }
                }
            }
            queued.or(fallback)
        };
        self.timer.cancel();
        for idx in to_disable {
            self.inputs[idx].line.set_trigger(None);
        }
        if let Some(next) = next {
            self.enter_state(next);
        }
    }

    /// The entry sequence.  Runs on the worker thread, and once more on
    /// the shutdown caller if the bounded wait expires.
    fn enter_state(&self, id: StateId) {
        let st = self.machine.state(id);
        debug!("enter_state({})", st.name);

        self.control().current = Some(id);

        for sig in &st.signals {
            let word = match sig.kind {
                SignalKind::Real => "output",
                SignalKind::Soft => "soft",
            };
            if self.machine.chatty() {
                info!("  set {} {} -> {}", word, sig.index, u8::from(sig.value));
            }
            match sig.kind {
                SignalKind::Real => {
                    self.outputs[sig.index as usize].set_level(Level::from_bool(sig.value));
                }
                SignalKind::Soft => self.write_soft(sig.index as usize, sig.value),
            }
        }

        let shutting = self.shutting_down.load(Ordering::SeqCst);

        // Terminal state reached while shutting down: signal and stop.
        if shutting && self.machine.is_terminal(id) {
            self.finish_entry(id);
            return;
        }

        // Record when a forced shutdown would be due; arm it for real
        // only while the shutdown sequence is running.
        let deadline = st.shutdown.map(|sd| Instant::now() + sd.after);
        {
            let mut c = self.control();
            c.shutdown_deadline = deadline;
            if shutting {
                if let Some(sd) = st.shutdown {
                    c.pending_delay = Some(sd.target);
                }
            }
        }
        if shutting {
            if let Some(at) = deadline {
                self.timer.arm_at(at);
            }
            self.finish_entry(id);
            return;
        }

        // Soft edges take precedence: first match wins and ends the scan.
        let soft_hit = {
            let c = self.control();
            st.soft_events
                .iter()
                .find(|ev| c.soft[ev.index as usize].value == ev.value)
                .copied()
        };
        if let Some(ev) = soft_hit {
            if self.machine.chatty() {
                info!(
                    "soft {}={} -> {}",
                    ev.index,
                    u8::from(ev.value),
                    self.name(ev.target)
                );
            }
            self.go_to(ev.target);
            self.finish_entry(id);
            return;
        }

        // Arm the real inputs one at a time, catching levels already there.
        for ev in &st.input_events {
            let ch = &self.inputs[ev.index as usize];
            self.control().watches[ev.index as usize] = Watch {
                target: Some(ev.target),
                value: ev.value,
                enabled: true,
            };

            let level = ch.line.level();
            // Disable-then-enable discards any stale latched edge.
            ch.line.set_trigger(None);
            let edge = if ev.value != ch.active_low {
                Edge::Rising
            } else {
                Edge::Falling
            };
            ch.line.set_trigger(Some(edge));

            if level == Level::from_bool(ev.value) {
                // Re-check under the lock: a racing request may have
                // disarmed this channel, in which case scanning goes on.
                let still_armed = self.control().watches[ev.index as usize].target.is_some();
                if still_armed {
                    if self.machine.chatty() {
                        info!(
                            "input {}={} -> {}",
                            ev.index,
                            u8::from(ev.value),
                            self.name(ev.target)
                        );
                    }
                    self.go_to(ev.target);
                    self.finish_entry(id);
                    return;
                }
            }
        }

        if let Some(d) = st.delay {
            self.control().pending_delay = Some(d.target);
            self.timer.arm_in(d.after);
        }
        self.finish_entry(id);
    }

    /// Write a soft line and take a matching edge out of the current
    /// state, synchronously with respect to the caller.
    fn write_soft(&self, index: usize, value: bool) {
        debug!("set({}, {})", index, u8::from(value));
        let hit = {
            let mut c = self.control();
            c.soft[index].value = value;
            c.current.and_then(|cur| {
                self.machine
                    .state(cur)
                    .soft_events
                    .iter()
                    .find(|ev| ev.index as usize == index && ev.value == value)
                    .copied()
            })
        };
        if let Some(ev) = hit {
            if self.machine.chatty() {
                info!(
                    "soft {}->{} -> {}",
                    ev.index,
                    u8::from(ev.value),
                    self.name(ev.target)
                );
            }
            self.go_to(ev.target);
        }
    }

    /// Edge delivery from an input producer.  Unknown indices and
    /// unarmed channels are ignored.
    fn input_interrupt(&self, index: usize) {
        if index >= self.inputs.len() {
            debug!("edge on unknown input {index}, ignored");
            return;
        }
        let fired = {
            let mut c = self.control();
            let w = &mut c.watches[index];
            match w.target {
                Some(target) if w.enabled => {
                    w.enabled = false;
                    Some((target, w.value))
                }
                _ => None,
            }
        };
        let Some((target, value)) = fired else {
            return;
        };
        self.inputs[index].line.set_trigger(None);
        if self.machine.chatty() {
            info!("input {}->{} -> {}", index, u8::from(value), self.name(target));
        }
        self.go_to(target);
    }

    /// Timer expiry.  The pending slot is re-read, not trusted: a request
    /// that won the race has already cleared it.
    fn on_timer_fired(&self) {
        let target = self.control().pending_delay;
        let Some(target) = target else { return };
        if self.machine.chatty() {
            info!("delay elapsed -> {}", self.name(target));
        }
        self.go_to(target);
    }

    fn finish_entry(&self, id: StateId) {
        let seq = {
            let mut c = self.control();
            c.entries += 1;
            c.entries
        };
        self.entry_cv.notify_all();
        self.trace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(TraceEntry { seq, state: id });
    }

    fn wait_first_entry(&self) {
        let mut c = self.control();
        while c.entries == 0 {
            c = self
                .entry_cv
                .wait(c)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the current state is terminal, or the budget runs out.
    fn wait_terminal(&self, budget: Duration) -> bool {
        let deadline = Instant::now() + budget;
        let mut c = self.control();
        loop {
            if c.current.is_some_and(|cur| self.machine.is_terminal(cur)) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            c = self
                .entry_cv
                .wait_timeout(c, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn worker_loop(&self) {
        futures_lite::future::block_on(async {
            loop {
                self.kick.receive().await;
                if self.stop_worker.load(Ordering::SeqCst) {
                    break;
                }
                self.run_deferred();
            }
        });
    }
}

// ───────────────────────────────────────────────────────────────
// Public handle
// ───────────────────────────────────────────────────────────────

/// A compiled machine bound to its lines and running.
///
/// Dropping the engine runs the shutdown sequence; [`Engine::shutdown`]
/// does the same explicitly.
pub struct Engine {
    core: Arc<Core>,
    worker: Option<thread::JoinHandle<()>>,
    timer_thread: Option<thread::JoinHandle<()>>,
    finished: bool,
}

impl Engine {
    /// Compile `config`, bind it to the given lines, start the runtime
    /// threads and enter the start state.  Returns once the first entry
    /// has completed, so outputs already reflect the start state.
    pub fn bring_up(
        config: &MachineConfig,
        inputs: Vec<Arc<dyn InputLinePort>>,
        outputs: Vec<Arc<dyn OutputLinePort>>,
    ) -> Result<Self, CompileError> {
        let machine = crate::compiler::compile(config, inputs.len(), outputs.len())?;

        if config.verbosity >= 2 {
            info!("{}", diag::render_machine(&machine));
        }

        let inputs = inputs
            .into_iter()
            .map(|line| {
                let active_low = line.is_active_low();
                InputChannel { line, active_low }
            })
            .collect::<Vec<_>>();

        let soft = vec![SoftLine::default(); machine.soft_count()];
        let watches = vec![Watch::default(); inputs.len()];

        let core = Arc::new(Core {
            control: Mutex::new(Control {
                current: None,
                pending_next: None,
                pending_delay: None,
                soft,
                watches,
                shutdown_deadline: None,
                entries: 0,
            }),
            entry_cv: Condvar::new(),
            shutting_down: AtomicBool::new(false),
            stop_worker: AtomicBool::new(false),
            kick: Channel::new(),
            timer: timer::DelayTimer::new(),
            inputs,
            outputs,
            dropped: AtomicU64::new(0),
            trace: Mutex::new(heapless::HistoryBuffer::new()),
            machine,
        });

        let worker_core = Arc::clone(&core);
        let worker = thread::Builder::new()
            .name("linefsm-work".into())
            .spawn(move || worker_core.worker_loop())
            .expect("linefsm: worker thread creation failed");

        let timer_core = Arc::clone(&core);
        let timer_thread = thread::Builder::new()
            .name("linefsm-timer".into())
            .spawn(move || timer_core.timer.run(|| timer_core.on_timer_fired()))
            .expect("linefsm: timer thread creation failed");

        if core.machine.chatty() {
            info!("start -> {}", core.name(core.machine.start()));
        }
        core.go_to(core.machine.start());
        core.wait_first_entry();

        Ok(Self {
            core,
            worker: Some(worker),
            timer_thread: Some(timer_thread),
            finished: false,
        })
    }

    /// Consumer view of the machine's soft lines.
    pub fn chip(&self) -> VirtualChip {
        VirtualChip::new(Arc::clone(&self.core))
    }

    /// Cloneable, thread-safe handle for delivering input edges.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            core: Arc::clone(&self.core),
        }
    }

    /// Deliver an edge on input line `index`.  Spurious calls (unknown
    /// index, channel not armed) are ignored.
    pub fn input_interrupt(&self, index: usize) {
        self.core.input_interrupt(index);
    }

    /// Name of the state the machine is in, if the first entry completed.
    pub fn current_state(&self) -> Option<&str> {
        let id = self.core.control().current;
        id.map(|id| self.core.name(id))
    }

    /// The compiled graph this engine runs.
    pub fn machine(&self) -> &CompiledMachine {
        &self.core.machine
    }

    /// Human-readable dump of the whole machine plus live line state.
    pub fn dump(&self) -> String {
        let (soft, current) = {
            let c = self.core.control();
            (c.soft.clone(), c.current)
        };
        diag::render_live(&self.core.machine, &soft, current)
    }

    /// Runtime counters and the recent transition trace.
    pub fn stats(&self) -> EngineStats {
        let (entries, current) = {
            let c = self.core.control();
            (c.entries, c.current)
        };
        let recent = {
            let trace = self
                .core
                .trace
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            trace
                .oldest_ordered()
                .map(|e| TraceItem {
                    seq: e.seq,
                    state: self.core.name(e.state).to_owned(),
                })
                .collect()
        };
        EngineStats {
            entries,
            dropped_requests: self.core.dropped.load(Ordering::Relaxed),
            current: current.map(|id| self.core.name(id).to_owned()),
            recent,
        }
    }

    /// Run the shutdown sequence and tear the engine down.
    pub fn shutdown(mut self) {
        self.do_shutdown();
    }

    fn do_shutdown(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let core = Arc::clone(&self.core);

        if let Some(terminal) = core.machine.shutdown_state() {
            if core.machine.chatty() {
                info!("shutting down");
            }

            // Flip the mode and, if the current state has a shutdown edge
            // to somewhere else, arm its previously recorded deadline.
            let arm_at = {
                let mut c = core.control();
                core.shutting_down.store(true, Ordering::SeqCst);
                let mut arm_at = None;
                if let Some(cur) = c.current {
                    if let Some(sd) = core.machine.state(cur).shutdown {
                        if sd.target != cur {
                            c.pending_delay = Some(sd.target);
                            arm_at = c.shutdown_deadline;
                        }
                    }
                }
                arm_at
            };
            if let Some(at) = arm_at {
                core.timer.arm_at(at);
            }

            let budget = core.machine.shutdown_timeout();
            let reached = core.wait_terminal(budget);

            // Producers are quiesced before any forced entry so the
            // single-writer rule holds to the very end.
            self.stop_threads();

            if !reached {
                warn!(
                    "shutdown timed out after {} ms, forcing {}",
                    budget.as_millis(),
                    core.name(terminal)
                );
                core.enter_state(terminal);
            }
        } else {
            self.stop_threads();
        }

        if core.machine.chatty() {
            info!("exiting");
        }
    }

    fn stop_threads(&mut self) {
        self.core.stop_worker.store(true, Ordering::SeqCst);
        let _ = self.core.kick.try_send(());
        self.core.timer.stop();
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
        if let Some(h) = self.timer_thread.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.do_shutdown();
    }
}

/// Edge-delivery handle that producers can keep across threads.
#[derive(Clone)]
pub struct InterruptHandle {
    core: Arc<Core>,
}

impl InterruptHandle {
    /// Deliver an edge on input line `index`.
    pub fn fire(&self, index: usize) {
        self.core.input_interrupt(index);
    }
}
