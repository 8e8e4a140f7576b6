//! Mock line implementations shared by the integration tests.
//!
//! `MockInput` records the trigger the engine programs on it so tests can
//! both assert on arming and decide whether a simulated edge should raise
//! an interrupt.  `MockOutput` records every level ever driven, so tests
//! assert on the full signal history rather than just the final level.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use linefsm::{Edge, Engine, InputLinePort, InterruptHandle, Level, OutputLinePort};

// ── MockInput ─────────────────────────────────────────────────

pub struct MockInput {
    level: Mutex<Level>,
    trigger: Mutex<Option<Edge>>,
    active_low: bool,
    /// How many times the engine called `set_trigger`, any value.
    pub trigger_writes: AtomicUsize,
}

#[allow(dead_code)]
impl MockInput {
    pub fn new(level: Level) -> Arc<Self> {
        Arc::new(Self {
            level: Mutex::new(level),
            trigger: Mutex::new(None),
            active_low: false,
            trigger_writes: AtomicUsize::new(0),
        })
    }

    pub fn new_active_low(level: Level) -> Arc<Self> {
        Arc::new(Self {
            level: Mutex::new(level),
            trigger: Mutex::new(None),
            active_low: true,
            trigger_writes: AtomicUsize::new(0),
        })
    }

    pub fn trigger(&self) -> Option<Edge> {
        *self.trigger.lock().unwrap()
    }

    /// Set the level without raising an interrupt.
    pub fn set_level(&self, level: Level) {
        *self.level.lock().unwrap() = level;
    }

    /// Drive the line like real hardware: change the level and raise the
    /// interrupt only if the resulting edge matches the armed trigger.
    pub fn drive(&self, level: Level, irq: &InterruptHandle, index: usize) {
        let edge = {
            let mut cur = self.level.lock().unwrap();
            if *cur == level {
                None
            } else {
                *cur = level;
                Some(if level.is_high() {
                    Edge::Rising
                } else {
                    Edge::Falling
                })
            }
        };
        if let Some(edge) = edge {
            if self.trigger() == Some(edge) {
                irq.fire(index);
            }
        }
    }
}

impl InputLinePort for MockInput {
    fn level(&self) -> Level {
        *self.level.lock().unwrap()
    }

    fn is_active_low(&self) -> bool {
        self.active_low
    }

    fn set_trigger(&self, trigger: Option<Edge>) {
        self.trigger_writes.fetch_add(1, Ordering::SeqCst);
        *self.trigger.lock().unwrap() = trigger;
    }
}

// ── MockOutput ────────────────────────────────────────────────

pub struct MockOutput {
    history: Mutex<Vec<Level>>,
}

#[allow(dead_code)]
impl MockOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            history: Mutex::new(Vec::new()),
        })
    }

    pub fn levels(&self) -> Vec<Level> {
        self.history.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Level> {
        self.history.lock().unwrap().last().copied()
    }
}

impl OutputLinePort for MockOutput {
    fn set_level(&self, level: Level) {
        self.history.lock().unwrap().push(level);
    }
}

// ── Polling helper ────────────────────────────────────────────

/// Wait until the engine reports `name`, or give up after `budget`.
#[allow(dead_code)]
pub fn wait_for_state(engine: &Engine, name: &str, budget: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < budget {
        if engine.current_state() == Some(name) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}
