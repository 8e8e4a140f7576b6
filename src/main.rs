//! linefsm-sim: scripted demonstration of the LineFSM engine.
//!
//! Runs a four-state power sequencer against simulated lines and walks it
//! through a full session: button press, soft-line forced power cycle,
//! normal release, and a bounded shutdown while running.
//!
//! ```text
//!            button=1                delay 150ms
//!   ┌─────┐ ─────────▶ ┌──────────┐ ───────────▶ ┌─────────┐
//!   │ off │            │ power_up │              │ running │
//!   └─────┘ ◀───┐      └──────────┘              └─────────┘
//!      ▲        │            │ button=0               │ button=0, soft=1,
//!      │        │            ▼                        ▼ or shutdown
//!      │   delay 150ms  ┌────────────┐ ◀──────────────┘
//!      └─────────────── │ power_down │
//!                       └────────────┘
//! ```
//!
//! All lines are in-process fakes: the "button" is an atomic with a latched
//! trigger, the two outputs log every level change.  `RUST_LOG=debug` shows
//! the engine's own transition log on top of the script narration.

#![deny(unused_must_use)]

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::info;

use linefsm::config::{MachineConfig, StateNode};
use linefsm::tokens;
use linefsm::{Edge, Engine, InputLinePort, InterruptHandle, Level, OutputLinePort};

// ── Line indices ──────────────────────────────────────────────

const BUTTON: u32 = 0; // input 0
const POWER: u32 = 0; // output 0
const LED: u32 = 1; // output 1
const FORCE: usize = 0; // soft 0, the consumer-facing power-cycle request

// ── Simulated lines ───────────────────────────────────────────

/// An input line backed by an atomic, with the trigger latch the engine
/// programs stored alongside so the simulator only fires matching edges.
struct SimButton {
    level: AtomicBool,
    // 0 = disabled, 1 = rising, 2 = falling
    trigger: AtomicU8,
}

impl SimButton {
    fn new() -> Self {
        Self {
            level: AtomicBool::new(false),
            trigger: AtomicU8::new(0),
        }
    }

    /// Drive the line and raise an interrupt if the edge is watched.
    fn write(&self, irq: &InterruptHandle, high: bool) {
        let prev = self.level.swap(high, Ordering::SeqCst);
        if prev == high {
            return;
        }
        let want = if high { 1 } else { 2 };
        if self.trigger.load(Ordering::SeqCst) == want {
            irq.fire(BUTTON as usize);
        }
    }
}

impl InputLinePort for SimButton {
    fn level(&self) -> Level {
        Level::from_bool(self.level.load(Ordering::SeqCst))
    }

    fn set_trigger(&self, edge: Option<Edge>) {
        let code = match edge {
            None => 0,
            Some(Edge::Rising) => 1,
            Some(Edge::Falling) => 2,
        };
        self.trigger.store(code, Ordering::SeqCst);
    }
}

/// An output line that narrates every level change.
struct SimOutput {
    label: &'static str,
}

impl OutputLinePort for SimOutput {
    fn set_level(&self, level: Level) {
        info!("[{}] -> {}", self.label, level);
    }
}

// ── Machine description ───────────────────────────────────────

/// The sequencer from the module header, with `off` as both the start
/// state and the shutdown terminal.
fn power_sequencer() -> MachineConfig {
    MachineConfig::new(1)
        .state(
            StateNode::new("off")
                .mark(tokens::REC_START)
                .mark(tokens::REC_SHUTDOWN)
                .record(
                    tokens::REC_SET,
                    vec![tokens::output(POWER), 0, tokens::output(LED), 0],
                )
                .record("power_up", vec![tokens::input(BUTTON), 1]),
        )
        .state(
            StateNode::new("power_up")
                .record(tokens::REC_SET, vec![tokens::output(POWER), 1])
                .record("running", vec![tokens::delay(), 150])
                .record(
                    "off",
                    vec![tokens::input(BUTTON), 0, tokens::shutdown(), 0],
                ),
        )
        .state(
            StateNode::new("running")
                .record(tokens::REC_SET, vec![tokens::output(LED), 1])
                .record(
                    "power_down",
                    vec![
                        tokens::input(BUTTON),
                        0,
                        tokens::soft(FORCE as u32),
                        1,
                        tokens::shutdown(),
                        0,
                    ],
                ),
        )
        .state(
            StateNode::new("power_down")
                .record(
                    tokens::REC_SET,
                    vec![tokens::output(LED), 0, tokens::output(POWER), 0],
                )
                .record("off", vec![tokens::delay(), 150, tokens::shutdown(), 150]),
        )
}

// ── Script helpers ────────────────────────────────────────────

fn wait_for(engine: &Engine, state: &str) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if engine.current_state() == Some(state) {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(5));
    }
    anyhow::bail!("timed out waiting for state '{state}'");
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("linefsm-sim v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Lines + bring-up ───────────────────────────────────
    let mut desc = power_sequencer();
    desc.verbosity = 1; // narrate transitions

    let button = Arc::new(SimButton::new());
    let inputs: Vec<Arc<dyn InputLinePort>> = vec![button.clone()];
    let outputs: Vec<Arc<dyn OutputLinePort>> = vec![
        Arc::new(SimOutput { label: "power" }),
        Arc::new(SimOutput { label: "led" }),
    ];

    let engine = Engine::bring_up(&desc, inputs, outputs)?;
    let irq = engine.interrupt_handle();
    let chip = engine.chip();
    info!("sequencer up, state '{}'", engine.current_state().unwrap_or("?"));

    // ── 3. Press the button: off -> power_up -> running ───────
    info!("--- press ---");
    button.write(&irq, true);
    wait_for(&engine, "running")?;
    thread::sleep(Duration::from_millis(100));

    // ── 4. Force a power cycle through the soft chip ──────────
    // The button is still held, so after the rails drain the machine
    // powers straight back up.
    info!("--- soft power-cycle request ---");
    chip.set(FORCE, Level::High)?;
    wait_for(&engine, "power_down")?;
    chip.set(FORCE, Level::Low)?; // clear the request while the rails drain
    wait_for(&engine, "running")?;

    // ── 5. Release: running -> power_down -> off ──────────────
    info!("--- release ---");
    button.write(&irq, false);
    wait_for(&engine, "off")?;

    // ── 6. Press again and shut down mid-run ──────────────────
    // The engine walks the shutdown edges (running -> power_down -> off)
    // instead of stopping with the power rail live.
    info!("--- press, then shut down while running ---");
    button.write(&irq, true);
    wait_for(&engine, "running")?;

    let stats = engine.stats();
    info!(
        "session: {} state entries, {} dropped requests",
        stats.entries, stats.dropped_requests
    );
    info!("machine dump:\n{}", engine.dump());

    engine.shutdown();
    info!("sequencer stopped on the shutdown terminal");
    Ok(())
}
