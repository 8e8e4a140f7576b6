//! Shutdown sequencing: the bounded walk to the terminal state, the
//! timeout fallback, and the degenerate cases around it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use linefsm::config::{MachineConfig, StateNode};
use linefsm::tokens::{REC_SET, REC_SHUTDOWN, REC_START, output, shutdown};
use linefsm::{Engine, Level, OutputLinePort};

use crate::mock_lines::MockOutput;

#[test]
fn graceful_walk_reaches_the_terminal() {
    // run --0ms--> drain --60ms--> off, shutdown edges only.
    let config = MachineConfig::new(0)
        .state(
            StateNode::new("run")
                .mark(REC_START)
                .record(REC_SET, vec![output(0), 1, output(1), 1])
                .record("drain", vec![shutdown(), 0]),
        )
        .state(
            StateNode::new("drain")
                .record(REC_SET, vec![output(1), 0])
                .record("off", vec![shutdown(), 60]),
        )
        .state(
            StateNode::new("off")
                .mark(REC_SHUTDOWN)
                .record(REC_SET, vec![output(0), 0]),
        );

    let power = MockOutput::new();
    let led = MockOutput::new();
    let outputs: Vec<Arc<dyn OutputLinePort>> = vec![power.clone(), led.clone()];
    let engine = Engine::bring_up(&config, Vec::new(), outputs).unwrap();

    let started = Instant::now();
    engine.shutdown();
    let took = started.elapsed();

    // led dropped in drain, power dropped in off, drain dwelled 60 ms.
    assert_eq!(led.levels(), [Level::High, Level::Low]);
    assert_eq!(power.levels(), [Level::High, Level::Low]);
    assert!(took >= Duration::from_millis(60), "drain dwell skipped: {took:?}");
    assert!(took < Duration::from_secs(2), "walk took {took:?}");
}

#[test]
fn timeout_forces_the_terminal() {
    // `stuck` has no shutdown edge, so only the timeout can finish the job.
    let mut config = MachineConfig::new(0)
        .state(
            StateNode::new("stuck")
                .mark(REC_START)
                .record(REC_SET, vec![output(0), 1]),
        )
        .state(
            StateNode::new("off")
                .mark(REC_SHUTDOWN)
                .record(REC_SET, vec![output(0), 0]),
        );
    config.shutdown_timeout_ms = 100;

    let led = MockOutput::new();
    let outputs: Vec<Arc<dyn OutputLinePort>> = vec![led.clone()];
    let engine = Engine::bring_up(&config, Vec::new(), outputs).unwrap();

    let started = Instant::now();
    engine.shutdown();
    let took = started.elapsed();

    assert!(took >= Duration::from_millis(100), "timeout not honored: {took:?}");
    assert_eq!(led.levels(), [Level::High, Level::Low], "terminal not forced");
}

#[test]
fn already_terminal_returns_without_extra_entries() {
    let config = MachineConfig::new(0).state(
        StateNode::new("off")
            .mark(REC_START)
            .mark(REC_SHUTDOWN)
            .record(REC_SET, vec![output(0), 0]),
    );

    let led = MockOutput::new();
    let outputs: Vec<Arc<dyn OutputLinePort>> = vec![led.clone()];
    let engine = Engine::bring_up(&config, Vec::new(), outputs).unwrap();
    assert_eq!(engine.stats().entries, 1);

    let started = Instant::now();
    engine.shutdown();

    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(led.levels(), [Level::Low], "terminal must not be re-entered");
}

#[test]
fn machines_without_a_terminal_stop_in_place() {
    let config = MachineConfig::new(0).state(
        StateNode::new("run")
            .mark(REC_START)
            .record(REC_SET, vec![output(0), 1]),
    );

    let led = MockOutput::new();
    let outputs: Vec<Arc<dyn OutputLinePort>> = vec![led.clone()];
    let engine = Engine::bring_up(&config, Vec::new(), outputs).unwrap();

    let started = Instant::now();
    engine.shutdown();

    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(led.levels(), [Level::High], "no sequencing without a terminal");
}

#[test]
fn dropping_the_engine_runs_the_sequence() {
    let config = MachineConfig::new(0)
        .state(
            StateNode::new("run")
                .mark(REC_START)
                .record(REC_SET, vec![output(0), 1])
                .record("off", vec![shutdown(), 0]),
        )
        .state(
            StateNode::new("off")
                .mark(REC_SHUTDOWN)
                .record(REC_SET, vec![output(0), 0]),
        );

    let led = MockOutput::new();
    let outputs: Vec<Arc<dyn OutputLinePort>> = vec![led.clone()];
    let engine = Engine::bring_up(&config, Vec::new(), outputs).unwrap();

    drop(engine);
    assert_eq!(led.levels(), [Level::High, Level::Low]);
}

#[test]
fn shutdown_delay_counts_from_state_entry() {
    // `hold` was entered 250 ms ago with a 150 ms shutdown edge, so its
    // deadline has already passed when shutdown starts.
    let config = MachineConfig::new(0)
        .state(
            StateNode::new("hold")
                .mark(REC_START)
                .record("off", vec![shutdown(), 150]),
        )
        .state(
            StateNode::new("off")
                .mark(REC_SHUTDOWN)
                .record(REC_SET, vec![output(0), 0]),
        );

    let led = MockOutput::new();
    let outputs: Vec<Arc<dyn OutputLinePort>> = vec![led.clone()];
    let engine = Engine::bring_up(&config, Vec::new(), outputs).unwrap();

    std::thread::sleep(Duration::from_millis(250));
    let started = Instant::now();
    engine.shutdown();

    assert!(
        started.elapsed() < Duration::from_millis(100),
        "elapsed dwell must count against the shutdown edge"
    );
    assert_eq!(led.levels(), [Level::Low]);
}
