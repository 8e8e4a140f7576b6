//! Engine integration: producers racing the worker, watch lifecycle,
//! event precedence at state entry, and polarity handling.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use linefsm::config::{MachineConfig, StateNode};
use linefsm::tokens::{REC_SET, REC_START, delay, input, output, soft};
use linefsm::{Edge, Engine, InputLinePort, Level, OutputLinePort};

use crate::mock_lines::{MockInput, MockOutput, wait_for_state};

// ── Request arbitration ───────────────────────────────────────

/// An output that sleeps inside `set_level`, holding the worker inside a
/// state entry so the test can race requests against it.
struct SlowOutput {
    hold: Duration,
    history: Mutex<Vec<Level>>,
}

impl SlowOutput {
    fn new(hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            hold,
            history: Mutex::new(Vec::new()),
        })
    }
}

impl OutputLinePort for SlowOutput {
    fn set_level(&self, level: Level) {
        thread::sleep(self.hold);
        self.history.lock().unwrap().push(level);
    }
}

#[test]
fn first_queued_request_wins_and_losers_are_counted() {
    // park --soft0--> slow --soft1--> t
    //                      --soft2--> u
    let config = MachineConfig::new(3)
        .state(
            StateNode::new("park")
                .mark(REC_START)
                .record("slow", vec![soft(0), 1]),
        )
        .state(
            StateNode::new("slow")
                .record(REC_SET, vec![output(0), 1])
                .record("t", vec![soft(1), 1])
                .record("u", vec![soft(2), 1]),
        )
        .state(StateNode::new("t"))
        .state(StateNode::new("u"));

    let slow_line = SlowOutput::new(Duration::from_millis(400));
    let outputs: Vec<Arc<dyn OutputLinePort>> = vec![slow_line];
    let engine = Engine::bring_up(&config, Vec::new(), outputs).unwrap();
    let chip = engine.chip();

    // Worker enters `slow` and stalls inside the signal write.
    chip.set(0, Level::High).unwrap();
    thread::sleep(Duration::from_millis(100));

    // Both of these see current == slow.  The first books the transition,
    // the second loses arbitration.
    chip.set(1, Level::High).unwrap();
    chip.set(2, Level::High).unwrap();

    assert!(wait_for_state(&engine, "t", Duration::from_secs(2)));
    let stats = engine.stats();
    // At least the `u` request was dropped; the entry rescan of soft 1 may
    // account for one more.
    assert!(
        stats.dropped_requests >= 1,
        "expected dropped requests, got {}",
        stats.dropped_requests
    );
    assert_eq!(engine.current_state(), Some("t"));
    engine.shutdown();
}

#[test]
fn writing_the_same_soft_value_twice_transitions_once() {
    // park --soft0--> slow --soft1--> t
    let config = MachineConfig::new(2)
        .state(
            StateNode::new("park")
                .mark(REC_START)
                .record("slow", vec![soft(0), 1]),
        )
        .state(
            StateNode::new("slow")
                .record(REC_SET, vec![output(0), 1])
                .record("t", vec![soft(1), 1]),
        )
        .state(StateNode::new("t"));

    let slow_line = SlowOutput::new(Duration::from_millis(400));
    let outputs: Vec<Arc<dyn OutputLinePort>> = vec![slow_line];
    let engine = Engine::bring_up(&config, Vec::new(), outputs).unwrap();
    let chip = engine.chip();

    // Worker enters `slow` and stalls inside the signal write.
    chip.set(0, Level::High).unwrap();
    thread::sleep(Duration::from_millis(100));

    // Same line, same value, twice.  The first write books the transition;
    // the repeat is a drop, not a second episode.
    chip.set(1, Level::High).unwrap();
    chip.set(1, Level::High).unwrap();

    assert!(wait_for_state(&engine, "t", Duration::from_secs(2)));
    thread::sleep(Duration::from_millis(50));

    let stats = engine.stats();
    let names: Vec<&str> = stats.recent.iter().map(|t| t.state.as_str()).collect();
    assert_eq!(names, ["park", "slow", "t"], "one transition per distinct cause");
    // The repeated write and the entry rescan of soft 1 both lose to the
    // booked request.
    assert!(
        stats.dropped_requests >= 2,
        "expected the repeat to be dropped, got {}",
        stats.dropped_requests
    );
    engine.shutdown();
}

// ── Watch lifecycle ───────────────────────────────────────────

#[test]
fn edge_preempts_delay_and_releases_the_watch() {
    // wait --input0=1--> fast, or --200ms--> late
    let config = MachineConfig::new(0)
        .state(
            StateNode::new("wait")
                .mark(REC_START)
                .record("late", vec![delay(), 200])
                .record("fast", vec![input(0), 1]),
        )
        .state(StateNode::new("late").record(REC_SET, vec![output(0), 1]))
        .state(StateNode::new("fast"));

    let line = MockInput::new(Level::Low);
    let led = MockOutput::new();
    let inputs: Vec<Arc<dyn InputLinePort>> = vec![line.clone()];
    let outputs: Vec<Arc<dyn OutputLinePort>> = vec![led.clone()];
    let engine = Engine::bring_up(&config, inputs, outputs).unwrap();
    let irq = engine.interrupt_handle();

    assert_eq!(line.trigger(), Some(Edge::Rising));
    line.drive(Level::High, &irq, 0);
    assert!(wait_for_state(&engine, "fast", Duration::from_secs(2)));

    // The pending delay died with the transition and the watch was released.
    thread::sleep(Duration::from_millis(300));
    assert_eq!(engine.current_state(), Some("fast"));
    assert_eq!(line.trigger(), None);
    assert!(led.levels().is_empty(), "late must never be entered");

    // A stale interrupt after leaving the state changes nothing.
    irq.fire(0);
    thread::sleep(Duration::from_millis(50));
    let stats = engine.stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(engine.current_state(), Some("fast"));
    engine.shutdown();
}

#[test]
fn overlapping_edge_and_delay_settle_on_one_winner() {
    // wait --input0=1--> fast, or --60ms--> late.  The edge lands right at
    // the deadline, so either producer may win, but only one episode runs.
    let config = MachineConfig::new(0)
        .state(
            StateNode::new("wait")
                .mark(REC_START)
                .record("late", vec![delay(), 60])
                .record("fast", vec![input(0), 1]),
        )
        .state(StateNode::new("late"))
        .state(StateNode::new("fast"));

    let line = MockInput::new(Level::Low);
    let inputs: Vec<Arc<dyn InputLinePort>> = vec![line.clone()];
    let engine = Engine::bring_up(&config, inputs, Vec::new()).unwrap();
    let irq = engine.interrupt_handle();

    thread::sleep(Duration::from_millis(55));
    line.drive(Level::High, &irq, 0);

    let deadline = Instant::now() + Duration::from_secs(2);
    while engine.current_state() == Some("wait") {
        assert!(Instant::now() < deadline, "neither producer fired");
        thread::sleep(Duration::from_millis(2));
    }

    // Whichever producer won, the loser changes nothing more: a late timer
    // fire finds its pending slot cleared, a late edge finds the watch
    // disarmed.
    thread::sleep(Duration::from_millis(150));
    let stats = engine.stats();
    assert_eq!(stats.entries, 2, "exactly one transition after the race");
    let end = engine.current_state();
    assert!(
        end == Some("late") || end == Some("fast"),
        "landed in {end:?}"
    );
    assert_eq!(line.trigger(), None);
    engine.shutdown();
}

#[test]
fn all_watches_drop_after_any_transition() {
    let config = MachineConfig::new(0)
        .state(
            StateNode::new("wait")
                .mark(REC_START)
                .record("a", vec![input(0), 1])
                .record("b", vec![input(1), 1]),
        )
        .state(StateNode::new("a"))
        .state(StateNode::new("b"));

    let first = MockInput::new(Level::Low);
    let second = MockInput::new(Level::Low);
    let inputs: Vec<Arc<dyn InputLinePort>> = vec![first.clone(), second.clone()];
    let engine = Engine::bring_up(&config, inputs, Vec::new()).unwrap();
    let irq = engine.interrupt_handle();

    assert_eq!(first.trigger(), Some(Edge::Rising));
    assert_eq!(second.trigger(), Some(Edge::Rising));

    second.drive(Level::High, &irq, 1);
    assert!(wait_for_state(&engine, "b", Duration::from_secs(2)));

    // Both watches are gone, not just the winner's.
    assert_eq!(first.trigger(), None);
    assert_eq!(second.trigger(), None);
    engine.shutdown();
}

#[test]
fn immediate_match_keeps_earlier_arms_until_the_next_pass() {
    // `gate` watches line 0 (low, stays pending) and line 1 (already
    // high, matches during the scan).  The match stops the scan but does
    // not revoke line 0's arming; the pass that executes the transition
    // releases both.
    let config = MachineConfig::new(0)
        .state(
            StateNode::new("gate")
                .mark(REC_START)
                .record("a", vec![input(0), 1])
                .record("b", vec![input(1), 1]),
        )
        .state(StateNode::new("a"))
        .state(StateNode::new("b"));

    let quiet = MockInput::new(Level::Low);
    let hot = MockInput::new(Level::High);
    let inputs: Vec<Arc<dyn InputLinePort>> = vec![quiet.clone(), hot.clone()];
    let engine = Engine::bring_up(&config, inputs, Vec::new()).unwrap();

    assert!(wait_for_state(&engine, "b", Duration::from_secs(2)));
    assert!(
        quiet.trigger_writes.load(Ordering::SeqCst) >= 2,
        "line 0 must be armed before the match stops the scan"
    );
    assert_eq!(quiet.trigger(), None);
    assert_eq!(hot.trigger(), None);
    engine.shutdown();
}

// ── Entry precedence ──────────────────────────────────────────

#[test]
fn soft_conditions_scan_before_input_levels_on_entry() {
    // Both the soft condition and the input level already hold when the
    // machine reaches `arena`; the soft event is checked first and wins
    // without the input watch ever being armed.
    let config = MachineConfig::new(1)
        .state(
            StateNode::new("stage")
                .mark(REC_START)
                .record("arena", vec![delay(), 30]),
        )
        .state(
            StateNode::new("arena")
                .record("via_soft", vec![soft(0), 1])
                .record("via_input", vec![input(0), 1]),
        )
        .state(StateNode::new("via_soft"))
        .state(StateNode::new("via_input"));

    let line = MockInput::new(Level::High);
    let inputs: Vec<Arc<dyn InputLinePort>> = vec![line.clone()];
    let engine = Engine::bring_up(&config, inputs, Vec::new()).unwrap();
    let chip = engine.chip();

    // Precondition both event sources while still in `stage`.
    chip.set(0, Level::High).unwrap();

    assert!(wait_for_state(&engine, "via_soft", Duration::from_secs(2)));
    assert_eq!(line.trigger(), None, "input watch must never be armed");
    engine.shutdown();
}

// ── Polarity ──────────────────────────────────────────────────

#[test]
fn active_low_lines_arm_the_inverted_physical_edge() {
    let config = MachineConfig::new(0)
        .state(
            StateNode::new("idle")
                .mark(REC_START)
                .record("hit", vec![input(0), 1]),
        )
        .state(StateNode::new("hit"));

    let line = MockInput::new_active_low(Level::Low);
    let inputs: Vec<Arc<dyn InputLinePort>> = vec![line.clone()];
    let engine = Engine::bring_up(&config, inputs, Vec::new()).unwrap();
    let irq = engine.interrupt_handle();

    // Waiting for logical 1 on an active-low line is a falling physical edge.
    assert_eq!(line.trigger(), Some(Edge::Falling));

    line.set_level(Level::High);
    irq.fire(0);
    assert!(wait_for_state(&engine, "hit", Duration::from_secs(2)));
    engine.shutdown();
}

// ── Virtual chip through the engine ───────────────────────────

#[test]
fn chip_reads_back_what_consumers_wrote() {
    let config = MachineConfig::new(2).state(StateNode::new("idle").mark(REC_START));

    let engine = Engine::bring_up(&config, Vec::new(), Vec::new()).unwrap();
    let chip = engine.chip();

    assert_eq!(chip.line_count(), 2);
    assert_eq!(chip.get(0).unwrap(), Level::Low);

    chip.set(1, Level::High).unwrap();
    assert_eq!(chip.get(1).unwrap(), Level::High);

    // Out-of-range offsets are typed errors on every operation.
    assert!(chip.get(2).is_err());
    assert!(chip.set(2, Level::High).is_err());
    engine.shutdown();
}
