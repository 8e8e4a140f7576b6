//! Fuzz target: raw description cells
//!
//! Builds state nodes directly from fuzz bytes: record names come from a
//! small pool so markers and transitions actually collide, and cells are
//! raw little endian words so every kind code and index (including the
//! invalid ones) reaches the compiler.  The compiler must return a machine
//! or a typed error, never panic, for any packing.
//!
//! cargo fuzz run fuzz_compile_cells

#![no_main]

use libfuzzer_sys::fuzz_target;
use linefsm::compiler::compile;
use linefsm::config::{MachineConfig, StateNode};
use linefsm::diag::render_machine;

const NAMES: [&str; 9] = [
    "set",
    "start_state",
    "shutdown_state",
    "name",
    "s0",
    "s1",
    "s2",
    "s3",
    "s4",
];

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let soft_count = (data[0] % 4) as usize;
    let input_count = (data[1] % 4) as usize;
    let output_count = (data[2] % 4) as usize;
    let state_count = (data[3] % 5) as usize + 1;

    let mut bytes = data[4..].iter().copied();
    let mut next = || bytes.next().unwrap_or(0);

    let mut config = MachineConfig {
        soft_count,
        shutdown_timeout_ms: 100,
        verbosity: 0,
        states: Vec::new(),
    };

    for i in 0..state_count {
        // Duplicate names are part of the input space.
        let name = NAMES[4 + (i + next() as usize) % 5];
        let mut node = StateNode::new(name);

        let records = next() % 4;
        for _ in 0..records {
            let rec_name = NAMES[next() as usize % NAMES.len()];
            let cell_count = (next() % 6) as usize;
            let mut cells = Vec::with_capacity(cell_count);
            for _ in 0..cell_count {
                let word = u32::from_le_bytes([next(), next(), next(), next()]);
                cells.push(word);
            }
            node = node.record(rec_name, cells);
        }
        config.states.push(node);
    }

    match compile(&config, input_count, output_count) {
        Ok(machine) => {
            let _ = render_machine(&machine);
        }
        Err(e) => {
            assert!(!e.to_string().is_empty());
        }
    }
});
