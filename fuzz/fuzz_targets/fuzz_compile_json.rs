//! Fuzz target: machine descriptions arriving as JSON
//!
//! Feeds arbitrary bytes through the serde path into the compiler and
//! asserts that the whole pipeline is panic-free: bad UTF-8 and bad JSON
//! are rejected by serde, bad descriptions come back as typed
//! `CompileError`s, and whatever compiles must also render.
//!
//! cargo fuzz run fuzz_compile_json

#![no_main]

use libfuzzer_sys::fuzz_target;
use linefsm::compiler::compile;
use linefsm::config::MachineConfig;
use linefsm::diag::render_machine;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First two bytes pick the line counts, the rest is the description.
    let input_count = (data[0] % 8) as usize;
    let output_count = (data[1] % 8) as usize;
    let Ok(text) = core::str::from_utf8(&data[2..]) else {
        return;
    };
    let Ok(config) = serde_json::from_str::<MachineConfig>(text) else {
        return;
    };

    match compile(&config, input_count, output_count) {
        Ok(machine) => {
            let dump = render_machine(&machine);
            assert!(
                dump.contains("start state:"),
                "compiled machine renders without a start state"
            );
        }
        Err(e) => {
            // Errors must carry a printable message.
            assert!(!e.to_string().is_empty());
        }
    }
});
