//! LineFSM, a declarative finite-state machine engine for I/O lines.
//!
//! A machine is described as data (`config::MachineConfig`), compiled into
//! an immutable transition graph (`compiler::compile`), and driven by a
//! single-writer runtime (`engine::Engine`) that reacts to input edges,
//! delay expiry, and writes to a virtual soft-line chip.
//!
//! The pure modules (`symtab`, `compiler`, `graph`, `diag`) have no
//! threading and are directly testable; all concurrency lives in `engine`.

#![deny(unused_must_use)]

pub mod compiler;
pub mod config;
pub mod diag;
pub mod engine;
pub mod graph;
pub mod ports;
pub mod symtab;
pub mod tokens;

mod error;

pub use diag::{EngineStats, TraceItem};
pub use engine::chip::{Direction, SoftPin, VirtualChip};
pub use engine::{Engine, InterruptHandle};
pub use error::{CompileError, SoftIoError};
pub use ports::{Edge, InputLinePort, Level, OutputLinePort};
