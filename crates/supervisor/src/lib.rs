//! Supervisor - External process lifecycle
//!
//! Spawns producer and sink programs, writes to their stdin, drains their
//! stdout without blocking and watches their stderr for crash signatures on
//! a separate task.

pub mod drain;
pub mod error;
pub mod policy;
pub mod process;
pub mod state;
pub mod watchdog;

pub use drain::Drained;
pub use error::SupervisorError;
pub use policy::{exit_process, CrashPolicy, Terminator};
pub use process::SupervisedProcess;
pub use state::{ProcessState, StateCell};
pub use watchdog::{watch_stderr, CrashEvent, CrashSignature};
