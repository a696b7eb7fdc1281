//! Application-level orchestration utilities.
//!
//! This module owns run lifecycle control (start/stop) and post-run processing such as
//! auto-save and exports. UI/CLI layers call into this module to keep responsibilities
//! separated.

mod controller;
mod post_process;

pub use controller::{run_controller, UiCommand};
pub use post_process::{process_run_completion, PostRunOptions, ProcessedRun};
