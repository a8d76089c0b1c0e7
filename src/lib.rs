//! Host-facing entry point for the crush CSS preprocessor.
//!
//! Re-exports the [`crush`] core along with `log`, and provides a file
//! logger so hosts can capture the pipeline's diagnostics.
//!
//! ```no_run
//! use crush_rs::{Compiler, Options, init_logger};
//!
//! init_logger("crush.log", log::LevelFilter::Debug).expect("logger installed once");
//! let output = Compiler::default().compile_file("styles/main.css", &Options::default());
//! for warning in &output.warnings {
//!     eprintln!("warning: {}", warning);
//! }
//! ```

pub mod log_init;

pub use crush::*;
pub use log;
pub use log_init::init_logger;
