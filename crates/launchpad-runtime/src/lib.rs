//! Launchpad runtime bootstrapper
//!
//! Starts the embedded interpreter from an assembled [`launchpad_bundle::Bundle`]:
//! - **interpreter**: the embedding API the bootstrap drives
//! - **python**: that API resolved by name from the reflectively loaded host image
//! - **bootstrap**: the start sequence, entry module run and exit status

mod args;
pub mod bootstrap;
pub mod error;
pub mod interpreter;
pub mod python;

pub use bootstrap::{launch, run};
pub use error::{BootError, EXIT_FAILURE, EXIT_FINALIZE_FAILED};
pub use interpreter::{GilState, Interpreter, WideChar};
pub use python::PythonApi;
