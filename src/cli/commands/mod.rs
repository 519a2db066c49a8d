//! CLI command implementations.

mod config;
mod simulate;
mod start;

pub use config::{run_config, ConfigArgs, ConfigCommand};
pub use simulate::{run_simulate, simulate, SimulateArgs, SimulationSummary};
pub use start::{init_tracing, run_start_with_config, StartArgs};
