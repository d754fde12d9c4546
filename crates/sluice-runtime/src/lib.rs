//! Sluice runtime: the staged driver and the batch executor.

pub mod driver;
pub mod executor;

pub use driver::{parse_source, run_stages, ExecConfig, Staged};
pub use executor::{load_records, load_records_file, ExecutionStats, Executor, ExecutorError, Output, DEFAULT_BATCH_SIZE};
