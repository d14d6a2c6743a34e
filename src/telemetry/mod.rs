//! Logging and resolver statistics.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{Counter, ResolverStats};
