//! Logging initialisation for Calrissian
//!
//! Everything logs through `tracing`. Crates that use the `log` facade are
//! bridged by the subscriber, so both end up in the same output.

mod init;

pub use init::{build_env_filter, init_logging_from_config};
