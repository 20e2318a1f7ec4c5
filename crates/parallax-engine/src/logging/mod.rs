//! Logging utilities.
//!
//! Centralizes logger initialization. The crate itself only uses the `log` facade;
//! binaries and tests call [`init_logging`] to install `env_logger`.

mod init;

pub use init::{init_logging, LoggingConfig};
