//! IPU command line driver
//!
//! Wires the engine to the host: configuration file, logging, the built-in
//! actor set and the in-place upgrade workflow.
//!
//! # Commands
//!
//! - `ipu preupgrade`: analysis only, stops after the `Reports` phase
//! - `ipu upgrade`: full run; `--resume` continues after a reboot or a
//!   retryable failure
//! - `ipu answer --section scope.key=value`: record answers for actors

pub mod actors;
pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod os_release;
pub mod workflow;

pub use cli::{command, RunArgs};
pub use commands::{dispatch, exit_code_for};
pub use config::IpuConfig;
