//! ddbmetrics operator tooling.
//!
//! Configuration loading and output helpers shared by the `ddbmetrics` binary.

pub mod config;
pub mod output;

pub use config::AppConfig;
