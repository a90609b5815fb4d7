pub mod cli;
pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod sink;
pub mod telemetry;
