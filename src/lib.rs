pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod signals;
mod validate;
