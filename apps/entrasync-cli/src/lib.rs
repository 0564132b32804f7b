//! entrasync CLI library
//!
//! Command implementations and wiring for the `entrasync` binary, exposed
//! for integration testing. Argument parsing lives in main.rs.

pub mod app;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
