//! CLI command implementations

pub mod check_config;
pub mod drain;
pub mod migrate;
pub mod run;
pub mod status;
pub mod sync;
