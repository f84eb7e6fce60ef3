pub mod batch;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod job;
pub mod machine;
pub mod manifest;
pub mod orchestrator;
pub mod process;
pub mod station;
pub mod util;
