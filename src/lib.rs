pub mod audit;
pub mod blocks;
pub mod cli;
pub mod config;
pub mod controller;
pub mod discover;
pub mod error;
pub mod experiment_log;
pub mod fix;
pub mod guard;
pub mod judge;
pub mod lint;
pub mod materialize;
pub mod model;
pub mod orchestrator;
pub mod plan;
pub mod process;
pub mod prompts;
pub mod state;

#[cfg(test)]
pub(crate) mod test_helpers;
