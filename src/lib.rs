pub mod balance;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod orchestrator;
pub mod parallel;
pub mod perf;
pub mod worker;
