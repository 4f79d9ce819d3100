#![doc = include_str!("../README.md")]

pub mod config;
pub mod generators;
pub mod report;
pub mod runner;
pub mod senders;
pub mod settings;
pub mod telemetry;

pub use runner::run;
