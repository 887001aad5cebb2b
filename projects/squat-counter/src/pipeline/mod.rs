// Squat analysis core

pub mod config;
pub mod detection;
pub mod error;
pub mod finalize;
pub mod geometry;
pub mod orchestrator;
pub mod overlay;
pub mod reader;
pub mod rep_counter;
pub mod stats;
pub mod types;
