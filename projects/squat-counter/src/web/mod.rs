// Thin HTTP job surface over the analysis core

pub mod api;
pub mod assets;
pub mod jobs;
pub mod server;
