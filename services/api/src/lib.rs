pub mod adapters;
pub mod agents;
pub mod config;
pub mod error;
pub mod media_bridge;
pub mod orchestrator;
pub mod web;
