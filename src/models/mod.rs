// src/models/mod.rs

//! Domain models for the news watcher.

mod config;
mod post;
mod region;
mod state;

// Re-export all public types
pub use config::{
    Config, DiscordConfig, ScheduleConfig, SourceConfig, StorageBackend, StorageConfig,
};
pub use post::PostRecord;
pub use region::{Region, parse_regions};
pub use state::SeenState;
