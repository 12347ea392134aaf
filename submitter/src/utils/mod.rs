//! Utility functions for timestamps, config snapshots and output URIs.

mod config;
pub mod timestamps;
pub mod uri;

pub use config::save_config;
pub use timestamps::{file_timestamp, now_utc, Timestamp, TIME_FORMAT};
