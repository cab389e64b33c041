//! Data models and structures for the pinger

pub mod config;
pub mod measure;

// Re-export main model types
pub use config::{PingConfig, RedirectCallback, RuntimeConfig};
pub use measure::{HttpMeasure, Measure};
