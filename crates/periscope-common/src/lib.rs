//! Periscope Common Types
//!
//! Shared error, logging, configuration and data types used by all Periscope crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{
    CameraConfig, CameraOffsets, ComponentOffsets, OffsetsConfig, PeriscopeConfig, ViewConfig,
    WritesConfig,
};
pub use error::{Error, Result};
pub use logging::{init_logging, LogConfig};
pub use types::*;

// Re-export tracing macros for convenience
pub use tracing::{debug, error, info, trace, warn};
