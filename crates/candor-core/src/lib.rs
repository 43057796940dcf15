//! # Candor Core
//!
//! Foundational types shared by every Candor crate: the platform error
//! type, result aliases and logging initialisation.

pub mod error;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use result::*;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};

// Re-export shaku for dependency injection
pub use shaku::Interface;
