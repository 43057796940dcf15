//! # Candor Server
//!
//! Wiring for the background worker process.

pub mod app;

pub use app::App;
