//! # Foodform Common Library
//!
//! Shared code for the foodform workspace:
//! - Error type shared by the engine and its tools
//! - Bootstrap configuration loading (TOML + environment)
//! - Logging initialisation
//! - Session event types and the broadcast `EventBus`

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
