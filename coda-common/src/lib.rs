//! # Coda Common Library
//!
//! Shared code for the Coda judgment services:
//! - Error types (Error enum, Result alias)
//! - Event types (CodaEvent enum) and the EventBus
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
