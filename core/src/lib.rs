//! Dockyard Core - Foundational Types and Abstractions
//!
//! This crate provides the foundational types shared across the Dockyard
//! workspace: the error type, store configuration, and logging setup.

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{PullerKind, StoreConfig};
pub use error::{DockError, Result};

/// Dockyard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
