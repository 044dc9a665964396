//! Domain layer - Entities and port definitions
//!
//! This module defines the storage entities callers see and the session port
//! the plugin core drives, following hexagonal architecture principles.

pub mod entities;
pub mod ports;

pub use entities::*;
pub use ports::*;
