//! SSM Storage Plugin
//!
//! Exposes storage arrays managed through the SSM (Simplified Storage
//! Management) CIM/WBEM provider as systems, pools and volumes, and runs
//! volume create/resize/delete against them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      SsmPlugin (public operations)                   │
//! │        every call wrapped by classifier::guard → domain Error        │
//! ├──────────────────────┬───────────────────────┬──────────────────────┤
//! │   OperationExecutor  │    EntityResolver     │   Entity translation │
//! │ invoke → rc → re-read│ enumerate + ID scan   │ property bag → entity│
//! ├──────────────────────┴───────────────────────┴──────────────────────┤
//! │                    WbemSession port (domain::ports)                   │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                HttpWbemSession: CIM-XML over HTTP(S)                 │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`plugin`]: Plugin operations, translation, resolution and classification
//! - [`domain`]: Storage entities and the provider session port
//! - [`wbem`]: CIM-XML transport
//! - [`error`]: Error types and handling

pub mod domain;
pub mod error;
pub mod plugin;
pub mod wbem;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use domain::entities::{
    Capabilities, Capability, PluginInfo, Pool, Provisioning, System, Volume,
};

pub use domain::ports::{
    CimFault, CimInstance, CimValue, InstancePath, MethodOutput, WbemSession, WbemSessionRef,
};

pub use error::{Error, ErrorNumber, Result};

pub use plugin::{ConnectionTarget, SsmPlugin};

pub use wbem::{HttpWbemSession, WbemClientConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
