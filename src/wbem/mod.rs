//! WBEM Transport
//!
//! CIM-XML over HTTP(S) implementation of the provider session port.

pub mod client;
pub mod xml;

pub use client::{HttpWbemSession, WbemClientConfig};
