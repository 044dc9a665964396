//! Domain Ports - Provider session boundary
//!
//! The plugin core never talks to the array directly. It goes through a
//! [`WbemSession`], which enumerates instances, fetches them by path and
//! invokes extrinsic methods. Instances come back as untyped property bags
//! ([`CimInstance`]) that the translator turns into domain entities.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Provider Classes and Methods
// =============================================================================

/// Provider class holding storage systems
pub const CLASS_STORAGE_SYSTEM: &str = "SSM_StorageSystem";
/// Provider class holding storage pools
pub const CLASS_STORAGE_POOL: &str = "SSM_StoragePool";
/// Provider class holding storage volumes
pub const CLASS_STORAGE_VOLUME: &str = "SSM_StorageVolume";

/// Extrinsic method creating a volume, invoked on a storage system
pub const METHOD_CREATE_VOLUME: &str = "CreateStorageVolume";
/// Extrinsic method resizing a volume, invoked on a storage system
pub const METHOD_MODIFY_VOLUME: &str = "ModifyStorageVolume";
/// Extrinsic method deleting a volume, invoked on a storage system
pub const METHOD_DELETE_VOLUME: &str = "DeleteStorageVolume";

// =============================================================================
// CIM Data Types
// =============================================================================

/// Object path identifying one provider instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstancePath {
    /// Class name of the instance
    pub class_name: String,
    /// Namespace, when the provider reported one
    pub namespace: Option<String>,
    /// Key property bindings
    pub keybindings: BTreeMap<String, String>,
}

impl InstancePath {
    /// Create a path with no keybindings
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            namespace: None,
            keybindings: BTreeMap::new(),
        }
    }

    /// Add a keybinding
    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keybindings.insert(name.into(), value.into());
        self
    }
}

impl fmt::Display for InstancePath {
    /// Renders the WBEM URI form, e.g. `root/ssm:SSM_StoragePool.InstanceID="P0"`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.namespace {
            write!(f, "{}:", ns)?;
        }
        write!(f, "{}", self.class_name)?;
        for (i, (name, value)) in self.keybindings.iter().enumerate() {
            let sep = if i == 0 { '.' } else { ',' };
            write!(f, "{}{}=\"{}\"", sep, name, value.replace('"', "\\\""))?;
        }
        Ok(())
    }
}

/// Value of a property or method parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CimValue {
    Null,
    String(String),
    Uint32(u32),
    Uint64(u64),
    StringArray(Vec<String>),
    Reference(InstancePath),
    ReferenceArray(Vec<InstancePath>),
}

impl CimValue {
    /// CIM-XML type name used when encoding this value
    pub fn type_name(&self) -> &'static str {
        match self {
            CimValue::Null | CimValue::String(_) | CimValue::StringArray(_) => "string",
            CimValue::Uint32(_) => "uint32",
            CimValue::Uint64(_) => "uint64",
            CimValue::Reference(_) | CimValue::ReferenceArray(_) => "reference",
        }
    }
}

impl fmt::Display for CimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CimValue::Null => write!(f, "NULL"),
            CimValue::String(s) => write!(f, "{}", s),
            CimValue::Uint32(v) => write!(f, "{}", v),
            CimValue::Uint64(v) => write!(f, "{}", v),
            CimValue::StringArray(items) => write!(f, "[{}]", items.join(", ")),
            CimValue::Reference(path) => write!(f, "{}", path),
            CimValue::ReferenceArray(paths) => {
                let rendered: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
        }
    }
}

/// One provider instance: its path plus a bag of named properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CimInstance {
    pub path: InstancePath,
    pub properties: BTreeMap<String, CimValue>,
}

impl CimInstance {
    pub fn new(path: InstancePath) -> Self {
        Self {
            path,
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter
    pub fn with_property(mut self, name: impl Into<String>, value: CimValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&CimValue> {
        self.properties.get(name)
    }

    /// Scalar string property, `None` when absent, NULL or not a scalar
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.properties.get(name) {
            Some(CimValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// String array property; a lone scalar is treated as a one-element array
    pub fn get_str_array(&self, name: &str) -> Option<Vec<String>> {
        match self.properties.get(name) {
            Some(CimValue::StringArray(items)) => Some(items.clone()),
            Some(CimValue::String(s)) => Some(vec![s.clone()]),
            _ => None,
        }
    }
}

/// Result of an extrinsic method call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MethodOutput {
    /// Numeric result code, zero on success
    pub return_value: u32,
    /// Output parameters by name
    pub out_params: BTreeMap<String, CimValue>,
}

impl fmt::Display for MethodOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.out_params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

// =============================================================================
// Transport Faults
// =============================================================================

/// Failure raised by a [`WbemSession`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CimFault {
    /// Protocol-level fault. Code 0 means the request never produced a CIM
    /// status (socket, SSL or HTTP failure described in `description`).
    #[error("CIM error {code}: {description}")]
    Cim { code: u32, description: String },

    /// The provider rejected the credentials
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Any other transport failure
    #[error("Transport error: {0}")]
    Http(String),
}

// =============================================================================
// WBEM Session Port
// =============================================================================

/// Port for talking to the provider
#[async_trait]
pub trait WbemSession: Send + Sync {
    /// Enumerate every instance of a class
    async fn enumerate_instances(&self, class_name: &str) -> Result<Vec<CimInstance>, CimFault>;

    /// Fetch one instance by path
    async fn get_instance(&self, path: &InstancePath) -> Result<CimInstance, CimFault>;

    /// Invoke an extrinsic method on the object at `target`
    async fn invoke_method(
        &self,
        method: &str,
        target: &InstancePath,
        params: Vec<(String, CimValue)>,
    ) -> Result<MethodOutput, CimFault>;

    /// Timeout applied to every subsequent remote call
    fn set_timeout(&self, timeout: Duration);
}

pub type WbemSessionRef = Arc<dyn WbemSession>;
