//! Domain Entities - Systems, pools and volumes
//!
//! Value snapshots built from the provider's state at query time. None of
//! them hold a connection back to the provider.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// System
// =============================================================================

/// A storage system (array) exposed by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    /// Identifier, unique within one provider connection
    pub id: String,
    /// Human friendly name
    pub name: String,
    /// Status bitmap, see `System::STATUS_*`
    pub status: u32,
    /// Additional message for status
    pub status_info: String,
    #[serde(skip)]
    pub(crate) plugin_data: Option<String>,
}

impl System {
    /// Plugin failed to query system status.
    pub const STATUS_UNKNOWN: u32 = 1;
    /// System is up and healthy.
    pub const STATUS_OK: u32 = 1 << 1;
    /// System is in error state.
    pub const STATUS_ERROR: u32 = 1 << 2;
    /// System is degraded.
    pub const STATUS_DEGRADED: u32 = 1 << 3;
}

// =============================================================================
// Pool
// =============================================================================

/// A storage pool volumes are allocated from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub name: String,
    /// Bitmap of `Pool::ELEMENT_TYPE_*`
    pub element_type: u64,
    /// Bitmap of `Pool::UNSUPPORTED_*`
    pub unsupported_actions: u64,
    /// Total space in bytes or `Pool::TOTAL_SPACE_NOT_FOUND`
    pub total_space: u64,
    /// Free space in bytes or `Pool::FREE_SPACE_NOT_FOUND`
    pub free_space: u64,
    /// Status bitmap, see `Pool::STATUS_*`
    pub status: u64,
    pub status_info: String,
    /// Identifier of owner system
    pub system_id: String,
    #[serde(skip)]
    pub(crate) plugin_data: Option<String>,
}

impl Pool {
    /// This pool could create volume.
    pub const ELEMENT_TYPE_VOLUME: u64 = 1 << 2;

    /// This pool cannot grow size of its volume.
    pub const UNSUPPORTED_VOLUME_GROW: u64 = 1;
    /// This pool cannot shrink size of its volume.
    pub const UNSUPPORTED_VOLUME_SHRINK: u64 = 1 << 1;

    /// Provider did not report total space.
    pub const TOTAL_SPACE_NOT_FOUND: u64 = u64::MAX;
    /// Provider did not report free space.
    pub const FREE_SPACE_NOT_FOUND: u64 = u64::MAX;

    /// Plugin failed to query pool status.
    pub const STATUS_UNKNOWN: u64 = 1;
    /// Pool data is accessible.
    pub const STATUS_OK: u64 = 1 << 1;

    /// Keys accepted by `pools()` filtering
    pub const SEARCH_KEYS: &'static [&'static str] = &["id", "system_id"];
}

// =============================================================================
// Volume
// =============================================================================

/// A storage volume (LUN)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub name: String,
    /// SCSI VPD 0x83 NAA identifier
    pub vpd83: String,
    pub block_size: u64,
    pub num_of_blocks: u64,
    /// `Volume::ADMIN_STATE_ENABLED` or `Volume::ADMIN_STATE_DISABLED`
    pub admin_state: u32,
    pub system_id: String,
    pub pool_id: String,
    #[serde(skip)]
    pub(crate) plugin_data: Option<String>,
}

impl Volume {
    pub const ADMIN_STATE_DISABLED: u32 = 0;
    pub const ADMIN_STATE_ENABLED: u32 = 1;

    /// Keys accepted by `volumes()` filtering
    pub const SEARCH_KEYS: &'static [&'static str] = &["id", "system_id", "pool_id"];

    /// Usable size of volume in bytes, `None` when it overflows `u64`.
    pub fn size_bytes(&self) -> Option<u64> {
        self.block_size.checked_mul(self.num_of_blocks)
    }
}

/// Provisioning requested for a new volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provisioning {
    /// Fully allocated volume
    Full,
    /// Thin provisioned volume
    Thin,
    /// Let the array decide
    Default,
}

impl std::fmt::Display for Provisioning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provisioning::Full => write!(f, "full"),
            Provisioning::Thin => write!(f, "thin"),
            Provisioning::Default => write!(f, "default"),
        }
    }
}

impl std::str::FromStr for Provisioning {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Provisioning::Full),
            "thin" => Ok(Provisioning::Thin),
            "default" => Ok(Provisioning::Default),
            other => Err(Error::InvalidArgument(format!(
                "unknown provisioning type: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Capabilities
// =============================================================================

/// A capability a system may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Capability {
    Volumes = 20,
    VolumeCreate = 21,
    VolumeResize = 22,
    VolumeDelete = 33,
}

/// Set of capabilities supported by one system
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    supported: BTreeSet<Capability>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, cap: Capability) {
        self.supported.insert(cap);
    }

    pub fn is_supported(&self, cap: Capability) -> bool {
        self.supported.contains(&cap)
    }

    /// Supported capabilities in ascending order
    pub fn supported(&self) -> impl Iterator<Item = Capability> + '_ {
        self.supported.iter().copied()
    }
}

/// Description of the plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub description: String,
    pub version: String,
}

// =============================================================================
// Property Search
// =============================================================================

/// Entities that can be filtered by `pools()`/`volumes()`
pub trait Searchable {
    /// Keys accepted for this entity
    fn search_keys() -> &'static [&'static str];

    /// Value of a search key, `None` for unknown keys
    fn search_value(&self, key: &str) -> Option<&str>;
}

impl Searchable for Pool {
    fn search_keys() -> &'static [&'static str] {
        Pool::SEARCH_KEYS
    }

    fn search_value(&self, key: &str) -> Option<&str> {
        match key {
            "id" => Some(&self.id),
            "system_id" => Some(&self.system_id),
            _ => None,
        }
    }
}

impl Searchable for Volume {
    fn search_keys() -> &'static [&'static str] {
        Volume::SEARCH_KEYS
    }

    fn search_value(&self, key: &str) -> Option<&str> {
        match key {
            "id" => Some(&self.id),
            "system_id" => Some(&self.system_id),
            "pool_id" => Some(&self.pool_id),
            _ => None,
        }
    }
}

/// Keep only entities whose `key` property equals `value`
///
/// No filtering happens unless both key and value are given.
pub fn search_property<T: Searchable>(
    items: Vec<T>,
    key: Option<&str>,
    value: Option<&str>,
) -> Result<Vec<T>> {
    let (key, value) = match (key, value) {
        (Some(k), Some(v)) => (k, v),
        _ => return Ok(items),
    };

    if !T::search_keys().contains(&key) {
        return Err(Error::UnsupportedSearchKey(format!(
            "unsupported search key: {}",
            key
        )));
    }

    Ok(items
        .into_iter()
        .filter(|item| item.search_value(key) == Some(value))
        .collect())
}
