//! Entity translation
//!
//! Pure conversion of raw provider instances into [`System`], [`Pool`] and
//! [`Volume`]. Missing or malformed properties surface as unexpected faults,
//! which the classifier reports as plugin bugs.

use crate::domain::entities::{Pool, System, Volume};
use crate::domain::ports::{CimInstance, CimValue};
use crate::plugin::flattened::parse_flattened;
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use tracing::warn;

/// Marker the provider puts in `ParentSystems` of a root system
const NULL_PARENT: &str = "NULL";

// =============================================================================
// Property Access
// =============================================================================

fn required_str<'a>(inst: &'a CimInstance, name: &str) -> Result<&'a str> {
    inst.get_str(name)
        .ok_or_else(|| anyhow!("{} has no property {}", inst.path, name))
}

fn required_array(inst: &CimInstance, name: &str) -> Result<Vec<String>> {
    inst.get_str_array(name)
        .ok_or_else(|| anyhow!("{} has no property {}", inst.path, name))
}

fn required_u64(inst: &CimInstance, name: &str) -> Result<u64> {
    match inst.get(name) {
        Some(CimValue::Uint64(v)) => Ok(*v),
        Some(CimValue::Uint32(v)) => Ok(u64::from(*v)),
        _ => parse_u64(required_str(inst, name)?)
            .with_context(|| format!("property {} of {}", name, inst.path)),
    }
}

fn flattened(inst: &CimInstance, name: &str) -> Result<BTreeMap<String, String>> {
    parse_flattened(&required_array(inst, name)?)
        .with_context(|| format!("property {} of {}", name, inst.path))
}

fn parse_u64(raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .with_context(|| format!("'{}' is not an unsigned integer", raw))
}

// =============================================================================
// System
// =============================================================================

/// Whether the provider reports this system as a root (no parent) system
pub fn is_root_system(ssm_sys: &CimInstance) -> bool {
    match ssm_sys.get("ParentSystems") {
        None | Some(CimValue::Null) => true,
        Some(_) => ssm_sys
            .get_str_array("ParentSystems")
            .map(|parents| parents.iter().any(|p| p == NULL_PARENT))
            .unwrap_or(false),
    }
}

pub fn system_from_instance(ssm_sys: &CimInstance) -> Result<System> {
    let id = required_str(ssm_sys, "InstanceID")?;
    // DurableName comes in several formats; vendor/model from ProvenanceInfo
    // would read better once the provider fills it reliably.
    let name = format!(
        "{}: {}",
        required_str(ssm_sys, "DurableName")?,
        required_str(ssm_sys, "GivenName")?
    );

    // The provider does not expose a trustworthy operational status yet.
    Ok(System {
        id: id.to_string(),
        name,
        status: System::STATUS_UNKNOWN,
        status_info: String::new(),
        plugin_data: None,
    })
}

// =============================================================================
// Pool
// =============================================================================

/// Reduce operational status records to a pool status and status info
fn pool_status(records: &[BTreeMap<String, String>]) -> Result<(u64, String)> {
    let mut status_info = String::new();

    for record in records {
        let status = record
            .get("Status")
            .ok_or_else(|| anyhow!("operational status record has no Status"))?;
        if status.contains("OK") {
            return Ok((Pool::STATUS_OK, String::new()));
        }
        let description = record
            .get("Description")
            .ok_or_else(|| anyhow!("operational status record has no Description"))?;
        status_info.push_str(description);
    }

    Ok((Pool::STATUS_UNKNOWN, status_info))
}

pub fn pool_from_instance(ssm_pool: &CimInstance) -> Result<Pool> {
    let space_info = flattened(ssm_pool, "SpaceInfo")?;

    let free_space = match space_info.get("AvailableSpace") {
        Some(raw) => parse_u64(raw).context("AvailableSpace of pool")?,
        None => Pool::FREE_SPACE_NOT_FOUND,
    };
    let total_space = match space_info.get("ProvisionedSpace") {
        Some(raw) => parse_u64(raw).context("ProvisionedSpace of pool")?,
        None => Pool::TOTAL_SPACE_NOT_FOUND,
    };

    let free_space = if free_space != Pool::FREE_SPACE_NOT_FOUND
        && total_space != Pool::TOTAL_SPACE_NOT_FOUND
        && free_space > total_space
    {
        warn!(
            "Pool {} reports free space {} above total {}, clamping",
            ssm_pool.path, free_space, total_space
        );
        total_space
    } else {
        free_space
    };

    // The provider returns a single OperationalStatus record instead of a list.
    let op_status_list = vec![flattened(ssm_pool, "OperationalStatus")?];
    let (status, status_info) = pool_status(&op_status_list)?;

    Ok(Pool {
        id: required_str(ssm_pool, "InstanceID")?.to_string(),
        name: required_str(ssm_pool, "GivenName")?.to_string(),
        element_type: Pool::ELEMENT_TYPE_VOLUME,
        unsupported_actions: Pool::UNSUPPORTED_VOLUME_SHRINK,
        total_space,
        free_space,
        status,
        status_info,
        system_id: required_str(ssm_pool, "SystemID")?.to_string(),
        plugin_data: None,
    })
}

// =============================================================================
// Volume
// =============================================================================

pub fn volume_from_instance(ssm_vol: &CimInstance) -> Result<Volume> {
    let vpd83 = required_str(ssm_vol, "DurableName")?.to_string();
    let block_size = required_u64(ssm_vol, "BlockSize")?;

    let space_info = flattened(ssm_vol, "SpaceInfo")?;
    let available = space_info
        .get("AvailableSpace")
        .ok_or_else(|| anyhow!("SpaceInfo of {} has no AvailableSpace", ssm_vol.path))?;
    let num_of_blocks = parse_u64(available)?
        .checked_div(block_size)
        .ok_or_else(|| anyhow!("{} reports a zero block size", ssm_vol.path))?;

    let pool_id = required_array(ssm_vol, "PoolID")?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("{} has an empty PoolID", ssm_vol.path))?;

    Ok(Volume {
        id: required_str(ssm_vol, "InstanceID")?.to_string(),
        name: required_str(ssm_vol, "GivenName")?.to_string(),
        vpd83,
        block_size,
        num_of_blocks,
        admin_state: Volume::ADMIN_STATE_ENABLED,
        system_id: required_str(ssm_vol, "SystemID")?.to_string(),
        pool_id,
        plugin_data: None,
    })
}
