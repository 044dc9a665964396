//! Volume Operations
//!
//! Mutating operations run as one synchronous sequence each: resolve the
//! operands, invoke the provider method, check its result code, then re-read
//! the affected volume. The array offers no job handle for any of them.

use crate::domain::entities::{Pool, Provisioning, Volume};
use crate::domain::ports::{
    CimValue, InstancePath, MethodOutput, WbemSession, CLASS_STORAGE_VOLUME,
    METHOD_CREATE_VOLUME, METHOD_DELETE_VOLUME, METHOD_MODIFY_VOLUME,
};
use crate::error::Error;
use crate::plugin::classifier::{Fault, FaultResult};
use crate::plugin::resolver::EntityResolver;
use crate::plugin::translate::volume_from_instance;
use anyhow::anyhow;
use tracing::{debug, info, warn};

/// Runs volume create/resize/delete against one session
pub struct OperationExecutor<'a> {
    session: &'a dyn WbemSession,
    resolver: EntityResolver<'a>,
}

/// Fail with a plugin bug unless the provider method returned zero
fn check_return(method: &str, out: &MethodOutput) -> FaultResult<()> {
    if out.return_value != 0 {
        return Err(Error::plugin_bug(format!(
            "{} returned error {}, out: {}",
            method, out.return_value, out
        ))
        .into());
    }
    Ok(())
}

impl<'a> OperationExecutor<'a> {
    pub fn new(session: &'a dyn WbemSession) -> Self {
        Self {
            session,
            resolver: EntityResolver::new(session),
        }
    }

    /// Re-read a volume by path and translate it
    async fn fetch_volume(&self, path: &InstancePath) -> FaultResult<Volume> {
        let ssm_vol = self.session.get_instance(path).await?;
        Ok(volume_from_instance(&ssm_vol)?)
    }

    /// Scan current volumes for one named `name`
    async fn name_in_use(&self, name: &str) -> FaultResult<bool> {
        let ssm_vols = self.session.enumerate_instances(CLASS_STORAGE_VOLUME).await?;
        for ssm_vol in &ssm_vols {
            if volume_from_instance(ssm_vol)?.name == name {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn volume_create(
        &self,
        pool: &Pool,
        volume_name: &str,
        size_bytes: u64,
        provisioning: Provisioning,
    ) -> FaultResult<Volume> {
        if provisioning == Provisioning::Thin {
            return Err(Error::NoSupport("Thin provisioning is not supported yet".into()).into());
        }

        let ssm_pool = self.resolver.pool(&pool.id).await?;
        let ssm_sys = self.resolver.system(&pool.system_id).await?;

        info!(
            "Creating volume {} ({} bytes) in pool {}",
            volume_name, size_bytes, pool.id
        );

        let params = vec![
            ("GivenName".to_string(), CimValue::String(volume_name.to_string())),
            ("Size".to_string(), CimValue::Uint64(size_bytes)),
            ("ProvisioningType".to_string(), CimValue::String("Full".to_string())),
            (
                "InPools".to_string(),
                CimValue::ReferenceArray(vec![ssm_pool.path.clone()]),
            ),
        ];

        let out = match self
            .session
            .invoke_method(METHOD_CREATE_VOLUME, &ssm_sys.path, params)
            .await
        {
            Ok(out) => out,
            Err(fault) => {
                // Best effort only: the volume list may change between the
                // failed call and this scan.
                warn!("{} failed, checking for duplicate name: {}", METHOD_CREATE_VOLUME, fault);
                if self.name_in_use(volume_name).await? {
                    return Err(Error::NameConflict(format!(
                        "Name '{}' is used by other volume",
                        volume_name
                    ))
                    .into());
                }
                return Err(Fault::Cim(fault));
            }
        };
        check_return(METHOD_CREATE_VOLUME, &out)?;

        let vol_path = match out.out_params.get("TheStorageVolume") {
            Some(CimValue::Reference(path)) => path.clone(),
            _ => {
                return Err(anyhow!(
                    "{} returned no TheStorageVolume reference, out: {}",
                    METHOD_CREATE_VOLUME,
                    out
                )
                .into())
            }
        };

        let volume = self.fetch_volume(&vol_path).await?;
        debug!("Created volume {} as {}", volume.name, volume.id);
        Ok(volume)
    }

    pub async fn volume_resize(&self, volume: &Volume, new_size_bytes: u64) -> FaultResult<Volume> {
        let current = volume.size_bytes().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Volume {} size overflows: {} blocks of {} bytes",
                volume.id, volume.num_of_blocks, volume.block_size
            ))
        })?;
        if new_size_bytes < current {
            return Err(Error::NoSupport("Volume size shrink is not supported yet".into()).into());
        }
        if new_size_bytes == current {
            debug!("Volume {} already has {} bytes", volume.id, current);
            return Ok(volume.clone());
        }

        let ssm_vol = self.resolver.volume(&volume.id).await?;
        let ssm_sys = self.resolver.system(&volume.system_id).await?;

        info!(
            "Resizing volume {} from {} to {} bytes",
            volume.id, current, new_size_bytes
        );

        // The provider takes the pool ID here, not a pool reference.
        let params = vec![
            ("Size".to_string(), CimValue::Uint64(new_size_bytes)),
            (
                "TheStorageVolume".to_string(),
                CimValue::Reference(ssm_vol.path.clone()),
            ),
            (
                "InPools".to_string(),
                CimValue::StringArray(vec![volume.pool_id.clone()]),
            ),
        ];
        let out = self
            .session
            .invoke_method(METHOD_MODIFY_VOLUME, &ssm_sys.path, params)
            .await?;
        check_return(METHOD_MODIFY_VOLUME, &out)?;

        self.fetch_volume(&ssm_vol.path).await
    }

    pub async fn volume_delete(&self, volume: &Volume) -> FaultResult<()> {
        let ssm_vol = self.resolver.volume(&volume.id).await?;
        let ssm_sys = self.resolver.system(&volume.system_id).await?;

        info!("Deleting volume {}", volume.id);

        let params = vec![(
            "TheStorageVolume".to_string(),
            CimValue::Reference(ssm_vol.path.clone()),
        )];
        let out = self
            .session
            .invoke_method(METHOD_DELETE_VOLUME, &ssm_sys.path, params)
            .await?;
        check_return(METHOD_DELETE_VOLUME, &out)
    }
}
