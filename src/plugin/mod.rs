//! SSM Plugin
//!
//! The public operation set of the plugin. Every call goes through
//! [`classifier::guard`] so callers only ever see domain [`Error`] kinds.
//! Reads re-query the provider every time; nothing is cached.

pub mod classifier;
pub mod executor;
pub mod flattened;
pub mod resolver;
pub mod translate;
pub mod uri;

pub use classifier::{classify, guard, Fault};
pub use executor::OperationExecutor;
pub use resolver::{EntityKind, EntityResolver};
pub use uri::ConnectionTarget;

use crate::domain::entities::{
    search_property, Capabilities, Capability, PluginInfo, Pool, Provisioning, System, Volume,
};
use crate::domain::ports::{
    WbemSessionRef, CLASS_STORAGE_POOL, CLASS_STORAGE_SYSTEM, CLASS_STORAGE_VOLUME,
};
use crate::error::{Error, Result};
use crate::wbem::{HttpWbemSession, WbemClientConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Description reported by `plugin_info`
pub const PLUGIN_DESCRIPTION: &str = "Generic SSM support";

/// A registered plugin instance bound to one provider session
pub struct SsmPlugin {
    session: WbemSessionRef,
    /// Timeout of every remote call, in milliseconds
    tmo: u32,
}

impl std::fmt::Debug for SsmPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsmPlugin")
            .field("tmo", &self.tmo)
            .finish_non_exhaustive()
    }
}

impl SsmPlugin {
    /// Connect to the provider named by `uri`
    pub fn register(uri: &str, password: Option<&str>, timeout_ms: u32) -> Result<Self> {
        let target = ConnectionTarget::parse(uri)?;
        info!(
            "Registering SSM plugin for {} (namespace {})",
            target.base_url(),
            target.namespace
        );

        let config = WbemClientConfig {
            url: target.base_url(),
            namespace: target.namespace.clone(),
            username: target.username.clone(),
            password: password.unwrap_or_default().to_string(),
            no_ssl_verify: target.ssl && target.no_ssl_verify,
            timeout: Duration::from_millis(u64::from(timeout_ms)),
        };
        let session = HttpWbemSession::new(config).map_err(classifier::classify_cim)?;

        Ok(Self::with_session(Arc::new(session), timeout_ms))
    }

    /// Bind the plugin to an existing session
    pub fn with_session(session: WbemSessionRef, timeout_ms: u32) -> Self {
        session.set_timeout(Duration::from_millis(u64::from(timeout_ms)));
        Self {
            session,
            tmo: timeout_ms,
        }
    }

    /// Release the provider session
    pub fn unregister(self) {
        info!("Unregistering SSM plugin");
    }

    pub fn time_out_set(&mut self, ms: u32) {
        self.tmo = ms;
        self.session.set_timeout(Duration::from_millis(u64::from(ms)));
    }

    pub fn time_out_get(&self) -> u32 {
        self.tmo
    }

    pub fn capabilities(&self, _system: &System) -> Result<Capabilities> {
        let mut cap = Capabilities::new();
        cap.set(Capability::Volumes);
        Ok(cap)
    }

    pub fn plugin_info(&self) -> PluginInfo {
        PluginInfo {
            description: PLUGIN_DESCRIPTION.to_string(),
            version: crate::VERSION.to_string(),
        }
    }

    /// Jobs are never started by this plugin
    pub fn job_status(&self, _job_id: &str) -> Result<()> {
        Err(Error::NoSupport("not support yet".into()))
    }

    pub fn job_free(&self, _job_id: &str) -> Result<()> {
        Err(Error::NoSupport("not support yet".into()))
    }

    /// Root storage systems
    pub async fn systems(&self) -> Result<Vec<System>> {
        guard("systems", async {
            let ssm_syss = self.session.enumerate_instances(CLASS_STORAGE_SYSTEM).await?;
            debug!("Provider returned {} systems", ssm_syss.len());

            let mut systems = Vec::new();
            for ssm_sys in ssm_syss.iter().filter(|s| translate::is_root_system(s)) {
                systems.push(translate::system_from_instance(ssm_sys)?);
            }
            Ok::<_, Fault>(systems)
        })
        .await
    }

    pub async fn pools(
        &self,
        search_key: Option<&str>,
        search_value: Option<&str>,
    ) -> Result<Vec<Pool>> {
        guard("pools", async {
            let ssm_pools = self.session.enumerate_instances(CLASS_STORAGE_POOL).await?;
            let pools = ssm_pools
                .iter()
                .map(translate::pool_from_instance)
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok::<_, Fault>(search_property(pools, search_key, search_value)?)
        })
        .await
    }

    pub async fn volumes(
        &self,
        search_key: Option<&str>,
        search_value: Option<&str>,
    ) -> Result<Vec<Volume>> {
        guard("volumes", async {
            let ssm_vols = self.session.enumerate_instances(CLASS_STORAGE_VOLUME).await?;
            let volumes = ssm_vols
                .iter()
                .map(translate::volume_from_instance)
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok::<_, Fault>(search_property(volumes, search_key, search_value)?)
        })
        .await
    }

    pub async fn volume_create(
        &self,
        pool: &Pool,
        volume_name: &str,
        size_bytes: u64,
        provisioning: Provisioning,
    ) -> Result<Volume> {
        guard(
            "volume_create",
            OperationExecutor::new(self.session.as_ref()).volume_create(
                pool,
                volume_name,
                size_bytes,
                provisioning,
            ),
        )
        .await
    }

    pub async fn volume_resize(&self, volume: &Volume, new_size_bytes: u64) -> Result<Volume> {
        guard(
            "volume_resize",
            OperationExecutor::new(self.session.as_ref()).volume_resize(volume, new_size_bytes),
        )
        .await
    }

    pub async fn volume_delete(&self, volume: &Volume) -> Result<()> {
        guard(
            "volume_delete",
            OperationExecutor::new(self.session.as_ref()).volume_delete(volume),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::CimFault;
    use crate::testing::{ssm_pool, ssm_volume, FakeSession, FAKE_BLOCK_SIZE};
    use assert_matches::assert_matches;

    fn plugin(session: &Arc<FakeSession>) -> SsmPlugin {
        SsmPlugin::with_session(session.clone(), 30_000)
    }

    #[tokio::test]
    async fn test_systems_only_roots() {
        let session = Arc::new(FakeSession::with_array());
        let systems = plugin(&session).systems().await.unwrap();
        assert_eq!(systems.len(), 1);
        assert_eq!(systems[0].id, "S0");
        assert_eq!(systems[0].name, "naa.2100000000000001: array01");
        assert_eq!(systems[0].status, System::STATUS_UNKNOWN);
    }

    #[tokio::test]
    async fn test_pools_and_search() {
        let session = Arc::new(FakeSession::with_array());
        session.add(ssm_pool("P1", "S1", "AvailableSpace=1,ProvisionedSpace=2", "Status=OK"));
        let plugin = plugin(&session);

        assert_eq!(plugin.pools(None, None).await.unwrap().len(), 2);

        let pools = plugin.pools(Some("system_id"), Some("S1")).await.unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].id, "P1");

        assert_matches!(
            plugin.pools(Some("name"), Some("pool-P1")).await,
            Err(Error::UnsupportedSearchKey(_))
        );
    }

    #[tokio::test]
    async fn test_volumes_read_fresh_each_call() {
        let session = Arc::new(FakeSession::with_array());
        let plugin = plugin(&session);

        assert!(plugin.volumes(None, None).await.unwrap().is_empty());
        session.add(ssm_volume("V1", "data", "P0", "S0", 512, 4096));
        let vols = plugin.volumes(Some("pool_id"), Some("P0")).await.unwrap();
        assert_eq!(vols.len(), 1);
        assert_eq!(session.enumerate_calls(), 2);
    }

    #[tokio::test]
    async fn test_malformed_instance_is_plugin_bug() {
        let session = Arc::new(FakeSession::with_array());
        let mut bad = ssm_volume("V1", "data", "P0", "S0", 512, 4096);
        bad.properties.remove("BlockSize");
        session.add(bad);

        let err = plugin(&session).volumes(None, None).await.unwrap_err();
        assert_matches!(err, Error::PluginBug { ref message, debug: Some(_) } => {
            assert!(message.contains("BlockSize"));
        });
    }

    #[tokio::test]
    async fn test_transport_fault_classified() {
        let session = Arc::new(FakeSession::with_array());
        session.fail_enumerate(CimFault::Cim {
            code: 0,
            description: "Socket error: [Errno 111] Connection refused".into(),
        });
        assert_matches!(
            plugin(&session).systems().await,
            Err(Error::NetworkConnRefused(_))
        );

        session.fail_enumerate(CimFault::Auth("401 Unauthorized".into()));
        assert_matches!(
            plugin(&session).pools(None, None).await,
            Err(Error::PluginAuthFailed(_))
        );
    }

    #[tokio::test]
    async fn test_create_resize_delete_round() {
        let session = Arc::new(FakeSession::with_array());
        let plugin = plugin(&session);
        let pool = plugin
            .pools(Some("id"), Some("P0"))
            .await
            .unwrap()
            .remove(0);

        let size = 64 * 1024 * 1024;
        let vol = plugin
            .volume_create(&pool, "db01", size, Provisioning::Full)
            .await
            .unwrap();
        assert_eq!(vol.pool_id, pool.id);
        assert_eq!(vol.system_id, pool.system_id);
        assert_eq!(vol.num_of_blocks, size / FAKE_BLOCK_SIZE);

        let calls = session.remote_calls();
        let same = plugin
            .volume_resize(&vol, vol.size_bytes().unwrap())
            .await
            .unwrap();
        assert_eq!(same, vol);
        assert_eq!(session.remote_calls(), calls);

        assert_matches!(
            plugin.volume_resize(&vol, vol.size_bytes().unwrap() - 1).await,
            Err(Error::NoSupport(_))
        );
        assert_eq!(session.remote_calls(), calls);

        let grown = plugin.volume_resize(&vol, size * 2).await.unwrap();
        assert_eq!(grown.size_bytes(), Some(size * 2));

        plugin.volume_delete(&grown).await.unwrap();
        assert!(plugin.volumes(None, None).await.unwrap().is_empty());
        assert_matches!(
            plugin.volume_delete(&grown).await,
            Err(Error::NotFoundVolume(_))
        );
    }

    #[tokio::test]
    async fn test_create_duplicate_name_conflict() {
        let session = Arc::new(FakeSession::with_array());
        let plugin = plugin(&session);
        let pool = plugin.pools(None, None).await.unwrap().remove(0);
        plugin
            .volume_create(&pool, "db01", 4096, Provisioning::Default)
            .await
            .unwrap();

        session.fail_invoke(CimFault::Cim {
            code: 1,
            description: "CIM_ERR_FAILED: name exists".into(),
        });
        assert_matches!(
            plugin
                .volume_create(&pool, "db01", 4096, Provisioning::Default)
                .await,
            Err(Error::NameConflict(_))
        );
        assert_matches!(
            plugin
                .volume_create(&pool, "db02", 4096, Provisioning::Default)
                .await,
            Err(Error::PluginBug { .. })
        );
    }

    #[test]
    fn test_timeout_and_fixed_answers() {
        let session = Arc::new(FakeSession::new());
        let mut plugin = plugin(&session);
        assert_eq!(plugin.time_out_get(), 30_000);
        assert_eq!(session.timeout(), Some(Duration::from_secs(30)));

        plugin.time_out_set(5_000);
        assert_eq!(plugin.time_out_get(), 5_000);
        assert_eq!(session.timeout(), Some(Duration::from_secs(5)));

        let info = plugin.plugin_info();
        assert_eq!(info.description, "Generic SSM support");
        assert_eq!(info.version, crate::VERSION);

        assert_matches!(plugin.job_status("job-1"), Err(Error::NoSupport(_)));
        assert_matches!(plugin.job_free("job-1"), Err(Error::NoSupport(_)));
        assert_eq!(format!("{:?}", plugin), "SsmPlugin { tmo: 5000, .. }");
        plugin.unregister();
    }

    #[test]
    fn test_capabilities_volumes_only() {
        let session = Arc::new(FakeSession::with_array());
        let plugin = plugin(&session);
        let systems = tokio_test::block_on(plugin.systems()).unwrap();

        let cap = plugin.capabilities(&systems[0]).unwrap();
        assert!(cap.is_supported(Capability::Volumes));
        assert_eq!(cap.supported().count(), 1);
    }

    #[test]
    fn test_register_requires_namespace() {
        assert_matches!(
            SsmPlugin::register("ssm://admin@127.0.0.1/", Some("secret"), 1000),
            Err(Error::InvalidArgument(_))
        );
    }
}
