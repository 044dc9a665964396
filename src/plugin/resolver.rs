//! Entity resolution
//!
//! The provider offers no server-side filter by ID, so each lookup enumerates
//! the whole class and scans it. Nothing is cached: the array may change
//! between two calls.

use crate::domain::ports::{
    CimInstance, WbemSession, CLASS_STORAGE_POOL, CLASS_STORAGE_SYSTEM, CLASS_STORAGE_VOLUME,
};
use crate::error::Error;
use crate::plugin::classifier::FaultResult;
use tracing::debug;

/// Entity kinds the resolver looks up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    System,
    Pool,
    Volume,
}

impl EntityKind {
    /// Provider class enumerated for this kind
    pub fn class_name(self) -> &'static str {
        match self {
            EntityKind::System => CLASS_STORAGE_SYSTEM,
            EntityKind::Pool => CLASS_STORAGE_POOL,
            EntityKind::Volume => CLASS_STORAGE_VOLUME,
        }
    }

    fn not_found(self) -> Error {
        match self {
            EntityKind::System => Error::NotFoundSystem("System not found".into()),
            EntityKind::Pool => Error::NotFoundPool("Pool not found".into()),
            EntityKind::Volume => Error::NotFoundVolume("Volume not found".into()),
        }
    }
}

/// Looks up raw provider instances by domain ID
pub struct EntityResolver<'a> {
    session: &'a dyn WbemSession,
}

impl<'a> EntityResolver<'a> {
    pub fn new(session: &'a dyn WbemSession) -> Self {
        Self { session }
    }

    /// Find the instance of `kind` whose `InstanceID` equals `id`
    pub async fn resolve(&self, kind: EntityKind, id: &str) -> FaultResult<CimInstance> {
        let instances = self.session.enumerate_instances(kind.class_name()).await?;
        debug!(
            "Resolving {:?} {} among {} instances",
            kind,
            id,
            instances.len()
        );

        instances
            .into_iter()
            .find(|inst| inst.get_str("InstanceID") == Some(id))
            .ok_or_else(|| kind.not_found().into())
    }

    pub async fn pool(&self, id: &str) -> FaultResult<CimInstance> {
        self.resolve(EntityKind::Pool, id).await
    }

    pub async fn system(&self, id: &str) -> FaultResult<CimInstance> {
        self.resolve(EntityKind::System, id).await
    }

    pub async fn volume(&self, id: &str) -> FaultResult<CimInstance> {
        self.resolve(EntityKind::Volume, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::CimFault;
    use crate::plugin::classifier::Fault;
    use crate::testing::{ssm_volume, FakeSession};
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_resolve_match() {
        let session = FakeSession::with_array();
        let resolver = EntityResolver::new(&session);

        let pool = resolver.pool("P0").await.unwrap();
        assert_eq!(pool.get_str("InstanceID"), Some("P0"));
        assert_eq!(session.enumerate_calls(), 1);
    }

    #[tokio::test]
    async fn test_resolve_first_match_wins() {
        let session = FakeSession::new();
        session.add(ssm_volume("V1", "first", "P0", "S0", 512, 512));
        session.add(ssm_volume("V1", "second", "P0", "S0", 512, 512));

        let vol = EntityResolver::new(&session).volume("V1").await.unwrap();
        assert_eq!(vol.get_str("GivenName"), Some("first"));
    }

    #[tokio::test]
    async fn test_resolve_not_found_per_kind() {
        let session = FakeSession::with_array();
        let resolver = EntityResolver::new(&session);

        assert_matches!(
            resolver.pool("P9").await,
            Err(Fault::Domain(Error::NotFoundPool(_)))
        );
        assert_matches!(
            resolver.system("S9").await,
            Err(Fault::Domain(Error::NotFoundSystem(_)))
        );
        assert_matches!(
            resolver.volume("V9").await,
            Err(Fault::Domain(Error::NotFoundVolume(_)))
        );
    }

    #[tokio::test]
    async fn test_resolve_does_not_match_other_class() {
        // a pool ID is not a system ID even if the string is equal
        let session = FakeSession::with_array();
        assert_matches!(
            EntityResolver::new(&session).system("P0").await,
            Err(Fault::Domain(Error::NotFoundSystem(_)))
        );
    }

    #[tokio::test]
    async fn test_resolve_propagates_session_fault() {
        let session = FakeSession::with_array();
        session.fail_enumerate(CimFault::Http("timed out".into()));
        assert_matches!(
            EntityResolver::new(&session).pool("P0").await,
            Err(Fault::Cim(CimFault::Http(_)))
        );
    }
}
