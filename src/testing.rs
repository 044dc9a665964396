//! In-memory provider used by unit tests
//!
//! `FakeSession` keeps a list of instances, answers enumerations from it and
//! applies the three volume methods to it. Every remote call is counted so
//! tests can assert which paths reach the provider.

use crate::domain::ports::{
    CimFault, CimInstance, CimValue, InstancePath, MethodOutput, WbemSession,
    CLASS_STORAGE_POOL, CLASS_STORAGE_SYSTEM, CLASS_STORAGE_VOLUME, METHOD_CREATE_VOLUME,
    METHOD_DELETE_VOLUME, METHOD_MODIFY_VOLUME,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Block size of volumes created by the fake provider
pub const FAKE_BLOCK_SIZE: u64 = 512;

fn path_of(class_name: &str, id: &str) -> InstancePath {
    InstancePath::new(class_name).with_key("InstanceID", id)
}

pub fn ssm_system(id: &str, durable_name: &str, given_name: &str, root: bool) -> CimInstance {
    let parent = if root { "NULL" } else { "S-parent" };
    CimInstance::new(path_of(CLASS_STORAGE_SYSTEM, id))
        .with_property("InstanceID", CimValue::String(id.into()))
        .with_property("DurableName", CimValue::String(durable_name.into()))
        .with_property("GivenName", CimValue::String(given_name.into()))
        .with_property(
            "ProvenanceInfo",
            CimValue::StringArray(vec!["Manufacture=Huawei,PartNumber=OceanStor".into()]),
        )
        .with_property("ParentSystems", CimValue::StringArray(vec![parent.into()]))
}

pub fn ssm_pool(id: &str, system_id: &str, space_info: &str, op_status: &str) -> CimInstance {
    CimInstance::new(path_of(CLASS_STORAGE_POOL, id))
        .with_property("InstanceID", CimValue::String(id.into()))
        .with_property("GivenName", CimValue::String(format!("pool-{}", id)))
        .with_property("SystemID", CimValue::String(system_id.into()))
        .with_property("SpaceInfo", CimValue::StringArray(vec![space_info.into()]))
        .with_property(
            "OperationalStatus",
            CimValue::StringArray(vec![op_status.into()]),
        )
}

pub fn ssm_volume(
    id: &str,
    name: &str,
    pool_id: &str,
    system_id: &str,
    block_size: u64,
    available: u64,
) -> CimInstance {
    CimInstance::new(path_of(CLASS_STORAGE_VOLUME, id))
        .with_property("InstanceID", CimValue::String(id.into()))
        .with_property("GivenName", CimValue::String(name.into()))
        .with_property("DurableName", CimValue::String(format!("60022a1100000000{}", id)))
        .with_property("BlockSize", CimValue::String(block_size.to_string()))
        .with_property(
            "SpaceInfo",
            CimValue::StringArray(vec![format!(
                "AvailableSpace={},ProvisionedSpace={}",
                available, available
            )]),
        )
        .with_property("PoolID", CimValue::StringArray(vec![pool_id.into()]))
        .with_property("SystemID", CimValue::String(system_id.into()))
}

/// One recorded extrinsic call
#[derive(Debug, Clone)]
pub struct Invocation {
    pub method: String,
    pub target: InstancePath,
    pub params: Vec<(String, CimValue)>,
}

#[derive(Default)]
struct FakeState {
    instances: Vec<CimInstance>,
    invoke_fault: Option<CimFault>,
    enumerate_fault: Option<CimFault>,
    return_value: u32,
    next_volume: usize,
    invocations: Vec<Invocation>,
    timeout: Option<Duration>,
}

/// In-memory [`WbemSession`]
#[derive(Default)]
pub struct FakeSession {
    state: Mutex<FakeState>,
    enumerate_calls: AtomicUsize,
    get_calls: AtomicUsize,
    invoke_calls: AtomicUsize,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// One root system `S0` holding pool `P0` with 1 GiB free of 4 GiB
    pub fn with_array() -> Self {
        let session = Self::new();
        session.add(ssm_system("S0", "naa.2100000000000001", "array01", true));
        session.add(ssm_system("S0-ctrl", "naa.2100000000000002", "ctrl-a", false));
        session.add(ssm_pool(
            "P0",
            "S0",
            "AvailableSpace=1073741824,ProvisionedSpace=4294967296",
            "Status=OK,Description=Normal",
        ));
        session
    }

    pub fn add(&self, inst: CimInstance) {
        self.state.lock().instances.push(inst);
    }

    /// Make every extrinsic call fail with `fault`
    pub fn fail_invoke(&self, fault: CimFault) {
        self.state.lock().invoke_fault = Some(fault);
    }

    /// Make every enumeration fail with `fault`
    pub fn fail_enumerate(&self, fault: CimFault) {
        self.state.lock().enumerate_fault = Some(fault);
    }

    /// Return `rc` from every extrinsic call without applying it
    pub fn set_return_value(&self, rc: u32) {
        self.state.lock().return_value = rc;
    }

    pub fn enumerate_calls(&self) -> usize {
        self.enumerate_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn invoke_calls(&self) -> usize {
        self.invoke_calls.load(Ordering::SeqCst)
    }

    /// Total remote calls of any kind
    pub fn remote_calls(&self) -> usize {
        self.enumerate_calls() + self.get_calls() + self.invoke_calls()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().invocations.clone()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.state.lock().timeout
    }

    fn instance_id(path: &InstancePath) -> String {
        path.keybindings.get("InstanceID").cloned().unwrap_or_default()
    }

    fn param<'a>(params: &'a [(String, CimValue)], name: &str) -> Option<&'a CimValue> {
        params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn apply(
        state: &mut FakeState,
        method: &str,
        target: &InstancePath,
        params: &[(String, CimValue)],
    ) -> Result<MethodOutput, CimFault> {
        let mut out = MethodOutput::default();
        match method {
            METHOD_CREATE_VOLUME => {
                let name = match Self::param(params, "GivenName") {
                    Some(CimValue::String(s)) => s.clone(),
                    _ => return Ok(MethodOutput { return_value: 5, ..Default::default() }),
                };
                let size = match Self::param(params, "Size") {
                    Some(CimValue::Uint64(s)) => *s,
                    _ => return Ok(MethodOutput { return_value: 5, ..Default::default() }),
                };
                let pool_id = match Self::param(params, "InPools") {
                    Some(CimValue::ReferenceArray(paths)) if !paths.is_empty() => {
                        Self::instance_id(&paths[0])
                    }
                    _ => return Ok(MethodOutput { return_value: 5, ..Default::default() }),
                };
                state.next_volume += 1;
                let id = format!("V{}", state.next_volume);
                let vol = ssm_volume(
                    &id,
                    &name,
                    &pool_id,
                    &Self::instance_id(target),
                    FAKE_BLOCK_SIZE,
                    size,
                );
                out.out_params
                    .insert("TheStorageVolume".into(), CimValue::Reference(vol.path.clone()));
                state.instances.push(vol);
            }
            METHOD_MODIFY_VOLUME => {
                let (vol_path, size) = match (
                    Self::param(params, "TheStorageVolume"),
                    Self::param(params, "Size"),
                ) {
                    (Some(CimValue::Reference(p)), Some(CimValue::Uint64(s))) => (p.clone(), *s),
                    _ => return Ok(MethodOutput { return_value: 5, ..Default::default() }),
                };
                let vol = state
                    .instances
                    .iter_mut()
                    .find(|i| i.path == vol_path)
                    .ok_or_else(|| not_found(&vol_path))?;
                vol.properties.insert(
                    "SpaceInfo".into(),
                    CimValue::StringArray(vec![format!(
                        "AvailableSpace={},ProvisionedSpace={}",
                        size, size
                    )]),
                );
            }
            METHOD_DELETE_VOLUME => {
                let vol_path = match Self::param(params, "TheStorageVolume") {
                    Some(CimValue::Reference(p)) => p.clone(),
                    _ => return Ok(MethodOutput { return_value: 5, ..Default::default() }),
                };
                let before = state.instances.len();
                state.instances.retain(|i| i.path != vol_path);
                if state.instances.len() == before {
                    return Err(not_found(&vol_path));
                }
            }
            other => {
                return Err(CimFault::Cim {
                    code: 17,
                    description: format!("CIM_ERR_METHOD_NOT_FOUND: {}", other),
                })
            }
        }
        Ok(out)
    }
}

fn not_found(path: &InstancePath) -> CimFault {
    CimFault::Cim {
        code: 6,
        description: format!("CIM_ERR_NOT_FOUND: {}", path),
    }
}

#[async_trait]
impl WbemSession for FakeSession {
    async fn enumerate_instances(&self, class_name: &str) -> Result<Vec<CimInstance>, CimFault> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if let Some(fault) = &state.enumerate_fault {
            return Err(fault.clone());
        }
        Ok(state
            .instances
            .iter()
            .filter(|i| i.path.class_name == class_name)
            .cloned()
            .collect())
    }

    async fn get_instance(&self, path: &InstancePath) -> Result<CimInstance, CimFault> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .instances
            .iter()
            .find(|i| &i.path == path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    async fn invoke_method(
        &self,
        method: &str,
        target: &InstancePath,
        params: Vec<(String, CimValue)>,
    ) -> Result<MethodOutput, CimFault> {
        self.invoke_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.invocations.push(Invocation {
            method: method.to_string(),
            target: target.clone(),
            params: params.clone(),
        });

        if let Some(fault) = &state.invoke_fault {
            return Err(fault.clone());
        }
        if state.return_value != 0 {
            let mut out = MethodOutput {
                return_value: state.return_value,
                ..Default::default()
            };
            out.out_params
                .insert("Error".into(), CimValue::String("array busy".into()));
            return Ok(out);
        }
        Self::apply(&mut state, method, target, &params)
    }

    fn set_timeout(&self, timeout: Duration) {
        self.state.lock().timeout = Some(timeout);
    }
}
