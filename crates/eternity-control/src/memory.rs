use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use eternity_core::{
    now_ms, CreateSaveRequest, Host, HostId, Instance, InstanceId, InstanceSpec, InstanceStatus,
    SaveSnapshot, SaveUploadResult, TransferSaveRequest,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Barrier;

use crate::controller::{Controller, StreamId};
use crate::error::ControlError;

/// One recorded controller call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListInstances,
    ListHosts,
    ListSaves(Option<InstanceId>),
    Stop(InstanceId),
    Start(InstanceId, Option<String>),
    Assign(InstanceId, HostId),
    RequestDownload(InstanceId, String),
    FetchStream(StreamId),
    Upload(InstanceId, String),
    CreateInstance(InstanceId),
    TransferSave(TransferSaveRequest),
    CreateSave(InstanceId, String),
    Rcon(InstanceId, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    ListInstances,
    ListHosts,
    ListSaves,
    Stop,
    Start,
    Assign,
    RequestDownload,
    FetchStream,
    Upload,
    CreateInstance,
    TransferSave,
    CreateSave,
    Rcon,
}

impl Call {
    pub fn kind(&self) -> CallKind {
        match self {
            Self::ListInstances => CallKind::ListInstances,
            Self::ListHosts => CallKind::ListHosts,
            Self::ListSaves(_) => CallKind::ListSaves,
            Self::Stop(_) => CallKind::Stop,
            Self::Start(..) => CallKind::Start,
            Self::Assign(..) => CallKind::Assign,
            Self::RequestDownload(..) => CallKind::RequestDownload,
            Self::FetchStream(_) => CallKind::FetchStream,
            Self::Upload(..) => CallKind::Upload,
            Self::CreateInstance(_) => CallKind::CreateInstance,
            Self::TransferSave(_) => CallKind::TransferSave,
            Self::CreateSave(..) => CallKind::CreateSave,
            Self::Rcon(..) => CallKind::Rcon,
        }
    }

    fn instance(&self) -> Option<InstanceId> {
        match self {
            Self::ListSaves(id) => *id,
            Self::Stop(id)
            | Self::Start(id, _)
            | Self::Assign(id, _)
            | Self::RequestDownload(id, _)
            | Self::Upload(id, _)
            | Self::CreateInstance(id)
            | Self::CreateSave(id, _)
            | Self::Rcon(id, _) => Some(*id),
            Self::TransferSave(req) => Some(req.target_instance),
            Self::ListInstances | Self::ListHosts | Self::FetchStream(_) => None,
        }
    }
}

/// In-memory controller for tests. Keeps instance/host/save tables, applies
/// calls to them the way the real controller would, and records every call.
#[derive(Default)]
pub struct InMemoryController {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    instances: Vec<Instance>,
    hosts: Vec<Host>,
    saves: Vec<SaveSnapshot>,
    contents: HashMap<(InstanceId, String), Vec<u8>>,
    streams: HashMap<StreamId, Vec<u8>>,
    next_stream: u64,
    calls: Vec<Call>,
    failures: HashMap<(CallKind, Option<InstanceId>), String>,
    upload_result: Option<SaveUploadResult>,
    rcon_replies: HashMap<InstanceId, String>,
    stream_gate: Option<Arc<Barrier>>,
}

impl InMemoryController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_hosts(self, hosts: Vec<Host>) -> Self {
        self.lock().hosts = hosts;
        self
    }

    pub fn with_instances(self, instances: Vec<Instance>) -> Self {
        self.lock().instances = instances;
        self
    }

    pub fn add_save(&self, save: SaveSnapshot, bytes: impl Into<Vec<u8>>) {
        let mut inner = self.lock();
        inner
            .contents
            .insert((save.instance_id, save.name.clone()), bytes.into());
        inner.saves.push(save);
    }

    /// Make every call of `kind` fail with a controller rejection.
    pub fn fail(&self, kind: CallKind, message: impl Into<String>) {
        self.lock().failures.insert((kind, None), message.into());
    }

    /// Make calls of `kind` concerning `instance` fail.
    pub fn fail_for(&self, kind: CallKind, instance: InstanceId, message: impl Into<String>) {
        self.lock()
            .failures
            .insert((kind, Some(instance)), message.into());
    }

    /// Answer uploads with `result` instead of storing the save.
    pub fn set_upload_result(&self, result: SaveUploadResult) {
        self.lock().upload_result = Some(result);
    }

    pub fn set_rcon_reply(&self, instance: InstanceId, reply: impl Into<String>) {
        self.lock().rcon_replies.insert(instance, reply.into());
    }

    /// Hold every stream, once written out, until `parties` streams have
    /// been written, so concurrent downloads finish together.
    pub fn gate_streams(&self, parties: usize) {
        self.lock().stream_gate = Some(Arc::new(Barrier::new(parties)));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn call_kinds(&self) -> Vec<CallKind> {
        self.lock().calls.iter().map(Call::kind).collect()
    }

    pub fn instance(&self, id: InstanceId) -> Option<Instance> {
        self.lock().instances.iter().find(|i| i.id == id).cloned()
    }

    pub fn instances(&self) -> Vec<Instance> {
        self.lock().instances.clone()
    }

    pub fn saves_of(&self, id: InstanceId) -> Vec<SaveSnapshot> {
        self.lock()
            .saves
            .iter()
            .filter(|s| s.instance_id == id)
            .cloned()
            .collect()
    }

    pub fn save_bytes(&self, id: InstanceId, name: &str) -> Option<Vec<u8>> {
        self.lock().contents.get(&(id, name.to_string())).cloned()
    }

    /// Record `call` and return the injected failure for it, if any.
    fn record(&self, call: Call) -> Result<MutexGuard<'_, Inner>, ControlError> {
        let mut inner = self.lock();
        let kind = call.kind();
        let instance = call.instance();
        inner.calls.push(call);
        let failure = instance
            .and_then(|id| inner.failures.get(&(kind, Some(id))))
            .or_else(|| inner.failures.get(&(kind, None)))
            .cloned();
        match failure {
            Some(message) => Err(ControlError::rejected(500, message)),
            None => Ok(inner),
        }
    }
}

fn not_found(what: impl std::fmt::Display) -> ControlError {
    ControlError::rejected(404, format!("{what} not found"))
}

impl Inner {
    fn instance_mut(&mut self, id: InstanceId) -> Result<&mut Instance, ControlError> {
        self.instances
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| not_found(format!("instance {id}")))
    }

    /// Insert a save as the instance's newest, making it the default load.
    fn put_save(&mut self, instance: InstanceId, name: &str, bytes: Vec<u8>) {
        self.saves
            .retain(|s| !(s.instance_id == instance && s.name == name));
        for s in self.saves.iter_mut().filter(|s| s.instance_id == instance) {
            s.loaded_by_default = false;
        }
        self.saves.push(SaveSnapshot {
            instance_id: instance,
            name: name.to_string(),
            mtime_ms: now_ms(),
            size: bytes.len() as u64,
            loaded_by_default: true,
        });
        self.contents.insert((instance, name.to_string()), bytes);
    }
}

#[async_trait]
impl Controller for InMemoryController {
    async fn list_instances(&self) -> Result<Vec<Instance>, ControlError> {
        let inner = self.record(Call::ListInstances)?;
        Ok(inner.instances.clone())
    }

    async fn list_hosts(&self) -> Result<Vec<Host>, ControlError> {
        let inner = self.record(Call::ListHosts)?;
        Ok(inner.hosts.clone())
    }

    async fn list_saves(
        &self,
        instance: Option<InstanceId>,
    ) -> Result<Vec<SaveSnapshot>, ControlError> {
        let inner = self.record(Call::ListSaves(instance))?;
        Ok(inner
            .saves
            .iter()
            .filter(|s| instance.map_or(true, |id| s.instance_id == id))
            .cloned()
            .collect())
    }

    async fn stop_instance(&self, instance: InstanceId) -> Result<(), ControlError> {
        let mut inner = self.record(Call::Stop(instance))?;
        inner.instance_mut(instance)?.status = InstanceStatus::Stopped;
        Ok(())
    }

    async fn start_instance(
        &self,
        instance: InstanceId,
        save: Option<&str>,
    ) -> Result<(), ControlError> {
        let mut inner = self.record(Call::Start(instance, save.map(str::to_string)))?;
        if let Some(name) = save {
            if !inner.contents.contains_key(&(instance, name.to_string())) {
                return Err(not_found(format!("save {name}")));
            }
        }
        inner.instance_mut(instance)?.status = InstanceStatus::Running;
        Ok(())
    }

    async fn assign_instance(
        &self,
        instance: InstanceId,
        host: HostId,
    ) -> Result<(), ControlError> {
        let mut inner = self.record(Call::Assign(instance, host))?;
        if !inner.hosts.iter().any(|h| h.id == host) {
            return Err(not_found(format!("host {host}")));
        }
        inner.instance_mut(instance)?.assigned_host = Some(host);
        Ok(())
    }

    async fn request_download(
        &self,
        instance: InstanceId,
        save: &str,
    ) -> Result<StreamId, ControlError> {
        let mut inner = self.record(Call::RequestDownload(instance, save.to_string()))?;
        let bytes = inner
            .contents
            .get(&(instance, save.to_string()))
            .cloned()
            .ok_or_else(|| not_found(format!("save {save}")))?;
        inner.next_stream += 1;
        let id = format!("stream-{}", inner.next_stream);
        inner.streams.insert(id.clone(), bytes);
        Ok(id)
    }

    async fn fetch_stream(
        &self,
        stream: &str,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, ControlError> {
        let (bytes, gate) = {
            let mut inner = self.record(Call::FetchStream(stream.to_string()))?;
            let bytes = inner
                .streams
                .remove(stream)
                .ok_or_else(|| not_found(format!("stream {stream}")))?;
            (bytes, inner.stream_gate.clone())
        };
        out.write_all(&bytes).await?;
        out.flush().await?;
        if let Some(gate) = gate {
            gate.wait().await;
        }
        Ok(bytes.len() as u64)
    }

    async fn upload_save(
        &self,
        instance: InstanceId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<SaveUploadResult, ControlError> {
        let mut inner = self.record(Call::Upload(instance, filename.to_string()))?;
        if let Some(result) = inner.upload_result.clone() {
            return Ok(result);
        }
        inner.instance_mut(instance)?;
        inner.put_save(instance, filename, bytes);
        Ok(SaveUploadResult {
            saves: vec![filename.to_string()],
            errors: vec![],
        })
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> Result<(), ControlError> {
        let mut inner = self.record(Call::CreateInstance(spec.id))?;
        if inner.instances.iter().any(|i| i.id == spec.id) {
            return Err(ControlError::rejected(409, format!("instance {} exists", spec.id)));
        }
        inner.instances.push(Instance {
            id: spec.id,
            name: spec.name.clone(),
            assigned_host: None,
            status: InstanceStatus::Unassigned,
        });
        Ok(())
    }

    async fn transfer_save(&self, request: &TransferSaveRequest) -> Result<(), ControlError> {
        let mut inner = self.record(Call::TransferSave(request.clone()))?;
        let key = (request.source_instance, request.source_save.clone());
        let bytes = inner
            .contents
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found(format!("save {}", request.source_save)))?;
        inner.instance_mut(request.target_instance)?;
        if !request.copy {
            inner.contents.remove(&key);
            inner
                .saves
                .retain(|s| !(s.instance_id == key.0 && s.name == key.1));
        }
        inner.put_save(request.target_instance, &request.target_save, bytes);
        Ok(())
    }

    async fn create_save(
        &self,
        instance: InstanceId,
        request: &CreateSaveRequest,
    ) -> Result<(), ControlError> {
        let mut inner = self.record(Call::CreateSave(instance, request.name.clone()))?;
        inner.instance_mut(instance)?;
        inner.put_save(instance, &request.name, Vec::new());
        Ok(())
    }

    async fn send_rcon(&self, instance: InstanceId, command: &str) -> Result<String, ControlError> {
        let mut inner = self.record(Call::Rcon(instance, command.to_string()))?;
        inner.instance_mut(instance)?;
        Ok(inner
            .rcon_replies
            .get(&instance)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: InstanceId) -> Instance {
        Instance {
            id,
            name: format!("inst-{id}"),
            assigned_host: Some(1),
            status: InstanceStatus::Running,
        }
    }

    #[tokio::test]
    async fn records_calls_in_order() {
        let ctl = InMemoryController::new().with_instances(vec![instance(1)]);
        ctl.list_instances().await.unwrap();
        ctl.stop_instance(1).await.unwrap();
        assert_eq!(ctl.calls(), vec![Call::ListInstances, Call::Stop(1)]);
        assert_eq!(ctl.instance(1).unwrap().status, InstanceStatus::Stopped);
    }

    #[tokio::test]
    async fn injected_failures_are_still_recorded() {
        let ctl = InMemoryController::new().with_instances(vec![instance(1), instance(2)]);
        ctl.fail_for(CallKind::Rcon, 2, "rcon offline");
        assert!(ctl.send_rcon(1, "/time").await.is_ok());
        let err = ctl.send_rcon(2, "/time").await.unwrap_err();
        assert!(matches!(err, ControlError::Rejected { status: 500, .. }));
        assert_eq!(ctl.calls().len(), 2);
    }

    #[tokio::test]
    async fn streams_are_single_use() {
        let ctl = InMemoryController::new().with_instances(vec![instance(1)]);
        ctl.add_save(
            SaveSnapshot {
                instance_id: 1,
                name: "a.zip".into(),
                mtime_ms: 1,
                size: 3,
                loaded_by_default: true,
            },
            b"abc".to_vec(),
        );
        let stream = ctl.request_download(1, "a.zip").await.unwrap();
        let mut buf = Vec::new();
        assert_eq!(ctl.fetch_stream(&stream, &mut buf).await.unwrap(), 3);
        assert_eq!(buf, b"abc");
        assert!(ctl.fetch_stream(&stream, &mut buf).await.is_err());
    }

    #[tokio::test]
    async fn upload_becomes_default_save() {
        let ctl = InMemoryController::new().with_instances(vec![instance(1)]);
        ctl.add_save(
            SaveSnapshot {
                instance_id: 1,
                name: "old.zip".into(),
                mtime_ms: 1,
                size: 0,
                loaded_by_default: true,
            },
            Vec::new(),
        );
        let res = ctl.upload_save(1, "new.zip", b"zz".to_vec()).await.unwrap();
        assert_eq!(res.saves, vec!["new.zip".to_string()]);
        let defaults: Vec<_> = ctl
            .saves_of(1)
            .into_iter()
            .filter(|s| s.loaded_by_default)
            .map(|s| s.name)
            .collect();
        assert_eq!(defaults, vec!["new.zip".to_string()]);
    }
}
