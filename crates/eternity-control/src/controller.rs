use crate::error::ControlError;
use async_trait::async_trait;
use eternity_core::{
    CreateSaveRequest, Host, HostId, Instance, InstanceId, InstanceSpec, SaveSnapshot,
    SaveUploadResult, TransferSaveRequest,
};
use tokio::io::AsyncWrite;

/// Identifier handed out by the controller for a pending byte stream.
pub type StreamId = String;

/// Operations the cluster controller exposes to command-line tooling.
///
/// Stop/start/assign calls resolve once the controller acknowledged them.
#[async_trait]
pub trait Controller: Send + Sync {
    async fn list_instances(&self) -> Result<Vec<Instance>, ControlError>;
    async fn list_hosts(&self) -> Result<Vec<Host>, ControlError>;
    /// All saves, or only those of `instance`.
    async fn list_saves(
        &self,
        instance: Option<InstanceId>,
    ) -> Result<Vec<SaveSnapshot>, ControlError>;

    async fn stop_instance(&self, instance: InstanceId) -> Result<(), ControlError>;
    /// Start, loading `save` if given, otherwise the default save.
    async fn start_instance(
        &self,
        instance: InstanceId,
        save: Option<&str>,
    ) -> Result<(), ControlError>;
    async fn assign_instance(&self, instance: InstanceId, host: HostId) -> Result<(), ControlError>;

    async fn request_download(
        &self,
        instance: InstanceId,
        save: &str,
    ) -> Result<StreamId, ControlError>;
    /// Copy the stream's bytes into `out`, returning how many were written.
    async fn fetch_stream(
        &self,
        stream: &str,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, ControlError>;
    async fn upload_save(
        &self,
        instance: InstanceId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<SaveUploadResult, ControlError>;

    async fn create_instance(&self, spec: &InstanceSpec) -> Result<(), ControlError>;
    async fn transfer_save(&self, request: &TransferSaveRequest) -> Result<(), ControlError>;
    async fn create_save(
        &self,
        instance: InstanceId,
        request: &CreateSaveRequest,
    ) -> Result<(), ControlError>;
    async fn send_rcon(&self, instance: InstanceId, command: &str) -> Result<String, ControlError>;
}
