use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type InstanceId = i64;
pub type HostId = i64;
/// Milliseconds since the UNIX epoch, as the controller reports save mtimes.
pub type EpochMs = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Unassigned,
    Stopped,
    Starting,
    Running,
    Stopping,
    CreatingSave,
    ExportingData,
    Deleted,
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    /// Only fully running or fully stopped instances are safe to move.
    pub fn is_movable(self) -> bool {
        matches!(self, Self::Running | Self::Stopped)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unassigned => "unassigned",
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::CreatingSave => "creating_save",
            Self::ExportingData => "exporting_data",
            Self::Deleted => "deleted",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instance {
    pub id: InstanceId,
    pub name: String,
    /// None while the instance is not assigned to any host.
    pub assigned_host: Option<HostId>,
    pub status: InstanceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    pub connected: bool,
    pub version: String,
    /// Last reported system info; absent until the host has reported once.
    #[serde(default)]
    pub metrics: Option<HostMetrics>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct HostMetrics {
    pub cpu_available: f64,
    #[serde(default)]
    pub memory_available: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveSnapshot {
    pub instance_id: InstanceId,
    pub name: String,
    pub mtime_ms: EpochMs,
    pub size: u64,
    /// Set on the save the instance would load when started without a save name.
    #[serde(default)]
    pub loaded_by_default: bool,
}

/// Configuration sent to the controller when creating an instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InstanceSpec {
    pub id: InstanceId,
    pub name: String,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub enable_authserver_bans: bool,
    pub player_online_autosave_slots: Option<u32>,
    /// Plugins that should not be loaded on this instance.
    #[serde(default)]
    pub disabled_plugins: Vec<String>,
    /// Entries merged into the game's server-settings.
    #[serde(default)]
    pub game_settings: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferSaveRequest {
    pub source_instance: InstanceId,
    pub source_save: String,
    pub target_instance: InstanceId,
    pub target_save: String,
    /// Copy rather than move.
    pub copy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateSaveRequest {
    pub name: String,
    pub seed: u64,
    /// Map exchange string the controller expands into map gen settings.
    pub map_exchange_string: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadIssue {
    pub message: String,
}

/// What the controller reports after receiving an uploaded save.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SaveUploadResult {
    #[serde(default)]
    pub saves: Vec<String>,
    #[serde(default)]
    pub errors: Vec<UploadIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("upload of {filename} rejected: {reason}")]
pub struct UploadRejected {
    pub filename: String,
    pub reason: String,
}

impl SaveUploadResult {
    /// The name of the created save, or why the upload has to count as failed
    /// even though the request itself went through.
    pub fn created_save(self, filename: &str) -> Result<String, UploadRejected> {
        if !self.errors.is_empty() {
            let reason = self
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(UploadRejected {
                filename: filename.to_string(),
                reason,
            });
        }
        self.saves.into_iter().next().ok_or_else(|| UploadRejected {
            filename: filename.to_string(),
            reason: "controller created no save".to_string(),
        })
    }
}
