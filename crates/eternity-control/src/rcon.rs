use eternity_core::{Instance, InstanceStatus};
use futures::future::join_all;
use tracing::warn;

use crate::controller::Controller;
use crate::error::ControlError;

#[derive(Debug)]
pub struct RconReply {
    pub instance: String,
    pub result: Result<String, ControlError>,
}

/// Send `command` to every running instance at once and collect each reply.
/// One instance failing does not affect the others.
pub async fn broadcast(
    controller: &dyn Controller,
    instances: &[Instance],
    command: &str,
) -> Vec<RconReply> {
    let sends = instances
        .iter()
        .filter(|i| i.status == InstanceStatus::Running)
        .map(|instance| async move {
            let result = controller.send_rcon(instance.id, command).await;
            if let Err(e) = &result {
                warn!(instance = %instance.name, error = %e, "rcon failed");
            }
            RconReply {
                instance: instance.name.clone(),
                result,
            }
        });
    join_all(sends).await
}
