use crate::model::{Host, HostId, Instance, InstanceId, InstanceStatus};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// User input problems detected before anything is sent to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("no instances selected for migration")]
    NoInstancesSelected,
    #[error("no destination hosts given")]
    NoDestinationHosts,
    #[error("unknown instance: {0}")]
    UnknownInstance(String),
    #[error("unknown host: {0}")]
    UnknownHost(String),
}

/// Look an instance up by exact name, falling back to its numeric id.
pub fn resolve_instance<'a>(
    instances: &'a [Instance],
    key: &str,
) -> Result<&'a Instance, PlanError> {
    instances
        .iter()
        .find(|i| i.name == key)
        .or_else(|| {
            let id: InstanceId = key.parse().ok()?;
            instances.iter().find(|i| i.id == id)
        })
        .ok_or_else(|| PlanError::UnknownInstance(key.to_string()))
}

/// Look a host up by exact name, falling back to its numeric id.
pub fn resolve_host<'a>(hosts: &'a [Host], key: &str) -> Result<&'a Host, PlanError> {
    hosts
        .iter()
        .find(|h| h.name == key)
        .or_else(|| {
            let id: HostId = key.parse().ok()?;
            hosts.iter().find(|h| h.id == id)
        })
        .ok_or_else(|| PlanError::UnknownHost(key.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Migrate,
    SkipUnassigned,
    SkipSameHost,
    SkipBadStatus(InstanceStatus),
}

impl PlanAction {
    pub fn is_migrate(self) -> bool {
        self == Self::Migrate
    }
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Migrate => f.write_str("migrate"),
            Self::SkipUnassigned => f.write_str("not assigned to any host"),
            Self::SkipSameHost => f.write_str("already on destination host"),
            Self::SkipBadStatus(status) => write!(f, "status is {status}, not running or stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub instance_id: InstanceId,
    pub instance_name: String,
    pub status: InstanceStatus,
    pub source_host: Option<HostId>,
    pub destination_host: HostId,
    pub action: PlanAction,
}

/// What the operator asked to move, by name or id.
#[derive(Debug, Clone, Default)]
pub struct MigrationRequest {
    pub instances: Vec<String>,
    pub from_hosts: Vec<String>,
    pub to_hosts: Vec<String>,
}

/// Union of the explicitly named instances and everything currently on
/// `from_hosts`, first occurrence wins, input order preserved.
pub fn select_instances<'a>(
    explicit: &[&'a Instance],
    all: &'a [Instance],
    from_hosts: &[HostId],
) -> Vec<&'a Instance> {
    let mut seen = HashSet::new();
    let on_sources = from_hosts
        .iter()
        .flat_map(|host| all.iter().filter(move |i| i.assigned_host == Some(*host)));
    explicit
        .iter()
        .copied()
        .chain(on_sources)
        .filter(|i| seen.insert(i.id))
        .collect()
}

fn classify(instance: &Instance, destination: HostId) -> PlanAction {
    match instance.assigned_host {
        None => PlanAction::SkipUnassigned,
        Some(host) if host == destination => PlanAction::SkipSameHost,
        Some(_) if !instance.status.is_movable() => PlanAction::SkipBadStatus(instance.status),
        Some(_) => PlanAction::Migrate,
    }
}

/// Round-robin assignment: the i-th instance goes to `destinations[i % len]`.
///
/// TODO: weigh destinations by `HostMetrics::cpu_available` the way benchmark
/// placement does, instead of ignoring load.
pub fn plan_migration(
    instances: &[&Instance],
    destinations: &[HostId],
) -> Result<Vec<MigrationPlan>, PlanError> {
    if instances.is_empty() {
        return Err(PlanError::NoInstancesSelected);
    }
    if destinations.is_empty() {
        return Err(PlanError::NoDestinationHosts);
    }

    Ok(instances
        .iter()
        .enumerate()
        .map(|(i, instance)| {
            let destination = destinations[i % destinations.len()];
            MigrationPlan {
                instance_id: instance.id,
                instance_name: instance.name.clone(),
                status: instance.status,
                source_host: instance.assigned_host,
                destination_host: destination,
                action: classify(instance, destination),
            }
        })
        .collect())
}

/// Resolve every name in `request` against fresh listings and plan the batch.
pub fn plan_request(
    request: &MigrationRequest,
    instances: &[Instance],
    hosts: &[Host],
) -> Result<Vec<MigrationPlan>, PlanError> {
    let explicit = request
        .instances
        .iter()
        .map(|name| resolve_instance(instances, name))
        .collect::<Result<Vec<_>, _>>()?;
    let from_hosts = request
        .from_hosts
        .iter()
        .map(|name| resolve_host(hosts, name).map(|h| h.id))
        .collect::<Result<Vec<_>, _>>()?;
    let destinations = request
        .to_hosts
        .iter()
        .map(|name| resolve_host(hosts, name).map(|h| h.id))
        .collect::<Result<Vec<_>, _>>()?;

    let selected = select_instances(&explicit, instances, &from_hosts);
    plan_migration(&selected, &destinations)
}
