use std::collections::BTreeMap;

use eternity_core::{
    benchmark_name, next_free_id, plan_benchmarks, BenchmarkRequest, HostId, HostVerdict,
    InstanceId, InstanceSpec, TransferSaveRequest, BENCHMARK_INSTANCE_IDS,
};
use serde_json::json;
use tracing::{info, warn};

use crate::controller::Controller;
use crate::error::BenchmarkError;

/// Plugins that would interfere with a benchmark run.
const BENCHMARK_DISABLED_PLUGINS: [&str; 2] = ["inventory_sync", "player_auth"];

/// Where a benchmark's world comes from.
#[derive(Debug, Clone)]
pub struct BenchmarkSource {
    pub instance: InstanceId,
    pub save: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedBenchmark {
    pub instance_id: InstanceId,
    pub name: String,
    pub host_id: HostId,
}

fn benchmark_spec(id: InstanceId, name: String) -> InstanceSpec {
    let mut game_settings = BTreeMap::new();
    game_settings.insert("non_blocking_saving".to_string(), json!(true));
    game_settings.insert("visibility".to_string(), json!({ "public": false, "lan": true }));
    InstanceSpec {
        id,
        name,
        disabled_plugins: BENCHMARK_DISABLED_PLUGINS.iter().map(|p| p.to_string()).collect(),
        game_settings,
        ..InstanceSpec::default()
    }
}

/// Create a benchmark instance on `host`, seeded with a copy of `source`.
///
/// `existing` is the number of benchmarks already on the host and only
/// affects the name.
pub async fn create_benchmark(
    controller: &dyn Controller,
    host: HostId,
    source: &BenchmarkSource,
    existing: usize,
) -> Result<CreatedBenchmark, BenchmarkError> {
    let instances = controller.list_instances().await?;
    let hosts = controller.list_hosts().await?;
    let host_name = hosts
        .iter()
        .find(|h| h.id == host)
        .map(|h| h.name.clone())
        .ok_or(BenchmarkError::UnknownHost(host))?;

    let id = next_free_id(instances.iter().map(|i| i.id), BENCHMARK_INSTANCE_IDS)?;
    let name = benchmark_name(&host_name, existing);

    info!(instance = %name, id, "creating benchmark instance");
    controller
        .create_instance(&benchmark_spec(id, name.clone()))
        .await?;
    info!(instance = %name, host = %host_name, "assigning");
    controller.assign_instance(id, host).await?;
    info!(instance = %name, save = %source.save, "copying save");
    controller
        .transfer_save(&TransferSaveRequest {
            source_instance: source.instance,
            source_save: source.save.clone(),
            target_instance: id,
            target_save: source.save.clone(),
            copy: true,
        })
        .await?;

    Ok(CreatedBenchmark {
        instance_id: id,
        name,
        host_id: host,
    })
}

/// Spread new benchmark instances over suitable hosts and start them.
/// A failed start is logged and does not stop the remaining hosts.
pub async fn auto_benchmark(
    controller: &dyn Controller,
    request: &BenchmarkRequest,
    source: &BenchmarkSource,
) -> Result<Vec<CreatedBenchmark>, BenchmarkError> {
    let hosts = controller.list_hosts().await?;
    let instances = controller.list_instances().await?;

    let mut created = Vec::new();
    for placement in plan_benchmarks(&hosts, &instances, request) {
        let existing = match placement.verdict {
            HostVerdict::Place { existing } => existing,
            HostVerdict::NotSelected => continue,
            skip => {
                info!(host = %placement.host_name, reason = %skip, "skipping host");
                continue;
            }
        };

        info!(host = %placement.host_name, existing, "placing benchmark");
        let benchmark = create_benchmark(controller, placement.host_id, source, existing).await?;
        if let Err(e) = controller
            .start_instance(benchmark.instance_id, Some(&source.save))
            .await
        {
            warn!(instance = %benchmark.name, error = %e, "starting benchmark failed");
        }
        created.push(benchmark);
    }
    Ok(created)
}
