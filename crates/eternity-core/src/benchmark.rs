use crate::ids::is_benchmark_id;
use crate::model::{Host, HostId, Instance};
use std::fmt;

/// Hosts reporting fewer available CPUs than this are left alone.
pub const MIN_BENCHMARK_CPU: f64 = 4.0;

#[derive(Debug, Clone, Default)]
pub struct BenchmarkRequest {
    /// How many hosts should receive a new benchmark instance.
    pub host_count: usize,
    /// Maximum benchmark instances per host.
    pub per_host_limit: usize,
    /// Only consider the host with this name.
    pub host_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostVerdict {
    NotSelected,
    LimitReached { existing: usize },
    Offline,
    LowCpu { available: Option<f64> },
    Place { existing: usize },
}

impl fmt::Display for HostVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSelected => f.write_str("not selected"),
            Self::LimitReached { existing } => write!(f, "instance limit reached ({existing})"),
            Self::Offline => f.write_str("host offline"),
            Self::LowCpu { available: Some(cpu) } => {
                write!(f, "cpu available {cpu} < {MIN_BENCHMARK_CPU}")
            }
            Self::LowCpu { available: None } => f.write_str("no system info reported"),
            Self::Place { existing } => write!(f, "place ({existing} existing)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub host_id: HostId,
    pub host_name: String,
    pub verdict: HostVerdict,
}

fn judge(host: &Host, existing: usize, request: &BenchmarkRequest) -> HostVerdict {
    if request.host_name.as_deref().is_some_and(|name| name != host.name) {
        return HostVerdict::NotSelected;
    }
    if existing >= request.per_host_limit {
        return HostVerdict::LimitReached { existing };
    }
    if !host.connected {
        return HostVerdict::Offline;
    }
    match host.metrics {
        Some(m) if m.cpu_available >= MIN_BENCHMARK_CPU => HostVerdict::Place { existing },
        other => HostVerdict::LowCpu {
            available: other.map(|m| m.cpu_available),
        },
    }
}

/// Walk hosts in id order and decide where benchmark instances go, stopping
/// once `host_count` placements were made. Every considered host is returned
/// so skips can be logged.
pub fn plan_benchmarks(
    hosts: &[Host],
    instances: &[Instance],
    request: &BenchmarkRequest,
) -> Vec<Placement> {
    let mut ordered: Vec<&Host> = hosts.iter().collect();
    ordered.sort_by_key(|h| h.id);

    let mut placed = 0;
    let mut out = Vec::new();
    for host in ordered {
        if placed >= request.host_count {
            break;
        }
        let existing = instances
            .iter()
            .filter(|i| i.assigned_host == Some(host.id) && is_benchmark_id(i.id))
            .count();
        let verdict = judge(host, existing, request);
        if matches!(verdict, HostVerdict::Place { .. }) {
            placed += 1;
        }
        out.push(Placement {
            host_id: host.id,
            host_name: host.name.clone(),
            verdict,
        });
    }
    out
}

/// Display name for a new benchmark instance on `host_name`.
pub fn benchmark_name(host_name: &str, existing: usize) -> String {
    if existing == 0 {
        format!("Benchmark {host_name}")
    } else {
        format!("Benchmark {host_name} {}", existing + 1)
    }
}
