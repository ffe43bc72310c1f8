use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use eternity_control::{
    archive_saves, auto_benchmark, broadcast, create_benchmark, create_instance, ArchiveOptions,
    BenchmarkSource, Config, Controller, HttpController, MigrationOutcome, MigrationReport,
    MigrationSummary, Migrator, NewInstance,
};
use eternity_core::{
    hosts_needing_update, plan_request, resolve_host, resolve_instance, BenchmarkRequest,
    MigrationRequest,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "eternityctl", about = "Cluster maintenance commands")]
struct Args {
    /// Config file (default ~/.config/eternityctl/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Controller base URL, overrides the config file.
    #[arg(long, global = true)]
    controller_url: Option<String>,

    /// Bearer token for the controller, overrides the config file.
    #[arg(long, global = true)]
    controller_token: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Create a benchmark instance on a host from an existing save.
    CreateBenchmark {
        target_host: String,
        save_instance: String,
        save_name: String,
    },
    /// Create and start benchmark instances on suitable hosts.
    AutoBenchmark {
        /// How many hosts to start on.
        host_count: usize,
        /// Maximum benchmark instances per host.
        instance_count: usize,
        save_instance: String,
        save_name: String,
        /// Only consider this host.
        host_name: Option<String>,
    },
    /// Print connected hosts not running the given version.
    HostNeedUpdate { host_version: String },
    /// Archive a spaced-out history of every instance's saves.
    DlSaves {
        folder: PathBuf,
        /// Minimum seconds between archived saves.
        interval: Option<u64>,
        /// Ignore `_autosaveN.zip` saves.
        #[arg(long)]
        skip_autosaves: bool,
        /// Skip saves larger than this many megabytes.
        #[arg(long)]
        max_size_mb: Option<u64>,
    },
    /// Create, assign and start a new instance with a fresh world.
    CreateInstance {
        name: String,
        host: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        game_password: Option<String>,
    },
    /// Move instances to other hosts, carrying their default save along.
    Migrate {
        /// Instance to move, by name or id. Repeatable.
        #[arg(long = "instance")]
        instances: Vec<String>,
        /// Move every instance on this host. Repeatable.
        #[arg(long = "from-host")]
        from_hosts: Vec<String>,
        /// Destination host; instances are spread round-robin. Repeatable.
        #[arg(long = "to-host")]
        to_hosts: Vec<String>,
    },
    /// Send an RCON command to every running instance.
    RconAll { command: String },
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_default(&path)?;
    if let Some(url) = &args.controller_url {
        config.controller.url = url.clone();
    }
    if let Some(token) = &args.controller_token {
        config.controller.token = Some(token.clone());
    }
    Ok(config)
}

async fn benchmark_source(
    ctl: &HttpController,
    save_instance: &str,
    save_name: String,
) -> anyhow::Result<BenchmarkSource> {
    let instances = ctl.list_instances().await?;
    let instance = resolve_instance(&instances, save_instance)?;
    Ok(BenchmarkSource {
        instance: instance.id,
        save: save_name,
    })
}

fn print_report(report: &MigrationReport) {
    let from = report.source_host.as_deref().unwrap_or("-");
    let line = match &report.outcome {
        MigrationOutcome::Migrated { save, restarted, .. } => {
            let restarted = if *restarted { ", restarted" } else { "" };
            format!("migrated with {save}{restarted}")
        }
        MigrationOutcome::Skipped(reason) => format!("skipped: {reason}"),
        MigrationOutcome::Failed(e) => format!("failed: {e}"),
    };
    println!("{} ({from} -> {}): {line}", report.instance_name, report.destination_host);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let ctl = config.connect()?;

    match args.cmd {
        Cmd::CreateBenchmark {
            target_host,
            save_instance,
            save_name,
        } => {
            let hosts = ctl.list_hosts().await?;
            let host = resolve_host(&hosts, &target_host)?;
            let source = benchmark_source(&ctl, &save_instance, save_name).await?;
            let created = create_benchmark(&ctl, host.id, &source, 0).await?;
            println!("{} ({})", created.name, created.instance_id);
        }
        Cmd::AutoBenchmark {
            host_count,
            instance_count,
            save_instance,
            save_name,
            host_name,
        } => {
            let source = benchmark_source(&ctl, &save_instance, save_name).await?;
            let request = BenchmarkRequest {
                host_count,
                per_host_limit: instance_count,
                host_name,
            };
            let created = auto_benchmark(&ctl, &request, &source).await?;
            info!(created = created.len(), requested = host_count, "auto-benchmark done");
            for b in created {
                println!("{} ({})", b.name, b.instance_id);
            }
        }
        Cmd::HostNeedUpdate { host_version } => {
            let hosts = ctl.list_hosts().await?;
            let names: Vec<&str> = hosts_needing_update(&hosts, &host_version)
                .into_iter()
                .map(|h| h.name.as_str())
                .collect();
            println!("{}", names.join(" "));
        }
        Cmd::DlSaves {
            folder,
            interval,
            skip_autosaves,
            max_size_mb,
        } => {
            let options = ArchiveOptions {
                folder,
                interval_secs: interval.unwrap_or(config.saves.default_interval_secs),
                skip_autosaves,
                max_save_bytes: max_size_mb
                    .map(|mb| mb.saturating_mul(1_000_000))
                    .unwrap_or(config.saves.max_download_bytes),
            };
            let summary = archive_saves(&ctl, &options)
                .await
                .with_context(|| format!("archiving saves into {}", options.folder.display()))?;
            info!(
                downloaded = summary.downloaded,
                oversized = summary.oversized,
                failed = summary.failed,
                "dl-saves done"
            );
        }
        Cmd::CreateInstance {
            name,
            host,
            username,
            token,
            game_password,
        } => {
            let hosts = ctl.list_hosts().await?;
            let host = resolve_host(&hosts, &host)?;
            let request = NewInstance {
                name,
                host: host.id,
                username,
                token,
                game_password,
            };
            let id = create_instance(&ctl, &request).await?;
            println!("{} ({id})", request.name);
        }
        Cmd::Migrate {
            instances,
            from_hosts,
            to_hosts,
        } => {
            let all_instances = ctl.list_instances().await?;
            let hosts = ctl.list_hosts().await?;
            let request = MigrationRequest {
                instances,
                from_hosts,
                to_hosts,
            };
            let plans = plan_request(&request, &all_instances, &hosts)?;
            let migrator = Migrator::new(&ctl, &hosts, config.staging_dir());
            let reports = migrator.run(&plans).await?;
            for report in &reports {
                print_report(report);
            }
            println!("{}", MigrationSummary::of(&reports));
        }
        Cmd::RconAll { command } => {
            let instances = ctl.list_instances().await?;
            for reply in broadcast(&ctl, &instances, &command).await {
                match reply.result {
                    Ok(output) => println!("{}: {}", reply.instance, output.trim_end()),
                    Err(e) => println!("{}: error: {e}", reply.instance),
                }
            }
        }
    }

    Ok(())
}
