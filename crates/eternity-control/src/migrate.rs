use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use eternity_core::{Host, HostId, InstanceStatus, MigrationPlan, PlanAction};
use tokio::fs;
use tracing::{info, warn};

use crate::controller::Controller;
use crate::download::download_save;
use crate::error::{MigrationError, MigrationStep};

#[derive(Debug)]
pub enum MigrationOutcome {
    Migrated {
        /// Name of the save created on the destination.
        save: String,
        /// The local copy that was uploaded.
        local: PathBuf,
        restarted: bool,
    },
    Skipped(PlanAction),
    Failed(MigrationError),
}

#[derive(Debug)]
pub struct MigrationReport {
    pub instance_name: String,
    pub source_host: Option<String>,
    pub destination_host: String,
    pub outcome: MigrationOutcome,
}

impl MigrationReport {
    pub fn is_migrated(&self) -> bool {
        matches!(self.outcome, MigrationOutcome::Migrated { .. })
    }
}

/// Counts over a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl MigrationSummary {
    pub fn of(reports: &[MigrationReport]) -> Self {
        reports
            .iter()
            .fold(Self::default(), |mut acc, r| {
                match r.outcome {
                    MigrationOutcome::Migrated { .. } => acc.migrated += 1,
                    MigrationOutcome::Skipped(_) => acc.skipped += 1,
                    MigrationOutcome::Failed(_) => acc.failed += 1,
                }
                acc
            })
    }
}

impl fmt::Display for MigrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} migrated, {} skipped, {} failed",
            self.migrated, self.skipped, self.failed
        )
    }
}

/// Moves instances between hosts by carrying their default save over.
pub struct Migrator<'a> {
    controller: &'a dyn Controller,
    host_names: HashMap<HostId, String>,
    staging_dir: PathBuf,
}

impl<'a> Migrator<'a> {
    pub fn new(
        controller: &'a dyn Controller,
        hosts: &[Host],
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            controller,
            host_names: hosts.iter().map(|h| (h.id, h.name.clone())).collect(),
            staging_dir: staging_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn host_name(&self, id: HostId) -> String {
        self.host_names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("host {id}"))
    }

    /// Execute one `Migrate` plan entry: stop, fetch the default save,
    /// reassign, upload to the new host and start again if it was running.
    ///
    /// The downloaded file is left in the staging directory when anything
    /// after the download fails. Entries the planner marked as skipped are
    /// returned as `Skipped` without touching the controller.
    pub async fn migrate(&self, plan: &MigrationPlan) -> Result<MigrationOutcome, MigrationError> {
        if !plan.action.is_migrate() {
            return Ok(MigrationOutcome::Skipped(plan.action));
        }

        let ctl = self.controller;
        let id = plan.instance_id;
        let name = plan.instance_name.as_str();
        let destination = self.host_name(plan.destination_host);
        let was_running = plan.status == InstanceStatus::Running;

        if was_running {
            info!(instance = name, "stopping");
            ctl.stop_instance(id)
                .await
                .map_err(MigrationError::step(MigrationStep::Stop))?;
        }

        let saves = ctl
            .list_saves(Some(id))
            .await
            .map_err(MigrationError::step(MigrationStep::ListSaves))?;
        let save = saves
            .into_iter()
            .find(|s| s.instance_id == id && s.loaded_by_default)
            .ok_or_else(|| MigrationError::MissingDefaultSave {
                instance: name.to_string(),
            })?;

        fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| MigrationError::step(MigrationStep::Download)(e.into()))?;
        info!(instance = name, save = %save.name, "downloading");
        let local = download_save(ctl, id, &save.name, &self.staging_dir.join(&save.name))
            .await
            .map_err(MigrationError::step(MigrationStep::Download))?;

        info!(instance = name, host = %destination, "assigning");
        ctl.assign_instance(id, plan.destination_host)
            .await
            .map_err(MigrationError::step(MigrationStep::Assign))?;

        let bytes = fs::read(&local)
            .await
            .map_err(|e| MigrationError::step(MigrationStep::Upload)(e.into()))?;
        info!(instance = name, host = %destination, save = %save.name, "uploading");
        let created = ctl
            .upload_save(id, &save.name, bytes)
            .await
            .map_err(MigrationError::step(MigrationStep::Upload))?
            .created_save(&save.name)?;

        if was_running {
            info!(instance = name, save = %created, "starting");
            ctl.start_instance(id, Some(&created))
                .await
                .map_err(MigrationError::step(MigrationStep::Start))?;
        }

        Ok(MigrationOutcome::Migrated {
            save: created,
            local,
            restarted: was_running,
        })
    }

    /// Run a planned batch one instance at a time, in plan order.
    ///
    /// Skips and anticipated failures become report entries; an unexpected
    /// failure stops the batch and is returned as the error.
    pub async fn run(
        &self,
        plans: &[MigrationPlan],
    ) -> Result<Vec<MigrationReport>, MigrationError> {
        let mut reports = Vec::with_capacity(plans.len());
        for plan in plans {
            let source = plan.source_host.map(|h| self.host_name(h));
            let destination = self.host_name(plan.destination_host);

            let outcome = if plan.action.is_migrate() {
                info!(
                    instance = %plan.instance_name,
                    from = source.as_deref().unwrap_or("-"),
                    to = %destination,
                    "migrating"
                );
                match self.migrate(plan).await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_recoverable() => {
                        warn!(instance = %plan.instance_name, error = %e, "migration failed");
                        MigrationOutcome::Failed(e)
                    }
                    Err(e) => return Err(e),
                }
            } else {
                warn!(instance = %plan.instance_name, reason = %plan.action, "skipping");
                MigrationOutcome::Skipped(plan.action)
            };

            reports.push(MigrationReport {
                instance_name: plan.instance_name.clone(),
                source_host: source,
                destination_host: destination,
                outcome,
            });
        }
        Ok(reports)
    }
}
