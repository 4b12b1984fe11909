use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{error, info, warn};

use crate::errors::CycleError;
use crate::retention;
use crate::settings::Settings;
use crate::snapshot::{self, Snapshot, SnapshotDirectory};

/// Hook that runs after snapshot and retention.
///
/// The daemon ships with [`NoUpdateCheck`]; build-id comparison against the
/// game's manifest is left to implementors.
#[async_trait]
pub trait UpdateCheck: Send + Sync {
    async fn check(&self, settings: &Settings) -> Result<(), CycleError>;
}

pub struct NoUpdateCheck;

#[async_trait]
impl UpdateCheck for NoUpdateCheck {
    async fn check(&self, _settings: &Settings) -> Result<(), CycleError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct CycleReport {
    pub snapshot: Snapshot,
    pub evicted: Vec<SnapshotDirectory>,
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Completed(CycleReport),
    Failed(CycleError),
    /// Another cycle held the slot; this trigger was dropped.
    Skipped,
}

/// Runs cycles one at a time against a fixed set of settings.
pub struct CycleRunner {
    settings: Arc<Settings>,
    update: Arc<dyn UpdateCheck>,
    // single slot: a trigger that cannot take it is dropped, never queued
    slot: Mutex<()>,
}

impl CycleRunner {
    pub fn new(settings: Settings, update: Arc<dyn UpdateCheck>) -> Self {
        Self {
            settings: Arc::new(settings),
            update,
            slot: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run one cycle stamped with `at` unless another one is in progress.
    ///
    /// Cycle failures are logged and returned, never propagated as a panic, so the
    /// next trigger proceeds normally.
    pub async fn trigger(&self, at: NaiveDateTime) -> TriggerOutcome {
        let Ok(_slot) = self.slot.try_lock() else {
            warn!("cycle already in progress; dropping trigger for {at}");
            return TriggerOutcome::Skipped;
        };

        info!("cycle starting for {at}");
        match run_cycle(self.settings.clone(), at, self.update.as_ref()).await {
            Ok(report) => {
                info!(
                    files = report.snapshot.files_copied,
                    evicted = report.evicted.len(),
                    "cycle finished: {}",
                    report.snapshot.dir.path.display()
                );
                TriggerOutcome::Completed(report)
            }
            Err(err) => {
                error!("cycle failed: {err}");
                TriggerOutcome::Failed(err)
            }
        }
    }
}

/// Snapshot, then prune if retention is on, then the update hook.
pub async fn run_cycle(
    settings: Arc<Settings>,
    at: NaiveDateTime,
    update: &dyn UpdateCheck,
) -> Result<CycleReport, CycleError> {
    let blocking = settings.clone();
    let report = task::spawn_blocking(move || -> Result<CycleReport, CycleError> {
        let snapshot = snapshot::snapshot(
            &blocking.watched_data_path,
            &blocking.backup_root_path,
            at,
        )?;
        let evicted = if blocking.retention_enabled {
            retention::prune(&blocking.backup_root_path, blocking.retention_count)?
        } else {
            Vec::new()
        };
        Ok(CycleReport { snapshot, evicted })
    })
    .await??;

    update.check(&settings).await?;
    Ok(report)
}
