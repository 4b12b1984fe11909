use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cycle::{CycleRunner, TriggerOutcome};
use crate::interval::interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Owns the recurring timer that drives cycles.
pub struct Scheduler {
    runner: Arc<CycleRunner>,
    cancel: Option<CancellationToken>,
    ticker: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(runner: CycleRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            cancel: None,
            ticker: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.cancel.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn runner(&self) -> &CycleRunner {
        &self.runner
    }

    /// Run one cycle on the caller's task, then arm the timer.
    ///
    /// Returns `None` if the scheduler was already running.
    pub async fn start(&mut self) -> Option<TriggerOutcome> {
        if self.cancel.is_some() {
            warn!("scheduler already running");
            return None;
        }

        let period = interval(self.runner.settings());
        info!(
            period_secs = period.as_secs_f64(),
            runs_per_day = self.runner.settings().runs_per_day.get(),
            "starting backup scheduler"
        );

        let first = self.runner.trigger(Local::now().naive_local()).await;

        let cancel = CancellationToken::new();
        self.ticker = Some(tokio::spawn(tick_loop(
            self.runner.clone(),
            period,
            cancel.clone(),
        )));
        self.cancel = Some(cancel);
        Some(first)
    }

    /// Disarm the timer. A cycle already running is left to finish.
    pub async fn stop(&mut self) {
        let Some(cancel) = self.cancel.take() else {
            debug!("scheduler already stopped");
            return;
        };
        cancel.cancel();
        if let Some(ticker) = self.ticker.take() {
            if let Err(err) = ticker.await {
                warn!("scheduler timer task ended abnormally: {err}");
            }
        }
        info!("backup scheduler stopped");
    }
}

async fn tick_loop(runner: Arc<CycleRunner>, period: Duration, cancel: CancellationToken) {
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {
                // spawned so a slow cycle never delays the timer; the slot drops overlaps
                let runner = runner.clone();
                tokio::spawn(async move {
                    runner.trigger(Local::now().naive_local()).await;
                });
            }
        }
    }
}
