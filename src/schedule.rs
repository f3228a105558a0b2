//! Run the synchronous lifecycle passes on a fixed cadence
//!
//! Every pass in this crate blocks on storage or a remote system, so each tick runs on tokio's
//! blocking pool. Passes run one after another within a tick. A pass that fails is logged and
//! tried again on the next tick.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info};
use tokio::time::MissedTickBehavior;

use crate::execution::ExecutionOrchestrator;
use crate::export::{ExportPass, ExportQueue};
use crate::request::ingest::MessageIngest;

/// One pass of periodic work
pub trait Tick: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn tick(&self) -> Result<()>;
}

pub struct Scheduler {
    interval: Duration,
    ticks: Vec<Arc<dyn Tick>>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Scheduler { interval, ticks: Vec::new() }
    }

    /// Add a pass, run in the order added
    pub fn every(mut self, tick: Arc<dyn Tick>) -> Self {
        self.ticks.push(tick);
        self
    }

    /// Tick until `shutdown` resolves. The first tick is immediate.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        info!("Running {} passes every {:?}", self.ticks.len(), self.interval);
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler shutting down");
                    break;
                }
                _ = timer.tick() => {}
            }

            for tick in &self.ticks {
                let task = Arc::clone(tick);
                match tokio::task::spawn_blocking(move || task.tick()).await {
                    Ok(Ok(())) => debug!("{} pass finished", tick.name()),
                    Ok(Err(err)) => error!("{} pass failed: {:#}", tick.name(), err),
                    Err(err) => error!("{} pass panicked: {}", tick.name(), err),
                }
            }
        }
    }
}

/// Ingest every message that appears in a directory
pub struct WatchDirectory {
    pub ingest: MessageIngest,
    pub dir: PathBuf,
}

impl Tick for WatchDirectory {
    fn name(&self) -> &str {
        "ingest"
    }

    fn tick(&self) -> Result<()> {
        self.ingest.ingest_dir(&self.dir)?;
        Ok(())
    }
}

impl Tick for ExportQueue {
    fn name(&self) -> &str {
        "export"
    }

    fn tick(&self) -> Result<()> {
        if self.run_pass()? == ExportPass::Busy {
            debug!("Previous export pass still running, skipped");
        }
        Ok(())
    }
}

impl Tick for ExecutionOrchestrator {
    fn name(&self) -> &str {
        "execution"
    }

    fn tick(&self) -> Result<()> {
        let summary = self.advance_all()?;
        if !summary.failed.is_empty() {
            debug!("{} submissions will be retried next tick", summary.failed.len());
        }
        Ok(())
    }
}
