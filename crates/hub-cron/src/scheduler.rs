//! Scheduler tick loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use hub_procedure::Executor;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{CronError, CronResult};
use crate::job::{Cronjob, CronjobDefinition, CronjobState};

/// Default interval between scheduler ticks
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Keeps one live job instance per configured cronjob
pub struct CronScheduler {
    definitions: Vec<Arc<CronjobDefinition>>,
    executor: Executor,
    tick_interval: Duration,
    jobs: Arc<DashMap<String, Cronjob>>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl CronScheduler {
    pub fn new(definitions: Vec<CronjobDefinition>, executor: Executor) -> CronResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for def in &definitions {
            if !seen.insert(def.name.as_str()) {
                return Err(CronError::Duplicate(def.name.clone()));
            }
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            definitions: definitions.into_iter().map(Arc::new).collect(),
            executor,
            tick_interval: DEFAULT_TICK_INTERVAL,
            jobs: Arc::new(DashMap::new()),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        })
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval.max(Duration::from_millis(1));
        self
    }

    pub fn definitions(&self) -> impl Iterator<Item = &CronjobDefinition> {
        self.definitions.iter().map(AsRef::as_ref)
    }

    /// One scheduler pass, returning the number of job instances started
    ///
    /// A fresh instance is started for every cronjob that has none yet or
    /// whose current instance has finished.
    pub fn tick(&self) -> usize {
        tick(&self.definitions, &self.executor, &self.jobs)
    }

    /// State of the current instance of `name`
    pub fn job_state(&self, name: &str) -> Option<CronjobState> {
        self.jobs.get(name).map(|job| job.state())
    }

    /// Watch the current instance of `name`
    pub fn subscribe(&self, name: &str) -> Option<watch::Receiver<CronjobState>> {
        self.jobs.get(name).map(|job| job.subscribe())
    }

    /// Spawn the tick loop
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Cron scheduler already running");
            return None;
        }

        info!(
            cronjobs = self.definitions.len(),
            tick_ms = self.tick_interval.as_millis() as u64,
            "Starting cron scheduler"
        );

        let definitions = self.definitions.clone();
        let executor = self.executor.clone();
        let jobs = self.jobs.clone();
        let running = self.running.clone();
        let tick_interval = self.tick_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        tick(&definitions, &executor, &jobs);
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown signal");
                        break;
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
            info!("Cron scheduler stopped");
        }))
    }

    /// Stop creating new job instances; running instances finish on their own
    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        info!("Stopping cron scheduler");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn tick(
    definitions: &[Arc<CronjobDefinition>],
    executor: &Executor,
    jobs: &DashMap<String, Cronjob>,
) -> usize {
    let mut started = 0;
    for def in definitions {
        let not_before = match jobs.get(&def.name) {
            Some(job) if !job.is_finished() => continue,
            Some(job) => {
                trace!(cronjob = %def.name, state = %job.state(), "Replacing finished instance");
                job.scheduled_for()
            }
            None => None,
        };
        if def.next_fire(Utc::now()).is_none() {
            trace!(cronjob = %def.name, "Schedule exhausted, not restarting");
            continue;
        }

        let job = Cronjob::spawn(def.clone(), executor.clone(), not_before);
        debug!(cronjob = %def.name, "Started cronjob instance");
        jobs.insert(def.name.clone(), job);
        started += 1;
    }
    started
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler")
            .field("cronjobs", &self.definitions.len())
            .field("tick_interval", &self.tick_interval)
            .field("running", &self.is_running())
            .finish()
    }
}
