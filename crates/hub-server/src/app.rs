//! Application wiring: bus, executor, rule engine and scheduler

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hub_bus::{Bus, LocalBus, LoopId, MqttBus, MqttConfig};
use hub_config::{BusBackend, BusConfig, HubConfig};
use hub_core::{event_types, Args, Event};
use hub_cron::{CronScheduler, CronjobDefinition};
use hub_procedure::{ActionRegistry, Executor, LinearProcedure, ProcedureTable};
use hub_rules::{EventHook, EventProcessor, HookTable};
use tracing::{info, warn};

use crate::actions::{register_core_actions, Variables};
use crate::dispatch::Dispatcher;

/// How long to wait for the dispatch loop to see its stop event
const STOP_GRACE: Duration = Duration::from_secs(5);

/// The running hub
pub struct Hub {
    config: HubConfig,
    bus: Arc<dyn Bus>,
    actions: Arc<ActionRegistry>,
    executor: Executor,
    processor: EventProcessor,
    scheduler: CronScheduler,
    variables: Variables,
}

impl Hub {
    /// Build the hub with the bus backend named in the config
    pub fn from_config(config: HubConfig) -> Result<Self> {
        let bus = build_bus(&config.device_id, &config.bus);
        Self::with_bus(config, bus)
    }

    /// Build the hub on an existing bus
    pub fn with_bus(config: HubConfig, bus: Arc<dyn Bus>) -> Result<Self> {
        let variables = Variables::default();
        let actions = Arc::new(ActionRegistry::new());
        register_core_actions(&actions, bus.clone(), variables.clone());

        let executor = Executor::new(actions.clone())
            .with_procedures(build_procedures(&config)?)
            .with_n_tries(config.executor.n_tries);

        let processor = EventProcessor::new(build_hooks(&config)?, executor.clone());

        let scheduler = CronScheduler::new(build_cronjobs(&config)?, executor.clone())
            .context("invalid cronjobs")?
            .with_tick_interval(Duration::from_millis(config.cron.tick_interval_ms));

        info!(
            device_id = %config.device_id,
            actions = actions.len(),
            procedures = config.procedures.len(),
            event_hooks = processor.hooks().len(),
            cronjobs = config.cronjobs.len(),
            "Hub initialized"
        );

        Ok(Self {
            config,
            bus,
            actions,
            executor,
            processor,
            scheduler,
            variables,
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }

    /// Registry for adding actions before the hub runs
    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn processor(&self) -> &EventProcessor {
        &self.processor
    }

    pub fn scheduler(&self) -> &CronScheduler {
        &self.scheduler
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.bus.clone(),
            self.executor.clone(),
            self.processor.clone(),
            self.config.token.clone(),
        )
    }

    /// Run the dispatch loop and the scheduler until `shutdown` resolves
    ///
    /// On shutdown the scheduler stops creating jobs and a stop event is
    /// posted for the dispatch loop.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let loop_id = LoopId::new();
        let dispatcher = self.dispatcher();

        self.scheduler.start();
        let started = Event::new(event_types::APPLICATION_STARTED, Args::new());
        if let Err(err) = self.bus.post(started.into()) {
            warn!(error = %err, "Failed to post application started event");
        }

        info!(loop_id = %loop_id, "Dispatch loop running");
        let poll = self.bus.poll(&loop_id, &dispatcher);
        tokio::pin!(poll);

        tokio::select! {
            result = &mut poll => {
                self.scheduler.stop();
                return result.context("dispatch loop failed");
            }
            _ = shutdown => {
                info!("Shutting down");
            }
        }

        self.scheduler.stop();
        if let Err(err) = self.bus.stop(&loop_id) {
            warn!(error = %err, "Failed to post stop event");
            return Ok(());
        }

        match tokio::time::timeout(STOP_GRACE, poll).await {
            Ok(result) => result.context("dispatch loop failed")?,
            Err(_) => warn!("Dispatch loop did not stop in time"),
        }
        info!("Dispatch loop stopped");
        Ok(())
    }
}

fn build_bus(device_id: &str, config: &BusConfig) -> Arc<dyn Bus> {
    match config.backend {
        BusBackend::Local => Arc::new(LocalBus::new(device_id)),
        BusBackend::Mqtt => Arc::new(MqttBus::new(
            device_id,
            MqttConfig {
                host: config.host.clone(),
                port: config.port,
                client_id: config.client_id.clone(),
                base_topic: config.base_topic.clone(),
                keep_alive_secs: config.keep_alive_secs,
                reconnect_backoff_ms: config.reconnect_backoff_ms,
                capacity: config.capacity,
            },
        )),
    }
}

fn build_procedures(config: &HubConfig) -> Result<ProcedureTable> {
    let mut table = ProcedureTable::new();
    for (name, declared) in &config.procedures {
        let procedure = LinearProcedure::build(name.clone(), declared.actions())
            .with_context(|| format!("invalid procedure '{name}'"))?
            .with_args(declared.args().to_vec())
            .with_concurrent(declared.concurrent());
        table.insert(name.clone(), Arc::new(procedure));
    }
    Ok(table)
}

fn build_hooks(config: &HubConfig) -> Result<HookTable> {
    let mut hooks = HookTable::new();
    for (name, hook) in &config.event_hooks {
        let hook = EventHook::from_config(name.clone(), &hook.condition, &hook.actions, hook.priority)
            .with_context(|| format!("invalid event hook '{name}'"))?;
        hooks.register(hook);
    }
    Ok(hooks)
}

fn build_cronjobs(config: &HubConfig) -> Result<Vec<CronjobDefinition>> {
    config
        .cronjobs
        .iter()
        .map(|(name, job)| {
            let actions = LinearProcedure::build(format!("cron.{name}"), &job.actions)
                .with_context(|| format!("invalid actions for cronjob '{name}'"))?;
            CronjobDefinition::new(name.clone(), job.cron_expression.clone(), actions)
                .with_context(|| format!("invalid cronjob '{name}'"))
        })
        .collect()
}
