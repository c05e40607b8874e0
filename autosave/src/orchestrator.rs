//! Long-lived autosave service: owns the store, collaborators, runtime state
//! and the scheduler, and is shared by every trigger surface.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::config::AutosaveConfig;
use crate::cycle::{CycleContext, CycleOutcome, Trigger, run_cycle};
use crate::io::agent::{AgentInvoker, OpenClawAgent};
use crate::io::git::{Git, VersionControl};
use crate::io::settings::{DEFAULT_SESSION_ID, Settings};
use crate::io::store::ConfigStore;
use crate::runtime::{RuntimeSnapshot, RuntimeState};
use crate::scheduler::Scheduler;

#[derive(Debug, Clone)]
pub struct AutosaveOptions {
    /// Agent session shared by both consultation calls.
    pub session_id: String,
    pub interval: Duration,
}

impl Default for AutosaveOptions {
    fn default() -> Self {
        Self {
            session_id: DEFAULT_SESSION_ID.to_string(),
            interval: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug)]
pub struct Autosave<V, A> {
    store: ConfigStore,
    vcs: V,
    agent: A,
    runtime: RuntimeState,
    options: AutosaveOptions,
}

/// Type-erased service used by the binaries and their tests.
pub type DynAutosave =
    Autosave<Box<dyn VersionControl + Send + Sync>, Box<dyn AgentInvoker + Send + Sync>>;

impl DynAutosave {
    pub fn boxed<V, A>(store: ConfigStore, vcs: V, agent: A, options: AutosaveOptions) -> Self
    where
        V: VersionControl + Send + Sync + 'static,
        A: AgentInvoker + Send + Sync + 'static,
    {
        Self::new(store, Box::new(vcs), Box::new(agent), options)
    }

    /// Wire git and the agent CLI as described by `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let agent = OpenClawAgent::new(
            settings.agent.program.clone(),
            settings.agent_workdir(),
            settings.agent_timeout(),
        );
        Self::boxed(
            ConfigStore::new(settings.data_path()),
            Git::new(&settings.project_root),
            agent,
            AutosaveOptions {
                session_id: settings.agent.session_id.clone(),
                interval: settings.interval(),
            },
        )
    }
}

impl<V, A> Autosave<V, A>
where
    V: VersionControl,
    A: AgentInvoker,
{
    pub fn new(store: ConfigStore, vcs: V, agent: A, options: AutosaveOptions) -> Self {
        Self {
            store,
            vcs,
            agent,
            runtime: RuntimeState::new(),
            options,
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn runtime(&self) -> &RuntimeState {
        &self.runtime
    }

    pub fn interval(&self) -> Duration {
        self.options.interval
    }

    /// Current persisted configuration.
    pub fn config(&self) -> Result<AutosaveConfig> {
        self.store.load()
    }

    /// Run one cycle on the calling thread.
    pub fn run_once(&self, trigger: Trigger) -> CycleOutcome {
        run_cycle(
            &CycleContext {
                store: &self.store,
                vcs: &self.vcs,
                agent: &self.agent,
                runtime: &self.runtime,
                session_id: &self.options.session_id,
            },
            trigger,
        )
    }

    /// Merge a user edit over the stored configuration and persist it.
    ///
    /// Leaves the timer alone; see [`Autosave::apply_patch`].
    pub fn save_patch(&self, patch: &Value) -> Result<AutosaveConfig> {
        let merged = self.config()?.merged_with(patch);
        self.store
            .save(&merged)
            .context("save autosave configuration")
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            enabled: self.runtime.scheduler_armed(),
            running: self.runtime.is_running(),
            every_minutes: self.options.interval.as_secs() / 60,
        }
    }

    /// Disarm the timer if armed.
    pub fn shutdown(&self) {
        if let Some(scheduler) = self.runtime.scheduler_slot().take() {
            scheduler.cancel();
            info!("scheduler disarmed on shutdown");
        }
    }
}

impl<V, A> Autosave<V, A>
where
    V: VersionControl + Send + Sync + 'static,
    A: AgentInvoker + Send + Sync + 'static,
{
    /// Load the store and arm the timer if autosave is enabled.
    pub fn start(self: &Arc<Self>) -> Result<AutosaveConfig> {
        let config = self.config()?;
        self.ensure_scheduler(&config)?;
        Ok(config)
    }

    /// Apply a user edit, persist it, and resync the timer.
    #[instrument(skip_all)]
    pub fn apply_patch(self: &Arc<Self>, patch: &Value) -> Result<AutosaveConfig> {
        let saved = self.save_patch(patch)?;
        debug!(enabled = saved.enabled, "configuration saved");
        self.ensure_scheduler(&saved)?;
        Ok(saved)
    }

    /// Arm the timer when enabled and none exists; disarm when disabled.
    pub fn ensure_scheduler(self: &Arc<Self>, config: &AutosaveConfig) -> Result<()> {
        let mut slot = self.runtime.scheduler_slot();
        if !config.enabled {
            if let Some(scheduler) = slot.take() {
                scheduler.cancel();
                info!("scheduler disarmed");
            }
            return Ok(());
        }
        if slot.is_some() {
            return Ok(());
        }

        let service = Arc::downgrade(self);
        let scheduler = Scheduler::spawn(self.options.interval, move || {
            let Some(service) = service.upgrade() else {
                return Ok(());
            };
            let outcome = service.run_once(Trigger::Scheduled);
            if outcome.ok || outcome.skipped {
                Ok(())
            } else {
                bail!(outcome.message)
            }
        })
        .context("spawn scheduler thread")?;
        *slot = Some(scheduler);
        Ok(())
    }
}
