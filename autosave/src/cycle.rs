//! One autosave cycle: detect changes, consult, commit, push, record.
//!
//! At most one cycle runs at a time per [`RuntimeState`]; a second request
//! is rejected immediately, never queued. The configuration is reloaded from
//! the store at the start of every cycle. Only consultation failures are
//! tolerated; anything else ends the cycle and lands in `lastError`.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::consult::{ConsultRequest, consult};
use crate::core::changes::{changed_paths, has_changes};
use crate::core::commit_message::{CommitFields, compose, iso_timestamp};
use crate::core::config::RunResult;
use crate::io::agent::AgentInvoker;
use crate::io::git::VersionControl;
use crate::io::process::ProcessError;
use crate::io::store::ConfigStore;
use crate::runtime::RuntimeState;

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Timer tick; honours `enabled`.
    Scheduled,
    /// Explicit user request; runs even when disabled.
    Manual,
}

impl Trigger {
    pub fn reason(self) -> &'static str {
        match self {
            Trigger::Scheduled => "scheduled",
            Trigger::Manual => "manual",
        }
    }

    pub fn forced(self) -> bool {
        matches!(self, Trigger::Manual)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    AlreadyRunning,
    SkippedDisabled,
    NoChanges,
    Pushed,
    Failed,
}

/// Result reported to the trigger (HTTP response, CLI output, log).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    pub ok: bool,
    pub skipped: bool,
    pub status: CycleStatus,
    pub message: String,
}

impl CycleOutcome {
    fn already_running() -> Self {
        Self {
            ok: false,
            skipped: true,
            status: CycleStatus::AlreadyRunning,
            message: "Git auto-save is already running.".to_string(),
        }
    }

    fn disabled() -> Self {
        Self {
            ok: false,
            skipped: true,
            status: CycleStatus::SkippedDisabled,
            message: "Git auto-save is disabled.".to_string(),
        }
    }

    fn no_changes() -> Self {
        Self {
            ok: true,
            skipped: true,
            status: CycleStatus::NoChanges,
            message: "No changes to commit.".to_string(),
        }
    }

    fn pushed(message: String) -> Self {
        Self {
            ok: true,
            skipped: false,
            status: CycleStatus::Pushed,
            message,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            ok: false,
            skipped: false,
            status: CycleStatus::Failed,
            message,
        }
    }
}

/// Fatal cycle failures. The display text is what `lastError` records.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Current project is not a git repository.")]
    NotARepository,
    #[error("git rev-parse failed: {0}")]
    WorkTree(ProcessError),
    #[error("git status failed: {0}")]
    Status(ProcessError),
    #[error("git add failed: {0}")]
    Stage(ProcessError),
    #[error("git commit failed: {0}")]
    Commit(ProcessError),
    #[error("git push failed: {0}")]
    Push(ProcessError),
    #[error("autosave store: {0:#}")]
    Store(anyhow::Error),
}

/// Borrowed collaborators for one cycle.
#[derive(Debug)]
pub struct CycleContext<'a, V: ?Sized, A: ?Sized> {
    pub store: &'a ConfigStore,
    pub vcs: &'a V,
    pub agent: &'a A,
    pub runtime: &'a RuntimeState,
    pub session_id: &'a str,
}

/// Run one cycle. Never panics on collaborator failure and never returns an
/// error: every failure is reported through the outcome.
#[instrument(skip_all, fields(reason = trigger.reason()))]
pub fn run_cycle<V, A>(ctx: &CycleContext<'_, V, A>, trigger: Trigger) -> CycleOutcome
where
    V: VersionControl + ?Sized,
    A: AgentInvoker + ?Sized,
{
    let Some(_guard) = ctx.runtime.try_begin() else {
        info!("cycle already running; request rejected");
        return CycleOutcome::already_running();
    };

    match execute(ctx, trigger) {
        Ok(outcome) => {
            info!(status = ?outcome.status, message = %outcome.message, "cycle finished");
            outcome
        }
        Err(err) => {
            let message = err.to_string();
            error!(err = %message, "cycle failed");
            let recorded = ctx.store.update_autosave(|config| {
                config.last_run_at = Some(now());
                config.last_result = Some(RunResult::Error);
                config.last_error = Some(message.clone());
            });
            if let Err(audit) = recorded {
                error!(err = %format!("{audit:#}"), "failed to record cycle error");
            }
            CycleOutcome::failed(message)
        }
    }
}

fn execute<V, A>(ctx: &CycleContext<'_, V, A>, trigger: Trigger) -> Result<CycleOutcome, CycleError>
where
    V: VersionControl + ?Sized,
    A: AgentInvoker + ?Sized,
{
    let config = ctx.store.load().map_err(CycleError::Store)?;
    if !config.enabled && !trigger.forced() {
        debug!("autosave disabled; skipping");
        return Ok(CycleOutcome::disabled());
    }

    if !ctx.vcs.is_work_tree().map_err(CycleError::WorkTree)? {
        return Err(CycleError::NotARepository);
    }
    let status = ctx.vcs.status_porcelain().map_err(CycleError::Status)?;
    if !has_changes(&status) {
        ctx.store
            .update_autosave(|config| {
                config.last_run_at = Some(now());
                config.last_result = Some(RunResult::NoChanges);
                config.last_error = None;
            })
            .map_err(CycleError::Store)?;
        return Ok(CycleOutcome::no_changes());
    }

    let actor = config.active_agent();
    let reviewer = actor.other();
    let profile = config.agents.profile(actor).clone();
    let changed_files = changed_paths(&status);
    debug!(actor = %actor, files = changed_files.len(), "changes detected");

    let mut hint = String::new();
    let mut snapshot = None;
    if config.consult_between_agents && !changed_files.is_empty() {
        let request = ConsultRequest {
            actor,
            reviewer,
            changed_files: &changed_files,
            commit_prefix: &config.commit_prefix,
            session_id: ctx.session_id,
        };
        match consult(ctx.agent, &request) {
            Ok(consultation) => {
                snapshot = Some(consultation.snapshot());
                hint = consultation.hint;
            }
            Err(err) => {
                warn!(err = %err, "consultation failed; committing without a hint");
                snapshot = Some(format!("consultation_error={err}"));
            }
        }
    }

    ctx.vcs.add_all().map_err(CycleError::Stage)?;
    let message = compose(
        CommitFields {
            prefix: &config.commit_prefix,
            actor_name: &profile.name,
            reason: trigger.reason(),
            hint: &hint,
        },
        &now(),
    );
    ctx.vcs
        .commit_as(&profile, &message)
        .map_err(CycleError::Commit)?;
    ctx.vcs
        .push(&config.remote, &config.branch)
        .map_err(CycleError::Push)?;

    let next_agent = if config.alternating_agents {
        actor.other()
    } else {
        config.next_agent_id
    };
    ctx.store
        .update_autosave(|saved| {
            saved.next_agent_id = next_agent;
            saved.last_run_at = Some(now());
            saved.last_result = Some(RunResult::Pushed);
            saved.last_actor_id = Some(actor);
            saved.last_consultation = snapshot;
            saved.last_error = None;
        })
        .map_err(CycleError::Store)?;

    Ok(CycleOutcome::pushed(format!(
        "Changes pushed to {}/{} as {} ({}).",
        config.remote, config.branch, profile.name, actor
    )))
}

fn now() -> String {
    iso_timestamp(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use serde_json::json;

    use crate::core::config::AutosaveConfig;
    use crate::core::roster::AgentId;
    use crate::io::agent::AgentError;
    use crate::test_support::{ScriptedAgent, ScriptedVcs, VcsStep, consultation_replies};

    struct Fixture {
        _temp: tempfile::TempDir,
        store: ConfigStore,
        runtime: RuntimeState,
    }

    impl Fixture {
        fn new(config: serde_json::Value) -> Self {
            let temp = tempfile::tempdir().expect("tempdir");
            let store = ConfigStore::new(temp.path().join("portfolio.json"));
            store
                .save(&AutosaveConfig::from_value(&config))
                .expect("seed store");
            Self {
                _temp: temp,
                store,
                runtime: RuntimeState::new(),
            }
        }

        fn run(&self, vcs: &ScriptedVcs, agent: &ScriptedAgent, trigger: Trigger) -> CycleOutcome {
            run_cycle(
                &CycleContext {
                    store: &self.store,
                    vcs,
                    agent,
                    runtime: &self.runtime,
                    session_id: "finance-autosave-consult",
                },
                trigger,
            )
        }

        fn config(&self) -> AutosaveConfig {
            self.store.load().expect("load")
        }
    }

    #[test]
    fn scheduled_cycle_skips_when_disabled() {
        let fx = Fixture::new(json!({"enabled": false}));
        let before = fx.store.load_document().expect("document");
        let vcs = ScriptedVcs::with_changes(" M a.txt\n");
        let outcome = fx.run(&vcs, &ScriptedAgent::new(vec![]), Trigger::Scheduled);

        assert_eq!(outcome.status, CycleStatus::SkippedDisabled);
        assert!(!outcome.ok);
        assert!(outcome.skipped);
        assert!(vcs.calls().is_empty());
        assert_eq!(fx.store.load_document().expect("document"), before);
    }

    #[test]
    fn manual_cycle_runs_even_when_disabled() {
        let fx = Fixture::new(json!({"enabled": false, "consultBetweenAgents": false}));
        let vcs = ScriptedVcs::with_changes("?? new.txt\n");
        let outcome = fx.run(&vcs, &ScriptedAgent::new(vec![]), Trigger::Manual);
        assert_eq!(outcome.status, CycleStatus::Pushed);
        assert!(vcs.commits()[0].message.contains("(manual)"));
    }

    #[test]
    fn rejected_while_another_cycle_holds_the_guard() {
        let fx = Fixture::new(json!({"enabled": true}));
        let before = fx.store.load_document().expect("document");
        let _held = fx.runtime.try_begin().expect("claim");
        let vcs = ScriptedVcs::with_changes(" M a.txt\n");

        let outcome = fx.run(&vcs, &ScriptedAgent::new(vec![]), Trigger::Manual);

        assert_eq!(
            outcome,
            CycleOutcome {
                ok: false,
                skipped: true,
                status: CycleStatus::AlreadyRunning,
                message: "Git auto-save is already running.".to_string(),
            }
        );
        assert!(vcs.calls().is_empty());
        assert_eq!(fx.store.load_document().expect("document"), before);
    }

    #[test]
    fn concurrent_triggers_run_exactly_one_cycle() {
        let fx = Arc::new(Fixture::new(json!({"enabled": true, "consultBetweenAgents": false})));
        let (vcs, gate) = ScriptedVcs::with_changes(" M a.txt\n").gated();
        let vcs = Arc::new(vcs);

        let first = {
            let fx = Arc::clone(&fx);
            let vcs = Arc::clone(&vcs);
            thread::spawn(move || fx.run(&vcs, &ScriptedAgent::new(vec![]), Trigger::Scheduled))
        };
        gate.wait_entered();
        let rejected = fx.run(&vcs, &ScriptedAgent::new(vec![]), Trigger::Manual);
        gate.release();
        let finished = first.join().expect("join");

        assert_eq!(rejected.status, CycleStatus::AlreadyRunning);
        assert_eq!(finished.status, CycleStatus::Pushed);
        assert_eq!(vcs.commits().len(), 1);
        assert!(!fx.runtime.is_running());
    }

    #[test]
    fn clean_tree_records_no_changes_without_touching_git() {
        let fx = Fixture::new(json!({
            "enabled": true,
            "nextAgentId": "builder",
            "lastError": "old",
        }));
        let vcs = ScriptedVcs::clean();
        let outcome = fx.run(&vcs, &ScriptedAgent::new(vec![]), Trigger::Scheduled);

        assert_eq!(outcome.status, CycleStatus::NoChanges);
        assert!(outcome.ok);
        assert!(outcome.skipped);
        assert_eq!(vcs.calls(), vec![VcsStep::WorkTree, VcsStep::Status]);

        let config = fx.config();
        assert_eq!(config.last_result, Some(RunResult::NoChanges));
        assert_eq!(config.last_error, None);
        assert!(config.last_run_at.is_some());
        assert_eq!(config.next_agent_id, AgentId::Builder);
    }

    #[test]
    fn outside_a_repository_records_an_error() {
        let fx = Fixture::new(json!({"enabled": true}));
        let vcs = ScriptedVcs::not_a_repository();
        let outcome = fx.run(&vcs, &ScriptedAgent::new(vec![]), Trigger::Manual);

        assert_eq!(outcome.status, CycleStatus::Failed);
        assert_eq!(outcome.message, "Current project is not a git repository.");
        let config = fx.config();
        assert_eq!(config.last_result, Some(RunResult::Error));
        assert_eq!(
            config.last_error.as_deref(),
            Some("Current project is not a git repository.")
        );
    }

    #[test]
    fn successful_cycle_commits_as_active_agent_and_rotates() {
        let fx = Fixture::new(json!({"enabled": true}));
        let vcs = ScriptedVcs::with_changes(" M app/data/portfolio.json\n");
        let agent = consultation_replies("Track holdings", "Record TSX holdings update");
        let outcome = fx.run(&vcs, &agent, Trigger::Scheduled);

        assert_eq!(outcome.status, CycleStatus::Pushed);
        assert_eq!(
            outcome.message,
            "Changes pushed to origin/main as Strategist (strategist)."
        );
        assert_eq!(
            vcs.calls(),
            vec![
                VcsStep::WorkTree,
                VcsStep::Status,
                VcsStep::Stage,
                VcsStep::Commit,
                VcsStep::Push
            ]
        );
        let commits = vcs.commits();
        let commit = &commits[0];
        assert_eq!(commit.author_name, "Strategist");
        assert_eq!(commit.author_email, "strategist@users.noreply.github.com");
        let subject = "finance-autosave [Strategist] (scheduled) Record TSX holdings update ";
        assert!(commit.message.starts_with(subject));
        assert_eq!(vcs.pushes(), vec![("origin".to_string(), "main".to_string())]);

        let config = fx.config();
        assert_eq!(config.next_agent_id, AgentId::Builder);
        assert_eq!(config.last_actor_id, Some(AgentId::Strategist));
        assert_eq!(config.last_result, Some(RunResult::Pushed));
        assert_eq!(config.last_error, None);
        assert_eq!(
            config.last_consultation.as_deref(),
            Some(
                concat!(
                    "actor=strategist; reviewer=builder; actorNote=Track holdings; ",
                    "reviewerNote=Record TSX holdings update"
                )
            )
        );
    }

    #[test]
    fn non_alternating_roster_always_commits_as_strategist() {
        let fx = Fixture::new(json!({
            "enabled": true,
            "alternatingAgents": false,
            "consultBetweenAgents": false,
            "nextAgentId": "builder",
        }));
        let vcs = ScriptedVcs::with_changes(" M a.txt\n");
        fx.run(&vcs, &ScriptedAgent::new(vec![]), Trigger::Scheduled);

        assert_eq!(vcs.commits()[0].author_name, "Strategist");
        let config = fx.config();
        assert_eq!(config.next_agent_id, AgentId::Builder);
        assert_eq!(config.last_actor_id, Some(AgentId::Strategist));
        assert_eq!(config.last_consultation, None);
    }

    #[test]
    fn push_failure_keeps_the_turn_and_records_the_error() {
        let fx = Fixture::new(json!({"enabled": true, "consultBetweenAgents": false}));
        let vcs = ScriptedVcs::with_changes(" M a.txt\n").failing_at(VcsStep::Push);
        let outcome = fx.run(&vcs, &ScriptedAgent::new(vec![]), Trigger::Scheduled);

        assert_eq!(outcome.status, CycleStatus::Failed);
        assert!(!outcome.ok);
        assert!(!outcome.skipped);
        assert_eq!(outcome.message, "git push failed: scripted push failure");

        let config = fx.config();
        assert_eq!(config.next_agent_id, AgentId::Strategist);
        assert_eq!(config.last_result, Some(RunResult::Error));
        assert_eq!(
            config.last_error.as_deref(),
            Some("git push failed: scripted push failure")
        );
        assert!(!fx.runtime.is_running());
    }

    #[test]
    fn work_tree_check_failure_is_reported_as_rev_parse() {
        let fx = Fixture::new(json!({"enabled": true}));
        let vcs = ScriptedVcs::with_changes(" M a.txt\n").failing_at(VcsStep::WorkTree);
        let outcome = fx.run(&vcs, &ScriptedAgent::new(vec![]), Trigger::Scheduled);
        assert_eq!(outcome.status, CycleStatus::Failed);
        assert_eq!(outcome.message, "git rev-parse failed: scripted rev-parse failure");
        assert_eq!(vcs.calls(), vec![VcsStep::WorkTree]);
        assert_eq!(fx.config().last_error.as_deref(), Some(outcome.message.as_str()));
    }

    #[test]
    fn commit_failure_skips_the_push() {
        let fx = Fixture::new(json!({"enabled": true, "consultBetweenAgents": false}));
        let vcs = ScriptedVcs::with_changes(" M a.txt\n").failing_at(VcsStep::Commit);
        let outcome = fx.run(&vcs, &ScriptedAgent::new(vec![]), Trigger::Scheduled);
        assert_eq!(outcome.status, CycleStatus::Failed);
        assert!(!vcs.calls().contains(&VcsStep::Push));
    }

    #[test]
    fn consultation_failure_commits_without_hint() {
        let fx = Fixture::new(json!({"enabled": true, "nextAgentId": "builder"}));
        let vcs = ScriptedVcs::with_changes("?? notes.md\n");
        let agent = ScriptedAgent::new(vec![Err(AgentError::ExecutableMissing {
            program: "openclaw".to_string(),
        })]);
        let outcome = fx.run(&vcs, &agent, Trigger::Manual);

        assert_eq!(outcome.status, CycleStatus::Pushed);
        let commits = vcs.commits();
        assert!(commits[0].message.starts_with("finance-autosave [Builder] (manual) 20"));

        let config = fx.config();
        assert_eq!(
            config.last_consultation.as_deref(),
            Some("consultation_error=openclaw CLI is missing; install it first")
        );
        assert_eq!(config.next_agent_id, AgentId::Strategist);
        assert_eq!(config.last_actor_id, Some(AgentId::Builder));
    }

    #[test]
    fn consultation_disabled_never_calls_the_agent() {
        let fx = Fixture::new(json!({"enabled": true, "consultBetweenAgents": false}));
        let vcs = ScriptedVcs::with_changes(" M a.txt\n");
        let agent = ScriptedAgent::new(vec![]);
        fx.run(&vcs, &agent, Trigger::Scheduled);
        assert!(agent.requests().is_empty());
    }

    #[test]
    fn outcome_serializes_for_http_callers() {
        let value = serde_json::to_value(CycleOutcome::no_changes()).expect("json");
        assert_eq!(
            value,
            json!({
                "ok": true,
                "skipped": true,
                "status": "no_changes",
                "message": "No changes to commit.",
            })
        );
    }
}
