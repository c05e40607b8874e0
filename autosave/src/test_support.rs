//! Test-only collaborators: scripted git and agent fakes plus real throwaway
//! repositories.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, bail};
use serde_json::json;
use tempfile::TempDir;

use crate::core::roster::AgentProfile;
use crate::io::agent::{AgentError, AgentInvoker, AgentReply, AgentRequest};
use crate::io::git::VersionControl;
use crate::io::process::ProcessError;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Agent that answers from a fixed script, in order.
///
/// Once the script runs out every call fails with `EmptyResponse`.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    replies: Mutex<VecDeque<Result<String, AgentError>>>,
    requests: Mutex<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn new(replies: Vec<Result<String, AgentError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<AgentRequest> {
        locked(&self.requests).clone()
    }
}

impl AgentInvoker for ScriptedAgent {
    fn invoke(&self, request: &AgentRequest) -> Result<AgentReply, AgentError> {
        locked(&self.requests).push(request.clone());
        let next = locked(&self.replies).pop_front();
        match next {
            Some(Ok(text)) => Ok(AgentReply {
                raw: json!({"result": {"payloads": [{"text": text}]}}),
                text,
            }),
            Some(Err(err)) => Err(err),
            None => Err(AgentError::EmptyResponse {
                agent: request.agent,
            }),
        }
    }
}

/// Repository operations, in the order a cycle performs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsStep {
    WorkTree,
    Status,
    Stage,
    Commit,
    Push,
}

impl VcsStep {
    fn label(self) -> &'static str {
        match self {
            VcsStep::WorkTree => "rev-parse",
            VcsStep::Status => "status",
            VcsStep::Stage => "add",
            VcsStep::Commit => "commit",
            VcsStep::Push => "push",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommit {
    pub author_name: String,
    pub author_email: String,
    pub message: String,
}

#[derive(Debug)]
struct StatusGate {
    entered: Sender<()>,
    release: Mutex<Receiver<()>>,
}

/// Test-side handle for a [`ScriptedVcs`] that pauses inside its first
/// `status_porcelain` call.
#[derive(Debug)]
pub struct GateHandle {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl GateHandle {
    /// Block until a cycle is parked inside `status_porcelain`.
    pub fn wait_entered(&self) {
        self.entered.recv().expect("gated status call");
    }

    pub fn release(&self) {
        self.release.send(()).expect("release gated status call");
    }
}

/// In-memory [`VersionControl`] with scripted results.
#[derive(Debug)]
pub struct ScriptedVcs {
    work_tree: bool,
    status: String,
    failing: Option<VcsStep>,
    gate: Mutex<Option<StatusGate>>,
    calls: Mutex<Vec<VcsStep>>,
    commits: Mutex<Vec<RecordedCommit>>,
    pushes: Mutex<Vec<(String, String)>>,
}

impl ScriptedVcs {
    /// A work tree whose `git status --porcelain` prints `status`.
    pub fn with_changes(status: &str) -> Self {
        Self {
            work_tree: true,
            status: status.to_string(),
            failing: None,
            gate: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
            pushes: Mutex::new(Vec::new()),
        }
    }

    pub fn clean() -> Self {
        Self::with_changes("")
    }

    pub fn not_a_repository() -> Self {
        Self {
            work_tree: false,
            ..Self::clean()
        }
    }

    /// Make `step` fail with `scripted <label> failure`.
    pub fn failing_at(mut self, step: VcsStep) -> Self {
        self.failing = Some(step);
        self
    }

    /// Pause the first `status_porcelain` call until the handle releases it.
    pub fn gated(self) -> (Self, GateHandle) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *locked(&self.gate) = Some(StatusGate {
            entered: entered_tx,
            release: Mutex::new(release_rx),
        });
        (
            self,
            GateHandle {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }

    pub fn calls(&self) -> Vec<VcsStep> {
        locked(&self.calls).clone()
    }

    pub fn commits(&self) -> Vec<RecordedCommit> {
        locked(&self.commits).clone()
    }

    pub fn pushes(&self) -> Vec<(String, String)> {
        locked(&self.pushes).clone()
    }

    fn step(&self, step: VcsStep) -> Result<(), ProcessError> {
        locked(&self.calls).push(step);
        if self.failing == Some(step) {
            return Err(ProcessError::Failed {
                program: "git".to_string(),
                exit_code: Some(1),
                message: format!("scripted {} failure", step.label()),
                stdout: String::new(),
                stderr: String::new(),
            });
        }
        Ok(())
    }
}

impl VersionControl for ScriptedVcs {
    fn is_work_tree(&self) -> Result<bool, ProcessError> {
        self.step(VcsStep::WorkTree)?;
        Ok(self.work_tree)
    }

    fn status_porcelain(&self) -> Result<String, ProcessError> {
        let gate = locked(&self.gate).take();
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = locked(&gate.release).recv();
        }
        self.step(VcsStep::Status)?;
        Ok(self.status.clone())
    }

    fn add_all(&self) -> Result<(), ProcessError> {
        self.step(VcsStep::Stage)
    }

    fn commit_as(&self, author: &AgentProfile, message: &str) -> Result<(), ProcessError> {
        self.step(VcsStep::Commit)?;
        locked(&self.commits).push(RecordedCommit {
            author_name: author.name.clone(),
            author_email: author.email.clone(),
            message: message.to_string(),
        });
        Ok(())
    }

    fn push(&self, remote: &str, branch: &str) -> Result<(), ProcessError> {
        self.step(VcsStep::Push)?;
        locked(&self.pushes).push((remote.to_string(), branch.to_string()));
        Ok(())
    }
}

/// A real git work tree in a temp dir, optionally with a local bare remote
/// registered as `origin`. Both use `main` as the initial branch.
#[derive(Debug)]
pub struct TestRepo {
    temp: TempDir,
    work: PathBuf,
    remote: Option<PathBuf>,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp dir")?;
        let work = temp.path().join("work");
        fs::create_dir_all(&work).context("create work tree")?;
        git(&work, &["init", "--quiet"])?;
        git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"])?;
        git(&work, &["config", "user.name", "Test Harness"])?;
        git(&work, &["config", "user.email", "harness@example.com"])?;
        git(&work, &["config", "commit.gpgsign", "false"])?;
        Ok(Self {
            temp,
            work,
            remote: None,
        })
    }

    pub fn with_remote() -> Result<Self> {
        let mut repo = Self::new()?;
        let remote = repo.temp.path().join("remote.git");
        fs::create_dir_all(&remote).context("create remote dir")?;
        git(&remote, &["init", "--bare", "--quiet"])?;
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"])?;
        let remote_str = remote.to_string_lossy().into_owned();
        git(&repo.work, &["remote", "add", "origin", &remote_str])?;
        repo.remote = Some(remote);
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.work
    }

    /// Directory next to the work tree, outside any repository.
    pub fn scratch_dir(&self) -> PathBuf {
        self.temp.path().to_path_buf()
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.work.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(path, contents).expect("write work tree file");
    }

    /// `Name <email>` of HEAD.
    pub fn last_commit_author(&self) -> String {
        self.query(&["log", "-1", "--format=%an <%ae>"])
    }

    pub fn last_commit_subject(&self) -> String {
        self.query(&["log", "-1", "--format=%s"])
    }

    pub fn commit_count(&self) -> usize {
        self.query(&["rev-list", "--count", "HEAD"])
            .parse()
            .expect("numeric commit count")
    }

    /// Subject of `branch`'s tip in the bare remote.
    pub fn remote_subject(&self, branch: &str) -> String {
        let remote = self.remote.as_ref().expect("repo was created with a remote");
        git(remote, &["log", "-1", "--format=%s", branch])
            .expect("query remote")
            .trim()
            .to_string()
    }

    fn query(&self, args: &[&str]) -> String {
        git(&self.work, args).expect("query repo").trim().to_string()
    }
}

fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("run git {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Write an executable `sh` script named `name` into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
    let mut perms = fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod script");
    path
}

/// Script for one successful consultation: actor proposal, then verdict.
pub fn consultation_replies(actor: &str, reviewer: &str) -> ScriptedAgent {
    ScriptedAgent::new(vec![Ok(actor.to_string()), Ok(reviewer.to_string())])
}
