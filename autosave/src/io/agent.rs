//! Reasoning-agent invocation.
//!
//! The [`AgentInvoker`] trait decouples consultation from the agent backend
//! (currently the `openclaw` CLI). Tests use scripted invokers that return
//! predetermined replies without spawning processes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::json_region::{RegionError, extract_object};
use crate::core::roster::AgentId;
use crate::io::process::{CommandSpec, ProcessError, run_command};

pub const DEFAULT_AGENT_PROGRAM: &str = "openclaw";
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// One message to one roster member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub agent: AgentId,
    /// Lets the agent keep conversational continuity across calls.
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    /// The parsed JSON document the agent printed.
    pub raw: Value,
    /// Non-empty text payloads, trimmed and joined by blank lines.
    pub text: String,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{program} CLI is missing; install it first")]
    ExecutableMissing { program: String },
    #[error("agent {agent} timed out after {timeout:?}")]
    Timeout { agent: AgentId, timeout: Duration },
    #[error("agent {agent} failed (exit {}): {output}", exit_label(.exit_code))]
    Failed {
        agent: AgentId,
        exit_code: Option<i32>,
        output: String,
    },
    #[error("failed to decode output of agent {agent}: {reason}")]
    Unparseable {
        agent: AgentId,
        #[source]
        reason: RegionError,
    },
    #[error("agent {agent} returned no text payload")]
    EmptyResponse { agent: AgentId },
    #[error("agent {agent} could not be run: {source}")]
    Process {
        agent: AgentId,
        #[source]
        source: ProcessError,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

/// Abstraction over reasoning-agent backends.
pub trait AgentInvoker {
    fn invoke(&self, request: &AgentRequest) -> Result<AgentReply, AgentError>;
}

impl<T: AgentInvoker + ?Sized> AgentInvoker for Box<T> {
    fn invoke(&self, request: &AgentRequest) -> Result<AgentReply, AgentError> {
        (**self).invoke(request)
    }
}

impl<T: AgentInvoker + ?Sized> AgentInvoker for Arc<T> {
    fn invoke(&self, request: &AgentRequest) -> Result<AgentReply, AgentError> {
        (**self).invoke(request)
    }
}

/// Invoker that spawns `<program> agent --agent <id> --session-id <sid> --message <msg> --json`.
#[derive(Debug, Clone)]
pub struct OpenClawAgent {
    program: String,
    workdir: PathBuf,
    timeout: Duration,
}

impl OpenClawAgent {
    pub fn new(program: impl Into<String>, workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            workdir: workdir.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, request: &AgentRequest) -> CommandSpec {
        CommandSpec::new(&self.program, &self.workdir)
            .args([
                "agent",
                "--agent",
                request.agent.as_str(),
                "--session-id",
                request.session_id.as_str(),
                "--message",
                request.message.as_str(),
                "--json",
            ])
            .timeout(self.timeout)
    }
}

impl AgentInvoker for OpenClawAgent {
    #[instrument(skip_all, fields(agent = %request.agent, session_id = %request.session_id))]
    fn invoke(&self, request: &AgentRequest) -> Result<AgentReply, AgentError> {
        info!(program = %self.program, "invoking agent");
        let agent = request.agent;
        let output = run_command(&self.command(request)).map_err(|err| match err {
            err if err.is_missing_executable() => AgentError::ExecutableMissing {
                program: self.program.clone(),
            },
            ProcessError::TimedOut { timeout, .. } => {
                warn!(timeout_secs = timeout.as_secs(), "agent timed out");
                AgentError::Timeout { agent, timeout }
            }
            ProcessError::Failed {
                exit_code,
                stdout,
                stderr,
                ..
            } => {
                warn!(exit_code = ?exit_code, "agent failed");
                let output = if stderr.trim().is_empty() { stdout } else { stderr };
                AgentError::Failed {
                    agent,
                    exit_code,
                    output: output.trim().to_string(),
                }
            }
            source => AgentError::Process { agent, source },
        })?;

        let combined = format!("{}\n{}", output.stdout, output.stderr);
        let reply = parse_reply(agent, &combined)?;
        debug!(text_len = reply.text.len(), "agent replied");
        Ok(reply)
    }
}

/// Decode the JSON document embedded in raw agent output.
pub fn parse_reply(agent: AgentId, raw: &str) -> Result<AgentReply, AgentError> {
    let document =
        extract_object(raw.trim()).map_err(|reason| AgentError::Unparseable { agent, reason })?;
    let text = payload_text(&document);
    if text.is_empty() {
        return Err(AgentError::EmptyResponse { agent });
    }
    Ok(AgentReply {
        raw: document,
        text,
    })
}

/// Join every non-empty `result.payloads[*].text`, trimmed, with blank lines.
pub fn payload_text(document: &Value) -> String {
    document
        .pointer("/result/payloads")
        .and_then(Value::as_array)
        .map(|payloads| {
            payloads
                .iter()
                .filter_map(|payload| payload.get("text").and_then(Value::as_str))
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n")
        })
        .unwrap_or_default()
}
