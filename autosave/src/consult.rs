//! Two-agent consultation that proposes a commit hint.
//!
//! The active agent proposes a focus for the commit; the other roster member
//! reviews it. Both calls share one session id. Any failure ends the
//! consultation; callers decide whether that is fatal.

use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::roster::AgentId;
use crate::core::text::first_non_blank_line;
use crate::io::agent::{AgentError, AgentInvoker, AgentRequest};
use crate::io::prompt::{PromptInputs, render_actor_prompt, render_reviewer_prompt};

#[derive(Debug, Clone, Copy)]
pub struct ConsultRequest<'a> {
    pub actor: AgentId,
    pub reviewer: AgentId,
    pub changed_files: &'a [String],
    pub commit_prefix: &'a str,
    pub session_id: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consultation {
    pub actor: AgentId,
    pub reviewer: AgentId,
    pub actor_text: String,
    pub reviewer_text: String,
    /// First non-blank reviewer line, else first non-blank actor line.
    pub hint: String,
}

impl Consultation {
    /// One-line audit record stored as `lastConsultation`.
    pub fn snapshot(&self) -> String {
        format!(
            "actor={}; reviewer={}; actorNote={}; reviewerNote={}",
            self.actor,
            self.reviewer,
            first_non_blank_line(&self.actor_text),
            first_non_blank_line(&self.reviewer_text),
        )
    }
}

#[derive(Debug, Error)]
pub enum ConsultError {
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("render consultation prompt: {0}")]
    Prompt(#[from] minijinja::Error),
}

#[instrument(skip_all, fields(actor = %request.actor, reviewer = %request.reviewer))]
pub fn consult<A>(invoker: &A, request: &ConsultRequest<'_>) -> Result<Consultation, ConsultError>
where
    A: AgentInvoker + ?Sized,
{
    let inputs = PromptInputs {
        actor: request.actor,
        reviewer: request.reviewer,
        changed_files: request.changed_files,
        commit_prefix: request.commit_prefix,
    };

    let actor_reply = invoker.invoke(&AgentRequest {
        agent: request.actor,
        session_id: request.session_id.to_string(),
        message: render_actor_prompt(&inputs)?,
    })?;
    debug!("actor proposal received");

    let reviewer_reply = invoker.invoke(&AgentRequest {
        agent: request.reviewer,
        session_id: request.session_id.to_string(),
        message: render_reviewer_prompt(&inputs, &actor_reply.text)?,
    })?;
    debug!("reviewer verdict received");

    let hint = match first_non_blank_line(&reviewer_reply.text) {
        "" => first_non_blank_line(&actor_reply.text),
        line => line,
    }
    .to_string();

    Ok(Consultation {
        actor: request.actor,
        reviewer: request.reviewer,
        actor_text: actor_reply.text,
        reviewer_text: reviewer_reply.text,
        hint,
    })
}
