//! Consultation prompt rendering.

use std::sync::LazyLock;

use minijinja::{Environment, context};

use crate::core::roster::AgentId;

const ACTOR_TEMPLATE: &str = include_str!("prompts/actor.md");
const REVIEWER_TEMPLATE: &str = include_str!("prompts/reviewer.md");

static ENGINE: LazyLock<PromptEngine> = LazyLock::new(PromptEngine::new);

/// What both consultation prompts are built from.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub actor: AgentId,
    pub reviewer: AgentId,
    pub changed_files: &'a [String],
    pub commit_prefix: &'a str,
}

struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("actor", ACTOR_TEMPLATE)
            .expect("actor template should be valid");
        env.add_template("reviewer", REVIEWER_TEMPLATE)
            .expect("reviewer template should be valid");
        Self { env }
    }
}

/// Prompt asking the active agent for a one-sentence commit focus.
pub fn render_actor_prompt(input: &PromptInputs<'_>) -> Result<String, minijinja::Error> {
    ENGINE.env.get_template("actor")?.render(context! {
        actor => input.actor.as_str(),
        commit_prefix => input.commit_prefix.trim(),
        changed_files => input.changed_files,
    })
}

/// Prompt asking the reviewer to validate or correct `actor_text`.
pub fn render_reviewer_prompt(
    input: &PromptInputs<'_>,
    actor_text: &str,
) -> Result<String, minijinja::Error> {
    ENGINE.env.get_template("reviewer")?.render(context! {
        actor => input.actor.as_str(),
        reviewer => input.reviewer.as_str(),
        changed_files => input.changed_files,
        actor_text => actor_text.trim(),
    })
}
