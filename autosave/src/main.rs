//! `autosave` command-line entry point.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value, json};

use autosave::core::roster::AgentId;
use autosave::cycle::Trigger;
use autosave::exit_codes;
use autosave::io::settings::{DEFAULT_SETTINGS_FILE, load_settings};
use autosave::logging;
use autosave::orchestrator::DynAutosave;

#[derive(Parser)]
#[command(
    name = "autosave",
    version,
    about = "Commit and push working-tree changes under alternating agent identities"
)]
struct Cli {
    /// Process settings (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one cycle now, even if autosave is disabled.
    Run,
    /// Run one cycle as the scheduler would (skipped when disabled).
    Tick,
    /// Print the persisted configuration and last-run audit fields.
    Status,
    /// Edit the persisted configuration.
    Configure(ConfigureArgs),
}

#[derive(clap::Args, Debug)]
struct ConfigureArgs {
    #[arg(long)]
    enabled: Option<bool>,
    #[arg(long)]
    remote: Option<String>,
    #[arg(long)]
    branch: Option<String>,
    /// Commit subject prefix.
    #[arg(long)]
    prefix: Option<String>,
    /// Rotate the commit author after each push.
    #[arg(long)]
    alternating: Option<bool>,
    /// Ask the roster for a commit hint before committing.
    #[arg(long)]
    consult: Option<bool>,
    /// Whose turn is next: strategist or builder.
    #[arg(long, value_parser = parse_agent_id)]
    next_agent: Option<AgentId>,
    #[arg(long)]
    strategist_name: Option<String>,
    #[arg(long)]
    strategist_email: Option<String>,
    #[arg(long)]
    builder_name: Option<String>,
    #[arg(long)]
    builder_email: Option<String>,
}

fn parse_agent_id(raw: &str) -> Result<AgentId, String> {
    AgentId::parse(raw)
        .ok_or_else(|| format!("unknown agent `{raw}` (expected strategist or builder)"))
}

impl ConfigureArgs {
    /// Only flags that were given end up in the patch.
    fn to_patch(&self) -> Value {
        let mut patch = Map::new();
        let mut set = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                patch.insert(key.to_string(), value);
            }
        };
        set("enabled", self.enabled.map(Value::Bool));
        set("remote", self.remote.clone().map(Value::String));
        set("branch", self.branch.clone().map(Value::String));
        set("commitPrefix", self.prefix.clone().map(Value::String));
        set("alternatingAgents", self.alternating.map(Value::Bool));
        set("consultBetweenAgents", self.consult.map(Value::Bool));
        set(
            "nextAgentId",
            self.next_agent.map(|id| Value::String(id.as_str().to_string())),
        );

        let mut agents = Map::new();
        for (id, name, email) in [
            (AgentId::Strategist, &self.strategist_name, &self.strategist_email),
            (AgentId::Builder, &self.builder_name, &self.builder_email),
        ] {
            let mut profile = Map::new();
            if let Some(name) = name {
                profile.insert("name".to_string(), Value::String(name.clone()));
            }
            if let Some(email) = email {
                profile.insert("email".to_string(), Value::String(email.clone()));
            }
            if !profile.is_empty() {
                agents.insert(id.as_str().to_string(), Value::Object(profile));
            }
        }
        if !agents.is_empty() {
            patch.insert("agents".to_string(), Value::Object(agents));
        }
        Value::Object(patch)
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let autosave = open(&cli.settings)?;
    match cli.command {
        Command::Run => cmd_cycle(&autosave, Trigger::Manual),
        Command::Tick => cmd_cycle(&autosave, Trigger::Scheduled),
        Command::Status => cmd_status(&autosave),
        Command::Configure(args) => cmd_configure(&autosave, &args),
    }
}

fn open(settings_path: &Path) -> Result<DynAutosave> {
    let settings = load_settings(settings_path)
        .with_context(|| format!("load settings {}", settings_path.display()))?;
    Ok(DynAutosave::from_settings(&settings))
}

fn cmd_cycle(autosave: &DynAutosave, trigger: Trigger) -> Result<i32> {
    let outcome = autosave.run_once(trigger);
    print_json(&outcome)?;
    Ok(exit_codes::for_outcome(&outcome))
}

fn cmd_status(autosave: &DynAutosave) -> Result<i32> {
    let config = autosave.config()?;
    print_json(&json!({ "gitAutoSave": config }))?;
    Ok(exit_codes::OK)
}

fn cmd_configure(autosave: &DynAutosave, args: &ConfigureArgs) -> Result<i32> {
    let saved = autosave.save_patch(&args.to_patch())?;
    print_json(&json!({ "gitAutoSave": saved }))?;
    Ok(exit_codes::OK)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{rendered}");
    Ok(())
}
