//! Process settings stored in `autosave.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::agent::DEFAULT_AGENT_PROGRAM;

pub const DEFAULT_SETTINGS_FILE: &str = "autosave.toml";
pub const DEFAULT_SESSION_ID: &str = "finance-autosave-consult";

/// Where the orchestrator works and how it reaches the agent CLI.
///
/// Relative paths are resolved against the directory holding the settings
/// file. Missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Git working tree the cycle commits from.
    pub project_root: PathBuf,

    /// Portfolio document, relative to `project_root`.
    pub data_file: PathBuf,

    /// Scheduler period in seconds.
    pub interval_secs: u64,

    pub agent: AgentSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentSettings {
    pub program: String,
    pub session_id: String,
    pub timeout_secs: u64,
    /// Directory the agent CLI runs in. Defaults to `project_root`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            program: DEFAULT_AGENT_PROGRAM.to_string(),
            session_id: DEFAULT_SESSION_ID.to_string(),
            timeout_secs: 10 * 60,
            workdir: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            data_file: PathBuf::from("app/data/portfolio.json"),
            interval_secs: 30 * 60,
            agent: AgentSettings::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(anyhow!("interval_secs must be > 0"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.agent.program.trim().is_empty() {
            return Err(anyhow!("agent.program must be non-empty"));
        }
        if self.agent.session_id.trim().is_empty() {
            return Err(anyhow!("agent.session_id must be non-empty"));
        }
        if self.data_file.as_os_str().is_empty() {
            return Err(anyhow!("data_file must be non-empty"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.timeout_secs)
    }

    pub fn data_path(&self) -> PathBuf {
        self.project_root.join(&self.data_file)
    }

    pub fn agent_workdir(&self) -> PathBuf {
        match &self.agent.workdir {
            Some(dir) => self.project_root.join(dir),
            None => self.project_root.clone(),
        }
    }

    /// Make `project_root` absolute relative to `base`.
    fn resolved(mut self, base: &Path) -> Self {
        if self.project_root.is_relative() {
            self.project_root = base.join(&self.project_root);
        }
        self
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `Settings::default()` resolved against
/// the file's directory.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let base = settings_base(path);
    if !path.exists() {
        let settings = Settings::default();
        settings.validate()?;
        return Ok(settings.resolved(&base));
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: Settings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings.validate()?;
    Ok(settings.resolved(&base))
}

/// Atomically write settings to disk (temp file + rename).
pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    settings.validate()?;
    let mut buf = toml::to_string_pretty(settings).context("serialize settings toml")?;
    buf.push('\n');
    let parent = settings_base(path);
    fs::create_dir_all(&parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp settings {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace settings {}", path.display()))?;
    Ok(())
}

fn settings_base(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_resolved_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(&temp.path().join("autosave.toml")).expect("load");
        assert_eq!(settings.interval(), Duration::from_secs(1800));
        assert_eq!(settings.agent.program, "openclaw");
        assert_eq!(settings.project_root, temp.path().join("."));
        assert_eq!(
            settings.data_path(),
            temp.path().join(".").join("app/data/portfolio.json")
        );
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("autosave.toml");
        let settings = Settings {
            project_root: temp.path().to_path_buf(),
            interval_secs: 60,
            agent: AgentSettings {
                timeout_secs: 30,
                workdir: Some(PathBuf::from("agents")),
                ..AgentSettings::default()
            },
            ..Settings::default()
        };
        write_settings(&path, &settings).expect("write");
        let loaded = load_settings(&path).expect("load");
        assert_eq!(loaded, settings);
        assert_eq!(loaded.agent_workdir(), temp.path().join("agents"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("autosave.toml");
        fs::write(&path, "interval_secs = 120\n[agent]\nprogram = \"claw\"\n").expect("write");
        let loaded = load_settings(&path).expect("load");
        assert_eq!(loaded.interval_secs, 120);
        assert_eq!(loaded.agent.program, "claw");
        assert_eq!(loaded.agent.session_id, DEFAULT_SESSION_ID);
        assert_eq!(loaded.agent_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn validate_rejects_zero_interval_and_blank_program() {
        let mut settings = Settings {
            interval_secs: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
        settings.interval_secs = 1;
        settings.agent.program = "  ".to_string();
        assert!(settings.validate().is_err());
    }
}
