use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use crate::merge::{MergeOptions, TieBreak};
use crate::outline::render::RenderMode;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolioConfig {
    #[serde(default)]
    pub save: SaveConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

/// Autosave timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveConfig {
    /// Quiet period after the last edit before a save starts.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// How long failures may persist before retries with backoff begin.
    #[serde(default = "default_failure_grace_ms")]
    pub failure_grace_ms: u64,
    /// Delay of the first retry once the grace period is over.
    #[serde(default = "default_first_retry_ms")]
    pub first_retry_ms: u64,
    /// How long the "saved" status stays up before returning to standby.
    #[serde(default = "default_saved_display_ms")]
    pub saved_display_ms: u64,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: f64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            failure_grace_ms: default_failure_grace_ms(),
            first_retry_ms: default_first_retry_ms(),
            saved_display_ms: default_saved_display_ms(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl SaveConfig {
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub const fn failure_grace(&self) -> Duration {
        Duration::from_millis(self.failure_grace_ms)
    }

    #[must_use]
    pub const fn first_retry(&self) -> Duration {
        Duration::from_millis(self.first_retry_ms)
    }

    #[must_use]
    pub const fn saved_display(&self) -> Duration {
        Duration::from_millis(self.saved_display_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub tie_break: TieBreak,
}

impl MergeConfig {
    #[must_use]
    pub const fn options(&self) -> MergeOptions {
        MergeOptions {
            tie_break: self.tie_break,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Context used by `folio render` when none is given.
    #[serde(default)]
    pub context: RenderMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: FolioConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// # Errors
///
/// When `.folio/config.toml` exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<FolioConfig> {
    let path = project_root.join(".folio/config.toml");
    if !path.exists() {
        return Ok(FolioConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<FolioConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// # Errors
///
/// When the user config file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("folio/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Apply `FOLIO_SAVE_DEBOUNCE_MS` and `FOLIO_MERGE_TIE_BREAK` from `lookup`.
///
/// # Errors
///
/// When an override is set to a value that does not parse.
pub fn apply_env_overrides(
    config: &mut FolioConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(raw) = lookup("FOLIO_SAVE_DEBOUNCE_MS") {
        config.save.debounce_ms = raw
            .trim()
            .parse()
            .with_context(|| format!("FOLIO_SAVE_DEBOUNCE_MS must be milliseconds, got '{raw}'"))?;
    }
    if let Some(raw) = lookup("FOLIO_MERGE_TIE_BREAK") {
        config.merge.tie_break = raw
            .parse()
            .map_err(anyhow::Error::msg)
            .context("Invalid FOLIO_MERGE_TIE_BREAK")?;
    }
    Ok(())
}

/// # Errors
///
/// Any error from loading either config file or applying overrides.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let mut project = load_project_config(project_root)?;
    apply_env_overrides(&mut project, |key| env::var(key).ok())?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.clone(), env_format);

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(
    cli_json: bool,
    user_output: Option<String>,
    env_format: Option<String>,
) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "plain" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_debounce_ms() -> u64 {
    3_000
}

const fn default_failure_grace_ms() -> u64 {
    10_000
}

const fn default_first_retry_ms() -> u64 {
    3_000
}

const fn default_saved_display_ms() -> u64 {
    2_000
}

const fn default_backoff_base_secs() -> f64 {
    5.0
}

const fn default_backoff_factor() -> f64 {
    2.5
}
