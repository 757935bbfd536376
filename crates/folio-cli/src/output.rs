//! Shared output layer for pretty/text/JSON parity across all CLI commands.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / hidden `--json` flag
//! 2. `FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 3. `output` in the user config (`~/.config/folio/config.toml`)
//! 4. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use clap::ValueEnum;
use folio_core::error::ErrorCode;
use folio_core::merge::MergeError;
use folio_core::save::SaveError;
use folio_core::session::SessionError;
use serde::Serialize;
use std::io::{self, Write};

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (sections, visual framing).
    Pretty,
    /// Token-efficient plain text for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    /// Returns `true` if JSON output was requested.
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    fn from_resolved(raw: &str) -> Option<Self> {
        match raw {
            "pretty" => Some(Self::Pretty),
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Pick the output mode.
///
/// `resolved` is the config layer's answer (`FORMAT`, user config, TTY
/// detection already applied); the explicit flags beat it.
pub fn resolve_output_mode(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    resolved: Option<&str>,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }
    if json_flag {
        return OutputMode::Json;
    }
    resolved
        .and_then(OutputMode::from_resolved)
        .unwrap_or(OutputMode::Text)
}

/// Render a serializable value with explicit pretty/text renderers.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

/// Render a serializable value; pretty and text share `human_fn`.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// A structured error with an optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// Human-readable error message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Stable `E####` code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    /// Build from a command failure, looking through the context chain for
    /// a folio error that carries a code.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let code = error_code(err);
        Self {
            message: format!("{err:#}"),
            suggestion: code.and_then(ErrorCode::hint).map(str::to_string),
            error_code: code.map(|c| c.code().to_string()),
        }
    }
}

/// First coded error in `err`'s chain.
pub fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<MergeError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<SessionError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<SaveError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<crate::cmd::check::CheckFailed>() {
            e.code
        } else if cause.is::<serde_json::Error>() {
            Some(ErrorCode::SnapshotParseError)
        } else if cause.is::<toml::de::Error>() {
            Some(ErrorCode::ConfigParseError)
        } else {
            None
        }
    })
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({
                "error": error,
            });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use folio_core::Uid;

    #[test]
    fn explicit_format_beats_everything() {
        assert_eq!(
            resolve_output_mode(Some(OutputMode::Pretty), true, Some("json")),
            OutputMode::Pretty
        );
    }

    #[test]
    fn json_flag_beats_resolved_config() {
        assert_eq!(resolve_output_mode(None, true, Some("pretty")), OutputMode::Json);
    }

    #[test]
    fn resolved_config_is_used_without_flags() {
        assert_eq!(resolve_output_mode(None, false, Some("pretty")), OutputMode::Pretty);
        assert_eq!(resolve_output_mode(None, false, Some("bogus")), OutputMode::Text);
        assert_eq!(resolve_output_mode(None, false, None), OutputMode::Text);
    }

    #[test]
    fn merge_errors_keep_their_code_through_context() {
        let err = anyhow::Error::new(MergeError::UidCollision {
            uid: Uid::from("x"),
        })
        .context("merging snapshots");
        let cli = CliError::from_anyhow(&err);
        assert_eq!(cli.error_code.as_deref(), Some("E3001"));
        assert!(cli.message.starts_with("merging snapshots: "));
        assert!(cli.suggestion.is_some());
    }

    #[test]
    fn json_parse_errors_map_to_snapshot_code() {
        let err = serde_json::from_str::<serde_json::Value>("{")
            .context("reading local.json")
            .expect_err("invalid json");
        assert_eq!(error_code(&err), Some(ErrorCode::SnapshotParseError));
    }

    #[test]
    fn plain_errors_have_no_code() {
        let err = anyhow::anyhow!("nope");
        let cli = CliError::from_anyhow(&err);
        assert!(cli.error_code.is_none());
        assert!(cli.suggestion.is_none());
    }

    #[test]
    fn error_json_shape() {
        let err = CliError {
            message: "bad".into(),
            suggestion: None,
            error_code: Some("E2002".into()),
        };
        let json = serde_json::to_value(&err).expect("serialize");
        assert_eq!(json["error_code"], "E2002");
        assert!(json.get("suggestion").is_none());
    }
}
