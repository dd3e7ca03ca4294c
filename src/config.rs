//! Optional TOML configuration file.
//!
//! Config supplies defaults only; every value is overridable from the
//! command line. Resolution order: `LLM_CTX_CONFIG` names a file
//! explicitly, else `$XDG_CONFIG_HOME/llm_ctx/config.toml`, else
//! `$HOME/.config/llm_ctx/config.toml`. `LLM_CTX_NO_CONFIG=1` disables
//! loading entirely.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::error::Fatal;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub token_model: Option<String>,
    pub token_budget: Option<usize>,
    /// Default system instructions (inline text or `@path`).
    pub system_instructions: Option<String>,
    pub editor_comments: Option<bool>,
    pub filerank: FileRankConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileRankConfig {
    /// Same syntax as `--filerank-weight`.
    pub weights: Option<String>,
    /// Same syntax as `--filerank-cutoff`.
    pub cutoff: Option<String>,
    /// Same syntax as `-k`.
    pub keywords: Option<String>,
}

/// Load the configuration for this invocation from the environment.
///
/// A missing default-location file is fine; a malformed one warns and is
/// ignored. A path named via `LLM_CTX_CONFIG` that cannot be loaded is a
/// usage error.
pub fn load() -> Result<Config, Fatal> {
    if std::env::var("LLM_CTX_NO_CONFIG").as_deref() == Ok("1") {
        return Ok(Config::default());
    }

    if let Ok(explicit) = std::env::var("LLM_CTX_CONFIG") {
        return load_from(Path::new(&explicit))
            .map_err(|err| Fatal::Usage(format!("cannot load {explicit}: {err:#}")));
    }

    let Some(path) = default_path(
        std::env::var("XDG_CONFIG_HOME").ok().as_deref(),
        std::env::var("HOME").ok().as_deref(),
    ) else {
        return Ok(Config::default());
    };

    if !path.is_file() {
        return Ok(Config::default());
    }

    match load_from(&path) {
        Ok(config) => Ok(config),
        Err(err) => {
            tracing::warn!("ignoring config {}: {err:#}", path.display());
            Ok(Config::default())
        }
    }
}

/// Parse one TOML config file.
pub fn load_from(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))
}

/// Default config location from the XDG/HOME environment.
fn default_path(xdg_config_home: Option<&str>, home: Option<&str>) -> Option<PathBuf> {
    if let Some(xdg) = xdg_config_home.filter(|v| !v.is_empty()) {
        return Some(Path::new(xdg).join("llm_ctx/config.toml"));
    }
    home.filter(|v| !v.is_empty())
        .map(|h| Path::new(h).join(".config/llm_ctx/config.toml"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
token_model = "gpt-4o"
token_budget = 64000
editor_comments = true

[filerank]
weights = "path:3,content:1"
cutoff = "auto"
"#,
        )
        .unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.token_model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.token_budget, Some(64000));
        assert_eq!(config.editor_comments, Some(true));
        assert_eq!(config.filerank.weights.as_deref(), Some("path:3,content:1"));
        assert_eq!(config.filerank.cutoff.as_deref(), Some("auto"));
    }

    #[test]
    fn test_empty_config_is_all_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "").unwrap();

        let config = load_from(&path).unwrap();
        assert!(config.token_model.is_none());
        assert!(config.token_budget.is_none());
        assert!(config.filerank.cutoff.is_none());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "surprise = true\n").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn test_default_path_resolution() {
        assert_eq!(
            default_path(Some("/xdg"), Some("/home/u")),
            Some(PathBuf::from("/xdg/llm_ctx/config.toml"))
        );
        assert_eq!(
            default_path(None, Some("/home/u")),
            Some(PathBuf::from("/home/u/.config/llm_ctx/config.toml"))
        );
        assert_eq!(
            default_path(Some(""), Some("/home/u")),
            Some(PathBuf::from("/home/u/.config/llm_ctx/config.toml"))
        );
        assert_eq!(default_path(None, None), None);
    }
}
