//! Chain configuration stored as TOML.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Engine configuration (TOML).
///
/// Missing fields default to the values the engine was tuned with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChainConfig {
    /// Model attempts per turn before falling back to a best-effort answer.
    pub max_retry_count: usize,

    /// Prompt token budget for history trimming. Trimming is skipped when unset.
    pub max_prompt_tokens: Option<u32>,

    /// Name under which the terminal reply command is registered.
    pub reply_command: String,

    pub templates: TemplatesConfig,
}

/// Optional prompt template overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TemplatesConfig {
    pub system: Option<PathBuf>,
    pub best_effort: Option<PathBuf>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_retry_count: 3,
            max_prompt_tokens: None,
            reply_command: "reply".to_string(),
            templates: TemplatesConfig::default(),
        }
    }
}

impl ChainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_retry_count == 0 {
            return Err(anyhow!("max_retry_count must be > 0"));
        }
        if self.max_prompt_tokens == Some(0) {
            return Err(anyhow!("max_prompt_tokens must be > 0 when set"));
        }
        if self.reply_command.trim().is_empty() {
            return Err(anyhow!("reply_command must be a non-empty name"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ChainConfig::default()`.
pub fn load_config(path: &Path) -> Result<ChainConfig> {
    if !path.exists() {
        let cfg = ChainConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ChainConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ChainConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ChainConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("chain.toml");
        let cfg = ChainConfig {
            max_retry_count: 5,
            max_prompt_tokens: Some(4096),
            reply_command: "answer".to_string(),
            templates: TemplatesConfig {
                system: Some(PathBuf::from("prompts/system.md")),
                best_effort: None,
            },
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("chain.toml");
        fs::write(&path, "max_prompt_tokens = 1000\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_retry_count, 3);
        assert_eq!(cfg.max_prompt_tokens, Some(1000));
        assert_eq!(cfg.reply_command, "reply");
    }

    #[test]
    fn zero_retries_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("chain.toml");
        fs::write(&path, "max_retry_count = 0\n").expect("write");
        let error = load_config(&path).expect_err("invalid");
        assert!(error.to_string().contains("max_retry_count"));
    }
}
