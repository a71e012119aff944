//! Pipeline configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MBOXSITE_CONFIG` (environment variable)
//! 2. `~/.config/mboxsite/config.toml` (Linux/macOS)
//!    `%APPDATA%\mboxsite\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub parser: ParserConfig,
    pub normalize: NormalizeConfig,
    pub threading: ThreadingConfig,
    pub corpus: CorpusConfig,
    pub search: SearchConfig,
    pub performance: PerformanceConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Name of the group being archived, passed through to renderers.
    pub group_name: String,
}

/// Record splitting and message parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Records larger than this many bytes are truncated.
    pub max_message_size: usize,
    /// Remove one `>` from body lines matching `>+From ` (mboxrd quoting).
    pub unescape_from_lines: bool,
}

/// Body normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Quote levels deeper than this collapse into the deepest block.
    pub max_quote_depth: usize,
    /// Turn bare URLs and email addresses in plain text into links.
    pub link_urls: bool,
}

/// Which reply header wins when both are present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkPolicy {
    /// First `In-Reply-To` value, then `References` newest to oldest.
    #[default]
    InReplyToFirst,
    /// `References` newest to oldest, then `In-Reply-To`.
    ReferencesFirst,
}

/// Thread reconstruction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadingConfig {
    pub link_policy: LinkPolicy,
    /// Attach parentless replies ("Re: …") to an earlier thread with the
    /// same normalized subject.
    pub merge_by_subject: bool,
}

/// Corpus assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Maximum snippet length in characters.
    pub snippet_length: usize,
    /// Threads per index page.
    pub threads_per_page: usize,
}

/// Search index construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Tokens shorter than this (in characters) are dropped.
    pub min_token_length: usize,
    /// Upper bound on distinct body tokens per message (0 = unbounded).
    pub max_body_tokens: usize,
}

/// Performance tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Parse records on the rayon thread pool.
    pub parallel: bool,
    /// Read buffer size in bytes (default: 1 MB).
    pub read_buffer_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
            group_name: "Mailing list".to_string(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024 * 1024, // 64 MB
            unescape_from_lines: true,
        }
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            max_quote_depth: 3,
            link_urls: true,
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            snippet_length: 200,
            threads_per_page: 25,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_token_length: 2,
            max_body_tokens: 5000,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            read_buffer_size: 1024 * 1024, // 1 MB
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match load_config_from(&path) {
                Ok(cfg) => {
                    tracing::info!(path = %path.display(), "Loaded config");
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to load config, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Load configuration from an explicit file.
pub fn load_config_from(path: &Path) -> crate::error::Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| ArchiveError::io(path, e))?;
    toml::from_str::<Config>(&contents).map_err(|e| ArchiveError::InvalidConfig(e.to_string()))
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MBOXSITE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mboxsite").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mboxsite")
}
