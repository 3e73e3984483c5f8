use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

/// Source selection: exactly one of `local` or `github` must be configured.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourceConfig {
    pub local: Option<LocalSourceConfig>,
    pub github: Option<GithubSourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalSourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubSourceConfig {
    pub owner: String,
    pub repo: String,
    /// Path inside the repository to scan ("" = repository root).
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Environment variable holding the bearer token. Absence of the
    /// variable is not an error; anonymous access is permitted.
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// Minimum spacing between API calls in milliseconds (0 = unlimited).
    #[serde(default)]
    pub min_request_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_branch() -> String {
    "main".to_string()
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.py".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Registry name (`bart`, `flan-t5`, `codet5`) or a custom name when
    /// `kind` and `model` are given explicitly.
    #[serde(default = "default_backend_name")]
    pub name: String,
    /// Backend shape override: `"summarization"` or `"generation"`.
    #[serde(default)]
    pub kind: Option<String>,
    /// Model identifier override (e.g. `"facebook/bart-large-cnn"`).
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_backend_token_env")]
    pub token_env: String,
    /// Summary length hints forwarded to the backend. Hints, not guarantees.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: default_backend_name(),
            kind: None,
            model: None,
            url: default_backend_url(),
            token_env: default_backend_token_env(),
            max_length: default_max_length(),
            min_length: default_min_length(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend_name() -> String {
    "bart".to_string()
}
fn default_backend_url() -> String {
    "https://api-inference.huggingface.co/models".to_string()
}
fn default_backend_token_env() -> String {
    "HF_API_TOKEN".to_string()
}
fn default_max_length() -> usize {
    100
}
fn default_min_length() -> usize {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum measured chunk length under the active backend's token
    /// measurement. Must be > 0.
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConcurrencyConfig {
    /// Number of concurrent unit pipelines. 1 = strictly sequential.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum concurrent backend calls when `workers > 1`.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_workers() -> usize {
    1
}
fn default_max_in_flight() -> usize {
    4
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match (&config.source.local, &config.source.github) {
        (Some(_), Some(_)) => {
            anyhow::bail!("Configure exactly one source: both [source.local] and [source.github] are set")
        }
        (None, None) => {
            anyhow::bail!("No source configured: set [source.local] or [source.github]")
        }
        _ => {}
    }

    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    if config.backend.min_length > config.backend.max_length {
        anyhow::bail!(
            "backend.min_length ({}) must not exceed backend.max_length ({})",
            config.backend.min_length,
            config.backend.max_length
        );
    }

    if config.concurrency.workers == 0 {
        anyhow::bail!("concurrency.workers must be >= 1");
    }
    if config.concurrency.max_in_flight == 0 {
        anyhow::bail!("concurrency.max_in_flight must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Config {
        let config: Config = toml::from_str(toml_str).unwrap();
        config
    }

    #[test]
    fn test_minimal_local_config() {
        let config = parse(
            r#"
[source.local]
root = "./src"

[chunking]
max_tokens = 512
"#,
        );
        validate(&config).unwrap();
        let local = config.source.local.unwrap();
        assert_eq!(local.include_globs, vec!["**/*.py"]);
        assert!(!local.follow_symlinks);
        assert_eq!(config.backend.name, "bart");
        assert_eq!(config.backend.max_length, 100);
        assert_eq!(config.backend.min_length, 30);
        assert_eq!(config.concurrency.workers, 1);
    }

    #[test]
    fn test_github_defaults() {
        let config = parse(
            r#"
[source.github]
owner = "pypa"
repo = "sampleproject"

[chunking]
max_tokens = 256
"#,
        );
        validate(&config).unwrap();
        let gh = config.source.github.unwrap();
        assert_eq!(gh.branch, "main");
        assert_eq!(gh.path, "");
        assert_eq!(gh.token_env, "GITHUB_TOKEN");
        assert_eq!(gh.api_url, "https://api.github.com");
        assert_eq!(gh.min_request_interval_ms, 0);
    }

    #[test]
    fn test_both_sources_rejected() {
        let config = parse(
            r#"
[source.local]
root = "./src"

[source.github]
owner = "pypa"
repo = "sampleproject"

[chunking]
max_tokens = 512
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_no_source_rejected() {
        let config = parse(
            r#"
[source]

[chunking]
max_tokens = 512
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = parse(
            r#"
[source.local]
root = "./src"

[chunking]
max_tokens = 0
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_length_bounds_validated() {
        let config = parse(
            r#"
[source.local]
root = "./src"

[backend]
max_length = 20
min_length = 30

[chunking]
max_tokens = 512
"#,
        );
        assert!(validate(&config).is_err());
    }
}
