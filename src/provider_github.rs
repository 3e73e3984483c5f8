//! GitHub source provider.
//!
//! Lists and fetches repository files through the GitHub contents API,
//! scoped by owner/repo, path, and branch. Directory recursion uses an
//! explicit worklist rather than self-recursive calls, so arbitrarily deep
//! trees cannot exhaust the stack and listings are easy to fake in tests.
//!
//! # Authentication
//!
//! An optional bearer token is read from the environment variable named by
//! `token_env` (default `GITHUB_TOKEN`) and attached to every call. Its
//! absence is not an error; anonymous access is subject to GitHub's own
//! rate limits.
//!
//! # Errors
//!
//! Any non-success response surfaces the HTTP status code and the response
//! body verbatim in a [`Error::SourceAccess`]. A failure to list the
//! configured root path is fatal to the run; a failure to fetch one file is
//! scoped to that unit.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::GithubSourceConfig;
use crate::error::{Error, Result};
use crate::models::SourceUnit;
use crate::provider::SourceProvider;

pub struct GithubProvider {
    name: String,
    config: GithubSourceConfig,
    client: reqwest::Client,
    token: Option<String>,
    include_set: GlobSet,
    exclude_set: GlobSet,
    /// Timestamp of the last API call, for minimum-interval rate limiting
    /// shared across concurrent fetches.
    last_request: Mutex<Option<Instant>>,
}

/// One entry of a contents API listing (or a single fetched file).
#[derive(Debug, Deserialize)]
struct ContentEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
    content: Option<String>,
    encoding: Option<String>,
    html_url: Option<String>,
}

impl GithubProvider {
    pub fn new(config: GithubSourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("codebrief/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        let token = std::env::var(&config.token_env).ok();
        if token.is_none() {
            log::info!(
                "{} not set; using anonymous GitHub access",
                config.token_env
            );
        }

        let include_set = build_globset(&config.include_globs)?;
        let exclude_set = build_globset(&config.exclude_globs)?;

        Ok(Self {
            name: format!("{}/{}", config.owner, config.repo),
            config,
            client,
            token,
            include_set,
            exclude_set,
            last_request: Mutex::new(None),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.config.api_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            path,
            self.config.branch
        )
    }

    /// Enforce the configured minimum spacing between API calls.
    async fn throttle(&self) {
        if self.config.min_request_interval_ms == 0 {
            return;
        }
        let interval = Duration::from_millis(self.config.min_request_interval_ms);
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let due = prev + interval;
            let now = Instant::now();
            if due > now {
                tokio::time::sleep(due - now).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get(&self, url: &str, context: &str) -> Result<String> {
        self.throttle().await;

        let mut req = self.client.get(url);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::source_access(format!("{}: {}", context, e)))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Error::http(context, status.as_u16(), &body));
        }
        Ok(body)
    }

    /// Whether a repository path passes the include/exclude globs, matched
    /// relative to the configured scan path.
    fn matches(&self, repo_path: &str) -> bool {
        let rel = strip_scan_prefix(repo_path, &self.config.path);
        !self.exclude_set.is_match(rel) && self.include_set.is_match(rel)
    }
}

#[async_trait]
impl SourceProvider for GithubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_label(&self) -> &str {
        "github"
    }

    async fn list(&self) -> Result<Vec<SourceUnit>> {
        let mut units = Vec::new();

        // Iterative worklist: directories are pushed onto an explicit queue
        // instead of recursing.
        let mut pending: VecDeque<String> = VecDeque::new();
        pending.push_back(self.config.path.clone());

        while let Some(dir) = pending.pop_front() {
            let url = self.contents_url(&dir);
            let context = format!(
                "GitHub listing failed for {}/{}",
                self.name, dir
            );
            let body = self.get(&url, &context).await?;
            let entries = parse_listing(&body)?;

            for entry in entries {
                match entry.entry_type.as_str() {
                    "file" => {
                        if self.matches(&entry.path) {
                            units.push(SourceUnit {
                                source: "github".to_string(),
                                path: entry.path,
                                url: entry.html_url,
                            });
                        }
                    }
                    "dir" => pending.push_back(entry.path),
                    other => {
                        // Submodules and symlinks are not summarizable text.
                        log::debug!("skipping {} entry: {}", other, entry.path);
                    }
                }
            }
        }

        units.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(units)
    }

    async fn fetch(&self, unit: &SourceUnit) -> Result<String> {
        let url = self.contents_url(&unit.path);
        let context = format!("GitHub fetch failed for {}", unit.path);
        let body = self.get(&url, &context).await?;

        let entry: ContentEntry = serde_json::from_str(&body).map_err(|e| {
            Error::source_access(format!("malformed content response for {}: {}", unit.path, e))
        })?;

        if entry.entry_type != "file" {
            return Err(Error::source_access(format!(
                "{} is not a file (type: {})",
                unit.path, entry.entry_type
            )));
        }

        decode_content(&entry, &unit.path)
    }
}

/// Parse a contents API response body into entries.
///
/// Listing a directory yields a JSON array; listing a path that is itself a
/// file yields a single object. Both shapes are accepted.
fn parse_listing(body: &str) -> Result<Vec<ContentEntry>> {
    if let Ok(entries) = serde_json::from_str::<Vec<ContentEntry>>(body) {
        return Ok(entries);
    }
    serde_json::from_str::<ContentEntry>(body)
        .map(|e| vec![e])
        .map_err(|e| Error::source_access(format!("malformed listing response: {}", e)))
}

/// Decode a transport-encoded content blob into text.
///
/// GitHub encodes file content as base64 with embedded newlines.
fn decode_content(entry: &ContentEntry, path: &str) -> Result<String> {
    let raw = entry
        .content
        .as_ref()
        .ok_or_else(|| Error::source_access(format!("no content returned for {}", path)))?;

    match entry.encoding.as_deref() {
        Some("base64") => {
            let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD.decode(compact.as_bytes()).map_err(|e| {
                Error::source_access(format!("base64 decode failed for {}: {}", path, e))
            })?;
            String::from_utf8(bytes).map_err(|e| {
                Error::source_access(format!("{} is not valid UTF-8: {}", path, e))
            })
        }
        Some("none") | None => Ok(raw.clone()),
        Some(other) => Err(Error::source_access(format!(
            "unsupported content encoding '{}' for {}",
            other, path
        ))),
    }
}

/// Strip the configured scan path prefix so globs match relative paths.
fn strip_scan_prefix<'a>(repo_path: &'a str, scan_path: &str) -> &'a str {
    if scan_path.is_empty() {
        return repo_path;
    }
    let prefix = scan_path.trim_end_matches('/');
    repo_path
        .strip_prefix(prefix)
        .map(|s| s.trim_start_matches('/'))
        .unwrap_or(repo_path)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern)
                .map_err(|e| Error::Config(format!("invalid glob '{}': {}", pattern, e)))?,
        );
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("invalid glob set: {}", e)))
}
