//! Source provider abstraction.
//!
//! A [`SourceProvider`] enumerates source units from one origin and fetches
//! their raw text. Two built-in providers exist: the local filesystem
//! ([`LocalProvider`](crate::provider_fs::LocalProvider)) and GitHub
//! ([`GithubProvider`](crate::provider_github::GithubProvider)). The
//! orchestrator depends only on this trait, so tests can inject fake
//! listings.

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::SourceUnit;

/// A source of summarizable units.
///
/// # Contract
///
/// - [`list`](SourceProvider::list) returns unit descriptors in a sorted,
///   deterministic order (lexicographic by path). A listing failure is fatal
///   to the run.
/// - [`fetch`](SourceProvider::fetch) returns one unit's decoded text. A
///   fetch failure is scoped to that unit.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Instance name (e.g. the local root or `"owner/repo"`).
    fn name(&self) -> &str;

    /// Source type label (`"filesystem"` or `"github"`), used to tag units.
    fn source_label(&self) -> &str;

    /// Enumerate all units in deterministic (lexicographic path) order.
    async fn list(&self) -> Result<Vec<SourceUnit>>;

    /// Fetch the raw text of one unit.
    async fn fetch(&self, unit: &SourceUnit) -> Result<String>;
}

/// Create the configured [`SourceProvider`].
///
/// Exactly one source must be configured (validated at config load time).
pub fn create_provider(config: &Config) -> Result<Box<dyn SourceProvider>> {
    use crate::provider_fs::LocalProvider;
    use crate::provider_github::GithubProvider;

    if let Some(ref local) = config.source.local {
        return Ok(Box::new(LocalProvider::new(local.clone())?));
    }
    if let Some(ref github) = config.source.github {
        return Ok(Box::new(GithubProvider::new(github.clone())?));
    }
    Err(Error::Config(
        "no source configured: set [source.local] or [source.github]".to_string(),
    ))
}
