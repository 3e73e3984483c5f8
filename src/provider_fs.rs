//! Local filesystem source provider.
//!
//! Recursively walks a root directory, filtering files by include/exclude
//! globs (default `**/*.py`), and produces unit descriptors in sorted,
//! deterministic order. Fetch reads the file; an unreadable file surfaces as
//! a per-unit failure, a missing root as a fatal listing failure.

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::LocalSourceConfig;
use crate::error::{Error, Result};
use crate::models::SourceUnit;
use crate::provider::SourceProvider;

pub struct LocalProvider {
    name: String,
    config: LocalSourceConfig,
    include_set: GlobSet,
    exclude_set: GlobSet,
}

impl LocalProvider {
    pub fn new(config: LocalSourceConfig) -> Result<Self> {
        let include_set = build_globset(&config.include_globs)?;

        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/__pycache__/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(config.exclude_globs.clone());
        let exclude_set = build_globset(&default_excludes)?;

        Ok(Self {
            name: config.root.display().to_string(),
            config,
            include_set,
            exclude_set,
        })
    }
}

#[async_trait]
impl SourceProvider for LocalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_label(&self) -> &str {
        "filesystem"
    }

    async fn list(&self) -> Result<Vec<SourceUnit>> {
        let root = &self.config.root;
        if !root.exists() {
            return Err(Error::source_access(format!(
                "root does not exist: {}",
                root.display()
            )));
        }

        let mut units = Vec::new();

        let walker = WalkDir::new(root).follow_links(self.config.follow_symlinks);
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    // Unreadable subdirectories are skipped, not fatal.
                    log::warn!("skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if self.exclude_set.is_match(&rel_str) {
                continue;
            }
            if !self.include_set.is_match(&rel_str) {
                continue;
            }

            units.push(SourceUnit {
                source: "filesystem".to_string(),
                path: rel_str,
                url: Some(format!("file://{}", path.display())),
            });
        }

        // Sort for deterministic ordering
        units.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(units)
    }

    async fn fetch(&self, unit: &SourceUnit) -> Result<String> {
        let path = self.config.root.join(&unit.path);
        std::fs::read_to_string(&path).map_err(|e| {
            Error::source_access(format!("failed to read {}: {}", path.display(), e))
        })
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn provider_for(root: &std::path::Path) -> LocalProvider {
        LocalProvider::new(LocalSourceConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.py".to_string()],
            exclude_globs: vec![],
            follow_symlinks: false,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("pkg")).unwrap();
        fs::write(tmp.path().join("zeta.py"), "x = 1\n").unwrap();
        fs::write(tmp.path().join("alpha.py"), "y = 2\n").unwrap();
        fs::write(tmp.path().join("notes.txt"), "not python").unwrap();
        fs::write(tmp.path().join("pkg/mod.py"), "z = 3\n").unwrap();

        let provider = provider_for(tmp.path());
        let units = provider.list().await.unwrap();

        let paths: Vec<&str> = units.iter().map(|u| u.path.as_str()).collect();
        assert_eq!(paths, vec!["alpha.py", "pkg/mod.py", "zeta.py"]);
        assert!(units.iter().all(|u| u.source == "filesystem"));
    }

    #[tokio::test]
    async fn test_missing_root_is_source_access_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("no-such-dir");
        let provider = provider_for(&missing);

        let err = provider.list().await.unwrap_err();
        assert!(matches!(err, Error::SourceAccess { .. }));
    }

    #[tokio::test]
    async fn test_fetch_reads_content() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.py"), "def f():\n    pass\n").unwrap();

        let provider = provider_for(tmp.path());
        let units = provider.list().await.unwrap();
        let text = provider.fetch(&units[0]).await.unwrap();
        assert_eq!(text, "def f():\n    pass\n");
    }

    #[tokio::test]
    async fn test_fetch_missing_file_is_per_unit_failure() {
        let tmp = TempDir::new().unwrap();
        let provider = provider_for(tmp.path());
        let unit = SourceUnit {
            source: "filesystem".to_string(),
            path: "ghost.py".to_string(),
            url: None,
        };
        let err = provider.fetch(&unit).await.unwrap_err();
        assert!(matches!(err, Error::SourceAccess { .. }));
    }

    #[tokio::test]
    async fn test_exclude_globs_applied() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("__pycache__")).unwrap();
        fs::write(tmp.path().join("__pycache__/cached.py"), "x = 1\n").unwrap();
        fs::write(tmp.path().join("real.py"), "y = 2\n").unwrap();

        let provider = provider_for(tmp.path());
        let units = provider.list().await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].path, "real.py");
    }
}
