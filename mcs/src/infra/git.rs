//! Fetching repository sources

use std::path::Path;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::info;

use crate::error::{Error, Result};

/// Places a repository's source tree at a destination directory
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Shallow clone through the git CLI
#[derive(Debug, Clone, Default)]
pub struct GitCloner;

#[async_trait]
impl SourceProvider for GitCloner {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Cloning {} into {:?}", url, dest);

        let output = Command::new("git")
            .args(["clone", "--depth", "1", url])
            .arg(dest)
            .output()
            .await
            .map_err(|e| Error::SourceFetchFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::SourceFetchFailed {
                url: url.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Guess the primary language of a source tree from marker files
pub fn detect_language(source: &Path) -> Option<&'static str> {
    const MARKERS: &[(&str, &str)] = &[
        ("go.mod", "go"),
        ("requirements.txt", "python"),
        ("pyproject.toml", "python"),
        ("setup.py", "python"),
        ("Cargo.toml", "rust"),
        ("pom.xml", "java"),
        ("build.gradle", "java"),
        ("composer.json", "php"),
        ("Gemfile", "ruby"),
        ("package.json", "node"),
    ];

    MARKERS
        .iter()
        .find(|(file, _)| source.join(file).exists())
        .map(|(_, lang)| *lang)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language_markers() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_language(dir.path()), None);

        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(detect_language(dir.path()), Some("node"));

        // A backend marker wins over package.json used for frontend tooling
        std::fs::write(dir.path().join("pyproject.toml"), "").unwrap();
        assert_eq!(detect_language(dir.path()), Some("python"));
    }
}
