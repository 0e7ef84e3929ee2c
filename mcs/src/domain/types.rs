//! Common domain types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Snapshot of a live container as reported by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    /// Engine-reported names, each with a leading slash
    pub names: Vec<String>,
    pub image: String,
    pub labels: HashMap<String, String>,
    /// Engine state string (`running`, `exited`, ...)
    pub state: String,
}

impl ContainerInfo {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    /// Name without the leading slash, falling back to the id
    pub fn display_name(&self) -> &str {
        self.names
            .first()
            .map(|n| n.trim_start_matches('/'))
            .unwrap_or(&self.id)
    }
}

/// Snapshot of a local image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub labels: HashMap<String, String>,
}

/// A parsed repository reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
    /// URL handed to `git clone`
    pub url: String,
}

impl RepoRef {
    /// Parse `owner/repo`, an HTTP(S) URL or an SCP-style SSH reference
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = || Error::InvalidRepository(input.to_string());

        if input.is_empty() || input.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let (path, url) = if let Some(rest) = input.strip_prefix("git@") {
            let (_, path) = rest.split_once(':').ok_or_else(invalid)?;
            (path, input.to_string())
        } else if let Some((_, rest)) = input.split_once("://") {
            let (_, path) = rest.split_once('/').ok_or_else(invalid)?;
            (path, input.to_string())
        } else if input.matches('/').count() == 1 {
            let shorthand = input.trim_end_matches(".git");
            (input, format!("https://github.com/{}.git", shorthand))
        } else {
            return Err(invalid());
        };

        let path = path.trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        let mut segments = path.rsplit('/');
        let repo = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let owner = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            url,
        })
    }
}
