//! Backup domain model

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Format of the timestamp embedded in a backup id
const ID_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S%3f";

/// Why a backup was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    /// Taken automatically before a codespace is removed
    Destroy,
    /// Taken before an install or upgrade overwrites files
    Install,
    /// Requested explicitly
    Manual,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Destroy => "destroy",
            BackupType::Install => "install",
            BackupType::Manual => "manual",
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "destroy" => Ok(BackupType::Destroy),
            "install" => Ok(BackupType::Install),
            "manual" => Ok(BackupType::Manual),
            other => Err(Error::InvalidParameter(format!("unknown backup type: {}", other))),
        }
    }
}

/// Build a backup id from its type and creation time
pub fn backup_id(kind: BackupType, at: DateTime<Utc>) -> String {
    format!("{}-{}", kind, at.format(ID_TIMESTAMP_FORMAT))
}

/// Recover the type and creation time embedded in a backup id
///
/// Ids may carry a trailing `-<n>` disambiguator.
pub fn parse_backup_id(id: &str) -> Option<(BackupType, DateTime<Utc>)> {
    let (kind, rest) = id.split_once('-')?;
    let kind = kind.parse().ok()?;
    // "YYYYMMDD-HHMMSSmmm" is 18 characters
    let stamp = rest.get(..18)?;
    let naive = NaiveDateTime::parse_from_str(stamp, ID_TIMESTAMP_FORMAT).ok()?;
    Some((kind, Utc.from_utc_datetime(&naive)))
}

/// Metadata recorded next to every backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BackupType,
    pub timestamp: DateTime<Utc>,
    pub source_path: PathBuf,
    /// Total size of copied files in bytes
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
