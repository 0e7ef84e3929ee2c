//! Codespace domain model

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::component::Component;

/// Suffix appended to a codespace name to form its container name
pub const CONTAINER_SUFFIX: &str = "-dev";

/// Container name for a codespace
pub fn container_name(codespace: &str) -> String {
    format!("{}{}", codespace, CONTAINER_SUFFIX)
}

/// Live status as reported by the container engine
///
/// Never persisted; recomputed on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodespaceStatus {
    /// Directory exists, no container has been created
    Created,
    Running,
    Stopped,
    Restarting,
    Paused,
    /// Engine unreachable or reported something unexpected
    Unknown,
}

impl CodespaceStatus {
    /// Map an engine state string; `None` means no container exists
    pub fn from_engine_state(state: Option<&str>) -> Self {
        match state {
            None => CodespaceStatus::Created,
            Some("running") => CodespaceStatus::Running,
            Some("exited") | Some("created") | Some("dead") => CodespaceStatus::Stopped,
            Some("restarting") => CodespaceStatus::Restarting,
            Some("paused") => CodespaceStatus::Paused,
            Some(_) => CodespaceStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CodespaceStatus::Created => "created",
            CodespaceStatus::Running => "running",
            CodespaceStatus::Stopped => "stopped",
            CodespaceStatus::Restarting => "restarting",
            CodespaceStatus::Paused => "paused",
            CodespaceStatus::Unknown => "unknown",
        }
    }

    /// Lifecycle state this status corresponds to
    pub fn lifecycle(&self) -> LifecycleState {
        match self {
            CodespaceStatus::Created => LifecycleState::Created,
            CodespaceStatus::Running | CodespaceStatus::Restarting => LifecycleState::Running,
            CodespaceStatus::Stopped | CodespaceStatus::Paused | CodespaceStatus::Unknown => {
                LifecycleState::Stopped
            }
        }
    }
}

/// Lifecycle state machine of a codespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Absent,
    Created,
    Running,
    Stopped,
    Removed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Absent => "absent",
            LifecycleState::Created => "created",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Removed => "removed",
        }
    }

    /// Check whether a transition is allowed
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        match (self, next) {
            (LifecycleState::Absent, LifecycleState::Created) => true,
            // Start
            (LifecycleState::Created, LifecycleState::Running) => true,
            (LifecycleState::Stopped, LifecycleState::Running) => true,
            (LifecycleState::Running, LifecycleState::Running) => true,
            // Stop
            (LifecycleState::Running, LifecycleState::Stopped) => true,
            (LifecycleState::Stopped, LifecycleState::Stopped) => true,
            (LifecycleState::Created, LifecycleState::Stopped) => true,
            // Remove
            (LifecycleState::Created, LifecycleState::Removed) => true,
            (LifecycleState::Running, LifecycleState::Removed) => true,
            (LifecycleState::Stopped, LifecycleState::Removed) => true,
            // Removed is terminal, nothing else allowed
            _ => false,
        }
    }
}

/// Codespace entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Codespace {
    /// Unique name, also the directory name
    pub name: String,

    /// Repository the source tree was cloned from
    pub repository: String,

    /// Directory under the codespaces root
    pub path: PathBuf,

    /// Live status, filled in on read
    #[serde(skip, default = "unknown_status")]
    pub status: CodespaceStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    pub vscode_url: String,

    pub app_url: String,

    pub password: String,

    /// Selected components only
    pub components: Vec<Component>,

    /// Detected or requested language tag
    pub language: String,
}

fn unknown_status() -> CodespaceStatus {
    CodespaceStatus::Unknown
}

impl Codespace {
    pub fn container_name(&self) -> String {
        container_name(&self.name)
    }

    /// Host port of the editor, parsed back from its URL
    pub fn vscode_port(&self) -> Option<u16> {
        port_of(&self.vscode_url)
    }

    /// Host port of the application, parsed back from its URL
    pub fn app_port(&self) -> Option<u16> {
        port_of(&self.app_url)
    }
}

fn port_of(url: &str) -> Option<u16> {
    url.rsplit(':').next()?.trim_end_matches('/').parse().ok()
}

/// Parameters for creating a codespace
#[derive(Debug, Clone, Default)]
pub struct CreateCodespaceParams {
    /// Repository reference (`owner/repo` or URL)
    pub repository: String,

    /// Language override; detected from the source tree when unset
    pub language: Option<String>,

    /// Component ids to install
    pub components: Vec<String>,

    /// Extra environment variables for the container
    pub env: std::collections::BTreeMap<String, String>,

    /// Start the container after writing the artifacts
    pub start: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_engine_state() {
        assert_eq!(CodespaceStatus::from_engine_state(None), CodespaceStatus::Created);
        assert_eq!(
            CodespaceStatus::from_engine_state(Some("running")),
            CodespaceStatus::Running
        );
        assert_eq!(
            CodespaceStatus::from_engine_state(Some("exited")),
            CodespaceStatus::Stopped
        );
        assert_eq!(
            CodespaceStatus::from_engine_state(Some("removing")),
            CodespaceStatus::Unknown
        );
    }

    #[test]
    fn test_removed_is_terminal() {
        for next in [
            LifecycleState::Absent,
            LifecycleState::Created,
            LifecycleState::Running,
            LifecycleState::Stopped,
            LifecycleState::Removed,
        ] {
            assert!(!LifecycleState::Removed.can_transition_to(next));
        }
    }

    #[test]
    fn test_absent_only_to_created() {
        assert!(LifecycleState::Absent.can_transition_to(LifecycleState::Created));
        assert!(!LifecycleState::Absent.can_transition_to(LifecycleState::Running));
        assert!(!LifecycleState::Absent.can_transition_to(LifecycleState::Removed));
    }

    #[test]
    fn test_container_name_and_ports() {
        let cs = Codespace {
            name: "facebook-react".into(),
            repository: "https://github.com/facebook/react.git".into(),
            path: PathBuf::from("/tmp/facebook-react"),
            status: CodespaceStatus::Created,
            created_at: Utc::now(),
            vscode_url: "http://localhost:8081".into(),
            app_url: "http://localhost:3001".into(),
            password: "secret".into(),
            components: vec![],
            language: "node".into(),
        };
        assert_eq!(cs.container_name(), "facebook-react-dev");
        assert_eq!(cs.vscode_port(), Some(8081));
        assert_eq!(cs.app_port(), Some(3001));
    }

    #[test]
    fn test_status_not_persisted() {
        let json = r#"{
            "name": "a-b",
            "repository": "https://github.com/a/b.git",
            "path": "/tmp/a-b",
            "created_at": "2026-01-01T00:00:00Z",
            "vscode_url": "http://localhost:8080",
            "app_url": "http://localhost:3000",
            "password": "pw",
            "components": [],
            "language": "go"
        }"#;
        let cs: Codespace = serde_json::from_str(json).unwrap();
        assert_eq!(cs.status, CodespaceStatus::Unknown);
        assert!(!serde_json::to_string(&cs).unwrap().contains("status"));
    }
}
