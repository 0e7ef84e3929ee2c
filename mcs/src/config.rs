//! Manager configuration

use std::net::IpAddr;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Manager configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for everything the manager writes
    pub home_dir: PathBuf,

    /// Directory holding one subdirectory per codespace
    pub codespaces_dir: PathBuf,

    /// Directory holding one subdirectory per backup
    pub backups_dir: PathBuf,

    /// Directory searched for custom `Dockerfile.<variant>` build files
    pub dockerfiles_dir: PathBuf,

    /// Docker socket path (local defaults when unset)
    pub docker_socket: Option<String>,

    /// External network shared by all codespace containers
    pub network_name: String,

    /// Host address used when building editor and app URLs
    pub host_ip: String,

    /// First host port tried for the editor
    pub vscode_base_port: u16,

    /// First host port tried for the application
    pub app_base_port: u16,

    /// Snapshot a codespace before removing it
    pub backup_before_destroy: bool,

    /// Number of backups kept by the retention pass after a destroy
    pub backup_keep: usize,
}

fn default_home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcs")
}

fn default_codespaces_dir() -> PathBuf {
    default_home_dir().join("codespaces")
}

fn default_backups_dir() -> PathBuf {
    default_home_dir().join("backups")
}

fn default_dockerfiles_dir() -> PathBuf {
    default_home_dir().join("dockerfiles")
}

fn default_network_name() -> String {
    "mcs-network".to_string()
}

fn default_host_ip() -> String {
    "localhost".to_string()
}

fn default_vscode_base_port() -> u16 {
    8080
}

fn default_app_base_port() -> u16 {
    3000
}

fn default_backup_before_destroy() -> bool {
    true
}

fn default_backup_keep() -> usize {
    5
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("MCS_HOME") {
            Some(home) => Config::with_home(PathBuf::from(home)),
            None => Config::default(),
        };

        if let Some(val) = lookup("MCS_CODESPACES_DIR") {
            config.codespaces_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("MCS_BACKUPS_DIR") {
            config.backups_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("MCS_DOCKERFILES_DIR") {
            config.dockerfiles_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("MCS_DOCKER_SOCKET") {
            config.docker_socket = Some(val);
        }
        if let Some(val) = lookup("MCS_NETWORK") {
            config.network_name = val;
        }
        if let Some(val) = lookup("MCS_HOST_IP") {
            config.host_ip = val;
        }
        if let Some(val) = lookup("MCS_VSCODE_PORT") {
            if let Ok(port) = val.parse() {
                config.vscode_base_port = port;
            }
        }
        if let Some(val) = lookup("MCS_APP_PORT") {
            if let Ok(port) = val.parse() {
                config.app_base_port = port;
            }
        }
        if let Some(val) = lookup("MCS_BACKUP_BEFORE_DESTROY") {
            config.backup_before_destroy = !matches!(val.as_str(), "0" | "false" | "no");
        }
        if let Some(val) = lookup("MCS_BACKUP_KEEP") {
            if let Ok(keep) = val.parse() {
                config.backup_keep = keep;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Configuration rooted at `home`, all other values defaulted
    pub fn with_home(home: PathBuf) -> Self {
        Self {
            codespaces_dir: home.join("codespaces"),
            backups_dir: home.join("backups"),
            dockerfiles_dir: home.join("dockerfiles"),
            home_dir: home,
            ..Config::default()
        }
    }

    /// Reject values that would produce unusable URLs or mappings
    pub fn validate(&self) -> Result<()> {
        if self.host_ip != "localhost" && self.host_ip.parse::<IpAddr>().is_err() {
            return Err(Error::InvalidAddress(self.host_ip.clone()));
        }
        if self.network_name.trim().is_empty() {
            return Err(Error::InvalidParameter(
                "network name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Browser URL for a host port, bracketing IPv6 hosts
    pub fn host_url(&self, port: u16) -> String {
        match self.host_ip.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("http://[{}]:{}", ip, port),
            _ => format!("http://{}:{}", self.host_ip, port),
        }
    }

    /// Directory of a single codespace
    pub fn codespace_dir(&self, name: &str) -> PathBuf {
        self.codespaces_dir.join(name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            codespaces_dir: default_codespaces_dir(),
            backups_dir: default_backups_dir(),
            dockerfiles_dir: default_dockerfiles_dir(),
            docker_socket: None,
            network_name: default_network_name(),
            host_ip: default_host_ip(),
            vscode_base_port: default_vscode_base_port(),
            app_base_port: default_app_base_port(),
            backup_before_destroy: default_backup_before_destroy(),
            backup_keep: default_backup_keep(),
        }
    }
}
