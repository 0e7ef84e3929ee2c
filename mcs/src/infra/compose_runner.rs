//! Compose invocation with legacy fallback
//!
//! Prefers the `docker compose` plugin and only falls back to the standalone
//! `docker-compose` binary when the plugin is missing.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::service::compose::COMPOSE_FILE;

/// Brings a codespace's compose project up and down
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComposeRunner: Send + Sync {
    /// `up -d`, building first when `build` is set
    async fn up(&self, project_dir: &Path, build: bool) -> Result<()>;

    async fn stop(&self, project_dir: &Path) -> Result<()>;
}

/// Outcome of one finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub success: bool,
    pub stderr: String,
}

/// Runs an external program to completion
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &str, args: Vec<String>, dir: &Path) -> Result<Invocation>;
}

/// Spawns real processes through tokio
#[derive(Debug, Clone, Default)]
pub struct SystemProcess;

#[async_trait]
impl ProcessRunner for SystemProcess {
    async fn run(&self, program: &str, args: Vec<String>, dir: &Path) -> Result<Invocation> {
        debug!("Running {} {} in {:?}", program, args.join(" "), dir);

        let output = Command::new(program)
            .args(&args)
            .current_dir(dir)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    Error::ComposeUnavailable(format!("{} not found on PATH", program))
                } else {
                    Error::ComposeFailed(e.to_string())
                }
            })?;

        Ok(Invocation {
            success: output.status.success(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Whether stderr shows the compose plugin is not installed
pub fn is_compose_missing(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("'compose' is not a docker command")
        || stderr.contains("unknown command: docker compose")
        || stderr.contains("unknown shorthand flag: 'f' in -f")
}

fn compose_args(prefix: &[&str], args: &[&str]) -> Vec<String> {
    prefix
        .iter()
        .chain(["-f", COMPOSE_FILE].iter())
        .chain(args)
        .map(|a| a.to_string())
        .collect()
}

/// Runs compose through the docker CLI
pub struct DockerCompose {
    process: Arc<dyn ProcessRunner>,
}

impl DockerCompose {
    pub fn new() -> Self {
        Self::with_process(Arc::new(SystemProcess))
    }

    pub fn with_process(process: Arc<dyn ProcessRunner>) -> Self {
        Self { process }
    }

    async fn run(&self, project_dir: &Path, args: &[&str]) -> Result<()> {
        let modern = self
            .process
            .run("docker", compose_args(&["compose"], args), project_dir)
            .await?;
        if modern.success {
            return Ok(());
        }
        if !is_compose_missing(&modern.stderr) {
            return Err(Error::ComposeFailed(modern.stderr));
        }

        warn!("docker compose plugin not available, falling back to docker-compose");
        let legacy = self
            .process
            .run("docker-compose", compose_args(&[], args), project_dir)
            .await?;
        if legacy.success {
            Ok(())
        } else {
            Err(Error::ComposeFailed(legacy.stderr))
        }
    }
}

impl Default for DockerCompose {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComposeRunner for DockerCompose {
    async fn up(&self, project_dir: &Path, build: bool) -> Result<()> {
        let args: &[&str] = if build {
            &["up", "-d", "--build"]
        } else {
            &["up", "-d"]
        };
        self.run(project_dir, args).await?;
        info!("Compose project in {:?} is up", project_dir);
        Ok(())
    }

    async fn stop(&self, project_dir: &Path) -> Result<()> {
        self.run(project_dir, &["stop"]).await?;
        info!("Compose project in {:?} stopped", project_dir);
        Ok(())
    }
}
