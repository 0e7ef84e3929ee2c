//! Command line surface

pub mod confirm;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::domain::backup::{BackupInfo, BackupType};
use crate::domain::codespace::{Codespace, CreateCodespaceParams};
use crate::domain::component::builtin_components;
use crate::error::{Error, Result};
use crate::infra::compose_runner::DockerCompose;
use crate::infra::docker::{ContainerEngine, DockerManager};
use crate::infra::git::GitCloner;
use crate::service::backup::BackupService;
use crate::service::codespace::{CodespaceService, RemoveOptions};
use crate::service::compose;
use crate::service::resources::{BulkReport, ResourceService};

use self::confirm::confirm;

#[derive(Debug, Parser)]
#[command(name = "mcs", version, about = "Manage container-backed codespaces")]
pub struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a codespace from a repository
    Create {
        /// `owner/repo`, HTTPS URL or SSH reference
        repository: String,
        /// Override the detected language
        #[arg(long)]
        language: Option<String>,
        /// Component to install (repeatable)
        #[arg(short, long = "component")]
        components: Vec<String>,
        /// Extra container variable as KEY=VALUE (repeatable)
        #[arg(short, long = "env", value_parser = parse_env)]
        env: Vec<(String, String)>,
        /// Only write the files, do not start the container
        #[arg(long)]
        no_start: bool,
    },
    /// Start a codespace
    Start { name: String },
    /// Stop a codespace
    Stop { name: String },
    /// Restart a codespace
    Restart { name: String },
    /// Remove a codespace and its container
    Remove {
        name: String,
        #[arg(short, long)]
        yes: bool,
        /// Skip the automatic backup
        #[arg(long)]
        no_backup: bool,
    },
    /// List codespaces
    List,
    /// Show one codespace, or a summary of everything managed
    Status { name: Option<String> },
    /// Remove all managed containers
    Cleanup {
        /// Also remove managed images
        #[arg(long)]
        images: bool,
        #[arg(short, long)]
        yes: bool,
    },
    /// Remove every codespace, managed container, image and the shared network
    Destroy {
        #[arg(short, long)]
        yes: bool,
        #[arg(long)]
        no_backup: bool,
    },
    /// List installable components
    Components,
    /// Manage backups
    #[command(subcommand)]
    Backup(BackupCommand),
}

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Back up a directory
    Create {
        path: PathBuf,
        #[arg(long = "type", default_value = "manual")]
        kind: BackupType,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List backups, newest first
    List,
    /// Restore a backup
    Restore {
        id: String,
        /// Directory to restore into (defaults to the original parent)
        #[arg(long)]
        target: Option<PathBuf>,
        /// Overwrite existing entries
        #[arg(short, long)]
        force: bool,
    },
    /// Delete a backup
    Delete {
        id: String,
        #[arg(short, long)]
        yes: bool,
    },
    /// Keep only the newest backups
    Cleanup {
        #[arg(long, default_value_t = 5)]
        keep: usize,
        /// Show what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_env(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))?;
    compose::check_env_var(key, value).map_err(|e| e.to_string())?;
    Ok((key.to_string(), value.to_string()))
}

/// Services wired for one invocation
struct App {
    config: Arc<Config>,
    engine: Arc<dyn ContainerEngine>,
    codespaces: CodespaceService,
    resources: ResourceService,
    backups: Arc<BackupService>,
}

impl App {
    fn new(config: Arc<Config>) -> Result<Self> {
        let engine: Arc<dyn ContainerEngine> =
            Arc::new(DockerManager::new(config.docker_socket.as_deref())?);
        let backups = Arc::new(BackupService::new(config.backups_dir.clone()));
        let codespaces = CodespaceService::new(
            config.clone(),
            engine.clone(),
            Arc::new(DockerCompose::new()),
            Arc::new(GitCloner),
            backups.clone(),
        );
        Ok(Self {
            resources: ResourceService::new(engine.clone()),
            config,
            engine,
            codespaces,
            backups,
        })
    }
}

/// Execute one command
pub async fn run(cli: Cli, config: Arc<Config>) -> Result<()> {
    let app = App::new(config)?;

    match cli.command {
        Command::Create {
            repository,
            language,
            components,
            env,
            no_start,
        } => {
            let params = CreateCodespaceParams {
                repository,
                language,
                components,
                env: env.into_iter().collect::<BTreeMap<_, _>>(),
                start: !no_start,
            };
            if params.start {
                app.engine.ping().await?;
            }
            let codespace = app.codespaces.create(params).await?;
            println!("Created codespace {}", codespace.name);
            print_details(&codespace);
        }
        Command::Start { name } => {
            app.codespaces.start(&name).await?;
            let codespace = app.codespaces.get(&name).await?;
            println!("Started {}: {}", name, codespace.vscode_url);
        }
        Command::Stop { name } => {
            app.codespaces.stop(&name).await?;
            println!("Stopped {}", name);
        }
        Command::Restart { name } => {
            app.codespaces.restart(&name).await?;
            println!("Restarted {}", name);
        }
        Command::Remove {
            name,
            yes,
            no_backup,
        } => {
            app.codespaces.get(&name).await?;
            if !confirm(&format!("Remove codespace {} and its data?", name), yes) {
                return Err(Error::Cancelled);
            }
            let backup = app.config.backup_before_destroy && !no_backup;
            app.codespaces.remove(&name, RemoveOptions { backup }).await?;
            println!("Removed {}", name);
        }
        Command::List => {
            let codespaces = app.codespaces.list().await?;
            if codespaces.is_empty() {
                println!("No codespaces");
            }
            for c in codespaces {
                println!(
                    "{:<40} {:<10} {:<8} {}",
                    c.name,
                    c.status.as_str(),
                    c.language,
                    c.vscode_url
                );
            }
        }
        Command::Status { name: Some(name) } => {
            print_details(&app.codespaces.get(&name).await?);
        }
        Command::Status { name: None } => {
            let codespaces = app.codespaces.list().await?;
            let counts = app.resources.summary().await?;
            println!("Codespaces:         {}", codespaces.len());
            println!(
                "Managed containers: {} ({} running)",
                counts.containers, counts.running
            );
            println!("Managed images:     {}", counts.images);
        }
        Command::Cleanup { images, yes } => {
            if !confirm("Stop and remove all managed containers?", yes) {
                return Err(Error::Cancelled);
            }
            let mut report = app.resources.cleanup_containers().await?;
            if images {
                report.merge(app.resources.cleanup_images().await?);
            }
            print_report(&report);
            report.ensure_success()?;
        }
        Command::Destroy { yes, no_backup } => {
            if !confirm("Remove ALL codespaces, containers and images?", yes) {
                return Err(Error::Cancelled);
            }
            let backup = app.config.backup_before_destroy && !no_backup;
            let mut report = app.codespaces.remove_all(RemoveOptions { backup }).await?;
            report.merge(app.resources.cleanup_containers().await?);
            report.merge(app.resources.cleanup_images().await?);
            let network = app.engine.remove_network(&app.config.network_name).await;
            report.record(format!("network {}", app.config.network_name), network);
            print_report(&report);
            report.ensure_success()?;
        }
        Command::Components => {
            for c in builtin_components() {
                let requires = if c.requires.is_empty() {
                    "-".to_string()
                } else {
                    c.requires.join(", ")
                };
                println!("{:<14} {:<40} requires: {}", c.id, c.description, requires);
            }
        }
        Command::Backup(command) => run_backup(&app, command).await?,
    }

    Ok(())
}

async fn run_backup(app: &App, command: BackupCommand) -> Result<()> {
    match command {
        BackupCommand::Create {
            path,
            kind,
            description,
        } => {
            let info = app.backups.create(&path, kind, description).await?;
            println!("Created backup {} ({} bytes)", info.id, info.size);
        }
        BackupCommand::List => {
            let backups = app.backups.list().await?;
            if backups.is_empty() {
                println!("No backups in {}", app.backups.root().display());
            }
            for b in &backups {
                print_backup(b);
            }
        }
        BackupCommand::Restore { id, target, force } => {
            if force && !confirm(&format!("Overwrite existing files with backup {}?", id), false) {
                return Err(Error::Cancelled);
            }
            let restored = app.backups.restore(&id, target.as_deref(), force).await?;
            println!("Restored {} into {}", id, restored.display());
        }
        BackupCommand::Delete { id, yes } => {
            app.backups.get(&id).await?;
            if !confirm(&format!("Delete backup {}?", id), yes) {
                return Err(Error::Cancelled);
            }
            app.backups.delete(&id).await?;
            println!("Deleted {}", id);
        }
        BackupCommand::Cleanup { keep, dry_run } => {
            let removed = app.backups.cleanup_old(keep, dry_run).await?;
            let verb = if dry_run { "Would delete" } else { "Deleted" };
            if removed.is_empty() {
                println!("Nothing to clean up, {} or fewer backups", keep);
            }
            for b in &removed {
                print!("{} ", verb);
                print_backup(b);
            }
        }
    }
    Ok(())
}

fn print_details(c: &Codespace) {
    println!("  Name:       {}", c.name);
    println!("  Status:     {}", c.status.as_str());
    println!("  Repository: {}", c.repository);
    println!("  Container:  {}", c.container_name());
    println!("  Path:       {}", c.path.display());
    println!("  Language:   {}", c.language);
    println!("  Editor:     {}", c.vscode_url);
    println!("  App:        {}", c.app_url);
    println!("  Password:   {}", c.password);
    if !c.components.is_empty() {
        let names: Vec<&str> = c.components.iter().map(|c| c.name.as_str()).collect();
        println!("  Components: {}", names.join(", "));
    }
}

fn print_backup(b: &BackupInfo) {
    println!(
        "{:<36} {:<8} {} {:>12} B  {}",
        b.id,
        b.kind.as_str(),
        b.timestamp.format("%Y-%m-%d %H:%M:%S"),
        b.size,
        b.description.as_deref().unwrap_or("")
    );
}

fn print_report(report: &BulkReport) {
    for item in &report.succeeded {
        println!("  removed {}", item);
    }
    for (item, reason) in &report.failed {
        println!("  failed  {}: {}", item, reason);
    }
    println!(
        "{}: succeeded {}, failed {}",
        report.operation,
        report.succeeded.len(),
        report.failed.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create_with_components_and_env() {
        let cli = Cli::try_parse_from([
            "mcs",
            "create",
            "facebook/react",
            "-c",
            "claude",
            "-c",
            "uv",
            "--env",
            "A=1",
            "--no-start",
        ])
        .unwrap();
        match cli.command {
            Command::Create {
                repository,
                components,
                env,
                no_start,
                ..
            } => {
                assert_eq!(repository, "facebook/react");
                assert_eq!(components, vec!["claude", "uv"]);
                assert_eq!(env, vec![("A".to_string(), "1".to_string())]);
                assert!(no_start);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_backup_type() {
        let args = ["mcs", "backup", "create", "/tmp/x", "--type", "install"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(
            cli.command,
            Command::Backup(BackupCommand::Create {
                kind: BackupType::Install,
                ..
            })
        ));
        let weekly = Cli::try_parse_from(["mcs", "backup", "create", "/tmp/x", "--type", "weekly"]);
        assert!(weekly.is_err());
    }

    #[test]
    fn test_parse_env_rejects_malformed() {
        assert!(parse_env("NOVALUE").is_err());
        assert!(parse_env("=x").is_err());
        assert!(parse_env("PASSWORD=x").is_err());
        assert!(parse_env("MY VAR=x").is_err());
        assert_eq!(parse_env("K=a=b").unwrap(), ("K".to_string(), "a=b".to_string()));
    }
}
