//! Codespace lifecycle service

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::domain::backup::BackupType;
use crate::domain::codespace::{
    container_name, Codespace, CodespaceStatus, CreateCodespaceParams, LifecycleState,
};
use crate::domain::component::{installer_script, select_components, Component};
use crate::domain::types::RepoRef;
use crate::error::{Error, Result};
use crate::infra::compose_runner::ComposeRunner;
use crate::infra::docker::ContainerEngine;
use crate::infra::git::{detect_language, SourceProvider};
use crate::infra::ports::find_available_port;
use crate::service::backup::BackupService;
use crate::service::compose::{
    self, ComposeConfig, ImageSource, APP_PORT, COMPONENTS_DIR, COMPOSE_FILE, DEFAULT_WORKING_DIR,
    EDITOR_PORT, ENV_FILE, INIT_SCRIPT,
};
use crate::service::image_selector::get_image_info;
use crate::service::naming::{is_single_segment, unique_name};
use crate::service::resources::BulkReport;

/// Metadata file written into every codespace directory
const METADATA_FILE: &str = "codespace.json";

/// Language assumed when nothing in the source tree gives it away
const DEFAULT_LANGUAGE: &str = "base";

const PASSWORD_LENGTH: usize = 16;

/// Options for removing a codespace
#[derive(Debug, Clone, Copy)]
pub struct RemoveOptions {
    /// Snapshot the directory first; a failed snapshot only warns
    pub backup: bool,
}

/// Codespace service for managing codespace lifecycle
pub struct CodespaceService {
    config: Arc<Config>,
    engine: Arc<dyn ContainerEngine>,
    compose: Arc<dyn ComposeRunner>,
    source: Arc<dyn SourceProvider>,
    backups: Arc<BackupService>,
}

impl CodespaceService {
    /// Create a new codespace service
    pub fn new(
        config: Arc<Config>,
        engine: Arc<dyn ContainerEngine>,
        compose: Arc<dyn ComposeRunner>,
        source: Arc<dyn SourceProvider>,
        backups: Arc<BackupService>,
    ) -> Self {
        Self {
            config,
            engine,
            compose,
            source,
            backups,
        }
    }

    /// Whether a codespace directory exists
    pub fn exists(&self, name: &str) -> bool {
        is_single_segment(name) && self.config.codespace_dir(name).is_dir()
    }

    fn existing_dir(&self, name: &str) -> Result<PathBuf> {
        if !self.exists(name) {
            return Err(Error::CodespaceNotFound(name.to_string()));
        }
        Ok(self.config.codespace_dir(name))
    }

    /// Create a new codespace
    pub async fn create(&self, params: CreateCodespaceParams) -> Result<Codespace> {
        let repo = RepoRef::parse(&params.repository)?;
        let components: Vec<Component> = select_components(&params.components)?
            .into_iter()
            .filter(|c| c.selected)
            .collect();
        for (key, value) in &params.env {
            compose::check_env_var(key, value)?;
        }

        fs::create_dir_all(&self.config.codespaces_dir).await?;
        let name = unique_name(&repo.owner, &repo.repo, |n| {
            self.config.codespace_dir(n).exists()
        });
        let dir = self.config.codespace_dir(&name);
        info!("Creating codespace {} for {}", name, repo.url);

        fs::create_dir_all(&dir).await?;
        let written = self.provision(&name, &dir, &repo, components, &params).await;
        let codespace = match written {
            Ok(codespace) => codespace,
            Err(e) => {
                error!("Failed to create codespace {}: {}", name, e);
                let _ = fs::remove_dir_all(&dir).await;
                return Err(e);
            }
        };

        if params.start {
            self.start_new(&codespace, &dir).await?;
        }

        self.get(&name).await
    }

    /// Fetch sources and write every artifact of a new codespace
    async fn provision(
        &self,
        name: &str,
        dir: &Path,
        repo: &RepoRef,
        components: Vec<Component>,
        params: &CreateCodespaceParams,
    ) -> Result<Codespace> {
        self.source.fetch(&repo.url, &dir.join("src")).await?;

        let language = params
            .language
            .as_deref()
            .map(str::to_lowercase)
            .or_else(|| detect_language(&dir.join("src")).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        debug!("Codespace {} uses language {}", name, language);

        let image = get_image_info(&language, &components);
        let custom_dockerfile = self.config.dockerfiles_dir.join(&image.dockerfile);
        let source = if custom_dockerfile.is_file() {
            ImageSource::Build {
                context: self.config.dockerfiles_dir.display().to_string(),
                dockerfile: image.dockerfile.clone(),
            }
        } else {
            ImageSource::Image(image.image.clone())
        };

        let mut reserved = self.reserved_ports().await?;
        let vscode_port = find_available_port(self.config.vscode_base_port, &reserved)?;
        reserved.insert(vscode_port);
        let app_port = find_available_port(self.config.app_base_port, &reserved)?;

        let password: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LENGTH)
            .map(char::from)
            .collect();

        let compose_config = ComposeConfig {
            container_name: container_name(name),
            codespace_name: name.to_string(),
            source,
            password: password.clone(),
            ports: BTreeMap::from([
                (vscode_port.to_string(), EDITOR_PORT.to_string()),
                (app_port.to_string(), APP_PORT.to_string()),
            ]),
            environment: params.env.clone(),
            labels: BTreeMap::from([("mcs.repository".to_string(), repo.url.clone())]),
            components: components.clone(),
            working_dir: DEFAULT_WORKING_DIR.to_string(),
            network: self.config.network_name.clone(),
        };
        let artifacts = compose::render(&compose_config)?;

        for sub in ["data", "config", "logs"] {
            fs::create_dir_all(dir.join(sub)).await?;
        }
        fs::write(dir.join(COMPOSE_FILE), &artifacts.compose).await?;
        fs::write(dir.join(ENV_FILE), &artifacts.env_file).await?;
        if let Some(script) = &artifacts.init_script {
            write_executable(&dir.join(INIT_SCRIPT), script).await?;
            let components_dir = dir.join(COMPONENTS_DIR);
            fs::create_dir_all(&components_dir).await?;
            for component in &components {
                if let Some(body) = installer_script(component) {
                    write_executable(&components_dir.join(&component.installer), &body).await?;
                }
            }
        }

        let codespace = Codespace {
            name: name.to_string(),
            repository: repo.url.clone(),
            path: dir.to_path_buf(),
            status: CodespaceStatus::Created,
            created_at: Utc::now(),
            vscode_url: self.config.host_url(vscode_port),
            app_url: self.config.host_url(app_port),
            password,
            components,
            language,
        };
        fs::write(dir.join(METADATA_FILE), serde_json::to_vec_pretty(&codespace)?).await?;

        Ok(codespace)
    }

    /// First start of a fresh codespace, retrying a failed custom build with
    /// the fallback image
    async fn start_new(&self, codespace: &Codespace, dir: &Path) -> Result<()> {
        self.engine.ensure_network(&self.config.network_name).await?;

        let compose_path = dir.join(COMPOSE_FILE);
        let rendered = fs::read_to_string(&compose_path).await?;
        let parsed: compose::ComposeFile = serde_yaml::from_str(&rendered)?;
        let is_build = parsed.services.values().any(|s| s.build.is_some());

        match self.compose.up(dir, is_build).await {
            Ok(()) => Ok(()),
            Err(e) if is_build => {
                let fallback =
                    get_image_info(&codespace.language, &codespace.components).fallback_image;
                warn!(
                    "Custom image build for {} failed ({}), falling back to {}",
                    codespace.name, e, fallback
                );
                let mut file = parsed;
                for service in file.services.values_mut() {
                    service.build = None;
                    service.image = Some(fallback.clone());
                }
                fs::write(&compose_path, serde_yaml::to_string(&file)?).await?;
                self.compose.up(dir, false).await
            }
            Err(e) => Err(e),
        }
    }

    async fn reserved_ports(&self) -> Result<HashSet<u16>> {
        let mut ports = HashSet::new();
        for codespace in self.read_all().await? {
            ports.extend(codespace.vscode_port());
            ports.extend(codespace.app_port());
        }
        Ok(ports)
    }

    /// Live status of a codespace's container
    async fn live_status(&self, name: &str) -> CodespaceStatus {
        match self.engine.container_state(&container_name(name)).await {
            Ok(state) => CodespaceStatus::from_engine_state(state.as_deref()),
            Err(e) => {
                debug!("Could not inspect {}: {}", name, e);
                CodespaceStatus::Unknown
            }
        }
    }

    async fn check_transition(&self, name: &str, next: LifecycleState) -> Result<()> {
        let current = if self.exists(name) {
            self.live_status(name).await.lifecycle()
        } else {
            LifecycleState::Absent
        };
        if current.can_transition_to(next) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                from: current.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }

    /// Get a codespace by name, with live status
    pub async fn get(&self, name: &str) -> Result<Codespace> {
        let dir = self.existing_dir(name)?;
        let mut codespace = read_metadata(name, &dir).await;
        codespace.status = self.live_status(name).await;
        Ok(codespace)
    }

    /// All codespaces on disk, sorted by name
    async fn read_all(&self) -> Result<Vec<Codespace>> {
        let mut codespaces = Vec::new();
        if !self.config.codespaces_dir.exists() {
            return Ok(codespaces);
        }

        let mut entries = fs::read_dir(&self.config.codespaces_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            codespaces.push(read_metadata(&name, &entry.path()).await);
        }
        codespaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(codespaces)
    }

    /// List all codespaces with live status
    pub async fn list(&self) -> Result<Vec<Codespace>> {
        let mut codespaces = self.read_all().await?;
        for codespace in &mut codespaces {
            codespace.status = self.live_status(&codespace.name).await;
        }
        Ok(codespaces)
    }

    /// Start a codespace
    pub async fn start(&self, name: &str) -> Result<()> {
        let dir = self.existing_dir(name)?;
        self.check_transition(name, LifecycleState::Running).await?;

        self.engine.ensure_network(&self.config.network_name).await?;
        self.compose.up(&dir, false).await?;
        info!("Codespace {} started", name);
        Ok(())
    }

    /// Stop a codespace
    ///
    /// Falls back to stopping the container directly when compose fails.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let dir = self.existing_dir(name)?;
        let container = container_name(name);
        if self.engine.container_state(&container).await?.is_none() {
            return Err(Error::ContainerNotFound(container));
        }

        if let Err(e) = self.compose.stop(&dir).await {
            warn!("Compose stop failed for {} ({}), stopping container directly", name, e);
            self.engine.stop_container(&container).await?;
        }
        info!("Codespace {} stopped", name);
        Ok(())
    }

    /// Restart a codespace; a missing container counts as already stopped
    pub async fn restart(&self, name: &str) -> Result<()> {
        match self.stop(name).await {
            Ok(()) => {}
            Err(Error::ContainerNotFound(container)) => {
                debug!("{} not found, treating as stopped", container);
            }
            Err(e) => return Err(e),
        }
        self.start(name).await
    }

    /// Remove a codespace, its container and its volumes
    pub async fn remove(&self, name: &str, options: RemoveOptions) -> Result<()> {
        let dir = self.existing_dir(name)?;
        self.check_transition(name, LifecycleState::Removed).await?;

        if options.backup {
            self.backup_before_remove(name, &dir).await;
        }

        let container = container_name(name);
        if let Some(state) = self.engine.container_state(&container).await? {
            if state == "running" {
                if let Err(e) = self.engine.stop_container(&container).await {
                    warn!("Failed to stop {} gracefully: {}", container, e);
                }
            }
            match self.engine.remove_container(&container).await {
                Ok(()) | Err(Error::ContainerNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        fs::remove_dir_all(&dir).await?;
        info!("Codespace {} removed", name);
        Ok(())
    }

    async fn backup_before_remove(&self, name: &str, dir: &Path) {
        let description = format!("Automatic backup before removing {}", name);
        match self
            .backups
            .create(dir, BackupType::Destroy, Some(description))
            .await
        {
            Ok(info) => {
                info!("Backed up {} as {}", name, info.id);
                if let Err(e) = self.backups.cleanup_old(self.config.backup_keep, false).await {
                    warn!("Backup retention failed: {}", e);
                }
            }
            Err(e) => warn!("Backup of {} failed, removing anyway: {}", name, e),
        }
    }

    /// Remove every codespace, continuing past failures
    pub async fn remove_all(&self, options: RemoveOptions) -> Result<BulkReport> {
        let mut report = BulkReport::new("Destroy");
        for codespace in self.read_all().await? {
            let outcome = self.remove(&codespace.name, options).await;
            report.record(codespace.name, outcome);
        }
        Ok(report)
    }
}

/// Read a codespace's metadata, tolerating a missing or damaged file
async fn read_metadata(name: &str, dir: &Path) -> Codespace {
    match fs::read(dir.join(METADATA_FILE)).await {
        Ok(raw) => match serde_json::from_slice::<Codespace>(&raw) {
            Ok(mut codespace) => {
                codespace.path = dir.to_path_buf();
                return codespace;
            }
            Err(e) => warn!("Ignoring damaged metadata for {}: {}", name, e),
        },
        Err(e) => debug!("No metadata for {}: {}", name, e),
    }

    let created_at = fs::metadata(dir)
        .await
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    Codespace {
        name: name.to_string(),
        repository: String::new(),
        path: dir.to_path_buf(),
        status: CodespaceStatus::Unknown,
        created_at,
        vscode_url: String::new(),
        app_url: String::new(),
        password: String::new(),
        components: Vec::new(),
        language: String::new(),
    }
}

async fn write_executable(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    }
    Ok(())
}
