//! Compose artifact generation
//!
//! Renders the three files that describe a codespace on disk: the compose
//! service definition, the `.env` file and the component init script.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::component::Component;
use crate::error::{Error, Result};
use crate::service::ownership::{CODESPACE_LABEL, MANAGED_LABEL};

/// File names inside a codespace directory
pub const COMPOSE_FILE: &str = "docker-compose.yml";
pub const ENV_FILE: &str = ".env";
pub const INIT_SCRIPT: &str = "init.sh";
pub const COMPONENTS_DIR: &str = "components";

/// Ports the editor and the application listen on inside the container
pub const EDITOR_PORT: u16 = 8080;
pub const APP_PORT: u16 = 3000;

/// Default working directory of the editor
pub const DEFAULT_WORKING_DIR: &str = "/home/coder/workspace";

const EDITOR_HOME: &str = "/home/coder";
const INIT_SCRIPT_TARGET: &str = "/usr/local/bin/mcs-init.sh";

/// Where the container image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Image(String),
    Build { context: String, dockerfile: String },
}

/// Everything needed to render a codespace's artifacts
#[derive(Debug, Clone)]
pub struct ComposeConfig {
    pub container_name: String,
    pub codespace_name: String,
    pub source: ImageSource,
    pub password: String,
    /// Host port -> container port
    pub ports: BTreeMap<String, String>,
    pub environment: BTreeMap<String, String>,
    /// Caller labels; ownership labels are always added on render
    pub labels: BTreeMap<String, String>,
    pub components: Vec<Component>,
    pub working_dir: String,
    /// Shared external network
    pub network: String,
}

/// Top level of a compose file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeFile {
    pub services: BTreeMap<String, ServiceDefinition>,
    pub networks: BTreeMap<String, NetworkDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildDefinition>,
    pub container_name: String,
    pub restart: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    pub working_dir: String,
    pub env_file: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub healthcheck: Healthcheck,
    pub networks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDefinition {
    pub context: String,
    pub dockerfile: String,
    /// Stamped onto the built image so cleanup can find it
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Healthcheck {
    pub test: Vec<String>,
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
    pub start_period: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDefinition {
    pub external: bool,
    pub name: String,
}

/// The rendered files of one codespace
#[derive(Debug, Clone)]
pub struct ComposeArtifacts {
    pub compose: String,
    pub env_file: String,
    /// Only rendered when components are present
    pub init_script: Option<String>,
}

/// Variables the generator writes itself
pub const RESERVED_ENV_KEYS: &[&str] = &["CODESPACE_NAME", "PASSWORD"];

/// Check a custom variable fits on one `KEY=VALUE` line of the env file
pub fn check_env_var(key: &str, value: &str) -> Result<()> {
    let mut chars = key.chars();
    let well_formed = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !well_formed {
        return Err(Error::InvalidParameter(format!(
            "invalid environment variable name `{}`",
            key
        )));
    }
    if RESERVED_ENV_KEYS.contains(&key) {
        return Err(Error::InvalidParameter(format!(
            "environment variable `{}` is set by the codespace itself",
            key
        )));
    }
    if value.contains(['\n', '\r']) {
        return Err(Error::InvalidParameter(format!(
            "value of `{}` must not contain line breaks",
            key
        )));
    }
    Ok(())
}

/// Labels written on every managed container
pub fn ownership_labels(codespace: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CODESPACE_LABEL.to_string(), codespace.to_string()),
        (MANAGED_LABEL.to_string(), "true".to_string()),
    ])
}

fn editor_healthcheck() -> Healthcheck {
    Healthcheck {
        test: vec![
            "CMD".to_string(),
            "curl".to_string(),
            "-f".to_string(),
            format!("http://localhost:{}/healthz", EDITOR_PORT),
        ],
        interval: "30s".to_string(),
        timeout: "10s".to_string(),
        retries: 3,
        start_period: "40s".to_string(),
    }
}

fn base_volumes(working_dir: &str) -> Vec<String> {
    vec![
        format!("./src:{}", working_dir),
        format!("./data:{}/.local/share/code-server", EDITOR_HOME),
        format!("./config:{}/.config/code-server", EDITOR_HOME),
        format!("./logs:{}/logs", EDITOR_HOME),
        format!("${{HOME}}/.ssh:{}/.ssh:ro", EDITOR_HOME),
        format!("${{HOME}}/.gitconfig:{}/.gitconfig:ro", EDITOR_HOME),
    ]
}

/// Build the typed service definition
pub fn service_definition(config: &ComposeConfig) -> ServiceDefinition {
    let mut labels = config.labels.clone();
    labels.extend(ownership_labels(&config.codespace_name));

    let mut environment = config.environment.clone();
    environment.insert("PASSWORD".to_string(), config.password.clone());

    let mut volumes = base_volumes(&config.working_dir);
    let mut command = None;
    if !config.components.is_empty() {
        volumes.push(format!("./{}:{}/{}:ro", COMPONENTS_DIR, EDITOR_HOME, COMPONENTS_DIR));
        volumes.push(format!("./{}:{}:ro", INIT_SCRIPT, INIT_SCRIPT_TARGET));
        command = Some(vec![
            "/bin/bash".to_string(),
            "-c".to_string(),
            format!(
                "{} && exec /usr/bin/entrypoint.sh --bind-addr 0.0.0.0:{} {}",
                INIT_SCRIPT_TARGET, EDITOR_PORT, config.working_dir
            ),
        ]);
    }

    let (image, build) = match &config.source {
        ImageSource::Image(image) => (Some(image.clone()), None),
        ImageSource::Build {
            context,
            dockerfile,
        } => (
            None,
            Some(BuildDefinition {
                context: context.clone(),
                dockerfile: dockerfile.clone(),
                labels: ownership_labels(&config.codespace_name),
            }),
        ),
    };

    ServiceDefinition {
        image,
        build,
        container_name: config.container_name.clone(),
        restart: "unless-stopped".to_string(),
        command,
        working_dir: config.working_dir.clone(),
        env_file: vec![ENV_FILE.to_string()],
        environment,
        ports: config
            .ports
            .iter()
            .map(|(host, container)| format!("{}:{}", host, container))
            .collect(),
        volumes,
        labels,
        healthcheck: editor_healthcheck(),
        networks: vec![config.network.clone()],
    }
}

/// Render the compose file
pub fn render_compose(config: &ComposeConfig) -> Result<String> {
    let file = ComposeFile {
        services: BTreeMap::from([(config.container_name.clone(), service_definition(config))]),
        networks: BTreeMap::from([(
            config.network.clone(),
            NetworkDefinition {
                external: true,
                name: config.network.clone(),
            },
        )]),
    };
    Ok(serde_yaml::to_string(&file)?)
}

/// Render the init script that installs selected components
pub fn render_init_script(components: &[Component]) -> String {
    let mut script = String::from(
        "#!/bin/bash\n\
         set -e\n\
         \n\
         mkdir -p \"$HOME/.local/bin\" \"$HOME/.npm-global/bin\"\n\
         export NPM_CONFIG_PREFIX=\"$HOME/.npm-global\"\n\
         export PATH=\"$HOME/.local/bin:$HOME/.npm-global/bin:$PATH\"\n",
    );

    for component in components.iter().filter(|c| c.selected) {
        script.push_str(&format!(
            "\necho \"Installing {name}...\"\n\
             if \"{home}/{dir}/{installer}\" install; then\n\
             \x20 echo \"{name} installed\"\n\
             else\n\
             \x20 echo \"{name} installation failed\" >&2\n\
             fi\n",
            name = component.name,
            home = EDITOR_HOME,
            dir = COMPONENTS_DIR,
            installer = component.installer,
        ));
    }

    script
}

/// Render the `.env` file
pub fn render_env_file(config: &ComposeConfig) -> String {
    let mut out = format!(
        "# Environment for codespace {}\n\
         CODESPACE_NAME={}\n\
         PASSWORD={}\n",
        config.codespace_name, config.codespace_name, config.password
    );
    for (key, value) in &config.environment {
        out.push_str(&format!("{}={}\n", key, value));
    }
    out
}

/// Render all artifacts of a codespace
pub fn render(config: &ComposeConfig) -> Result<ComposeArtifacts> {
    Ok(ComposeArtifacts {
        compose: render_compose(config)?,
        env_file: render_env_file(config),
        init_script: (!config.components.is_empty())
            .then(|| render_init_script(&config.components)),
    })
}
