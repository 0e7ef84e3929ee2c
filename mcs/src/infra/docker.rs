//! Docker management layer

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::{
    container::{ListContainersOptions, RemoveContainerOptions, StopContainerOptions},
    errors::Error as BollardError,
    image::{ListImagesOptions, RemoveImageOptions},
    network::{CreateNetworkOptions, InspectNetworkOptions},
    Docker,
};
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info};

use crate::domain::types::{ContainerInfo, ImageRecord};
use crate::error::{Error, Result};
use crate::service::ownership::MANAGED_LABEL;

/// Grace period before the engine kills a stopping container
pub const STOP_TIMEOUT_SECS: i64 = 30;

/// Container engine operations the lifecycle and cleanup services rely on
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check the engine is reachable
    async fn ping(&self) -> Result<()>;

    /// Snapshot of every container, running or not
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>>;

    /// Engine state of a container, `None` if it does not exist
    async fn container_state(&self, name: &str) -> Result<Option<String>>;

    /// Stop a container, allowing [`STOP_TIMEOUT_SECS`] before a kill
    async fn stop_container(&self, name: &str) -> Result<()>;

    /// Force-remove a container together with its anonymous volumes
    async fn remove_container(&self, name: &str) -> Result<()>;

    async fn list_images(&self) -> Result<Vec<ImageRecord>>;

    async fn remove_image(&self, id: &str) -> Result<()>;

    /// Create the bridge network if it does not exist yet
    async fn ensure_network(&self, name: &str) -> Result<()>;

    async fn remove_network(&self, name: &str) -> Result<()>;
}

/// Docker manager for container operations
pub struct DockerManager {
    client: Docker,
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

impl DockerManager {
    /// Create a new Docker manager
    pub fn new(socket_path: Option<&str>) -> Result<Self> {
        let client = match socket_path {
            Some(path) => Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| Error::DockerError(e.to_string()))?,
            None => Docker::connect_with_local_defaults()
                .map_err(|e| Error::DockerError(e.to_string()))?,
        };

        Ok(Self { client })
    }
}

#[async_trait]
impl ContainerEngine for DockerManager {
    async fn ping(&self) -> Result<()> {
        self.client
            .ping()
            .await
            .map_err(|e| Error::DockerError(format!("Docker ping failed: {}", e)))?;
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(|e| Error::DockerError(format!("Failed to list containers: {}", e)))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerInfo {
                id: c.id.unwrap_or_default(),
                names: c.names.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                labels: c.labels.unwrap_or_default(),
                state: c.state.unwrap_or_default(),
            })
            .collect())
    }

    async fn container_state(&self, name: &str) -> Result<Option<String>> {
        match self.client.inspect_container(name, None).await {
            Ok(info) => Ok(Some(
                info.state
                    .and_then(|s| s.status)
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
            )),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(Error::DockerError(e.to_string())),
        }
    }

    async fn stop_container(&self, name: &str) -> Result<()> {
        let options = StopContainerOptions {
            t: STOP_TIMEOUT_SECS,
        };

        match self.client.stop_container(name, Some(options)).await {
            Ok(()) => {
                info!("Container {} stopped", name);
                Ok(())
            }
            Err(e) if is_not_found(&e) => Err(Error::ContainerNotFound(name.to_string())),
            Err(e) => Err(Error::DockerError(format!(
                "Failed to stop container {}: {}",
                name, e
            ))),
        }
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true, // Remove associated volumes
            ..Default::default()
        };

        match self.client.remove_container(name, Some(options)).await {
            Ok(()) => {
                info!("Container {} removed", name);
                Ok(())
            }
            Err(e) if is_not_found(&e) => Err(Error::ContainerNotFound(name.to_string())),
            Err(e) => Err(Error::DockerError(format!(
                "Failed to remove container {}: {}",
                name, e
            ))),
        }
    }

    async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        let options = ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        };

        let images = self
            .client
            .list_images(Some(options))
            .await
            .map_err(|e| Error::DockerError(format!("Failed to list images: {}", e)))?;

        Ok(images
            .into_iter()
            .map(|i| ImageRecord {
                id: i.id,
                repo_tags: i.repo_tags,
                labels: i.labels,
            })
            .collect())
    }

    async fn remove_image(&self, id: &str) -> Result<()> {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };

        self.client
            .remove_image(id, Some(options), None)
            .await
            .map_err(|e| Error::DockerError(format!("Failed to remove image {}: {}", id, e)))?;

        info!("Image {} removed", id);
        Ok(())
    }

    async fn ensure_network(&self, name: &str) -> Result<()> {
        match self
            .client
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(_) => {
                debug!("Network {} already exists", name);
                return Ok(());
            }
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(Error::DockerError(e.to_string())),
        }

        let options = CreateNetworkOptions::<String> {
            name: name.to_string(),
            driver: "bridge".to_string(),
            labels: HashMap::from([(MANAGED_LABEL.to_string(), "true".to_string())]),
            ..Default::default()
        };

        self.client
            .create_network(options)
            .await
            .map_err(|e| Error::DockerError(format!("Failed to create network {}: {}", name, e)))?;

        info!("Network {} created", name);
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        match self.client.remove_network(name).await {
            Ok(()) => {
                info!("Network {} removed", name);
                Ok(())
            }
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(Error::DockerError(format!(
                "Failed to remove network {}: {}",
                name, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let missing = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container: x".to_string(),
        };
        let conflict = BollardError::DockerResponseServerError {
            status_code: 409,
            message: "conflict".to_string(),
        };
        assert!(is_not_found(&missing));
        assert!(!is_not_found(&conflict));
    }
}
