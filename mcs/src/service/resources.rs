//! Bulk operations over managed engine resources

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::infra::docker::ContainerEngine;
use crate::service::ownership::{count_managed, is_image_owned, owned_containers, ManagedCounts};

/// Per-item outcome of a bulk operation
#[derive(Debug, Clone, Default)]
pub struct BulkReport {
    pub operation: String,
    pub succeeded: Vec<String>,
    /// Item and the error it failed with
    pub failed: Vec<(String, String)>,
}

impl BulkReport {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, item: impl Into<String>, outcome: Result<()>) {
        let item = item.into();
        match outcome {
            Ok(()) => self.succeeded.push(item),
            Err(e) => {
                warn!("{}: {} failed: {}", self.operation, item, e);
                self.failed.push((item, e.to_string()));
            }
        }
    }

    /// Fold another report's outcomes into this one
    pub fn merge(&mut self, other: BulkReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    /// Collapse into one aggregate error when anything failed
    pub fn ensure_success(&self) -> Result<()> {
        if self.failed.is_empty() {
            Ok(())
        } else {
            Err(Error::BulkOperationFailed {
                operation: self.operation.clone(),
                succeeded: self.succeeded.len(),
                failed: self.failed.len(),
            })
        }
    }
}

/// Resource service for enumerating and pruning managed resources
pub struct ResourceService {
    engine: Arc<dyn ContainerEngine>,
}

impl ResourceService {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Count managed containers and images
    pub async fn summary(&self) -> Result<ManagedCounts> {
        let containers = self.engine.list_containers().await?;
        let images = self.engine.list_images().await?;
        Ok(count_managed(&containers, &images))
    }

    /// Stop and remove every managed container
    ///
    /// Works from one snapshot of the container list; a failing container is
    /// recorded and the loop moves on.
    pub async fn cleanup_containers(&self) -> Result<BulkReport> {
        let snapshot = owned_containers(self.engine.list_containers().await?);
        info!("Cleaning up {} managed container(s)", snapshot.len());

        let mut report = BulkReport::new("Container cleanup");
        for container in snapshot {
            let target = if container.id.is_empty() {
                container.display_name().to_string()
            } else {
                container.id.clone()
            };

            let mut outcome = Ok(());
            if container.is_running() {
                outcome = self.engine.stop_container(&target).await;
            }
            if outcome.is_ok() {
                outcome = match self.engine.remove_container(&target).await {
                    Err(Error::ContainerNotFound(_)) => Ok(()),
                    other => other,
                };
            }
            report.record(container.display_name(), outcome);
        }
        Ok(report)
    }

    /// Remove every managed image
    pub async fn cleanup_images(&self) -> Result<BulkReport> {
        let images: Vec<_> = self
            .engine
            .list_images()
            .await?
            .into_iter()
            .filter(is_image_owned)
            .collect();
        info!("Removing {} managed image(s)", images.len());

        let mut report = BulkReport::new("Image cleanup");
        for image in images {
            let label = image.repo_tags.first().cloned().unwrap_or_else(|| image.id.clone());
            let outcome = self.engine.remove_image(&image.id).await;
            report.record(label, outcome);
        }
        Ok(report)
    }
}
