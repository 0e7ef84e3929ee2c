//! Ownership classification of live engine resources
//!
//! Every bulk stop/remove/prune filters through these predicates so foreign
//! containers and images are never touched.

use crate::domain::types::{ContainerInfo, ImageRecord};
use crate::service::image_selector::IMAGE_REPOSITORY;

/// Label marking a resource as managed by this tool
pub const MANAGED_LABEL: &str = "mcs.managed";

/// Label recording the owning codespace name
pub const CODESPACE_LABEL: &str = "mcs.codespace";

/// Engine name prefix (with the leading slash) of managed containers
pub const NAME_PREFIX: &str = "/mcs-";

fn has_managed_label(labels: &std::collections::HashMap<String, String>) -> bool {
    labels.get(MANAGED_LABEL).map(String::as_str) == Some("true")
}

/// Whether a container belongs to this tool
pub fn is_owned(container: &ContainerInfo) -> bool {
    container.names.iter().any(|n| n.starts_with(NAME_PREFIX))
        || container.image.contains(IMAGE_REPOSITORY)
        || has_managed_label(&container.labels)
}

/// Whether an image belongs to this tool
pub fn is_image_owned(image: &ImageRecord) -> bool {
    image.repo_tags.iter().any(|t| t.contains(IMAGE_REPOSITORY)) || has_managed_label(&image.labels)
}

/// Keep only the containers this tool owns
pub fn owned_containers(containers: Vec<ContainerInfo>) -> Vec<ContainerInfo> {
    containers.into_iter().filter(is_owned).collect()
}

/// Counts of managed resources for status output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagedCounts {
    pub containers: usize,
    pub running: usize,
    pub images: usize,
}

pub fn count_managed(containers: &[ContainerInfo], images: &[ImageRecord]) -> ManagedCounts {
    let owned = containers.iter().filter(|c| is_owned(c));
    let (containers, running) = owned.fold((0, 0), |(total, running), c| {
        (total + 1, running + usize::from(c.is_running()))
    });
    ManagedCounts {
        containers,
        running,
        images: images.iter().filter(|i| is_image_owned(i)).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn named(name: &str) -> ContainerInfo {
        ContainerInfo {
            id: "id".into(),
            names: vec![name.into()],
            image: "nginx:latest".into(),
            ..Default::default()
        }
    }

    fn with_image(image: &str) -> ContainerInfo {
        ContainerInfo {
            image: image.into(),
            ..Default::default()
        }
    }

    fn labelled(key: &str, value: &str) -> ContainerInfo {
        ContainerInfo {
            labels: HashMap::from([(key.to_string(), value.to_string())]),
            ..Default::default()
        }
    }

    #[test]
    fn test_name_prefix_must_anchor() {
        assert!(is_owned(&named("/mcs-foo")));
        assert!(!is_owned(&named("/my-mcs-container")));
        assert!(!is_owned(&named("mcs-foo")));
    }

    #[test]
    fn test_any_name_suffices() {
        let c = ContainerInfo {
            names: vec!["/other".into(), "/mcs-alias".into()],
            ..Default::default()
        };
        assert!(is_owned(&c));
    }

    #[test]
    fn test_image_substring() {
        assert!(is_owned(&with_image("docker.io/michaelkeevildown/claude-coder:v1")));
        assert!(is_owned(&with_image("michaelkeevildown/claude-coder")));
        assert!(!is_owned(&with_image("MICHAELKEEVILDOWN/CLAUDE-CODER:v1")));
        assert!(!is_owned(&with_image("codercom/code-server:latest")));
    }

    #[test]
    fn test_managed_label_exact() {
        assert!(is_owned(&labelled("mcs.managed", "true")));
        assert!(!is_owned(&labelled("mcs.managed", "True")));
        assert!(!is_owned(&labelled("mcs.managed", "yes")));
        assert!(!is_owned(&labelled("mcs.codespace", "true")));
        assert!(!is_owned(&ContainerInfo::default()));
    }

    #[test]
    fn test_image_ownership() {
        let tagged = ImageRecord {
            id: "sha256:1".into(),
            repo_tags: vec!["michaelkeevildown/claude-coder:python".into()],
            ..Default::default()
        };
        let built = ImageRecord {
            id: "sha256:2".into(),
            labels: HashMap::from([(MANAGED_LABEL.to_string(), "true".to_string())]),
            ..Default::default()
        };
        let foreign = ImageRecord {
            id: "sha256:3".into(),
            repo_tags: vec!["postgres:16".into()],
            ..Default::default()
        };
        assert!(is_image_owned(&tagged));
        assert!(is_image_owned(&built));
        assert!(!is_image_owned(&foreign));
    }

    #[test]
    fn test_count_managed() {
        let mut running = named("/mcs-a");
        running.state = "running".into();
        let mut stopped = labelled("mcs.managed", "true");
        stopped.state = "exited".into();
        let foreign = named("/postgres");

        let counts = count_managed(&[running, stopped, foreign], &[]);
        assert_eq!(
            counts,
            ManagedCounts {
                containers: 2,
                running: 1,
                images: 0
            }
        );
    }

    #[test]
    fn test_scan_scales_linearly() {
        let containers: Vec<ContainerInfo> = (0..10_000)
            .map(|i| {
                if i % 2 == 0 {
                    named(&format!("/mcs-{}", i))
                } else {
                    named(&format!("/foreign-{}", i))
                }
            })
            .collect();
        assert_eq!(owned_containers(containers).len(), 5_000);
    }
}
