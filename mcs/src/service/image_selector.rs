//! Base image and Dockerfile selection

use serde::{Deserialize, Serialize};

use crate::domain::component::Component;

/// Repository all codespace images are published under
pub const IMAGE_REPOSITORY: &str = "michaelkeevildown/claude-coder";

/// Plain editor image used when a custom build fails
pub const FALLBACK_IMAGE: &str = "codercom/code-server:latest";

/// Runtime requirement that pulls in a Node.js combo image
const NODE_RUNTIME: &str = "nodejs";

/// Resolved image for a codespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub image: String,
    pub dockerfile: String,
    pub fallback_image: String,
}

/// One row of the decision table
struct Variant {
    tag: &'static str,
    dockerfile: &'static str,
}

const PYTHON: Variant = Variant {
    tag: "python",
    dockerfile: "Dockerfile.python",
};
const PYTHON_NODE: Variant = Variant {
    tag: "python-node",
    dockerfile: "Dockerfile.python-node",
};
const GO: Variant = Variant {
    tag: "go",
    dockerfile: "Dockerfile.go",
};
const GO_NODE: Variant = Variant {
    tag: "go-node",
    dockerfile: "Dockerfile.go-node",
};
const NODE: Variant = Variant {
    tag: "node",
    dockerfile: "Dockerfile.node",
};
const BASE: &str = "base";
const BASE_NODE: Variant = Variant { tag: "base-node", dockerfile: "Dockerfile.base-node" };

fn image_for(tag: &str) -> String {
    format!("{}:{}", IMAGE_REPOSITORY, tag)
}

/// Whether any selected component needs Node.js in the image
pub fn needs_node(components: &[Component]) -> bool {
    components
        .iter()
        .any(|c| c.selected && c.requires(NODE_RUNTIME))
}

/// Map a language tag and component selection to an image
pub fn get_image_info(language: &str, components: &[Component]) -> ImageInfo {
    let language = language.to_lowercase();
    let node = needs_node(components);

    let (image, dockerfile) = match (language.as_str(), node) {
        ("python", false) => (image_for(PYTHON.tag), PYTHON.dockerfile.to_string()),
        ("python", true) => (image_for(PYTHON_NODE.tag), PYTHON_NODE.dockerfile.to_string()),
        ("go", false) => (image_for(GO.tag), GO.dockerfile.to_string()),
        ("go", true) => (image_for(GO_NODE.tag), GO_NODE.dockerfile.to_string()),
        ("node", _) => (image_for(NODE.tag), NODE.dockerfile.to_string()),
        (_, true) => (image_for(BASE_NODE.tag), BASE_NODE.dockerfile.to_string()),
        // Generic image, but the Dockerfile keeps the caller's language tag
        (other, false) => (image_for(BASE), format!("Dockerfile.{}", other)),
    };

    ImageInfo {
        image,
        dockerfile,
        fallback_image: FALLBACK_IMAGE.to_string(),
    }
}
