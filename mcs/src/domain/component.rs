//! Add-on components installed into a codespace at startup

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An installable add-on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Stable identifier used on the command line
    pub id: String,
    pub name: String,
    pub description: String,
    /// Installer file name inside the components directory
    pub installer: String,
    /// Runtimes the component needs in the image (`nodejs`, `python`, ...)
    pub requires: Vec<String>,
    pub selected: bool,
}

impl Component {
    pub fn requires(&self, runtime: &str) -> bool {
        self.requires.iter().any(|r| r == runtime)
    }
}

struct BuiltinComponent {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    requires: &'static [&'static str],
    install: &'static str,
}

const BUILTIN_COMPONENTS: &[BuiltinComponent] = &[
    BuiltinComponent {
        id: "claude",
        name: "Claude Code",
        description: "Anthropic's agentic coding CLI",
        requires: &["nodejs"],
        install: "npm install -g @anthropic-ai/claude-code",
    },
    BuiltinComponent {
        id: "claude-flow",
        name: "Claude Flow",
        description: "Multi-agent orchestration for Claude Code",
        requires: &["nodejs"],
        install: "npm install -g claude-flow@alpha",
    },
    BuiltinComponent {
        id: "github-cli",
        name: "GitHub CLI",
        description: "The gh command line tool",
        requires: &[],
        install: "curl -fsSL \
                  https://github.com/cli/cli/releases/latest/download/gh_linux_amd64.tar.gz \
                  | tar -xz -C \"$HOME/.local\" --strip-components=1",
    },
    BuiltinComponent {
        id: "uv",
        name: "uv",
        description: "Fast Python package and project manager",
        requires: &["python"],
        install: "curl -LsSf https://astral.sh/uv/install.sh | sh",
    },
];

/// All built-in components, unselected
pub fn builtin_components() -> Vec<Component> {
    BUILTIN_COMPONENTS
        .iter()
        .map(|c| Component {
            id: c.id.to_string(),
            name: c.name.to_string(),
            description: c.description.to_string(),
            installer: format!("{}.sh", c.id),
            requires: c.requires.iter().map(|r| r.to_string()).collect(),
            selected: false,
        })
        .collect()
}

/// Resolve the requested ids against the built-in registry
///
/// Returns the full registry with the requested components marked selected.
/// Unknown ids are rejected before anything is written to disk.
pub fn select_components(ids: &[String]) -> Result<Vec<Component>> {
    let mut components = builtin_components();
    for id in ids {
        let component = components
            .iter_mut()
            .find(|c| c.id == *id)
            .ok_or_else(|| Error::InvalidParameter(format!("unknown component: {}", id)))?;
        component.selected = true;
    }
    Ok(components)
}

/// Installer script body for a built-in component
pub fn installer_script(component: &Component) -> Option<String> {
    let builtin = BUILTIN_COMPONENTS.iter().find(|c| c.id == component.id)?;
    Some(format!(
        "#!/bin/bash\n\
         set -e\n\
         \n\
         case \"$1\" in\n\
         \x20 install)\n\
         \x20   {}\n\
         \x20   ;;\n\
         \x20 *)\n\
         \x20   echo \"usage: $0 install\" >&2\n\
         \x20   exit 2\n\
         \x20   ;;\n\
         esac\n",
        builtin.install
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_marks_only_requested() {
        let components = select_components(&["claude".to_string()]).unwrap();
        let selected: Vec<_> = components.iter().filter(|c| c.selected).collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "claude");
        assert!(selected[0].requires("nodejs"));
    }

    #[test]
    fn test_unknown_component_rejected() {
        let result = select_components(&["emacs".to_string()]);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_installer_script_dispatches_on_install() {
        let component = &builtin_components()[0];
        let script = installer_script(component).unwrap();
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("  install)\n    npm install -g @anthropic-ai/claude-code\n"));
    }
}
