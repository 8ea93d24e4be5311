//! Session-level engine configuration.
//!
//! Recognized options: the default namespace used when no project is
//! bound, the prefix prepended to generated namespaces, and the name of
//! the environment created alongside a new project.

use serde::{Deserialize, Serialize};

/// Engine configuration, loadable from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Namespace targeted when the session is not bound to a project.
    pub default_namespace: String,

    /// Prefix prepended to every generated namespace name.
    pub namespace_prefix: String,

    /// Environment created automatically with every new project.
    pub default_environment: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_namespace: "default".to_string(),
            namespace_prefix: String::new(),
            default_environment: "dev".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.default_namespace, "default");
        assert_eq!(cfg.namespace_prefix, "");
        assert_eq!(cfg.default_environment, "dev");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg = EngineConfig::from_yaml("namespace_prefix: ks-\n").unwrap();
        assert_eq!(cfg.namespace_prefix, "ks-");
        assert_eq!(cfg.default_namespace, "default");
    }
}
