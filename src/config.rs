use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use vamphost::{PluginLoader, get_vamp_paths, plugin::builtin};

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Searched before the default locations.
    pub plugin_paths: Vec<PathBuf>,
    /// Whether to search `VAMP_PATH` and the platform directories.
    pub default_paths: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plugin_paths: Vec::new(),
            default_paths: true,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.plugin_paths.clone();
        if self.default_paths {
            paths.extend(get_vamp_paths());
        }
        paths
    }

    pub fn loader(&self) -> PluginLoader {
        PluginLoader::new(self.search_paths()).with_library(builtin::library())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.plugin_paths.is_empty());
        assert!(config.default_paths);
    }

    #[test]
    fn extra_paths_only() {
        let config: Config = toml::from_str(
            r#"
            plugin_paths = ["/opt/vamp", "plugins"]
            default_paths = false
            "#,
        )
        .unwrap();
        assert_eq!(
            config.search_paths(),
            [PathBuf::from("/opt/vamp"), PathBuf::from("plugins")]
        );
        assert_eq!(config.loader().paths().len(), 2);
    }

    #[test]
    fn extra_paths_come_first() {
        let config = Config {
            plugin_paths: vec![PathBuf::from("/opt/vamp")],
            ..Config::default()
        };
        let paths = config.search_paths();
        assert_eq!(paths[0], PathBuf::from("/opt/vamp"));
        assert_eq!(paths.len(), 1 + get_vamp_paths().len());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vamphost.toml");
        std::fs::write(&path, "plugin_paths = [\"/opt/vamp\"]\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.plugin_paths, [PathBuf::from("/opt/vamp")]);

        std::fs::write(&path, "plugin_paths = 3\n").unwrap();
        assert!(Config::load(&path).is_err());
        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }
}
