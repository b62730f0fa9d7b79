//! Persisted navigation settings.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const SETTINGS_DIR: &str = ".task-explorer";
const SETTINGS_FILE: &str = "settings.json";

/// The two persisted strings. Absent keys load as empty strings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct NavigationSettings {
    /// Last free-text filter; empty means none.
    #[serde(rename = "Filter", default)]
    pub filter: String,
    /// Expanded file paths joined by the navigation separator; empty means none.
    #[serde(rename = "ExpandedTargets", default)]
    pub expanded_targets: String,
}

/// Reads and writes [`NavigationSettings`] under `.task-explorer/`.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    root: PathBuf,
    path: PathBuf,
}

impl SettingsStore {
    /// Create a new store rooted at the provided directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let path = root.join(SETTINGS_DIR).join(SETTINGS_FILE);
        Self { root, path }
    }

    /// Location of the persisted settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted settings, or `None` if nothing was saved yet.
    pub fn load(&self) -> Result<Option<NavigationSettings>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read settings file at {}", self.path.display()))?;
        let settings = serde_json::from_str(&data)
            .with_context(|| format!("invalid settings data in {}", self.path.display()))?;
        Ok(Some(settings))
    }

    /// Persist the provided settings, creating parent directories as needed.
    pub fn save(&self, settings: &NavigationSettings) -> Result<()> {
        let dir = self.path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create settings directory {}", dir.display()))?;

        let data =
            serde_json::to_string_pretty(settings).context("failed to serialize settings")?;
        fs::write(&self.path, data)
            .with_context(|| format!("failed to write settings file to {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "navigation settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_none() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = SettingsStore::new(temp.path());
        assert!(store.load()?.is_none());
        Ok(())
    }

    #[test]
    fn save_then_load() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = SettingsStore::new(temp.path());
        let settings = NavigationSettings {
            filter: "^Compile$".into(),
            expanded_targets: "/a.csproj<`~`>/b.csproj".into(),
        };
        store.save(&settings)?;

        let raw = fs::read_to_string(store.path())?;
        assert!(raw.contains("\"Filter\""));
        assert!(raw.contains("\"ExpandedTargets\""));
        assert_eq!(store.load()?, Some(settings));
        Ok(())
    }

    #[test]
    fn absent_keys_default_to_empty() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = SettingsStore::new(temp.path());
        fs::create_dir_all(temp.path().join(SETTINGS_DIR))?;
        fs::write(store.path(), r#"{ "Filter": "Build" }"#)?;

        let loaded = store.load()?.expect("settings present");
        assert_eq!(loaded.filter, "Build");
        assert_eq!(loaded.expanded_targets, "");
        Ok(())
    }
}
