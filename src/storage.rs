use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ss_config::persist::DEFAULT_KEEP_BACKUPS;
use ss_config::ssh::expand_tilde;
use ss_config::{DefaultPolicy, Persister};

const APP_DIR: &str = "ss-config";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Preferences {
    pub(crate) config_path: Option<PathBuf>,
    pub(crate) backup_dir: Option<PathBuf>,
    pub(crate) auto_backup: bool,
    pub(crate) keep_backups: usize,
    /// Directive -> values treated as default and left out of the file.
    /// An empty list turns omission off for that directive.
    pub(crate) default_omission: BTreeMap<String, Vec<String>>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            config_path: None,
            backup_dir: None,
            auto_backup: true,
            keep_backups: DEFAULT_KEEP_BACKUPS,
            default_omission: BTreeMap::new(),
        }
    }
}

impl Preferences {
    pub(crate) fn ssh_config_path(&self) -> PathBuf {
        match &self.config_path {
            Some(path) => expand_tilde(&path.to_string_lossy()),
            None => default_ssh_config_path(),
        }
    }

    pub(crate) fn persister(&self) -> Persister {
        let backup_dir = self
            .backup_dir
            .as_ref()
            .map(|dir| expand_tilde(&dir.to_string_lossy()));
        Persister::new(backup_dir, self.keep_backups)
    }

    pub(crate) fn default_policy(&self) -> DefaultPolicy {
        DefaultPolicy::builtin().with_overrides(&self.default_omission)
    }
}

pub(crate) fn default_ssh_config_path() -> PathBuf {
    expand_tilde("~/.ssh/config")
}

pub(crate) fn default_keys_dir() -> PathBuf {
    expand_tilde("~/.ssh")
}

pub(crate) fn preferences_path() -> Result<PathBuf> {
    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_DIR);
        dir.push("preferences.json");
        return Ok(dir);
    }
    let mut fallback = std::env::current_dir().context("current dir")?;
    fallback.push("ss-config-preferences.json");
    Ok(fallback)
}

pub(crate) fn log_path() -> Result<PathBuf> {
    if let Some(mut dir) = dirs::data_local_dir().or_else(dirs::config_dir) {
        dir.push(APP_DIR);
        dir.push("activity.log");
        return Ok(dir);
    }
    let mut fallback = std::env::current_dir().context("current dir")?;
    fallback.push("ss-config-activity.log");
    Ok(fallback)
}

/// Reads the preferences file, writing the defaults on first run.
pub(crate) fn load_or_init_preferences(path: &Path) -> Result<Preferences> {
    if path.exists() {
        return load_preferences(path);
    }
    let prefs = Preferences::default();
    if let Err(err) = save_preferences(path, &prefs) {
        tracing::warn!(path = %path.display(), error = %err, "could not write default preferences");
    }
    Ok(prefs)
}

pub(crate) fn load_preferences(path: &Path) -> Result<Preferences> {
    let content = fs::read_to_string(path).context("read preferences file")?;
    let prefs = serde_json::from_str(&content).context("parse preferences file")?;
    Ok(prefs)
}

pub(crate) fn save_preferences(path: &Path, prefs: &Preferences) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create preferences dir")?;
    }
    let content = serde_json::to_string_pretty(prefs).context("serialize preferences")?;
    fs::write(path, content).context("write preferences file")?;
    Ok(())
}
