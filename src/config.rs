//! Persisted settings and command-line overrides.
//!
//! Settings live at `XDG_CONFIG_HOME/cloudframe/settings.json`. A missing file
//! means defaults; a file that exists but cannot be parsed is an error rather
//! than being silently replaced.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::layout::{NewPhotoPlacement, WindowConfig, DEFAULT_BATCH_SIZE, DEFAULT_PROXIMITY_MARGIN};
use crate::models::SortOrder;
use crate::remote::Credentials;
use crate::sync::SyncConfig;

const SETTINGS_FILE: &str = "settings.json";

pub const ENV_API_KEY: &str = "CLOUDFRAME_API_KEY";
pub const ENV_FOLDER_ID: &str = "CLOUDFRAME_FOLDER_ID";

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    pub api_key: String,
    pub folder_id: String,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.credentials(), f)
    }
}

impl ConnectionSettings {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.api_key.trim(), self.folder_id.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    /// Announce newly arrived photos.
    pub enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneralSettings {
    pub refresh_interval_secs: u64,
    pub batch_size: usize,
    pub result_cache_ms: u64,
    pub proximity_margin_px: f64,
    pub new_photo_placement: NewPhotoPlacement,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
            batch_size: DEFAULT_BATCH_SIZE,
            result_cache_ms: 1000,
            proximity_margin_px: DEFAULT_PROXIMITY_MARGIN,
            new_photo_placement: NewPhotoPlacement::Prepend,
        }
    }
}

/// Everything the gallery persists between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub sort_order: SortOrder,
    pub notifications: NotificationSettings,
    pub general: GeneralSettings,
}

impl Settings {
    /// Returns the default settings path based on XDG directories.
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "cloudframe")
            .context("Failed to determine project directories")?;
        Ok(proj_dirs.config_dir().join(SETTINGS_FILE))
    }

    /// Loads settings from `path`, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {:?}", path))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse settings: {:?}", path))?;

        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Writes settings to `path`, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write settings: {:?}", path))?;

        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Re-reads the file at `path`, applies `change` and writes it back.
    ///
    /// Only what `change` touches differs from what was on disk, so values that
    /// came from the environment or the command line are never written out.
    pub fn update(path: &Path, change: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut stored = Self::load(path)?;
        change(&mut stored);
        stored.save(path)
    }

    /// Applies credential overrides from the environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            self.connection.api_key = key;
        }
        if let Some(folder) = lookup(ENV_FOLDER_ID).filter(|v| !v.is_empty()) {
            self.connection.folder_id = folder;
        }
    }

    pub fn credentials(&self) -> Credentials {
        self.connection.credentials()
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            refresh_interval: Duration::from_secs(self.general.refresh_interval_secs),
            cache_window: Duration::from_millis(self.general.result_cache_ms),
        }
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            batch_size: self.general.batch_size.max(1),
            proximity_margin: self.general.proximity_margin_px.max(0.0),
            placement: self.general.new_photo_placement,
        }
    }
}

/// Command-line arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    pub settings_path: Option<PathBuf>,
    pub api_key: Option<String>,
    pub folder_id: Option<String>,
    pub interval_secs: Option<u64>,
    pub sort_order: Option<SortOrder>,
    /// Run a single cycle, print the first batch, and exit.
    pub once: bool,
}

impl CliArgs {
    pub fn from_env() -> Result<Self> {
        Self::parse(std::env::args().skip(1))
    }

    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = CliArgs::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--settings" => {
                    let value = args.next().context("Missing value for --settings")?;
                    parsed.settings_path = Some(PathBuf::from(value));
                }
                "--api-key" => {
                    parsed.api_key = Some(args.next().context("Missing value for --api-key")?);
                }
                "--folder" => {
                    parsed.folder_id = Some(args.next().context("Missing value for --folder")?);
                }
                "--interval" => {
                    let value = args.next().context("Missing value for --interval")?;
                    parsed.interval_secs = Some(
                        value
                            .parse::<u64>()
                            .context("Failed to parse --interval as a number of seconds")?,
                    );
                }
                "--sort" => {
                    let value = args.next().context("Missing value for --sort")?;
                    let order = value
                        .parse::<SortOrder>()
                        .map_err(anyhow::Error::msg)
                        .context("Failed to parse --sort (expected field:direction)")?;
                    parsed.sort_order = Some(order);
                }
                "--once" => parsed.once = true,
                other => bail!("Unknown argument: {}", other),
            }
        }

        Ok(parsed)
    }

    /// The settings file to use: the explicit one, or the XDG default.
    pub fn settings_path(&self) -> Result<PathBuf> {
        match &self.settings_path {
            Some(path) => Ok(path.clone()),
            None => Settings::default_path(),
        }
    }

    /// Overrides settings with whatever was given on the command line.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(key) = &self.api_key {
            settings.connection.api_key = key.clone();
        }
        if let Some(folder) = &self.folder_id {
            settings.connection.folder_id = folder.clone();
        }
        if let Some(secs) = self.interval_secs {
            settings.general.refresh_interval_secs = secs;
        }
        if let Some(order) = self.sort_order {
            settings.sort_order = order;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SortDirection, SortField};
    use tempfile::tempdir;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.general.refresh_interval_secs, 30);
        assert_eq!(settings.general.batch_size, 32);
        assert_eq!(settings.general.result_cache_ms, 1000);
        assert_eq!(settings.general.proximity_margin_px, 300.0);
        assert_eq!(settings.general.new_photo_placement, NewPhotoPlacement::Prepend);
        assert_eq!(settings.sort_order, SortOrder::default());
        assert!(settings.notifications.enabled);
        assert!(settings.credentials().validate().is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.connection.api_key = "key".to_string();
        settings.connection.folder_id = "folder".to_string();
        settings.sort_order = SortOrder::new(SortField::Name, SortDirection::Asc);
        settings.general.new_photo_placement = NewPhotoPlacement::SortOrder;
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"refreshIntervalSecs\": 30"));
        assert!(raw.contains("\"newPhotoPlacement\": \"sortOrder\""));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"general": {"batchSize": 8}}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.general.batch_size, 8);
        assert_eq!(settings.general.refresh_interval_secs, 30);
        assert_eq!(settings.window_config().batch_size, 8);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load(&path).is_err());
    }

    #[test]
    fn test_update_keeps_overrides_out_of_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut on_disk = Settings::default();
        on_disk.connection.api_key = "file-key".to_string();
        on_disk.connection.folder_id = "file-folder".to_string();
        on_disk.save(&path).unwrap();

        let mut merged = Settings::load(&path).unwrap();
        merged.apply_env_with(|name| match name {
            ENV_API_KEY => Some("env-key".to_string()),
            _ => None,
        });
        CliArgs::parse(args(&["--folder", "cli-folder"]))
            .unwrap()
            .apply_to(&mut merged);
        assert_eq!(merged.credentials(), Credentials::new("env-key", "cli-folder"));

        let by_name = SortOrder::new(SortField::Name, SortDirection::Asc);
        Settings::update(&path, |stored| stored.sort_order = by_name).unwrap();

        let reloaded = Settings::load(&path).unwrap();
        assert_eq!(reloaded.sort_order, by_name);
        assert_eq!(reloaded.credentials(), Credentials::new("file-key", "file-folder"));
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("env-key"));
        assert!(!raw.contains("cli-folder"));
    }

    #[test]
    fn test_update_creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fresh").join("settings.json");

        Settings::update(&path, |stored| stored.notifications.enabled = false).unwrap();

        let reloaded = Settings::load(&path).unwrap();
        assert!(!reloaded.notifications.enabled);
        assert_eq!(reloaded.connection, ConnectionSettings::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings.apply_env_with(|name| match name {
            ENV_API_KEY => Some("env-key".to_string()),
            ENV_FOLDER_ID => Some(String::new()),
            _ => None,
        });
        assert_eq!(settings.connection.api_key, "env-key");
        assert_eq!(settings.connection.folder_id, "");
    }

    #[test]
    fn test_derived_configs() {
        let mut settings = Settings::default();
        settings.general.refresh_interval_secs = 0;
        settings.general.batch_size = 0;

        let sync = settings.sync_config();
        assert_eq!(sync.effective_interval(), Duration::from_secs(1));
        assert_eq!(sync.cache_window, Duration::from_millis(1000));
        assert_eq!(settings.window_config().batch_size, 1);
    }

    #[test]
    fn test_parse_args() {
        let parsed = CliArgs::parse(args(&[
            "--settings",
            "/tmp/s.json",
            "--api-key",
            "k",
            "--folder",
            "f",
            "--interval",
            "5",
            "--sort",
            "name:desc",
            "--once",
        ]))
        .unwrap();

        assert_eq!(parsed.settings_path, Some(PathBuf::from("/tmp/s.json")));
        assert!(parsed.once);

        let mut settings = Settings::default();
        parsed.apply_to(&mut settings);
        assert_eq!(settings.credentials(), Credentials::new("k", "f"));
        assert_eq!(settings.general.refresh_interval_secs, 5);
        assert_eq!(
            settings.sort_order,
            SortOrder::new(SortField::Name, SortDirection::Desc)
        );
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(CliArgs::parse(args(&["--interval"])).is_err());
        assert!(CliArgs::parse(args(&["--interval", "soon"])).is_err());
        assert!(CliArgs::parse(args(&["--sort", "size"])).is_err());
        assert!(CliArgs::parse(args(&["--bogus"])).is_err());
        assert_eq!(CliArgs::parse(Vec::new()).unwrap(), CliArgs::default());
    }
}
