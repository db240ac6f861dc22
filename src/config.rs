use crate::render::TaskOrder;
use crate::week::WindowPreset;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const SERVER_ENV: &str = "WEEKBOARD_SERVER";
const PROJECT_SETTINGS: &str = ".weekboard/config.yml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn is_dark(&self) -> bool {
        *self == Theme::Dark
    }

    pub fn toggled(self) -> Theme {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Only `light` is written; a missing key means dark.
    #[serde(default, skip_serializing_if = "Theme::is_dark")]
    pub theme: Theme,
    #[serde(default)]
    pub window: WindowPreset,
    #[serde(default)]
    pub task_order: TaskOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server_url: default_server_url(),
            theme: Theme::Dark,
            window: WindowPreset::default(),
            task_order: TaskOrder::default(),
            log_level: None,
        }
    }
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsScope {
    Project,
    Global,
}

#[derive(Debug, Clone)]
pub struct SettingsLocation {
    pub path: PathBuf,
    pub scope: SettingsScope,
}

impl SettingsScope {
    pub fn label(&self) -> &'static str {
        match self {
            SettingsScope::Project => "project",
            SettingsScope::Global => "global",
        }
    }
}

/// Creates `.weekboard/config.yml` in the current directory, keeping an
/// existing file as is.
pub fn init_project_settings(server_url: Option<String>) -> Result<SettingsLocation> {
    let cwd = env::current_dir()?;
    init_settings_in(&cwd, server_url)
}

fn init_settings_in(dir: &Path, server_url: Option<String>) -> Result<SettingsLocation> {
    let location = SettingsLocation {
        path: dir.join(PROJECT_SETTINGS),
        scope: SettingsScope::Project,
    };
    if !location.path.exists() {
        let mut settings = Settings::default();
        if let Some(url) = server_url {
            settings.server_url = url;
        }
        save_settings(&location, &settings)?;
    }
    Ok(location)
}

pub fn locate_settings(start: &Path) -> Result<SettingsLocation> {
    if let Some(project_path) = find_project_settings(start) {
        return Ok(SettingsLocation {
            path: project_path,
            scope: SettingsScope::Project,
        });
    }
    Ok(SettingsLocation {
        path: global_settings_path()?,
        scope: SettingsScope::Global,
    })
}

pub fn load_settings(location: &SettingsLocation) -> Result<Settings> {
    if location.path.exists() {
        let data = fs::read_to_string(&location.path)
            .with_context(|| format!("reading {:?}", location.path))?;
        let settings: Settings = serde_yaml::from_str(&data).context("parsing settings file")?;
        Ok(settings)
    } else {
        let settings = Settings::default();
        save_settings(location, &settings)?;
        Ok(settings)
    }
}

pub fn save_settings(location: &SettingsLocation, settings: &Settings) -> Result<()> {
    if let Some(parent) = location.path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(settings).context("serializing settings")?;
    fs::write(&location.path, serialized)
        .with_context(|| format!("writing {:?}", location.path))?;
    Ok(())
}

/// Persists the theme flag without writing back any runtime overrides.
pub fn save_theme(location: &SettingsLocation, theme: Theme) -> Result<()> {
    let mut settings = load_settings(location)?;
    settings.theme = theme;
    save_settings(location, &settings)
}

/// Applies `WEEKBOARD_SERVER`, then the command-line flags, on top of the
/// file settings.
pub fn apply_overrides(
    settings: &mut Settings,
    server: Option<String>,
    window: Option<WindowPreset>,
) {
    if let Ok(url) = env::var(SERVER_ENV) {
        if !url.trim().is_empty() {
            settings.server_url = url.trim().to_string();
        }
    }
    if let Some(url) = server {
        settings.server_url = url;
    }
    if let Some(preset) = window {
        settings.window = preset;
    }
}

pub fn log_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().join("logs"))
}

fn find_project_settings(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let candidate = current.join(PROJECT_SETTINGS);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

fn global_settings_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.yml"))
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "weekboard").context("locating configuration directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_settings_are_found_from_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let created = init_settings_in(dir.path(), Some("http://board.local".into())).unwrap();
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();

        let found = locate_settings(&nested).unwrap();
        assert_eq!(found.scope, SettingsScope::Project);
        assert_eq!(found.path, created.path);
        let settings = load_settings(&found).unwrap();
        assert_eq!(settings.server_url, "http://board.local");
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let location = SettingsLocation {
            path: dir.path().join("conf/config.yml"),
            scope: SettingsScope::Global,
        };
        let settings = load_settings(&location).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(location.path.exists());
    }

    #[test]
    fn theme_flag_is_written_only_when_light() {
        let mut settings = Settings::default();
        let dark = serde_yaml::to_string(&settings).unwrap();
        assert!(!dark.contains("theme"));

        settings.theme = settings.theme.toggled();
        let light = serde_yaml::to_string(&settings).unwrap();
        assert!(light.contains("theme: light"));

        let parsed: Settings = serde_yaml::from_str("server_url: http://x\n").unwrap();
        assert_eq!(parsed.theme, Theme::Dark);
        assert_eq!(parsed.window, WindowPreset::FourDay);
        assert_eq!(parsed.task_order, TaskOrder::DoneLast);
    }

    #[test]
    fn saving_theme_keeps_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let location = init_settings_in(dir.path(), Some("http://file".into())).unwrap();
        save_theme(&location, Theme::Light).unwrap();
        let settings = load_settings(&location).unwrap();
        assert_eq!(settings.theme, Theme::Light);
        assert_eq!(settings.server_url, "http://file");
    }

    #[test]
    fn flags_override_file_values() {
        let mut settings = Settings::default();
        apply_overrides(
            &mut settings,
            Some("http://flag:9000".into()),
            Some(WindowPreset::Rolling),
        );
        assert_eq!(settings.server_url, "http://flag:9000");
        assert_eq!(settings.window, WindowPreset::Rolling);
    }
}
