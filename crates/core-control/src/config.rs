//! Control configuration: the attribute surface plus TOML discovery.
//!
//! Every knob a control exposes lives on [`ControlConfig`]. Boolean
//! attributes are presence-based: a missing key means `false`. Unknown keys
//! are ignored so config files can carry forward-looking entries, and a
//! file that fails to read or parse degrades to defaults instead of
//! aborting startup.

use std::{fs, path::PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use core_options::FieldMap;
use core_render::Theme;

/// How the control surface reacts to typing while closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// Always-visible text input that filters as you type.
    #[default]
    Combobox,
    /// Activating the control opens the list with a dedicated search box.
    Enhanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeVariant {
    Sm,
    #[default]
    Md,
    Lg,
}

impl SizeVariant {
    /// Control surface width in cells.
    pub fn width(self) -> u16 {
        match self {
            Self::Sm => 24,
            Self::Md => 40,
            Self::Lg => 56,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeChoice {
    Light,
    #[default]
    Dark,
}

impl ThemeChoice {
    pub fn theme(self) -> Theme {
        match self {
            Self::Light => Theme::light(),
            Self::Dark => Theme::dark(),
        }
    }
}

/// The per-control attribute surface.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ControlConfig {
    #[serde(default = "ControlConfig::default_name")]
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "ControlConfig::default_placeholder")]
    pub placeholder: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default = "ControlConfig::default_searchable")]
    pub searchable: bool,
    #[serde(default)]
    pub clearable: bool,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub allow_create: bool,
    #[serde(default)]
    pub show_recent: bool,
    #[serde(default)]
    pub data_url: Option<String>,
    #[serde(default)]
    pub min_search_length: usize,
    /// Field-name remapping for foreign record shapes; flattened so the
    /// keys sit at the control level (`id_field = "uuid"`).
    #[serde(flatten)]
    pub fields: FieldMap,
    #[serde(default)]
    pub mode: InteractionMode,
    /// Empty string means the control joins no sync group.
    #[serde(default)]
    pub sync_group: String,
    #[serde(default)]
    pub size: SizeVariant,
    #[serde(default)]
    pub theme: ThemeChoice,
    #[serde(default = "ControlConfig::default_empty_text")]
    pub empty_text: String,
    #[serde(default = "ControlConfig::default_search_placeholder")]
    pub search_placeholder: String,
}

impl ControlConfig {
    fn default_name() -> String {
        "hybrid-select".to_string()
    }
    fn default_placeholder() -> String {
        "Select an option".to_string()
    }
    const fn default_searchable() -> bool {
        true
    }
    fn default_empty_text() -> String {
        "No options found".to_string()
    }
    fn default_search_placeholder() -> String {
        "Search…".to_string()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            label: None,
            placeholder: Self::default_placeholder(),
            disabled: false,
            required: false,
            readonly: false,
            searchable: Self::default_searchable(),
            clearable: false,
            multiple: false,
            allow_create: false,
            show_recent: false,
            data_url: None,
            min_search_length: 0,
            fields: FieldMap::default(),
            mode: InteractionMode::default(),
            sync_group: String::new(),
            size: SizeVariant::default(),
            theme: ThemeChoice::default(),
            empty_text: Self::default_empty_text(),
            search_placeholder: Self::default_search_placeholder(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub controls: Vec<ControlConfig>,
}

impl ConfigFile {
    pub fn control(&self, name: &str) -> Option<&ControlConfig> {
        self.controls.iter().find(|c| c.name == name)
    }
}

/// Best-effort config path following platform conventions: a local
/// `hybrid-controls.toml` wins over the platform config directory.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("hybrid-controls.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("hybrid-controls").join("hybrid-controls.toml");
    }
    PathBuf::from("hybrid-controls.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<ConfigFile> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => Ok(file),
            Err(err) => {
                debug!(
                    target: "config",
                    path = %path.display(),
                    error = %err,
                    "config parse failed; using defaults"
                );
                Ok(ConfigFile::default())
            }
        }
    } else {
        Ok(ConfigFile::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_controls__.toml"))).unwrap();
        assert!(cfg.controls.is_empty());
    }

    #[test]
    fn parse_failure_degrades_to_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "controls = \"not an array\"").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert!(cfg.controls.is_empty());
    }

    #[test]
    fn booleans_are_presence_based() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"
[[controls]]
name = "crew"
multiple = true
allow_create = true
"#,
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        let crew = cfg.control("crew").unwrap();
        assert!(crew.multiple);
        assert!(crew.allow_create);
        assert!(!crew.disabled);
        assert!(!crew.show_recent);
        assert!(crew.searchable, "searchable defaults on");
        assert_eq!(crew.placeholder, "Select an option");
    }

    #[test]
    fn field_remaps_flatten_to_the_control_level() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"
[[controls]]
name = "sites"
data_url = "http://example.test/sites"
id_field = "uuid"
label_field = "displayName"
"#,
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        let sites = cfg.control("sites").unwrap();
        assert_eq!(sites.fields.id_field, "uuid");
        assert_eq!(sites.fields.label_field, "displayName");
        assert_eq!(sites.fields.value_field, "value");
        assert_eq!(sites.data_url.as_deref(), Some("http://example.test/sites"));
    }

    #[test]
    fn enums_parse_from_lowercase_names() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"
[[controls]]
name = "route"
mode = "enhanced"
size = "lg"
theme = "light"
sync_group = "jobs"
"#,
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        let route = cfg.control("route").unwrap();
        assert_eq!(route.mode, InteractionMode::Enhanced);
        assert_eq!(route.size, SizeVariant::Lg);
        assert_eq!(route.theme, ThemeChoice::Light);
        assert_eq!(route.sync_group, "jobs");
        assert_eq!(route.size.width(), 56);
        assert_eq!(route.theme.theme(), Theme::light());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"
[[controls]]
name = "crew"
future_knob = 42
"#,
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert!(cfg.control("crew").is_some());
    }
}
