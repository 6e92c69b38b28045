//! Settings loaded from the embedded `defaults.toml` and an optional user file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::scope::GlobalExceptions;

// Embed the defaults directly in the binary at compile time
const DEFAULTS_TOML: &str = include_str!("../defaults.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub library: LibrarySettings,
    pub scope: ScopeSettings,
    pub files: FileSettings,
    pub render: RenderSettings,
    pub minify: MinifySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibrarySettings {
    pub prefix: String,
    pub global_symbol: String,
    pub detection_suffix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeSettings {
    pub default_name: String,
    pub legacy_selector: String,
    pub global_components: Vec<String>,
    pub global_elements: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileSettings {
    pub root: String,
    pub stylesheets: Vec<String>,
    pub scripts: Vec<String>,
    pub minified_suffix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderEngine {
    Builtin,
    Lessc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderSettings {
    pub engine: RenderEngine,
    pub lessc: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinifySettings {
    pub enabled: bool,
}

impl Settings {
    /// The built-in defaults.
    pub fn embedded() -> Result<Self> {
        toml::from_str(DEFAULTS_TOML).context("Failed to parse embedded defaults")
    }

    /// Defaults with the TOML file at `path` merged over them. Keys missing
    /// from the file keep their default value.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_overrides(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    fn from_overrides(text: &str) -> Result<Self> {
        let mut merged: toml::Value =
            toml::from_str(DEFAULTS_TOML).context("Failed to parse embedded defaults")?;
        let overrides: toml::Value = toml::from_str(text)?;
        merge(&mut merged, overrides);
        Ok(merged.try_into()?)
    }

    pub fn global_exceptions(&self) -> GlobalExceptions {
        GlobalExceptions {
            components: self.scope.global_components.clone(),
            elements: self.scope.global_elements.clone(),
        }
    }
}

/// Deep-merge tables of `overrides` into `base`; other values replace.
fn merge(base: &mut toml::Value, overrides: toml::Value) {
    match (base, overrides) {
        (toml::Value::Table(base), toml::Value::Table(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overrides) => *base = overrides,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults() {
        let settings = Settings::embedded().unwrap();
        assert_eq!(settings.library.prefix, "uk");
        assert_eq!(settings.library.global_symbol, "UIkit");
        assert_eq!(settings.scope.default_name, "uk-scope");
        assert_eq!(settings.scope.global_elements, vec!["html"]);
        assert_eq!(settings.files.root, "dist");
        assert_eq!(settings.render.engine, RenderEngine::Builtin);
        assert!(settings.minify.enabled);
    }

    #[test]
    fn test_overrides_keep_other_defaults() {
        let settings = Settings::from_overrides(
            "[library]\nprefix = \"acme\"\n[render]\nengine = \"lessc\"\n",
        )
        .unwrap();
        assert_eq!(settings.library.prefix, "acme");
        assert_eq!(settings.library.global_symbol, "UIkit");
        assert_eq!(settings.render.engine, RenderEngine::Lessc);
        assert_eq!(settings.render.lessc, "lessc");
    }

    #[test]
    fn test_arrays_are_replaced() {
        let settings =
            Settings::from_overrides("[scope]\nglobal_components = [\"drag\"]\n").unwrap();
        assert_eq!(settings.scope.global_components, vec!["drag"]);
        assert_eq!(settings.global_exceptions().components, vec!["drag"]);
    }

    #[test]
    fn test_load_reports_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rescope.toml");
        fs::write(&path, "[render]\nengine = \"sass\"\n").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config"));
    }
}
