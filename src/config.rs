use std::path::Path;

use log::debug;
use serde::Deserialize;

use crate::chart::render::{MIN_HEIGHT, MIN_WIDTH};
use crate::color::Palette;
use crate::error::ConfigError;

pub const ENV_STORE_CAPACITY: &str = "CSVCHART_STORE_CAPACITY";
pub const ENV_FIGURE_WIDTH: &str = "CSVCHART_FIGURE_WIDTH";
pub const ENV_FIGURE_HEIGHT: &str = "CSVCHART_FIGURE_HEIGHT";
pub const ENV_PALETTE: &str = "CSVCHART_PALETTE";

/// Runtime settings. Every field has a default, so a settings file only needs
/// the keys it overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Maximum number of uploaded tables kept in memory.
    pub store_capacity: usize,
    /// Rendered figure size in pixels.
    pub figure_width: u32,
    pub figure_height: u32,
    /// Palette used when a chart request names none.
    pub default_palette: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            store_capacity: 64,
            figure_width: 1000,
            figure_height: 600,
            default_palette: Palette::default().name().to_string(),
        }
    }
}

impl Settings {
    /// Defaults overlaid by a JSON settings file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let settings = Settings::from_json(&text)?;
        debug!("loaded settings from {}", path.as_ref().display());
        Ok(settings)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.validate()
    }

    /// Defaults (or `path`, when given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => Settings::from_json_file(path)?,
            None => Settings::default(),
        };
        settings.with_env(|name| std::env::var(name).ok())
    }

    /// Overlay values looked up through `var`, which maps an environment
    /// variable name to its value.
    pub fn with_env<F>(mut self, var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var(ENV_STORE_CAPACITY) {
            self.store_capacity = parse_env(ENV_STORE_CAPACITY, &v)?;
        }
        if let Some(v) = var(ENV_FIGURE_WIDTH) {
            self.figure_width = parse_env(ENV_FIGURE_WIDTH, &v)?;
        }
        if let Some(v) = var(ENV_FIGURE_HEIGHT) {
            self.figure_height = parse_env(ENV_FIGURE_HEIGHT, &v)?;
        }
        if let Some(v) = var(ENV_PALETTE) {
            self.default_palette = v.trim().to_string();
        }
        self.validate()
    }

    /// Reject figure sizes no chart can be drawn on.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.figure_width < MIN_WIDTH || self.figure_height < MIN_HEIGHT {
            return Err(ConfigError::FigureTooSmall {
                width: self.figure_width,
                height: self.figure_height,
            });
        }
        Ok(self)
    }

    /// The configured default palette; unknown names fall back to `plotly`.
    pub fn palette(&self) -> Palette {
        Palette::resolve(Some(&self.default_palette), Palette::default())
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.store_capacity, 64);
        assert_eq!((s.figure_width, s.figure_height), (1000, 600));
        assert_eq!(s.palette(), Palette::Plotly);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let s = Settings::from_json(r#"{"figure_width": 640, "default_palette": "viridis"}"#).unwrap();
        assert_eq!(s.figure_width, 640);
        assert_eq!(s.figure_height, 600);
        assert_eq!(s.palette(), Palette::Viridis);
    }

    #[test]
    fn json_file_round_trip() {
        let path = std::env::temp_dir().join(format!("csvchart-settings-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"store_capacity": 3}}"#).unwrap();
        let s = Settings::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(s.store_capacity, 3);
    }

    #[test]
    fn environment_overrides_file() {
        let s = Settings::default()
            .with_env(env(&[(ENV_STORE_CAPACITY, " 8 "), (ENV_PALETTE, "dark")]))
            .unwrap();
        assert_eq!(s.store_capacity, 8);
        assert_eq!(s.palette(), Palette::Dark);
    }

    #[test]
    fn bad_environment_value_is_reported() {
        let err = Settings::default()
            .with_env(env(&[(ENV_FIGURE_HEIGHT, "tall")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: ENV_FIGURE_HEIGHT, .. }));
    }

    #[test]
    fn tiny_figure_size_is_rejected() {
        let err = Settings::from_json(r#"{"figure_width": 120}"#).unwrap_err();
        assert!(matches!(err, ConfigError::FigureTooSmall { width: 120, height: 600 }));

        let err = Settings::default()
            .with_env(env(&[(ENV_FIGURE_HEIGHT, "10")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::FigureTooSmall { height: 10, .. }));

        let smallest = format!(r#"{{"figure_width": {MIN_WIDTH}, "figure_height": {MIN_HEIGHT}}}"#);
        assert!(Settings::from_json(&smallest).is_ok());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Settings::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
