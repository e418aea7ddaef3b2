use crate::places;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub server: ServerConfig,
    pub style: StyleConfig,
    pub places: Vec<PlacesConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    /// Directory the data paths are resolved against. Defaults to the
    /// directory holding the executable.
    pub base_dir: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub archive: PathBuf,
    pub boundary_file: String,
    pub points_file: String,
    pub province_field: String,
    pub name_field: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            data_dir: PathBuf::from("data"),
            archive: PathBuf::from("data.zip"),
            boundary_file: "geoBoundaries-CAN-ADM1_simplified.geojson".to_string(),
            points_file: "hotosm_can_points_of_interest_points_geojson.geojson".to_string(),
            province_field: "shapeName".to_string(),
            name_field: "name".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8050,
            session_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StyleConfig {
    pub base_color: String,      // Hex code
    pub highlight_color: String, // Hex code
    pub border_color: String,
    pub marker_color: String,
    pub clicked_marker_color: String,
    pub marker_size: f64,
    pub clicked_marker_size: f64,
    pub map_style: String,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            base_color: "#d9d9d9".to_string(),
            highlight_color: "#e4572e".to_string(),
            border_color: "#ffffff".to_string(),
            marker_color: "#1f77b4".to_string(),
            clicked_marker_color: "#ffbf00".to_string(),
            marker_size: 9.0,
            clicked_marker_size: 15.0,
            map_style: "carto-positron".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PlacesConfig {
    pub province: String,
    pub names: Vec<String>,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Load the config file if it exists. A missing file at the default
    /// location is not an error; an explicitly requested one is.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        let mut config = if path.exists() || explicit {
            info!(path = ?path, "loading configuration");
            Self::load_from_file(path)?
        } else {
            info!(path = ?path, "no configuration file, using defaults");
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// `HOST` and `PORT` win over the file.
    pub fn apply_env(&mut self) {
        if let Ok(host) = env::var("HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(value = %port, "ignoring unparseable PORT"),
            }
        }
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn base_dir(&self) -> PathBuf {
        if let Some(dir) = &self.input.base_dir {
            return dir.clone();
        }
        env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base_dir().join(&self.input.data_dir)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.base_dir().join(&self.input.archive)
    }

    pub fn boundary_path(&self) -> PathBuf {
        self.data_dir().join(&self.input.boundary_file)
    }

    pub fn points_path(&self) -> PathBuf {
        self.data_dir().join(&self.input.points_file)
    }

    /// The province -> notable places mapping, in declaration order.
    pub fn notable_places(&self) -> Vec<PlacesConfig> {
        if self.places.is_empty() {
            places::default_places()
        } else {
            self.places.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8050);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.input.province_field, "shapeName");
        assert!(!config.notable_places().is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [input]
            base_dir = "/srv/map"

            [[places]]
            province = "Ontario"
            names = ["CN Tower"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(
            config.boundary_path(),
            PathBuf::from("/srv/map/data/geoBoundaries-CAN-ADM1_simplified.geojson")
        );
        assert_eq!(config.archive_path(), PathBuf::from("/srv/map/data.zip"));
        assert_eq!(
            config.notable_places(),
            vec![PlacesConfig {
                province: "Ontario".to_string(),
                names: vec!["CN Tower".to_string()],
            }]
        );
    }

    #[test]
    fn test_missing_default_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("config.toml"), false).unwrap();
        assert_eq!(config.input.name_field, "name");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(&dir.path().join("nope.toml"), true).is_err());
    }
}
