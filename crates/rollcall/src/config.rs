//! Configuration management for rollcall.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::api::http::parse_base_url;
use crate::error::{Error, Result};
use crate::geo::Coordinates;
use crate::location::{LocationConfig, LocationTier};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default config directory name.
const CONFIG_DIR_NAME: &str = "rollcall";

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "ROLLCALL_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `ROLLCALL_`, sections split by
///    `__`, e.g. `ROLLCALL_API__BASE_URL`)
/// 2. TOML config file at `~/.config/rollcall/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Attendance service configuration.
    pub api: ApiConfig,
    /// Location configuration.
    pub location: LocationSettings,
}

/// Attendance service configuration.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API root, e.g. `https://attendance.example.com/api`.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Bearer token of the signed-in user.
    pub token: Option<String>,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Location configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationSettings {
    /// Accuracy tier for location fixes.
    pub tier: LocationTier,
    /// Fixed latitude to report instead of a device fix.
    pub latitude: Option<f64>,
    /// Fixed longitude to report instead of a device fix.
    pub longitude: Option<f64>,
    /// Reported accuracy in meters for the fixed position.
    pub accuracy: Option<f64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            request_timeout_secs: 10,
            token: None,
        }
    }
}

impl LocationSettings {
    /// The configured fixed position, when both coordinates are set.
    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
            _ => None,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `ROLLCALL_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let config: Config = Self::figment(&config_file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults merged with the TOML file, without environment overrides.
    fn figment(config_file: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        parse_base_url(&self.api.base_url)?;

        if self.api.request_timeout_secs == 0 {
            return Err(Error::config_validation(
                "api.request_timeout_secs must be greater than 0",
            ));
        }

        let location = &self.location;
        match (location.latitude, location.longitude) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(Error::config_validation(
                    "location.latitude and location.longitude must be set together",
                ));
            }
            (Some(latitude), Some(longitude)) => {
                Coordinates::new(latitude, longitude)
                    .validate()
                    .map_err(|e| Error::config_validation(format!("location: {e}")))?;
            }
            (None, None) => {}
        }

        if let Some(accuracy) = location.accuracy {
            if !accuracy.is_finite() || accuracy < 0.0 {
                return Err(Error::config_validation(format!(
                    "location.accuracy must be a non-negative number, got {accuracy}"
                )));
            }
        }

        Ok(())
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// Timeout and staleness limits for the configured tier.
    #[must_use]
    pub fn location_config(&self) -> LocationConfig {
        self.location.tier.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rollcall-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.api.base_url, "http://localhost:8000/api");
        assert_eq!(config.api.request_timeout_secs, 10);
        assert!(config.api.token.is_none());
        assert_eq!(config.location.tier, LocationTier::High);
        assert!(config.location.coordinates().is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_base_url() {
        let mut config = Config::default();
        config.api.base_url = "localhost:8000".to_string();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::BaseUrl { .. }));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.api.request_timeout_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("request_timeout_secs"));
    }

    #[test]
    fn test_validate_half_a_position() {
        let mut config = Config::default();
        config.location.latitude = Some(19.4326);

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("set together"));
    }

    #[test]
    fn test_validate_out_of_bounds_position() {
        let mut config = Config::default();
        config.location.latitude = Some(95.0);
        config.location.longitude = Some(0.0);

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("latitude"));
    }

    #[test]
    fn test_validate_negative_accuracy() {
        let mut config = Config::default();
        config.location.accuracy = Some(-1.0);

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("accuracy"));
    }

    #[test]
    fn test_request_timeout() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_location_config_follows_tier() {
        let mut config = Config::default();
        config.location.tier = LocationTier::Low;
        assert_eq!(config.location_config().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_fixed_coordinates_need_both_values() {
        let mut config = Config::default();
        assert_eq!(config.location.coordinates(), None);

        config.location.latitude = Some(19.4326);
        assert_eq!(config.location.coordinates(), None);

        config.location.longitude = Some(-99.1332);
        assert_eq!(
            config.location.coordinates(),
            Some(Coordinates::new(19.4326, -99.1332))
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let mut config = Config::default();
        config.api.token = Some("secret-token".to_string());

        let debug_str = format!("{config:?}");
        assert!(debug_str.contains("<redacted>"));
        assert!(!debug_str.contains("secret-token"));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("rollcall"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Loading from a nonexistent path should work (uses defaults)
        let config = Config::figment(Path::new("/nonexistent/config.toml"))
            .extract::<Config>()
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml() {
        let path = temp_config(
            "valid.toml",
            r#"
            [api]
            base_url = "https://attendance.example.com/api"
            request_timeout_secs = 20

            [location]
            tier = "balanced"
            latitude = 19.4326
            longitude = -99.1332
            "#,
        );
        let config: Config = Config::figment(&path).extract().unwrap();

        assert_eq!(config.api.base_url, "https://attendance.example.com/api");
        assert_eq!(config.api.request_timeout_secs, 20);
        assert_eq!(config.location.tier, LocationTier::Balanced);
        assert!(config.location.coordinates().is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_rejects_invalid_values() {
        let path = temp_config(
            "invalid.toml",
            r#"
            [api]
            request_timeout_secs = 0
            "#,
        );
        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_load_from_rejects_unknown_tier() {
        let path = temp_config(
            "tier.toml",
            r#"
            [location]
            tier = "extreme"
            "#,
        );
        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(matches!(err, Error::ConfigLoad(_)));
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("request_timeout_secs"));
        assert!(json.contains("\"tier\":\"high\""));
    }
}
