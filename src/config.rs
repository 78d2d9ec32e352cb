use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::ConfigError;

const CONFIG_FILE_NAME: &str = "desk.yml";
const FALLBACK_CONFIG_FILE_NAME: &str = ".desk.yml";

/// Stand height used when neither the file nor the command line sets one.
pub const DEFAULT_STAND_HEIGHT: f64 = 1.12;
/// Sit height used when neither the file nor the command line sets one.
pub const DEFAULT_SIT_HEIGHT: f64 = 0.74;

/// Persistent desk settings stored as YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    connection_address: String,
    local_name: String,
    stand_height: f64,
    sit_height: f64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            connection_address: String::new(),
            local_name: String::new(),
            stand_height: DEFAULT_STAND_HEIGHT,
            sit_height: DEFAULT_SIT_HEIGHT,
        }
    }
}

/// Sit and stand heights after command-line overrides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightPresets {
    pub sit: f64,
    pub stand: f64,
}

impl HeightPresets {
    /// Returns whichever preset is further from `current`; stand wins a tie.
    #[must_use]
    pub fn toggle_target(&self, current: f64) -> f64 {
        if (current - self.sit).abs() > (current - self.stand).abs() {
            self.sit
        } else {
            self.stand
        }
    }
}

impl Configuration {
    /// Loads settings from `path`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    #[instrument(level = "debug", fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("configuration file missing; using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes settings to `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or any filesystem operation fails.
    #[instrument(skip(self), level = "debug", fields(path = %path.display()))]
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let serialised = serde_yaml::to_string(self).map_err(ConfigError::Serialise)?;
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        fs::write(path, serialised).map_err(write_error)
    }

    /// Records the desk chosen during `configure`.
    #[must_use]
    pub fn with_desk(mut self, address: impl Into<String>, local_name: Option<&str>) -> Self {
        self.connection_address = address.into();
        self.local_name = local_name.unwrap_or_default().to_string();
        self
    }

    /// Returns the configured desk address, if one is set.
    #[must_use]
    pub fn connection_address(&self) -> Option<&str> {
        Some(self.connection_address.trim()).filter(|address| !address.is_empty())
    }

    /// Returns the configured desk address.
    ///
    /// # Errors
    ///
    /// Returns an error naming `path` when no address is configured.
    pub fn require_connection_address(&self, path: &Path) -> Result<&str, ConfigError> {
        self.connection_address()
            .ok_or_else(|| ConfigError::MissingConnectionAddress {
                path: path.to_path_buf(),
            })
    }

    /// Returns the configured desk name, if one is set.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        Some(self.local_name.trim()).filter(|name| !name.is_empty())
    }

    /// Resolves sit and stand heights, preferring positive overrides.
    #[must_use]
    pub fn presets(&self, sit_override: Option<f64>, stand_override: Option<f64>) -> HeightPresets {
        HeightPresets {
            sit: pick_height(sit_override, self.sit_height, DEFAULT_SIT_HEIGHT),
            stand: pick_height(stand_override, self.stand_height, DEFAULT_STAND_HEIGHT),
        }
    }
}

fn pick_height(cli: Option<f64>, configured: f64, default: f64) -> f64 {
    cli.into_iter()
        .chain([configured])
        .find(|height| *height > 0.0)
        .unwrap_or(default)
}

/// Returns the per-user configuration path, or `.desk.yml` in the working
/// directory when no home directory is known.
#[must_use]
pub fn default_config_path() -> PathBuf {
    match ProjectDirs::from("", "", "desk") {
        Some(project_dirs) => project_dirs.config_dir().join(CONFIG_FILE_NAME),
        None => PathBuf::from(FALLBACK_CONFIG_FILE_NAME),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn unique_temp_path(file_name: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("desk-{file_name}-{suffix}.yml"))
    }

    fn remove_if_exists(path: &Path) {
        if path.exists() {
            fs::remove_file(path).expect("temporary fixture file should be removable");
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = unique_temp_path("missing");

        let config = Configuration::load(&path).expect("missing file should load");

        assert_eq!(Configuration::default(), config);
        assert_eq!(None, config.connection_address());
    }

    #[test]
    fn saved_configuration_reloads() {
        let path = unique_temp_path("round-trip");
        let config = Configuration::default().with_desk("E8:5B:5B:24:22:E4", Some("Desk 8421"));

        config.save(&path).expect("configuration should save");
        let reloaded = Configuration::load(&path).expect("configuration should reload");

        assert_eq!(Some("E8:5B:5B:24:22:E4"), reloaded.connection_address());
        assert_eq!(Some("Desk 8421"), reloaded.local_name());
        remove_if_exists(&path);
    }

    #[test]
    fn partial_file_keeps_default_heights() {
        let path = unique_temp_path("partial");
        fs::write(&path, "connection_address: AA:BB\n").expect("fixture should write");

        let config = Configuration::load(&path).expect("partial file should load");

        assert_eq!(
            HeightPresets {
                sit: DEFAULT_SIT_HEIGHT,
                stand: DEFAULT_STAND_HEIGHT
            },
            config.presets(None, None)
        );
        remove_if_exists(&path);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let path = unique_temp_path("malformed");
        fs::write(&path, "stand_height: [not, a, number]\n").expect("fixture should write");

        let result = Configuration::load(&path);

        assert_matches!(result, Err(ConfigError::Parse { .. }));
        remove_if_exists(&path);
    }

    #[test]
    fn missing_address_names_the_file() {
        let path = PathBuf::from("/tmp/desk.yml");

        let config = Configuration::default();

        let result = config.require_connection_address(&path);

        assert_matches!(
            result,
            Err(ConfigError::MissingConnectionAddress { path: reported }) if reported == path
        );
    }

    #[rstest]
    #[case::override_wins(Some(0.70), 0.76, 0.70)]
    #[case::configured(None, 0.76, 0.76)]
    #[case::zero_override_ignored(Some(0.0), 0.76, 0.76)]
    #[case::zero_configured_falls_back(None, 0.0, DEFAULT_SIT_HEIGHT)]
    fn sit_height_resolution(
        #[case] cli: Option<f64>,
        #[case] configured: f64,
        #[case] expected: f64,
    ) {
        assert_eq!(expected, pick_height(cli, configured, DEFAULT_SIT_HEIGHT));
    }

    #[rstest]
    #[case::sitting_goes_up(0.76, 1.25)]
    #[case::standing_goes_down(1.24, 0.75)]
    #[case::midpoint_prefers_stand(1.0, 1.25)]
    fn toggle_picks_further_preset(#[case] current: f64, #[case] expected: f64) {
        let presets = HeightPresets {
            sit: 0.75,
            stand: 1.25,
        };
        assert_eq!(expected, presets.toggle_target(current));
    }
}
