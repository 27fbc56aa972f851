// EnrolSift - platform/config.rs
//
// Platform-specific directory resolution and config.toml loading with
// startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for EnrolSift data and configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/enrolsift/ or %APPDATA%\EnrolSift\config\)
    pub config_dir: PathBuf,

    /// Data directory holding the default store file.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to the current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            Self {
                config_dir: PathBuf::from("."),
                data_dir: PathBuf::from("."),
            }
        }
    }

    /// Default `config.toml` location.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }

    /// Default store document location.
    pub fn store_file(&self) -> PathBuf {
        self.data_dir.join(constants::STORE_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are ignored so a newer config file still loads.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[store]` section.
    pub store: StoreSection,
    /// `[filters]` section.
    pub filters: FiltersSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[store]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Store document path (default: platform data dir).
    pub path: Option<String>,
    /// Top-level node holding per-owner data.
    pub owner_namespace: Option<String>,
    /// Dataset the saved configurations apply to.
    pub dataset_key: Option<String>,
    /// Top-level node mapping owner ids to display names.
    pub owner_directory: Option<String>,
}

/// `[filters]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct FiltersSection {
    /// Longest accepted search term, in characters.
    pub max_search_term_chars: Option<usize>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    // -- Store --
    /// Store document path; `None` means the platform default.
    pub store_path: Option<PathBuf>,
    pub owner_namespace: String,
    pub dataset_key: String,
    pub owner_directory: String,

    // -- Filters --
    pub max_search_term_chars: usize,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    /// Log file path.
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            owner_namespace: constants::DEFAULT_OWNER_NAMESPACE.to_string(),
            dataset_key: constants::DEFAULT_DATASET_KEY.to_string(),
            owner_directory: constants::DEFAULT_OWNER_DIRECTORY.to_string(),
            max_search_term_chars: constants::DEFAULT_MAX_SEARCH_TERM_CHARS,
            log_level: None,
            log_file: None,
        }
    }
}

/// Load and validate the `config.toml` at `config_path`.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// A missing file yields defaults with no warnings (first run). An unreadable
/// or unparseable file yields defaults plus a warning so the tool still runs.
pub fn load_config(config_path: &Path) -> (AppConfig, Vec<String>) {
    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), Vec::new());
    }

    match load_config_file(config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            let msg =
                format!("{e}. Using defaults. See config.example.toml for the expected format.");
            tracing::warn!("{}", msg);
            (AppConfig::default(), vec![msg])
        }
    }
}

/// Load and validate an explicitly named config file.
///
/// Unlike `load_config`, a missing or malformed file is an error: a path the
/// user typed should never be silently ignored. Out-of-range values still
/// fall back with a warning.
pub fn load_config_file(path: &Path) -> Result<(AppConfig, Vec<String>), ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let raw: RawConfig = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source: e,
    })?;

    tracing::info!(path = %path.display(), "Loaded config.toml");
    Ok(validate(raw))
}

/// Validate each field against named constants, accumulating all warnings.
pub fn validate(raw: RawConfig) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();
    let mut config = AppConfig::default();

    // -- Store: path --
    if let Some(path) = raw.store.path.filter(|p| !p.trim().is_empty()) {
        config.store_path = Some(PathBuf::from(path));
    }

    // -- Store: node names --
    let names = [
        ("owner_namespace", raw.store.owner_namespace, &mut config.owner_namespace),
        ("dataset_key", raw.store.dataset_key, &mut config.dataset_key),
        ("owner_directory", raw.store.owner_directory, &mut config.owner_directory),
    ];
    for (field, value, target) in names {
        let Some(value) = value else { continue };
        if is_valid_node_name(&value) {
            *target = value;
        } else {
            warnings.push(format!(
                "[store] {field} = {value:?} is not a valid node name \
                 (non-empty, no control characters, none of {:?}). Using default ({target}).",
                constants::FORBIDDEN_SEGMENT_CHARS,
            ));
        }
    }

    // -- Filters: max_search_term_chars --
    if let Some(max) = raw.filters.max_search_term_chars {
        if (constants::MIN_MAX_SEARCH_TERM_CHARS..=constants::ABSOLUTE_MAX_SEARCH_TERM_CHARS)
            .contains(&max)
        {
            config.max_search_term_chars = max;
        } else {
            warnings.push(format!(
                "[filters] max_search_term_chars = {max} is out of range ({}-{}). Using default ({}).",
                constants::MIN_MAX_SEARCH_TERM_CHARS,
                constants::ABSOLUTE_MAX_SEARCH_TERM_CHARS,
                constants::DEFAULT_MAX_SEARCH_TERM_CHARS,
            ));
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default ({}).",
                constants::DEFAULT_LOG_LEVEL,
            ));
        }
    }

    // -- Logging: file --
    if let Some(file) = raw.logging.file.filter(|f| !f.is_empty()) {
        config.log_file = Some(file);
    }

    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "Config validation produced warnings");
    }

    (config, warnings)
}

fn is_valid_node_name(name: &str) -> bool {
    !name.trim().is_empty()
        && !name
            .chars()
            .any(|c| c.is_control() || constants::FORBIDDEN_SEGMENT_CHARS.contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_path(dir: &TempDir) -> PathBuf {
        PlatformPaths {
            config_dir: dir.path().to_path_buf(),
            data_dir: dir.path().to_path_buf(),
        }
        .config_file()
    }

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = config_path(dir);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let (config, warnings) = load_config(&config_path(&dir));
        assert_eq!(config, AppConfig::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_valid_values_applied() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            r#"
[store]
path = "/tmp/enrolsift/store.json"
owner_namespace = "teachers"
dataset_key = "archivedSummaries"

[filters]
max_search_term_chars = 64

[logging]
level = "debug"
"#,
        );
        let (config, warnings) = load_config(&config_path(&dir));
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/enrolsift/store.json")));
        assert_eq!(config.owner_namespace, "teachers");
        assert_eq!(config.dataset_key, "archivedSummaries");
        assert_eq!(config.owner_directory, constants::DEFAULT_OWNER_DIRECTORY);
        assert_eq!(config.max_search_term_chars, 64);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_invalid_values_warn_and_fall_back() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            r#"
[store]
owner_namespace = "a/b"

[filters]
max_search_term_chars = 2

[logging]
level = "loud"
"#,
        );
        let (config, warnings) = load_config(&config_path(&dir));
        assert_eq!(warnings.len(), 3);
        assert_eq!(config.owner_namespace, constants::DEFAULT_OWNER_NAMESPACE);
        assert_eq!(
            config.max_search_term_chars,
            constants::DEFAULT_MAX_SEARCH_TERM_CHARS
        );
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_control_characters_in_node_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            r#"
[store]
owner_namespace = "staff\u0007"
dataset_key = "summaries\n"
owner_directory = "members"
"#,
        );
        let (config, warnings) = load_config(&config_path(&dir));
        assert_eq!(warnings.len(), 2, "{warnings:?}");
        assert_eq!(config.owner_namespace, constants::DEFAULT_OWNER_NAMESPACE);
        assert_eq!(config.dataset_key, constants::DEFAULT_DATASET_KEY);
        assert_eq!(config.owner_directory, "members");
    }

    #[test]
    fn test_config_file_lives_in_config_dir() {
        let dir = TempDir::new().unwrap();
        let paths = PlatformPaths {
            config_dir: dir.path().join("cfg"),
            data_dir: dir.path().join("data"),
        };
        assert_eq!(
            paths.config_file(),
            dir.path().join("cfg").join(constants::CONFIG_FILE_NAME)
        );
        assert_eq!(
            paths.store_file(),
            dir.path().join("data").join(constants::STORE_FILE_NAME)
        );
    }

    #[test]
    fn test_unparseable_file_falls_back_with_warning() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[filters\nmax_search_term_chars = ");
        let (config, warnings) = load_config(&config_path(&dir));
        assert_eq!(config, AppConfig::default());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_explicit_file_errors_are_reported() {
        let dir = TempDir::new().unwrap();
        let missing = load_config_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let path = write_config(&dir, "not = [valid");
        assert!(matches!(
            load_config_file(&path),
            Err(ConfigError::TomlParse { .. })
        ));
    }
}
