//! Configuration loading from disk and the environment.
//!
//! Precedence, lowest first: built-in defaults, config file, environment
//! variables. Command-line flags are layered on top by the binary.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    InvalidPath(PathBuf),
    Env { var: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::InvalidPath(p) => write!(f, "Invalid config path: {}", p.display()),
            ConfigError::Env { var, value } => {
                write!(f, "Invalid value {:?} for environment variable {}", value, var)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let config = read_config_file(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Parse a TOML file without semantic validation.
pub fn read_config_file(path: &Path) -> Result<AppConfig, ConfigError> {
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(ConfigError::InvalidPath(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Candidate config file locations, most specific first.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".").join(CONFIG_FILE_NAME)];
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(".blog-backend-config.toml"));
    }
    paths.push(PathBuf::from("/etc/blog-backend-config.toml"));
    paths
}

/// First existing config file from [`config_search_paths`].
pub fn find_config_file() -> Option<PathBuf> {
    config_search_paths().into_iter().find(|p| p.is_file())
}

/// Override fields from environment variables.
///
/// `lookup` abstracts `std::env::var` so overrides can be tested without
/// touching the process environment.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = lookup("LOG_LEVEL") {
        config.log.level = level.to_ascii_lowercase();
    }
    if let Some(port) = lookup("PORT") {
        config.listener.port = parse_env("PORT", port)?;
    }
    if let Some(v) = lookup("DATABASE_LOG_QUERIES") {
        config.database.log_queries = parse_env("DATABASE_LOG_QUERIES", v)?;
    }
    if let Some(v) = lookup("ERRORS_IN_RESPONSE") {
        config.errors_in_response = parse_env("ERRORS_IN_RESPONSE", v)?;
    }
    if let Some(v) = lookup("IP_RATE_LIMIT") {
        config.rate_limit.ip_rate_limit = parse_env("IP_RATE_LIMIT", v)?;
    }
    if let Some(v) = lookup("BURST_RATE_LIMIT") {
        config.rate_limit.burst_rate_limit = parse_env("BURST_RATE_LIMIT", v)?;
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

/// The config file to read: `explicit` if given, else the first one found.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(find_config_file)
}

/// Build the effective configuration from defaults, an optional file and the
/// process environment. Validation is left to the caller so that flags can
/// still be applied on top.
///
/// Runs before logging is set up, so it emits nothing.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::capture::CapturedLogs;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("PORT", "9000"),
                ("ERRORS_IN_RESPONSE", "true"),
                ("IP_RATE_LIMIT", "2.5"),
                ("BURST_RATE_LIMIT", "7"),
                ("LOG_LEVEL", "DEBUG"),
            ]),
        )
        .unwrap();

        assert_eq!(config.listener.port, 9000);
        assert!(config.errors_in_response);
        assert_eq!(config.rate_limit.ip_rate_limit, 2.5);
        assert_eq!(config.rate_limit.burst_rate_limit, 7);
        assert_eq!(config.log.level, "debug");
        assert!(!config.database.log_queries);
    }

    #[test]
    fn test_env_parse_error_names_variable() {
        let mut config = AppConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("BURST_RATE_LIMIT", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("BURST_RATE_LIMIT"));
    }

    #[test]
    fn test_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "errors_in_response = true\n[rate_limit]\nburst_rate_limit = 3").unwrap();

        let mut config = read_config_file(file.path()).unwrap();
        assert_eq!(config.rate_limit.burst_rate_limit, 3);

        apply_env_overrides(&mut config, env(&[("ERRORS_IN_RESPONSE", "false")])).unwrap();
        assert!(!config.errors_in_response);
        assert_eq!(config.rate_limit.burst_rate_limit, 3);
    }

    #[test]
    fn test_load_config_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[rate_limit]\nburst_rate_limit = 0").unwrap();

        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors, vec![ValidationError::ZeroBurst]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_parent_dir_paths() {
        let err = read_config_file(Path::new("../config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPath(_)));
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = Path::new("/srv/blog/custom.toml");
        assert_eq!(
            resolve_config_path(Some(explicit)),
            Some(explicit.to_path_buf())
        );
    }

    #[test]
    fn test_load_reads_given_file_silently() {
        let (logs, _guard) = CapturedLogs::install();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeouts]\nhandler_secs = 42").unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.timeouts.handler_secs, 42);
        assert!(logs.contents().is_empty());
    }
}
