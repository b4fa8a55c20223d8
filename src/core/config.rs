use crate::core::dispatcher::DispatcherSettings;
use crate::core::fetcher::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use crate::core::request::TransferRequest;
use crate::core::source::{default_user_agent, SourceSettings, DEFAULT_TIMEOUT_SECS};
use crate::error::{FetchzipError, Result};
use crate::logging::{LogFormat, DEFAULT_LOG_LEVEL};
use crate::utils::fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_NAME: &str = "fetchzip";

/// Template written by `fetchzip config init`.
pub const CONFIG_TEMPLATE: &str = r#"# fetchzip configuration
#
# Request settings have no defaults. Set them here or pass them as flags.
# source_address = "https://example.com/archive.zip"
# destination_directory = "/tmp/downloads"
# destination_file_name = "archive.zip"

# Unpack the archive next to the download once it completes.
extract_after_fetch = true

# Read chunk in bytes, clamped to 1024..=65536.
chunk_size = 65536

# HTTP request timeout in seconds.
timeout_secs = 300

# Log level used when RUST_LOG is not set, and "pretty" or "json" output.
log_level = "warn"
log_format = "pretty"
"#;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub source_address: Option<String>,
    pub destination_directory: Option<PathBuf>,
    pub destination_file_name: Option<String>,
    pub extract_after_fetch: bool,
    pub chunk_size: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_address: None,
            destination_directory: None,
            destination_file_name: None,
            extract_after_fetch: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: default_user_agent(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Values given on the command line. They win over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub source_address: Option<String>,
    pub destination_directory: Option<PathBuf>,
    pub destination_file_name: Option<String>,
    pub no_extract: bool,
}

impl Config {
    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => match find_default_config()? {
                Some(path) => Self::load_from(&path),
                None => Ok(Config::default()),
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = match extension_of(path).as_deref() {
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => {
                return Err(FetchzipError::UnsupportedConfigFormat {
                    path: path.to_path_buf(),
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = match extension_of(path).as_deref() {
            Some("toml") => toml::to_string_pretty(self)?,
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => {
                return Err(FetchzipError::UnsupportedConfigFormat {
                    path: path.to_path_buf(),
                })
            }
        };

        fs::ensure_parent_exists(path)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if overrides.source_address.is_some() {
            self.source_address = overrides.source_address;
        }
        if overrides.destination_directory.is_some() {
            self.destination_directory = overrides.destination_directory;
        }
        if overrides.destination_file_name.is_some() {
            self.destination_file_name = overrides.destination_file_name;
        }
        if overrides.no_extract {
            self.extract_after_fetch = false;
        }
    }

    /// Build the download request. The file name falls back to the last
    /// path segment of the source address.
    pub fn transfer_request(&self) -> Result<TransferRequest> {
        let source = self
            .source_address
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(FetchzipError::MissingSetting {
                field: "source_address",
            })?;
        let directory = self
            .destination_directory
            .clone()
            .ok_or(FetchzipError::MissingSetting {
                field: "destination_directory",
            })?;
        let file_name = match &self.destination_file_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => file_name_from_address(source).ok_or(FetchzipError::MissingSetting {
                field: "destination_file_name",
            })?,
        };

        if file_name.contains('/') || file_name.contains('\\') {
            return Err(FetchzipError::config_error(format!(
                "destination_file_name '{file_name}' must not contain path separators"
            )));
        }

        Ok(TransferRequest::new(source, directory, file_name))
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(FetchzipError::config_error("timeout_secs must be greater than 0"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(FetchzipError::config_error("user_agent must not be empty"));
        }
        Ok(())
    }

    /// Settings that are accepted but adjusted at run time. The caller logs
    /// them once the subscriber is installed.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            warnings.push(format!(
                "chunk_size {} is outside {MIN_CHUNK_SIZE}..={MAX_CHUNK_SIZE}, it will be clamped",
                self.chunk_size
            ));
        }
        warnings
    }

    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            chunk_size: self.chunk_size,
            extract_after_fetch: self.extract_after_fetch,
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME))
        .ok_or(FetchzipError::ConfigDirectoryNotFound)
}

/// Where `config init` writes the template.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.toml"))
}

fn find_default_config() -> Result<Option<PathBuf>> {
    let dir = match get_config_dir() {
        Ok(dir) => dir,
        Err(_) => return Ok(None),
    };
    Ok(["config.toml", "config.json"]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file()))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

fn file_name_from_address(address: &str) -> Option<String> {
    let trimmed = address.split(['?', '#']).next().unwrap_or(address);
    let (_, path) = trimmed.split_once("://").unwrap_or(("", trimmed));
    // drop the host so "http://example.com" has no file name
    let (_, path) = path.split_once('/')?;
    path.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn complete() -> Config {
        Config {
            source_address: Some("http://x/sample.zip".into()),
            destination_directory: Some(PathBuf::from("out")),
            destination_file_name: Some("sample.zip".into()),
            ..Config::default()
        }
    }

    #[test]
    fn test_template_matches_defaults() {
        let parsed: Config = toml::from_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_missing_request_fields() {
        let err = Config::default().transfer_request().unwrap_err();
        assert!(matches!(
            err,
            FetchzipError::MissingSetting {
                field: "source_address"
            }
        ));

        let config = Config {
            source_address: Some("http://x/sample.zip".into()),
            ..Config::default()
        };
        assert!(matches!(
            config.transfer_request().unwrap_err(),
            FetchzipError::MissingSetting {
                field: "destination_directory"
            }
        ));
    }

    #[test]
    fn test_transfer_request() {
        let request = complete().transfer_request().unwrap();
        assert_eq!(
            request,
            TransferRequest::new("http://x/sample.zip", "out", "sample.zip")
        );
    }

    #[test]
    fn test_file_name_falls_back_to_address() {
        let mut config = complete();
        config.destination_file_name = None;
        config.source_address = Some("https://host/files/data.zip?token=abc#frag".into());
        assert_eq!(
            config.transfer_request().unwrap().destination_file_name(),
            "data.zip"
        );

        config.source_address = Some("https://host/".into());
        assert!(matches!(
            config.transfer_request().unwrap_err(),
            FetchzipError::MissingSetting {
                field: "destination_file_name"
            }
        ));
    }

    #[test]
    fn test_rejects_file_name_with_separator() {
        let mut config = complete();
        config.destination_file_name = Some("../evil.zip".into());
        assert!(config.transfer_request().is_err());
    }

    #[test]
    fn test_overrides_win() {
        let mut config = complete();
        config.apply(Overrides {
            source_address: Some("http://y/other.zip".into()),
            destination_directory: None,
            destination_file_name: None,
            no_extract: true,
        });

        assert_eq!(config.source_address.as_deref(), Some("http://y/other.zip"));
        assert_eq!(config.destination_directory, Some(PathBuf::from("out")));
        assert!(!config.extract_after_fetch);
        assert!(!config.dispatcher_settings().extract_after_fetch);
    }

    #[test]
    fn test_save_and_load_toml_and_json() {
        let temp = TempDir::new().unwrap();
        let mut config = complete();
        config.chunk_size = 4096;
        config.log_format = LogFormat::Json;

        for name in ["nested/config.toml", "config.json"] {
            let path = temp.path().join(name);
            config.save_to(&path).unwrap();
            assert_eq!(Config::load(Some(path.as_path())).unwrap(), config);
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "source_address = \"http://x/a.zip\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.source_address.as_deref(), Some("http://x/a.zip"));
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.extract_after_fetch);
    }

    #[test]
    fn test_load_errors() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(Some(temp.path().join("absent.toml").as_path())),
            Err(FetchzipError::Io(_))
        ));

        let yaml = temp.path().join("config.yaml");
        std::fs::write(&yaml, "a: b").unwrap();
        assert!(matches!(
            Config::load_from(&yaml),
            Err(FetchzipError::UnsupportedConfigFormat { .. })
        ));

        let zero = temp.path().join("zero.toml");
        std::fs::write(&zero, "timeout_secs = 0\n").unwrap();
        assert!(matches!(
            Config::load_from(&zero),
            Err(FetchzipError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_out_of_range_chunk_size_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "chunk_size = 10\n").unwrap();

        let config = Config::load_from(&path).unwrap();

        let warnings = config.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("chunk_size 10"));
        assert!(Config::default().warnings().is_empty());
    }

    #[test]
    fn test_source_settings() {
        let mut config = Config::default();
        config.timeout_secs = 12;
        config.user_agent = "agent/1".into();
        let settings = config.source_settings();
        assert_eq!(settings.timeout, Duration::from_secs(12));
        assert_eq!(settings.user_agent, "agent/1");
    }
}
