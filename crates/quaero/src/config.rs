//! Configuration file support for quaero.
//!
//! Project data lives in a `.quaero/` directory:
//! - `.quaero/config.toml` - Configuration file
//! - `.quaero/logs/` - Log files (`serve --log-to-file`)
//!
//! Config discovery searches for `.quaero/config.toml` starting from the current
//! directory and walking up to parent directories.

use std::path::{Path, PathBuf};

/// The quaero data directory name.
pub const QUAERO_DIR: &str = ".quaero";
/// The config file name within the quaero directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Encoder providers accepted in `[encoder] provider`.
pub const ENCODER_PROVIDERS: [&str; 2] = ["hashing", "ollama"];

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerSection,
    /// Collection source settings.
    pub data: DataSection,
    /// Text encoder settings.
    pub encoder: EncoderSection,
    /// Query defaults.
    pub search: SearchSection,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Allow cross-origin requests from any origin.
    pub cors: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors: true,
        }
    }
}

/// Collection source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataSection {
    /// Directory of `*.json` collections.
    pub dir: PathBuf,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
        }
    }
}

/// Encoder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EncoderSection {
    /// Encoder provider: "hashing" or "ollama".
    pub provider: String,
    /// Embedding model (ollama).
    pub model: String,
    /// Server URL (ollama).
    pub base_url: String,
    /// Vector dimension (hashing).
    pub dimension: usize,
    /// Request timeout in seconds (ollama).
    pub timeout_secs: u64,
    /// Retries for network errors while encoding (ollama).
    pub max_retries: u32,
}

impl Default for EncoderSection {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            model: quaero_index::ollama::DEFAULT_MODEL.to_string(),
            base_url: quaero_index::ollama::DEFAULT_BASE_URL.to_string(),
            dimension: quaero_index::hashing::DEFAULT_DIMENSION,
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

/// Query defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchSection {
    /// Dataset searched when a request names none ("all" for every dataset).
    pub default_dataset: String,
    /// Result count when a request gives no limit.
    pub default_limit: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            default_dataset: quaero_index::Target::ALL.to_string(),
            default_limit: quaero_server::DEFAULT_LIMIT,
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Find and load configuration from current or parent directories.
    pub fn find_and_load() -> Result<Option<(Self, PathBuf)>> {
        let current = std::env::current_dir()?;
        Self::find_and_load_from(&current)
    }

    /// Find and load configuration starting from a specific directory.
    ///
    /// Looks for `.quaero/config.toml` in the directory and its parents and
    /// returns the config together with its `.quaero` directory.
    pub fn find_and_load_from(start: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start.to_path_buf();

        loop {
            let quaero_dir = dir.join(QUAERO_DIR);
            let config_path = quaero_dir.join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::from_file(&config_path)?;
                return Ok(Some((config, quaero_dir)));
            }

            if !dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Resolve the data directory.
    ///
    /// A relative path is taken from the project root, the parent of the
    /// `.quaero` directory. Without a config directory it is left relative
    /// to the working directory.
    pub fn resolve_data_dir(&self, quaero_dir: Option<&Path>) -> PathBuf {
        if self.data.dir.is_absolute() {
            return self.data.dir.clone();
        }
        match quaero_dir.and_then(Path::parent) {
            Some(root) => root.join(&self.data.dir),
            None => self.data.dir.clone(),
        }
    }

    /// Validate the configuration.
    ///
    /// Returns a list of validation errors if any are found.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if !ENCODER_PROVIDERS.contains(&self.encoder.provider.as_str()) {
            errors.push(ConfigValidationError::new(
                "encoder.provider",
                format!(
                    "Invalid provider '{}'. Expected one of: {}.",
                    self.encoder.provider,
                    ENCODER_PROVIDERS.join(", ")
                ),
            ));
        }

        if self.encoder.provider == "hashing" && self.encoder.dimension == 0 {
            errors.push(ConfigValidationError::new(
                "encoder.dimension",
                "Dimension must be at least 1.",
            ));
        }

        if self.encoder.provider == "ollama" {
            if self.encoder.model.is_empty() {
                errors.push(ConfigValidationError::new(
                    "encoder.model",
                    "Encoder model cannot be empty.",
                ));
            }
            if !self.encoder.base_url.starts_with("http://")
                && !self.encoder.base_url.starts_with("https://")
            {
                errors.push(ConfigValidationError::new(
                    "encoder.base_url",
                    format!(
                        "Invalid URL '{}'. Expected an http:// or https:// URL.",
                        self.encoder.base_url
                    ),
                ));
            }
            if self.encoder.timeout_secs == 0 {
                errors.push(ConfigValidationError::new(
                    "encoder.timeout_secs",
                    "Timeout must be at least 1 second.",
                ));
            }
        }

        if self.search.default_limit == 0 {
            errors.push(ConfigValidationError::new(
                "search.default_limit",
                "Default limit must be at least 1.",
            ));
        }

        if self.search.default_dataset.trim().is_empty() {
            errors.push(ConfigValidationError::new(
                "search.default_dataset",
                "Default dataset cannot be empty. Use \"all\" to search every dataset.",
            ));
        }

        errors
    }
}

/// Configuration validation error.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl ConfigValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigValidationError {}

/// Written by `quaero init`.
pub const DEFAULT_CONFIG: &str = r#"# quaero configuration
# Relative paths are resolved from the directory containing .quaero/

[server]
host = "127.0.0.1"
port = 8000
cors = true

[data]
dir = "data"  # One collection per *.json file

[encoder]
provider = "hashing"  # Options: "hashing", "ollama"
dimension = 384       # hashing only
# model = "all-minilm"                   # ollama only
# base_url = "http://localhost:11434"    # ollama only
# timeout_secs = 120
# max_retries = 3

[search]
default_dataset = "all"
default_limit = 5
"#;
