use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Model used when `GEMINI_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
/// Base URL of the Generative Language API.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Claim cap used when `MAX_CLAIMS_TO_ANALYZE` is not set.
pub const DEFAULT_MAX_CLAIMS: usize = 5;
/// Generative call deadline used when `ANALYSIS_TIMEOUT_SECONDS` is not set.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const API_KEY_PLACEHOLDER: &str = "your-gemini-api-key-here";

const ENV_API_KEY: &str = "GEMINI_API_KEY";
const ENV_MODEL: &str = "GEMINI_MODEL";
const ENV_ENDPOINT: &str = "GEMINI_ENDPOINT";
const ENV_MAX_CLAIMS: &str = "MAX_CLAIMS_TO_ANALYZE";
const ENV_TIMEOUT: &str = "ANALYSIS_TIMEOUT_SECONDS";

/// Errors raised while assembling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A recognized option carried an unusable value.
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        /// Option name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// Config file could not be read.
    #[error("reading config {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Config file was not valid TOML.
    #[error("parsing config {}: {source}", path.display())]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },
}

/// Artificial latency of the simulated retrieval backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Delay paid once per retrieval call, in milliseconds.
    pub request_latency_ms: u64,
    /// Delay paid per returned entry, in milliseconds.
    pub per_entry_latency_ms: u64,
}

impl RetrievalSettings {
    /// Settings without any artificial delay.
    #[must_use]
    pub const fn instant() -> Self {
        Self {
            request_latency_ms: 0,
            per_entry_latency_ms: 0,
        }
    }

    /// Per-call delay.
    #[must_use]
    pub const fn request_latency(&self) -> Duration {
        Duration::from_millis(self.request_latency_ms)
    }

    /// Per-entry delay.
    #[must_use]
    pub const fn per_entry_latency(&self) -> Duration {
        Duration::from_millis(self.per_entry_latency_ms)
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            request_latency_ms: 1_000,
            per_entry_latency_ms: 200,
        }
    }
}

/// Process-wide analysis configuration, established once and threaded into
/// the runtime at construction.
#[derive(Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Generative API key; `None` means fallback-only mode.
    pub api_key: Option<String>,
    /// Generative model identifier.
    pub model: String,
    /// Maximum number of claims carried through the pipeline.
    pub max_claims: usize,
    /// Deadline for each generative call.
    pub timeout: Duration,
    /// Base URL of the generative API.
    pub endpoint: String,
    /// Simulated retrieval latency.
    pub retrieval: RetrievalSettings,
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_claims", &self.max_claims)
            .field("timeout", &self.timeout)
            .field("endpoint", &self.endpoint)
            .field("retrieval", &self.retrieval)
            .finish()
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.into(),
            max_claims: DEFAULT_MAX_CLAIMS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            endpoint: DEFAULT_ENDPOINT.into(),
            retrieval: RetrievalSettings::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    api_key: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    max_claims: Option<usize>,
    timeout_seconds: Option<u64>,
    retrieval: Option<RetrievalSettings>,
}

impl AnalysisConfig {
    /// Reads the recognized environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] against an injected key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_overrides(lookup)
    }

    /// Reads a TOML file, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file(path)?.with_overrides(|key| std::env::var(key).ok())
    }

    /// Reads a TOML file without consulting the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let defaults = Self::default();
        let max_claims = match file.max_claims {
            Some(value) => require_positive("max_claims", value)?,
            None => defaults.max_claims,
        };
        let timeout = match file.timeout_seconds {
            Some(secs) => Duration::from_secs(require_positive("timeout_seconds", secs)?),
            None => defaults.timeout,
        };
        let config = Self {
            api_key: file.api_key.as_deref().and_then(normalize_api_key),
            model: non_blank(file.model).unwrap_or(defaults.model),
            endpoint: non_blank(file.endpoint).unwrap_or(defaults.endpoint),
            max_claims,
            timeout,
            retrieval: file.retrieval.unwrap_or(defaults.retrieval),
        };
        Ok(config)
    }

    /// Applies every option present in `lookup` on top of `self`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_API_KEY) {
            self.api_key = normalize_api_key(&raw);
        }
        if let Some(model) = non_blank(lookup(ENV_MODEL)) {
            self.model = model;
        }
        if let Some(endpoint) = non_blank(lookup(ENV_ENDPOINT)) {
            self.endpoint = endpoint;
        }
        if let Some(raw) = lookup(ENV_MAX_CLAIMS) {
            let parsed = parse_number::<usize>(ENV_MAX_CLAIMS, &raw)?;
            self.max_claims = require_positive(ENV_MAX_CLAIMS, parsed)?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            let parsed = parse_number::<u64>(ENV_TIMEOUT, &raw)?;
            self.timeout = Duration::from_secs(require_positive(ENV_TIMEOUT, parsed)?);
        }
        Ok(self)
    }

    /// Sets the API key (blank or placeholder keys count as absent).
    #[must_use]
    pub fn with_api_key(mut self, key: impl AsRef<str>) -> Self {
        self.api_key = normalize_api_key(key.as_ref());
        self
    }

    /// Sets the generative call deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the simulated retrieval latency.
    #[must_use]
    pub const fn with_retrieval(mut self, retrieval: RetrievalSettings) -> Self {
        self.retrieval = retrieval;
        self
    }

    /// True when a generative API key is available.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

fn normalize_api_key(raw: &str) -> Option<String> {
    let key = raw.trim();
    if key.is_empty() || key == API_KEY_PLACEHOLDER {
        None
    } else {
        Some(key.to_string())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: "expected a non-negative integer",
    })
}

fn require_positive<T>(key: &'static str, value: T) -> Result<T, ConfigError>
where
    T: Copy + PartialEq + Default + fmt::Display,
{
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be at least 1",
        });
    }
    Ok(value)
}
