//! Client configuration.
//!
//! Only this module reads the process environment. Everything else receives
//! a [`ClientConfig`] value.

use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::mode::AuthMode;
use crate::scalar;

/// Address of the policy evaluator when none is configured.
pub const DEFAULT_EMULATOR_HOST: &str = "localhost:8080";

/// Environment variable prefix (`IAM_MODE`, `IAM_EMULATOR_HOST`,
/// `IAM_TRACE_OUTPUT`).
pub const ENV_PREFIX: &str = "IAM_";

const ENV_KEYS: [&str; 3] = ["mode", "emulator_host", "trace_output"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Security posture. Unknown values fall back to `off`.
    pub mode: AuthMode,
    /// `host:port` of the policy evaluator.
    #[serde(deserialize_with = "scalar::string")]
    pub emulator_host: String,
    /// `stdout` or a file path. `None` disables tracing.
    #[serde(deserialize_with = "scalar::option_string")]
    pub trace_output: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Off,
            emulator_host: DEFAULT_EMULATOR_HOST.to_owned(),
            trace_output: None,
        }
    }
}

impl ClientConfig {
    /// Load from `IAM_*` environment variables on top of the defaults.
    /// Other `IAM_*` variables are ignored.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if a variable holds a value of the wrong shape.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment())
    }

    /// Defaults merged with the environment, for callers that want to layer
    /// additional providers (e.g. a YAML file) before extracting.
    #[must_use]
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX).only(&ENV_KEYS))
    }

    /// Extract and normalize a configuration from any figment.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if extraction fails, including unknown keys.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        let host = self.emulator_host.trim();
        self.emulator_host = if host.is_empty() {
            DEFAULT_EMULATOR_HOST.to_owned()
        } else {
            host.to_owned()
        };
        self.trace_output = self
            .trace_output
            .map(|out| out.trim().to_owned())
            .filter(|out| !out.is_empty());
        self
    }
}
