//! Agent configuration: optional JSON file, then environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chat_api::{ChatApiConfig, SamplingParams};
use serde::Deserialize;
use thiserror::Error;

use crate::session::SessionConfig;

pub const CONFIG_PATH_ENV_VAR: &str = "ARTIFACT_AGENT_CONFIG_PATH";
pub const API_KEY_ENV_VAR: &str = "ARTIFACT_AGENT_API_KEY";
pub const BASE_URL_ENV_VAR: &str = "ARTIFACT_AGENT_BASE_URL";
pub const MODEL_ENV_VAR: &str = "ARTIFACT_AGENT_MODEL";
pub const SYSTEM_PROMPT_ENV_VAR: &str = "ARTIFACT_AGENT_SYSTEM_PROMPT";
pub const TIMEOUT_ENV_VAR: &str = "ARTIFACT_AGENT_TIMEOUT_SEC";

pub const DEFAULT_MODEL: &str = "moonshotai/kimi-k2-instruct";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a coding agent working inside a project workspace. \
When you produce a file, emit it as a fenced code block whose info string names the target path \
relative to the workspace root, for example ```rust path=src/main.rs. Emit each file in full; \
partial files overwrite the existing content.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("invalid config field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    #[must_use]
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// On-disk shape. Every field is optional; unknown fields are rejected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub timeout_sec: Option<u64>,
    #[serde(default)]
    pub sampling: SamplingFile,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingFile {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub timeout: Option<Duration>,
    pub sampling: SamplingParams,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: chat_api::url::DEFAULT_CHAT_BASE_URL.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            timeout: None,
            sampling: SamplingParams::default(),
        }
    }
}

impl AgentConfig {
    /// Load from `ARTIFACT_AGENT_CONFIG_PATH` (if set) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match env_string_opt(CONFIG_PATH_ENV_VAR) {
            Some(path) => Some(ConfigFile::load(Path::new(&path))?),
            None => None,
        };
        Self::from_sources(file, env_string_opt)
    }

    /// Merge defaults, `file`, then variables returned by `lookup`, and validate.
    pub fn from_sources(
        file: Option<ConfigFile>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(file) = file {
            config.apply_file(file);
        }

        if let Some(api_key) = lookup(API_KEY_ENV_VAR) {
            config.api_key = api_key;
        }
        if let Some(base_url) = lookup(BASE_URL_ENV_VAR) {
            config.base_url = base_url;
        }
        if let Some(model) = lookup(MODEL_ENV_VAR) {
            config.model = model;
        }
        if let Some(system_prompt) = lookup(SYSTEM_PROMPT_ENV_VAR) {
            config.system_prompt = system_prompt;
        }
        if let Some(raw) = lookup(TIMEOUT_ENV_VAR) {
            let seconds = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidEnv {
                    key: TIMEOUT_ENV_VAR,
                    value: raw.clone(),
                })?;
            config.timeout = Some(Duration::from_secs(seconds));
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        let ConfigFile {
            api_key,
            base_url,
            model,
            system_prompt,
            timeout_sec,
            sampling,
        } = file;

        if let Some(api_key) = api_key {
            self.api_key = api_key;
        }
        if let Some(base_url) = base_url {
            self.base_url = base_url;
        }
        if let Some(model) = model {
            self.model = model;
        }
        if let Some(system_prompt) = system_prompt {
            self.system_prompt = system_prompt;
        }
        if let Some(seconds) = timeout_sec {
            self.timeout = Some(Duration::from_secs(seconds));
        }

        let target = &mut self.sampling;
        target.temperature = sampling.temperature.unwrap_or(target.temperature);
        target.top_p = sampling.top_p.unwrap_or(target.top_p);
        target.frequency_penalty = sampling
            .frequency_penalty
            .unwrap_or(target.frequency_penalty);
        target.presence_penalty = sampling.presence_penalty.unwrap_or(target.presence_penalty);
        target.max_tokens = sampling.max_tokens.unwrap_or(target.max_tokens);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::invalid(
                "api_key",
                format!("must be set (config file or {API_KEY_ENV_VAR})"),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("model", "must not be empty"));
        }
        if self.timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ConfigError::invalid("timeout_sec", "must be > 0"));
        }

        let sampling = &self.sampling;
        if !(0.0..=2.0).contains(&sampling.temperature) {
            return Err(ConfigError::invalid("temperature", "must be within [0, 2]"));
        }
        if !(sampling.top_p > 0.0 && sampling.top_p <= 1.0) {
            return Err(ConfigError::invalid("top_p", "must be within (0, 1]"));
        }
        if sampling.max_tokens == 0 {
            return Err(ConfigError::invalid("max_tokens", "must be > 0"));
        }
        Ok(())
    }

    pub fn chat_api_config(&self) -> ChatApiConfig {
        let config = ChatApiConfig::new(self.api_key.clone()).with_base_url(self.base_url.clone());
        match self.timeout {
            Some(timeout) => config.with_timeout(timeout),
            None => config,
        }
    }

    pub fn session_config(&self, persist_blocks: bool) -> SessionConfig {
        SessionConfig {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            sampling: self.sampling,
            persist_blocks,
        }
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
