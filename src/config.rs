use std::{path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(String, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

// key names follow the config.json the watcher has always been deployed with
#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub api_interval: u64,
    pub steam_api_key: String,
    #[serde(default = "default_format")]
    pub steam_api_format: String,
    #[serde(default = "default_server")]
    pub steam_api_server: String,
    #[serde(default = "default_service")]
    pub d2match_service: String,
    #[serde(default = "default_history_function")]
    pub d2match_function: String,
    #[serde(default = "default_details_function")]
    pub d2match_details_function: String,
    #[serde(default = "default_version")]
    pub d2match_version: String,
    pub steam_account_id: String,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default)]
    pub network_backoff: bool,
}

fn default_format() -> String {
    "json".to_string()
}

fn default_server() -> String {
    "https://api.steampowered.com".to_string()
}

fn default_service() -> String {
    "/IDOTA2Match_570".to_string()
}

fn default_history_function() -> String {
    "/GetMatchHistory".to_string()
}

fn default_details_function() -> String {
    "/GetMatchDetails".to_string()
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_state_file() -> String {
    "PreviousMatch.txt".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::ReadError(path.display().to_string(), err))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_interval == 0 {
            return Err(ConfigError::InvalidValue(
                "api_interval",
                "must be at least 1 second".to_string(),
            ));
        }
        if self.steam_api_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "steam_api_key",
                "must not be empty".to_string(),
            ));
        }
        if self.steam_api_format != "json" {
            return Err(ConfigError::InvalidValue(
                "steam_api_format",
                format!("only \"json\" is supported, got {:?}", self.steam_api_format),
            ));
        }
        if !(self.steam_api_server.starts_with("http://")
            || self.steam_api_server.starts_with("https://"))
        {
            return Err(ConfigError::InvalidValue(
                "steam_api_server",
                format!("not an http(s) url: {}", self.steam_api_server),
            ));
        }
        if self.steam_account_id.parse::<u64>().is_err() {
            return Err(ConfigError::InvalidValue(
                "steam_account_id",
                format!("not a numeric account id: {}", self.steam_account_id),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.api_interval)
    }

    pub fn account_id(&self) -> u64 {
        // checked by validate
        self.steam_account_id.parse().unwrap_or_default()
    }

    fn endpoint(&self, function: &str) -> String {
        format!(
            "{}{}{}/{}/",
            self.steam_api_server.trim_end_matches('/'),
            self.d2match_service,
            function,
            self.d2match_version
        )
    }

    pub fn history_url(&self) -> String {
        self.endpoint(&self.d2match_function)
    }

    pub fn details_url(&self) -> String {
        self.endpoint(&self.d2match_details_function)
    }
}
