use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use tutor_core::provider::{gemini, openai};

/// Why the service configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Service settings read from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Key used by the server-mediated endpoint and to seed fresh settings.
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub openai_model: String,
    /// Registers ChatGPT instead of announcing it as coming soon.
    pub enable_openai: bool,
    pub settings_path: PathBuf,
    pub prompts_path: Option<PathBuf>,
    pub pacing: Duration,
    pub log_level: Level,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a boolean", other),
        )),
    }
}

impl Config {
    /// Reads the service settings, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let gemini_api_key = non_empty_var("GEMINI_API_KEY");
        let gemini_model =
            non_empty_var("GEMINI_MODEL").unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string());
        let openai_model =
            non_empty_var("OPENAI_MODEL").unwrap_or_else(|| openai::DEFAULT_MODEL.to_string());

        let enable_openai = match std::env::var("ENABLE_OPENAI_PROVIDER") {
            Ok(value) => parse_flag("ENABLE_OPENAI_PROVIDER", &value)?,
            Err(_) => false,
        };

        let settings_path = non_empty_var("TUTOR_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./tutor_config.json"));
        let prompts_path = non_empty_var("PROMPTS_PATH").map(PathBuf::from);

        let pacing = match non_empty_var("LECTURE_PACING_MS") {
            Some(value) => value.parse::<u64>().map(Duration::from_millis).map_err(|_| {
                ConfigError::InvalidValue(
                    "LECTURE_PACING_MS".to_string(),
                    format!("'{}' is not a number of milliseconds", value),
                )
            })?,
            None => tutor_core::session::DEFAULT_PACING,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            gemini_api_key,
            gemini_model,
            openai_model,
            enable_openai,
            settings_path,
            prompts_path,
            pacing,
            log_level,
        })
    }

    /// The server's Gemini key, required by the server-mediated endpoint.
    pub fn require_gemini_key(&self) -> Result<&str, ConfigError> {
        self.gemini_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))
    }
}
