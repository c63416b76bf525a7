use std::env;
use std::time::Duration;

/// Runtime configuration for the document backend
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Maximum upload size in bytes (default: 10 MiB)
    pub max_file_size: usize,

    /// Root directory for blob storage (default: "./media")
    pub storage_root: String,

    /// How long a document may sit in `processing`/`modifying` before the
    /// watchdog forces it to `failed` (default: 300 s)
    pub stale_after: Duration,

    /// Interval between watchdog sweeps (default: 60 s)
    pub sweep_interval: Duration,

    /// Run modification inline with the request instead of spawning a task
    /// (default: true)
    pub inline_modification: bool,

    /// OpenAI API key; when unset the deterministic rule engine runs alone
    pub openai_api_key: Option<String>,

    /// Chat model used by the optional LLM rewriter (default: "gpt-3.5-turbo")
    pub openai_model: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024, // 10 MiB
            storage_root: "./media".to_string(),
            stale_after: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            inline_modification: true,
            openai_api_key: None,
            openai_model: "gpt-3.5-turbo".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            storage_root: env::var("STORAGE_ROOT").unwrap_or(default.storage_root),

            stale_after: env::var("STALE_AFTER_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.stale_after),

            sweep_interval: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.sweep_interval),

            inline_modification: env::var("INLINE_MODIFICATION")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.inline_modification),

            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),

            openai_model: env::var("OPENAI_MODEL").unwrap_or(default.openai_model),
        }
    }

    /// Config for tests: inline modification, no external provider
    pub fn development() -> Self {
        Self {
            inline_modification: true,
            openai_api_key: None,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.stale_after, Duration::from_secs(300));
        assert!(config.inline_modification);
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_development_config() {
        let config = AppConfig::development();
        assert!(config.inline_modification);
        assert!(config.openai_api_key.is_none());
    }
}
