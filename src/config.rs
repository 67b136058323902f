use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub proxy: ProxySettings,
    pub admission: AdmissionSettings,
    pub audit: AuditSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxySettings {
    /// Base URL of the backend every request is relayed to
    pub target_url: String,
    /// Bound on time-to-first-byte from the backend; streamed bodies are
    /// not bounded by this
    pub request_timeout_secs: u64,
    pub max_request_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdmissionSettings {
    pub enabled: bool,
    pub model_name: String,
    pub ollama_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditSettings {
    pub enabled: bool,
    pub url: String,
    pub index: String,
    pub username: String,
    pub password: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 8080)?
            .set_default("application.environment", environment.clone())?
            .set_default("proxy.target_url", "http://127.0.0.1:11434")?
            .set_default("proxy.request_timeout_secs", 120)?
            .set_default("proxy.max_request_bytes", 10 * 1024 * 1024)?
            .set_default("admission.enabled", true)?
            .set_default("admission.model_name", "phi3:3.8b")?
            .set_default("admission.ollama_url", "http://127.0.0.1:11434")?
            .set_default("admission.timeout_secs", 5)?
            .set_default("admission.max_retries", 2)?
            .set_default("audit.enabled", false)?
            .set_default("audit.url", "http://127.0.0.1:9200")?
            .set_default("audit.index", "gatehouse-proxy")?
            .set_default("audit.username", "")?
            .set_default("audit.password", "")?
            .set_default("audit.api_key", "")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            // Add configuration file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix
            .add_source(Environment::with_prefix("GATEHOUSE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
