use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_env_parsed};
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct OrderServiceConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub store: StoreConfig,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub timeout_ms: u64,
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl OrderServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let backend: StoreBackend = get_env("STORE_BACKEND", Some("postgres"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        // An in-memory store needs no database.
        let database_url = match backend {
            StoreBackend::Postgres => get_env("DATABASE_URL", None, is_prod)?,
            StoreBackend::Memory => env::var("DATABASE_URL").unwrap_or_default(),
        };

        let config = OrderServiceConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("order-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: database_url,
                max_connections: get_env_parsed("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: get_env_parsed("DATABASE_MIN_CONNECTIONS", Some("2"), is_prod)?,
            },
            store: StoreConfig {
                backend,
                timeout_ms: get_env_parsed("STORE_TIMEOUT_MS", Some("5000"), is_prod)?,
            },
            retry: RetrySettings {
                max_retries: get_env_parsed("RETRY_MAX_ATTEMPTS", Some("3"), is_prod)?,
                initial_backoff_ms: get_env_parsed("RETRY_INITIAL_BACKOFF_MS", Some("50"), is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Settings for running against an in-memory store, used by tests.
    pub fn for_memory_store() -> Self {
        Self {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "order-service".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 1,
                min_connections: 0,
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                timeout_ms: 5000,
            },
            retry: RetrySettings {
                max_retries: 3,
                initial_backoff_ms: 5,
            },
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry.max_retries,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            ..RetryConfig::default()
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.store.timeout_ms == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "STORE_TIMEOUT_MS must be positive"
            )));
        }

        if self.store.backend == StoreBackend::Postgres
            && self.database.min_connections > self.database.max_connections
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MIN_CONNECTIONS must not exceed DATABASE_MAX_CONNECTIONS"
            )));
        }

        if self.environment == Environment::Prod && self.store.backend == StoreBackend::Memory {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "The in-memory store is not allowed in production"
            )));
        }

        Ok(())
    }
}
