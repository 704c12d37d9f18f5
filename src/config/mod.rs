use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub controller: ControllerConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Defaults applied to controller knobs that were left unset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub document_limit: usize,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub action_body_limit: usize,
    pub action_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

impl ControllerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            document_limit: 8 * 1024 * 1024, // 8M
            read_timeout_secs: 30,
            write_timeout_secs: 30,
            action_body_limit: 8 * 1024 * 1024, // 8M
            action_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Controller overrides
        if let Ok(v) = env::var("JSONAPI_DOCUMENT_LIMIT") {
            self.controller.document_limit = parse_byte_size(&v).unwrap_or(self.controller.document_limit);
        }
        if let Ok(v) = env::var("JSONAPI_READ_TIMEOUT_SECS") {
            self.controller.read_timeout_secs = v.parse().unwrap_or(self.controller.read_timeout_secs);
        }
        if let Ok(v) = env::var("JSONAPI_WRITE_TIMEOUT_SECS") {
            self.controller.write_timeout_secs = v.parse().unwrap_or(self.controller.write_timeout_secs);
        }
        if let Ok(v) = env::var("JSONAPI_ACTION_BODY_LIMIT") {
            self.controller.action_body_limit = parse_byte_size(&v).unwrap_or(self.controller.action_body_limit);
        }
        if let Ok(v) = env::var("JSONAPI_ACTION_TIMEOUT_SECS") {
            self.controller.action_timeout_secs = v.parse().unwrap_or(self.controller.action_timeout_secs);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            controller: ControllerConfig::default(),
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            controller: ControllerConfig::default(),
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            controller: ControllerConfig::default(),
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
        }
    }
}

/// Parse a byte size like "512", "4K", "8M" or "1G".
pub fn parse_byte_size(input: &str) -> Option<usize> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let (number, unit) = match input.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((index, _)) => input.split_at(index),
        None => (input, ""),
    };

    let multiplier: usize = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        _ => return None,
    };

    number.parse::<usize>().ok()?.checked_mul(multiplier)
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
