use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Presence lifecycle tuning
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Period of the `last_seen` refresh sweep over online users
    pub sweep_interval: Duration,
    /// Trailing window inside which a `last_seen` counts as "active"
    pub activity_window: Duration,
}

/// WebSocket session tuning
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `None` selects the in-memory store
    pub database_url: Option<String>,
    pub database_max_connections: usize,
    /// `None` disables the cross-instance relay
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub presence: PresenceConfig,
    pub ws: WsConfig,
    pub log_format: LogFormat,
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env_opt(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let port = env_parse("PORT", 3000u16)?;
        let database_url = env_opt("DATABASE_URL");
        let database_max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 16usize)?;
        let redis_url = env_opt("REDIS_URL");
        let jwt_secret = env_opt("JWT_SECRET")
            .ok_or_else(|| AppError::Config("JWT_SECRET missing".into()))?;

        let sweep_secs = env_parse("PRESENCE_SWEEP_INTERVAL_SECS", 60u64)?;
        let window_secs = env_parse("ACTIVITY_WINDOW_SECS", 300u64)?;
        if sweep_secs == 0 {
            return Err(AppError::Config(
                "PRESENCE_SWEEP_INTERVAL_SECS must be greater than 0".into(),
            ));
        }

        let heartbeat_secs = env_parse("WS_HEARTBEAT_INTERVAL_SECS", 5u64)?;
        let timeout_secs = env_parse("WS_CLIENT_TIMEOUT_SECS", 30u64)?;
        if timeout_secs <= heartbeat_secs {
            return Err(AppError::Config(
                "WS_CLIENT_TIMEOUT_SECS must exceed WS_HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }

        let log_format = match env_opt("LOG_FORMAT").as_deref() {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            redis_url,
            jwt_secret,
            presence: PresenceConfig {
                sweep_interval: Duration::from_secs(sweep_secs),
                activity_window: Duration::from_secs(window_secs),
            },
            ws: WsConfig {
                heartbeat_interval: Duration::from_secs(heartbeat_secs),
                client_timeout: Duration::from_secs(timeout_secs),
            },
            log_format,
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            port: 3000,
            database_url: None,
            database_max_connections: 4,
            redis_url: None,
            jwt_secret: "test-secret".into(),
            presence: PresenceConfig {
                sweep_interval: Duration::from_secs(60),
                activity_window: Duration::from_secs(300),
            },
            ws: WsConfig {
                heartbeat_interval: Duration::from_secs(5),
                client_timeout: Duration::from_secs(30),
            },
            log_format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "PORT",
        "DATABASE_URL",
        "REDIS_URL",
        "JWT_SECRET",
        "PRESENCE_SWEEP_INTERVAL_SECS",
        "ACTIVITY_WINDOW_SECS",
        "WS_HEARTBEAT_INTERVAL_SECS",
        "WS_CLIENT_TIMEOUT_SECS",
        "LOG_FORMAT",
    ];

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_apply_when_only_secret_is_set() {
        clear_env();
        env::set_var("JWT_SECRET", "s3cret");

        let cfg = Config::from_env().expect("config should load");
        assert_eq!(cfg.port, 3000);
        assert!(cfg.database_url.is_none());
        assert!(cfg.redis_url.is_none());
        assert_eq!(cfg.presence.sweep_interval, Duration::from_secs(60));
        assert_eq!(cfg.presence.activity_window, Duration::from_secs(300));
        assert_eq!(cfg.log_format, LogFormat::Text);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_secret_is_rejected() {
        clear_env();
        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_timeout_must_exceed_heartbeat() {
        clear_env();
        env::set_var("JWT_SECRET", "s3cret");
        env::set_var("WS_HEARTBEAT_INTERVAL_SECS", "10");
        env::set_var("WS_CLIENT_TIMEOUT_SECS", "10");

        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_number_is_reported() {
        clear_env();
        env::set_var("JWT_SECRET", "s3cret");
        env::set_var("PORT", "not-a-port");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("PORT"));
        clear_env();
    }
}
