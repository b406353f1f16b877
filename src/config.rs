use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Shared with the identity service that signs the tokens.
    pub jwt_secret: String,
    pub tutoring_service_url: String,
    /// Without a database the service keeps messages in memory.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub bind_addr: SocketAddr,
    pub base_path: String,
    pub dependency_timeout: Duration,
    pub history_limit: usize,
    pub trust_forwarded_identity: bool,
    pub json_logs: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let tutoring_service_url = get("TUTORING_SERVICE_URL")
            .ok_or(ConfigError::Missing("TUTORING_SERVICE_URL"))?
            .trim_end_matches('/')
            .to_string();
        if !tutoring_service_url.starts_with("http://") && !tutoring_service_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "TUTORING_SERVICE_URL",
                value: tutoring_service_url,
            });
        }

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let base_path = match get("BASE_PATH") {
            Some(path) => {
                let path = path.trim_matches('/');
                if path.is_empty() {
                    String::new()
                } else {
                    format!("/{}", path)
                }
            }
            None => "/api".to_string(),
        };

        Ok(Config {
            jwt_secret,
            tutoring_service_url,
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 5)?,
            allowed_origins,
            bind_addr: parse_or(&get, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            base_path,
            dependency_timeout: Duration::from_millis(parse_or(&get, "DEPENDENCY_TIMEOUT_MS", 5000)?),
            history_limit: parse_or(&get, "HISTORY_LIMIT", 100)?,
            trust_forwarded_identity: parse_or(&get, "TRUST_FORWARDED_IDENTITY", false)?,
            json_logs: get("LOG_FORMAT").as_deref() == Some("json"),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("TUTORING_SERVICE_URL", "http://tutorias:4000/"),
        ]))
        .unwrap();

        assert_eq!(config.tutoring_service_url, "http://tutorias:4000");
        assert_eq!(config.base_path, "/api");
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.dependency_timeout, Duration::from_secs(5));
        assert_eq!(config.bind_addr.port(), 3000);
        assert!(config.database_url.is_none());
        assert!(config.allowed_origins.is_empty());
        assert!(!config.trust_forwarded_identity);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("TUTORING_SERVICE_URL", "https://tutorias.example"),
            ("ALLOWED_ORIGINS", "http://localhost:3001/, https://app.example ,"),
            ("BASE_PATH", "/"),
            ("DEPENDENCY_TIMEOUT_MS", "750"),
            ("TRUST_FORWARDED_IDENTITY", "true"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(
            config.allowed_origins,
            vec!["http://localhost:3001".to_string(), "https://app.example".to_string()]
        );
        assert_eq!(config.base_path, "");
        assert_eq!(config.dependency_timeout, Duration::from_millis(750));
        assert!(config.trust_forwarded_identity);
        assert!(config.json_logs);
    }

    #[test]
    fn test_missing_and_invalid_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("TUTORING_SERVICE_URL", "http://x")])),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[
                ("JWT_SECRET", "s"),
                ("TUTORING_SERVICE_URL", "http://x"),
                ("HISTORY_LIMIT", "lots"),
            ])),
            Err(ConfigError::Invalid { key: "HISTORY_LIMIT", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("JWT_SECRET", "s"), ("TUTORING_SERVICE_URL", "tutorias")])),
            Err(ConfigError::Invalid { key: "TUTORING_SERVICE_URL", .. })
        ));
    }
}
