use crate::utils::retry::RetryPolicy;
use anyhow::{Context, bail};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum StoreBackend {
    Mysql,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    pub database_url: Option<String>,
    pub store_backend: StoreBackend,
    pub api_prefix: String,

    // Rate limiting
    pub rate_per_min: u32,

    // Store resilience
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,

    /// Zero disables expiry.
    pub cache_ttl_secs: u64,

    pub log_dir: String,
    pub run_migrations: bool,

    /// Profiles seeded into the memory backend, as `user:company` pairs.
    pub memory_profiles: Vec<(u64, Option<u64>)>,
}

/// Parses `1:10,2:10,3` into `(user, company)` pairs; a bare user has no company.
fn parse_profiles(raw: &str) -> anyhow::Result<Vec<(u64, Option<u64>)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> anyhow::Result<(u64, Option<u64>)> {
            let (user, company) = match entry.split_once(':') {
                Some((user, company)) => (user, Some(company)),
                None => (entry, None),
            };
            let user: u64 = user
                .trim()
                .parse()
                .with_context(|| format!("MEMORY_PROFILES has an invalid user id: {entry}"))?;
            let company = company
                .map(|c| c.trim().parse::<u64>())
                .transpose()
                .with_context(|| format!("MEMORY_PROFILES has an invalid company id: {entry}"))?;
            Ok((user, company))
        })
        .collect()
}

fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        let store_backend = match env::var("STORE_BACKEND") {
            Ok(raw) => StoreBackend::from_str(raw.trim())
                .with_context(|| format!("STORE_BACKEND must be mysql or memory, got {raw}"))?,
            Err(_) => StoreBackend::Mysql,
        };

        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Mysql && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORE_BACKEND=mysql");
        }

        let config = Self {
            server_addr: env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            database_url,
            store_backend,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            rate_per_min: var_or("RATE_PER_MIN", 1000)?,
            retry_max_attempts: var_or("RETRY_MAX_ATTEMPTS", 3)?,
            retry_base_delay_ms: var_or("RETRY_BASE_DELAY_MS", 200)?,
            cache_ttl_secs: var_or("CACHE_TTL_SECS", 0)?,
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            run_migrations: var_or("RUN_MIGRATIONS", false)?,
            memory_profiles: parse_profiles(&env::var("MEMORY_PROFILES").unwrap_or_default())?,
        };

        if config.retry_max_attempts == 0 {
            bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            server_addr: "127.0.0.1:0".into(),
            database_url: None,
            store_backend: StoreBackend::Memory,
            api_prefix: "/api".into(),
            rate_per_min: 60,
            retry_max_attempts: 4,
            retry_base_delay_ms: 50,
            cache_ttl_secs: 0,
            log_dir: "logs".into(),
            run_migrations: false,
            memory_profiles: Vec::new(),
        }
    }

    #[test]
    fn zero_ttl_disables_expiry() {
        let mut config = sample();
        assert_eq!(config.cache_ttl(), None);
        config.cache_ttl_secs = 30;
        assert_eq!(config.cache_ttl(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn retry_policy_uses_configured_values() {
        let policy = sample().retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
    }

    #[test]
    fn memory_profiles_parse() {
        assert_eq!(
            parse_profiles("1:10, 2:10,3").unwrap(),
            vec![(1, Some(10)), (2, Some(10)), (3, None)]
        );
        assert!(parse_profiles("").unwrap().is_empty());
        assert!(parse_profiles("x:10").is_err());
        assert!(parse_profiles("1:y").is_err());
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!(StoreBackend::from_str("memory").unwrap(), StoreBackend::Memory);
        assert_eq!(StoreBackend::from_str("mysql").unwrap(), StoreBackend::Mysql);
        assert!(StoreBackend::from_str("postgres").is_err());
        assert_eq!(StoreBackend::Memory.as_ref(), "memory");
    }
}
