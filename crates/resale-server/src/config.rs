use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub backend_timeout: Duration,
    /// 0 disables the background maintenance task.
    pub maintenance_interval_secs: u64,
    pub admin_emails: Vec<String>,
    /// Empty means permissive CORS.
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("RESALE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("RESALE_JWT_SECRET is unset or still a placeholder");
        }

        Ok(Self {
            host: lookup("RESALE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_var(&lookup, "RESALE_PORT", 3000)?,
            db_path: lookup("RESALE_DB_PATH").unwrap_or_else(|| "resale.db".into()).into(),
            jwt_secret,
            token_ttl_hours: parse_var(&lookup, "RESALE_TOKEN_TTL_HOURS", 720)?,
            backend_timeout: Duration::from_millis(parse_var(&lookup, "RESALE_BACKEND_TIMEOUT_MS", 5000)?),
            maintenance_interval_secs: parse_var(&lookup, "RESALE_MAINTENANCE_INTERVAL_SECS", 3600)?,
            admin_emails: list_var(&lookup, "RESALE_ADMIN_EMAILS")
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
            cors_origins: list_var(&lookup, "RESALE_CORS_ORIGINS"),
        })
    }
}

fn parse_var<T>(lookup: impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}

fn list_var(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Vec<String> {
    lookup(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let config = Config::from_lookup(lookup(&[("RESALE_JWT_SECRET", "s3cr3t")])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.backend_timeout, Duration::from_secs(5));
        assert_eq!(config.maintenance_interval_secs, 3600);
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("RESALE_JWT_SECRET", "dev-secret-change-me")])).is_err());
    }

    #[test]
    fn admin_emails_are_trimmed_and_lower_cased() {
        let config = Config::from_lookup(lookup(&[
            ("RESALE_JWT_SECRET", "s3cr3t"),
            ("RESALE_ADMIN_EMAILS", " Ops@Resale.io, ,b@x.io ,"),
        ]))
        .unwrap();
        assert_eq!(config.admin_emails, ["ops@resale.io", "b@x.io"]);
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = Config::from_lookup(lookup(&[
            ("RESALE_JWT_SECRET", "s3cr3t"),
            ("RESALE_PORT", "eighty"),
        ]))
        .err()
        .unwrap();
        assert!(err.to_string().contains("RESALE_PORT"));
    }
}
