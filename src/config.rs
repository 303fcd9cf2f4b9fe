//! Configuration management

use anyhow::{self, Context, Result};
use chrono::FixedOffset;

/// Which storage backend the worker runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("Unknown STORE_BACKEND '{}' (expected postgres or memory)", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// Optional NATS credentials
    pub nats_user: Option<String>,
    pub nats_password: Option<String>,

    pub store_backend: StoreBackend,

    /// PostgreSQL connection string (required for the postgres backend)
    pub database_url: Option<String>,

    /// JWT secret key for token signing/validation
    pub jwt_secret: String,

    /// Offset used to display times and bucket dashboard days
    pub utc_offset: FixedOffset,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let nats_url = std::env::var("NATS_URL")
            .unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let nats_user = std::env::var("NATS_USER").ok().filter(|u| !u.is_empty());
        let nats_password = std::env::var("NATS_PASSWORD").ok();

        let store_backend = StoreBackend::parse(
            &std::env::var("STORE_BACKEND").unwrap_or_default(),
        )?;

        let database_url = std::env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when STORE_BACKEND is postgres");
        }

        let jwt_secret = std::env::var("JWT_SECRET")
            .context("JWT_SECRET must be set, generate one with: openssl rand -base64 48")?;
        check_jwt_secret(&jwt_secret)?;

        let utc_offset = parse_utc_offset(
            &std::env::var("PANEL_UTC_OFFSET").unwrap_or_else(|_| "-03:00".to_string()),
        )?;

        Ok(Self {
            nats_url,
            nats_user,
            nats_password,
            store_backend,
            database_url,
            jwt_secret,
            utc_offset,
        })
    }
}

fn check_jwt_secret(secret: &str) -> Result<()> {
    if secret.len() < 32 {
        anyhow::bail!(
            "JWT_SECRET must be at least 32 bytes (current: {} bytes). Generate one with: openssl rand -base64 48",
            secret.len()
        );
    }

    const KNOWN_DEV_SECRETS: &[&str] = &[
        "dev-secret-change-in-production-min-32-bytes!!",
    ];
    if KNOWN_DEV_SECRETS.contains(&secret) {
        tracing::warn!("JWT_SECRET matches a known default, change it for production!");
    }
    Ok(())
}

/// Parse `±HH:MM` into a fixed offset
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    let (sign, rest) = match value.chars().next() {
        Some('+') => (1, &value[1..]),
        Some('-') => (-1, &value[1..]),
        _ => anyhow::bail!("PANEL_UTC_OFFSET must look like -03:00, got '{}'", value),
    };

    let (hours, minutes) = rest
        .split_once(':')
        .with_context(|| format!("PANEL_UTC_OFFSET must look like -03:00, got '{}'", value))?;
    let hours: i32 = hours.parse().context("Invalid hours in PANEL_UTC_OFFSET")?;
    let minutes: i32 = minutes.parse().context("Invalid minutes in PANEL_UTC_OFFSET")?;

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("PANEL_UTC_OFFSET out of range: '{}'", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_utc_offset_negative() {
        let offset = parse_utc_offset("-03:00").unwrap();
        assert_eq!(offset.local_minus_utc(), -3 * 3600);
    }

    #[test]
    fn test_parse_utc_offset_positive_with_minutes() {
        let offset = parse_utc_offset("+05:30").unwrap();
        assert_eq!(offset.local_minus_utc(), 5 * 3600 + 30 * 60);
    }

    #[test]
    fn test_parse_utc_offset_rejects_garbage() {
        assert!(parse_utc_offset("UTC").is_err());
        assert!(parse_utc_offset("-0300").is_err());
        assert!(parse_utc_offset("+30:00").is_err());
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!(StoreBackend::parse("").unwrap(), StoreBackend::Postgres);
        assert_eq!(StoreBackend::parse("Memory").unwrap(), StoreBackend::Memory);
        assert!(StoreBackend::parse("redis").is_err());
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        assert!(check_jwt_secret("too-short").is_err());
        assert!(check_jwt_secret(&"x".repeat(32)).is_ok());
    }
}
