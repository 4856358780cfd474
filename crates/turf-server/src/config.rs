use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::warn;

use turf_rooms::RoomConfig;

const PLACEHOLDER_SECRETS: &[&str] = &["", "dev-secret-change-me", "changeme", "secret"];

/// Server configuration, read from `TURF_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub rooms: RoomConfig,
}

impl Config {
    /// Read the process environment. `main` has already merged `.env` into it.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let production = lookup("TURF_ENV").is_some_and(|v| v == "production");

        let jwt_secret = lookup("TURF_JWT_SECRET").unwrap_or_else(|| "dev-secret-change-me".into());
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            if production {
                bail!("TURF_JWT_SECRET must be set to a real secret when TURF_ENV=production");
            }
            warn!("TURF_JWT_SECRET is a placeholder; tokens are forgeable outside development");
        }

        let defaults = RoomConfig::default();
        let rooms = RoomConfig {
            pin_interval: secs(&lookup, "TURF_PIN_INTERVAL_SECS", defaults.pin_interval)?,
            pin_duration: secs(&lookup, "TURF_PIN_DURATION_SECS", defaults.pin_duration)?,
            lull_threshold: secs(&lookup, "TURF_LULL_THRESHOLD_SECS", defaults.lull_threshold)?,
            tick_interval: secs(&lookup, "TURF_ROOM_TICK_SECS", defaults.tick_interval)?,
            orphan_ttl: secs(&lookup, "TURF_ORPHAN_TTL_SECS", defaults.orphan_ttl)?,
            ..defaults
        };
        if rooms.tick_interval.is_zero() {
            bail!("TURF_ROOM_TICK_SECS must be greater than zero");
        }

        Ok(Config {
            host: lookup("TURF_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: lookup("TURF_PORT")
                .unwrap_or_else(|| "3000".into())
                .parse::<u16>()
                .context("TURF_PORT must be a valid port number")?,
            db_path: PathBuf::from(lookup("TURF_DB_PATH").unwrap_or_else(|| "turf.db".into())),
            jwt_secret,
            rooms,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    match lookup(key) {
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .with_context(|| format!("{key} must be a whole number of seconds")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.addr().unwrap().to_string(), "0.0.0.0:3000");
        assert_eq!(c.db_path, PathBuf::from("turf.db"));
        assert_eq!(c.rooms.pin_interval, Duration::from_secs(300));
        assert_eq!(c.rooms.pin_duration, Duration::from_secs(30));
        assert_eq!(c.rooms.lull_threshold, Duration::from_secs(20));
        assert_eq!(c.rooms.tick_interval, Duration::from_secs(5));
        assert_eq!(c.rooms.orphan_ttl, Duration::from_secs(60));
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("TURF_PORT", "8080"),
            ("TURF_JWT_SECRET", "s3cr3t-value"),
            ("TURF_LULL_THRESHOLD_SECS", "45"),
        ])
        .unwrap();
        assert_eq!(c.port, 8080);
        assert_eq!(c.jwt_secret, "s3cr3t-value");
        assert_eq!(c.rooms.lull_threshold, Duration::from_secs(45));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("TURF_PORT", "70000")]).is_err());
        assert!(config(&[("TURF_PIN_INTERVAL_SECS", "5m")]).is_err());
        assert!(config(&[("TURF_ROOM_TICK_SECS", "0")]).is_err());
    }

    #[test]
    fn production_requires_a_real_secret() {
        assert!(config(&[("TURF_ENV", "production")]).is_err());
        assert!(config(&[("TURF_ENV", "production"), ("TURF_JWT_SECRET", "changeme")]).is_err());
        assert!(config(&[("TURF_ENV", "production"), ("TURF_JWT_SECRET", "long-random-value")]).is_ok());
    }
}
