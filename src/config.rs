use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

const DATA_DIR: &str = "matchday";
const DB_FILE: &str = "matchday.sqlite";
const MIN_PASSWORD_ROUNDS: u32 = 1_000;
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 100;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub session_ttl_hours: i64,
    pub password_rounds: u32,
    pub cors_origins: Vec<String>,
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            db_path: PathBuf::from(DB_FILE),
            session_ttl_hours: 720,
            password_rounds: 100_000,
            cors_origins: Vec::new(),
            max_body_bytes: 64 * 1024,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let db_path = match var("MATCHDAY_DB_PATH") {
            Some(raw) => PathBuf::from(raw),
            None => default_db_path().unwrap_or(defaults.db_path),
        };
        let session_ttl_hours: i64 = try_load("MATCHDAY_SESSION_TTL_HOURS", "720")?;
        let password_rounds: u32 = try_load("MATCHDAY_PASSWORD_ROUNDS", "100000")?;
        check_limits(session_ttl_hours, password_rounds)?;

        Ok(Self {
            bind_addr: var("MATCHDAY_BIND").unwrap_or(defaults.bind_addr),
            db_path,
            session_ttl_hours,
            password_rounds,
            cors_origins: var("MATCHDAY_CORS_ORIGINS")
                .map(|raw| parse_list(&raw))
                .unwrap_or_default(),
            max_body_bytes: try_load("MATCHDAY_MAX_BODY_BYTES", "65536")?,
        })
    }
}

fn check_limits(session_ttl_hours: i64, password_rounds: u32) -> Result<()> {
    if !(1..=MAX_SESSION_TTL_HOURS).contains(&session_ttl_hours) {
        return Err(anyhow!(
            "MATCHDAY_SESSION_TTL_HOURS must be between 1 and {MAX_SESSION_TTL_HOURS}"
        ));
    }
    if password_rounds < MIN_PASSWORD_ROUNDS {
        return Err(anyhow!(
            "MATCHDAY_PASSWORD_ROUNDS must be at least {MIN_PASSWORD_ROUNDS}"
        ));
    }
    Ok(())
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.trim()
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            anyhow!("invalid {key} value {raw:?}: {e}")
        })
        .with_context(|| format!("environment misconfigured: {key}"))
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_db_path() -> Option<PathBuf> {
    // Prefer XDG data dir.
    if let Some(base) = var("XDG_DATA_HOME") {
        return Some(PathBuf::from(base).join(DATA_DIR).join(DB_FILE));
    }
    let home = var("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(DATA_DIR)
            .join(DB_FILE),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_list_skips_blanks() {
        let origins = parse_list(" https://a.example , ,https://b.example,");
        assert_eq!(origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert!(cfg.password_rounds >= 1_000);
        assert!(cfg.session_ttl_hours >= 1);
        assert_eq!(cfg.max_body_bytes, 65536);
        assert!(check_limits(cfg.session_ttl_hours, cfg.password_rounds).is_ok());
    }

    #[test]
    fn session_ttl_is_bounded() {
        assert!(check_limits(0, 100_000).is_err());
        assert!(check_limits(1, 100_000).is_ok());
        assert!(check_limits(MAX_SESSION_TTL_HOURS, 100_000).is_ok());
        assert!(check_limits(MAX_SESSION_TTL_HOURS + 1, 100_000).is_err());
        assert!(check_limits(3_000_000_000, 100_000).is_err());
    }

    #[test]
    fn password_rounds_have_a_floor() {
        assert!(check_limits(720, 999).is_err());
        assert!(check_limits(720, MIN_PASSWORD_ROUNDS).is_ok());
    }
}
