use crate::assessment::{PercentageRounding, ScoringPolicy};
use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::sync::OnceLock;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub jwt_secret: String,
    pub jwt_ttl_minutes: i64,
    pub admin_email: String,
    pub admin_password_hash: String,
    pub public_rps: u32,
    pub admin_rps: u32,
    pub trust_forwarded_for: bool,
    pub scoring: ScoringPolicy,
    pub invitation_ttl_hours: i64,
    pub webapp_url: String,
    pub mail_relay_url: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub seed_tests_file: Option<String>,
    pub tick_interval_ms: u64,
    pub log_json: bool,
}

/// Invitation lifetimes, in hours. Matches the per-request override bound.
pub const INVITATION_TTL_RANGE: RangeInclusive<i64> = 1..=720;
/// Admin and candidate token lifetimes, in minutes. One week at most.
pub const JWT_TTL_RANGE: RangeInclusive<i64> = 1..=10_080;

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let pass_percentage: u32 = get_env_or("PASS_PERCENTAGE", 50)?;
        if pass_percentage > 100 {
            return Err(Error::Config(format!(
                "PASS_PERCENTAGE must be between 0 and 100, got {}",
                pass_percentage
            )));
        }
        let rounding: PercentageRounding = get_env_or("PERCENTAGE_ROUNDING", PercentageRounding::HalfUp)?;

        let webapp_url = get_optional("WEBAPP_URL").unwrap_or_else(|| "http://localhost:3000".to_string());
        check_url("WEBAPP_URL", &webapp_url)?;
        let mail_relay_url = get_optional("MAIL_RELAY_URL");
        if let Some(relay) = &mail_relay_url {
            check_url("MAIL_RELAY_URL", relay)?;
        }
        let webhook_url = get_optional("WEBHOOK_URL");
        if let Some(hook) = &webhook_url {
            check_url("WEBHOOK_URL", hook)?;
        }

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            jwt_secret: get_env("JWT_SECRET")?,
            jwt_ttl_minutes: get_env_in_range("JWT_TTL_MINUTES", 480, JWT_TTL_RANGE)?,
            admin_email: get_env("ADMIN_EMAIL")?,
            admin_password_hash: get_env("ADMIN_PASSWORD_HASH")?,
            public_rps: get_env_or("PUBLIC_RPS", 20)?,
            admin_rps: get_env_or("ADMIN_RPS", 50)?,
            trust_forwarded_for: get_env_or("TRUST_FORWARDED_FOR", false)?,
            scoring: ScoringPolicy {
                pass_percentage,
                rounding,
            },
            invitation_ttl_hours: get_env_in_range("INVITATION_TTL_HOURS", 72, INVITATION_TTL_RANGE)?,
            webapp_url,
            mail_relay_url,
            webhook_url,
            webhook_secret: get_optional("WEBHOOK_SECRET"),
            seed_tests_file: get_optional("SEED_TESTS_FILE"),
            tick_interval_ms: get_env_or("TICK_INTERVAL_MS", 1000)?,
            log_json: get_optional("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_optional(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        None => Ok(default),
    }
}

fn get_env_in_range<T>(name: &str, default: T, range: RangeInclusive<T>) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + Display,
    T::Err: Display,
{
    let value = get_env_or(name, default)?;
    if !range.contains(&value) {
        return Err(Error::Config(format!(
            "{} must be between {} and {}, got {}",
            name,
            range.start(),
            range.end(),
            value
        )));
    }
    Ok(value)
}

fn check_url(name: &str, raw: &str) -> Result<()> {
    let parsed = Url::parse(raw).map_err(|e| Error::Config(format!("Invalid URL in {}: {}", name, e)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(Error::Config(format!("{} must use http or https", name)));
    }
    Ok(())
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}
