//! Process configuration read from the environment.

use std::net::SocketAddr;

use anyhow::{Context, bail};
use chrono::Duration;

const DEV_JWT_SECRET: &str = "dev-secret";
const DEFAULT_BCRYPT_COST: u32 = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedAdmin {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub bcrypt_cost: u32,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub seed_admin: Option<SeedAdmin>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the process environment in production, a
    /// map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR must be a socket address")?;

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let access_minutes = parse_positive(var("ACCESS_TOKEN_TTL_MINUTES"), 5, "ACCESS_TOKEN_TTL_MINUTES")?;
        let refresh_hours = parse_positive(var("REFRESH_TOKEN_TTL_HOURS"), 24, "REFRESH_TOKEN_TTL_HOURS")?;

        let bcrypt_cost = match var("BCRYPT_COST") {
            None => DEFAULT_BCRYPT_COST,
            Some(raw) => {
                let cost: u32 = raw
                    .parse()
                    .with_context(|| format!("BCRYPT_COST must be an integer, got '{raw}'"))?;
                if !(4..=31).contains(&cost) {
                    bail!("BCRYPT_COST must be between 4 and 31, got {cost}");
                }
                cost
            }
        };

        let use_persistent_stores = var("USE_PERSISTENT_STORES")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
            .unwrap_or(false);

        let database_url = var("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            bail!("DATABASE_URL is required when USE_PERSISTENT_STORES is set");
        }

        let seed_admin = match (var("SEED_ADMIN_LOGIN"), var("SEED_ADMIN_PASSWORD")) {
            (Some(login), Some(password)) => Some(SeedAdmin { login, password }),
            (None, None) => None,
            _ => bail!("SEED_ADMIN_LOGIN and SEED_ADMIN_PASSWORD must be set together"),
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            access_token_ttl: Duration::minutes(access_minutes),
            refresh_token_ttl: Duration::hours(refresh_hours),
            bcrypt_cost,
            use_persistent_stores,
            database_url,
            seed_admin,
        })
    }
}

fn parse_positive(value: Option<String>, default: i64, key: &str) -> anyhow::Result<i64> {
    let Some(raw) = value else {
        return Ok(default);
    };
    let n: i64 = raw
        .parse()
        .with_context(|| format!("{key} must be an integer, got '{raw}'"))?;
    if n <= 0 {
        bail!("{key} must be positive, got {n}");
    }
    Ok(n)
}
