use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub typing_ttl: Duration,
    pub typing_sweep_interval: Duration,
    /// `open` or `roster`.
    pub access: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("MUSTER_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MUSTER_JWT_SECRET is unset or still a placeholder; it must match the account service's signing secret");
        }

        let port = get("MUSTER_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("MUSTER_PORT must be a port number")?;
        let typing_ttl_secs: u64 = get("MUSTER_TYPING_TTL_SECS")
            .unwrap_or_else(|| "5".into())
            .parse()
            .context("MUSTER_TYPING_TTL_SECS must be a whole number of seconds")?;
        if typing_ttl_secs == 0 {
            bail!("MUSTER_TYPING_TTL_SECS must be greater than zero");
        }
        let sweep_secs: u64 = get("MUSTER_TYPING_SWEEP_SECS")
            .unwrap_or_else(|| "30".into())
            .parse()
            .context("MUSTER_TYPING_SWEEP_SECS must be a whole number of seconds")?;
        if sweep_secs == 0 {
            bail!("MUSTER_TYPING_SWEEP_SECS must be greater than zero");
        }

        Ok(Self {
            host: get("MUSTER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("MUSTER_DB_PATH").unwrap_or_else(|| "muster.db".into()).into(),
            jwt_secret,
            typing_ttl: Duration::from_secs(typing_ttl_secs),
            typing_sweep_interval: Duration::from_secs(sweep_secs),
            access: get("MUSTER_ACCESS").unwrap_or_else(|| "roster".into()),
        })
    }
}
