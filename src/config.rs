use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{bail, Result};
use log::info;

/// Service configuration, loaded from the environment with logged defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    /// Distance threshold the recognizer used when matching; observations at
    /// or above it are treated as no confident match.
    pub match_threshold: f64,
    pub cooldown_secs: u64,
    /// Upper bound on rows returned by the attendance log endpoint.
    pub log_limit: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config = Self {
            port: try_load("ROLLCALL_PORT", "3000")?,
            db_path: PathBuf::from(try_load::<String>(
                "ROLLCALL_DB_PATH",
                "rollcall.sqlite3",
            )?),
            match_threshold: try_load("ROLLCALL_MATCH_THRESHOLD", "0.6")?,
            cooldown_secs: try_load("ROLLCALL_COOLDOWN_SECS", "10")?,
            log_limit: try_load("ROLLCALL_LOG_LIMIT", "100")?,
        };

        if config.cooldown_secs == 0 {
            bail!("ROLLCALL_COOLDOWN_SECS must be greater than zero");
        }
        if !(config.match_threshold > 0.0) {
            bail!("ROLLCALL_MATCH_THRESHOLD must be greater than zero");
        }

        Ok(config)
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = match env::var(key) {
        Ok(value) => value,
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default.to_string()
        }
    };

    match raw.parse() {
        Ok(value) => Ok(value),
        Err(err) => bail!("invalid {key} value '{raw}': {err}"),
    }
}
