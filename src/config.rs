use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use axum_extra::extract::cookie::Key;
use bcrypt::DEFAULT_COST;
use eyre::{eyre, Result};
use log::info;

use crate::client::{DEFAULT_MODEL, VENICE_API_URL};
use crate::error::Error;
use crate::repository::sessions::DEFAULT_SESSION_TTL;

const MIN_SECRET_KEY_LEN: usize = 32;

pub enum UserStoreConfig {
    Sqlite { database_url: String },
    /// Single `admin` account whose password comes from `ADMIN_PASSWORD`.
    Memory { admin_password: String },
}

pub struct Config {
    pub secret_key: String,
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub user_store: UserStoreConfig,
    pub bind_addr: SocketAddr,
    pub bcrypt_cost: u32,
    pub session_ttl: Duration,
    pub rate_limit_per_hour: u32,
    pub rate_limit_per_day: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret_key = required(&lookup, "SECRET_KEY")?;
        if secret_key.len() < MIN_SECRET_KEY_LEN {
            return Err(Error::InvalidConfig(format!(
                "SECRET_KEY must be at least {MIN_SECRET_KEY_LEN} bytes"
            ))
            .into());
        }

        let user_store = match lookup("USER_STORE").as_deref().unwrap_or("sqlite") {
            "sqlite" => UserStoreConfig::Sqlite {
                database_url: lookup("DATABASE_URL")
                    .unwrap_or_else(|| "sqlite://users.db?mode=rwc".to_string()),
            },
            "memory" => UserStoreConfig::Memory {
                admin_password: required(&lookup, "ADMIN_PASSWORD")?,
            },
            other => {
                return Err(Error::InvalidConfig(format!(
                    "USER_STORE must be `sqlite` or `memory`, got `{other}`"
                ))
                .into())
            }
        };

        Ok(Config {
            secret_key,
            api_key: required(&lookup, "VENICE_API_KEY")?,
            api_url: lookup("VENICE_API_URL").unwrap_or_else(|| VENICE_API_URL.to_string()),
            model: lookup("IMAGE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            user_store,
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 5001)))?,
            bcrypt_cost: parse_or(&lookup, "BCRYPT_COST", DEFAULT_COST)?,
            session_ttl: Duration::from_secs(parse_or(
                &lookup,
                "SESSION_TTL_SECS",
                DEFAULT_SESSION_TTL.as_secs(),
            )?),
            rate_limit_per_hour: parse_or(&lookup, "RATE_LIMIT_PER_HOUR", 200)?,
            rate_limit_per_day: parse_or(&lookup, "RATE_LIMIT_PER_DAY", 1000)?,
        })
    }

    pub fn cookie_key(&self) -> Key {
        Key::derive_from(self.secret_key.as_bytes())
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::InvalidConfig(format!("{key} is not set")).into())
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => value
            .parse()
            .map_err(|e| eyre!(Error::InvalidConfig(format!("{key}: {e}")))),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
