use std::env;
use std::path::PathBuf;

use crate::error::{PortalError, Result};

#[derive(Clone, Debug)]
pub struct Config {
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    /// Email domain whose users are auto-registered as admins on login.
    pub corporate_domain: String,
    pub frontend_origin: String,
    pub bind_addr: String,
    pub local_store_path: PathBuf,
    pub duplicate_window_secs: i64,
    pub sync_interval_secs: u64,
    pub allow_auto_logout: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            mongo_uri: required("MONGO_URI")?,
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "pge_sugestoes".to_string()),
            jwt_secret: required("JWT_SECRET")?,
            corporate_domain: env::var("CORPORATE_DOMAIN")
                .unwrap_or_else(|_| "pge.sc.gov.br".to_string())
                .to_lowercase(),
            frontend_origin: env::var("FRONTEND_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            local_store_path: env::var("LOCAL_STORE_PATH")
                .unwrap_or_else(|_| "./data/local_store.json".to_string())
                .into(),
            duplicate_window_secs: parsed("DUPLICATE_WINDOW_SECS", 60)?,
            sync_interval_secs: parsed("SYNC_INTERVAL_SECS", 30)?,
            allow_auto_logout: parsed("ALLOW_AUTO_LOGOUT", false)?,
        })
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| PortalError::Config(format!("{} must be set", key)))
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PortalError::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}
