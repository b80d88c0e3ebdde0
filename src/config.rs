use anyhow::{bail, Context};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

/// Table used when `USERS_TABLE` is not set.
pub const DEFAULT_USERS_TABLE: &str = "auth_app_users";

/// Issuer stamped into every token and required on validation.
pub const TOKEN_ISSUER: &str = "auth-app";

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub users_table: String,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let users_table =
            std::env::var("USERS_TABLE").unwrap_or_else(|_| DEFAULT_USERS_TABLE.into());
        let secret = std::env::var("JWT_SECRET").unwrap_or_default();
        Self::from_parts(database_url, users_table, secret)
    }

    /// Builds a config from raw values, rejecting an empty signing secret and
    /// table names that are not plain SQL identifiers.
    pub fn from_parts(
        database_url: String,
        users_table: String,
        secret: String,
    ) -> anyhow::Result<Self> {
        if secret.trim().is_empty() {
            bail!("JWT_SECRET must be set to a non-empty value");
        }
        if !is_valid_table_name(&users_table) {
            bail!("USERS_TABLE {users_table:?} is not a valid table name");
        }
        Ok(Self {
            database_url,
            users_table,
            jwt: JwtConfig {
                secret,
                issuer: TOKEN_ISSUER.into(),
            },
        })
    }
}

fn is_valid_table_name(name: &str) -> bool {
    lazy_static! {
        static ref TABLE_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap();
    }
    TABLE_RE.is_match(name)
}
