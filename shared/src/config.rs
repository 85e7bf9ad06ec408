use std::env;
use thiserror::Error;

const DEFAULT_TABLE_NAME: &str = "edubase";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:8080";
const DEFAULT_SENDER_EMAIL: &str = "noreply@edubase.app";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Settings read once at cold start.
#[derive(Debug, Clone)]
pub struct Config {
    pub table_name: String,
    /// Origin the portal is served from. Access links are built from it.
    pub frontend_url: String,
    pub sender_email: String,
    pub cognito_client_id: String,
    pub cognito_client_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| non_empty(key).ok_or(ConfigError::Missing(key));

        Ok(Self {
            table_name: non_empty("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            frontend_url: non_empty("FRONTEND_URL")
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            sender_email: non_empty("SENDER_EMAIL")
                .unwrap_or_else(|| DEFAULT_SENDER_EMAIL.to_string()),
            cognito_client_id: required("COGNITO_CLIENT_ID")?,
            cognito_client_secret: required("COGNITO_CLIENT_SECRET")?,
        })
    }
}
