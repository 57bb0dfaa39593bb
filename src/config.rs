use std::env;
use std::time::Duration;

use dotenvy::dotenv;

const DEFAULT_DELETED_PLACEHOLDER: &str = "This message has been deleted";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Quiet period after the last typing signal before a stopped-typing
    /// event fires.
    pub typing_timeout_ms: u64,
    /// Text shown in place of a soft-deleted message's content.
    pub deleted_placeholder: String,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let typing_timeout_ms = env::var("TYPING_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3_000);
        let deleted_placeholder = env::var("DELETED_MESSAGE_PLACEHOLDER")
            .unwrap_or_else(|_| DEFAULT_DELETED_PLACEHOLDER.to_string());
        let default_page_size = env::var("DEFAULT_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50);
        let max_page_size = env::var("MAX_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);

        Ok(Self {
            database_url,
            typing_timeout_ms,
            deleted_placeholder,
            default_page_size,
            max_page_size,
        })
    }

    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            typing_timeout_ms: 50,
            deleted_placeholder: DEFAULT_DELETED_PLACEHOLDER.to_string(),
            default_page_size: 50,
            max_page_size: 200,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            typing_timeout_ms: 3_000,
            deleted_placeholder: DEFAULT_DELETED_PLACEHOLDER.to_string(),
            default_page_size: 50,
            max_page_size: 200,
        }
    }
}
