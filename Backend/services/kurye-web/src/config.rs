use std::time::Duration;

use clap::Args;

use crate::generator::{DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Runtime settings. Every field can come from the environment, flags win.
#[derive(Debug, Clone, Args)]
pub struct Config {
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:5002", global = true)]
    pub bind: String,

    /// Postgres URL; without it the site runs on an in-memory store.
    #[arg(long, env = "PG_URL", global = true, hide_env_values = true)]
    pub pg_url: Option<String>,

    #[arg(long, env = "HTTP_WORKERS", default_value_t = 2, global = true)]
    pub workers: usize,

    /// Public origin used in the sitemap and robots.txt.
    #[arg(long, env = "SITE_URL", default_value = "http://localhost:5002", global = true)]
    pub site_url: String,

    /// Number orders are sent to, any formatting; only digits are kept.
    #[arg(long, env = "WHATSAPP_PHONE", global = true)]
    pub whatsapp_phone: Option<String>,

    /// Bearer token for /api/admin; admin routes are open when unset.
    #[arg(long, env = "ADMIN_TOKEN", global = true, hide_env_values = true)]
    pub admin_token: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", global = true, hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL, global = true)]
    pub gemini_model: String,

    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub gemini_base_url: String,

    #[arg(long, env = "GEMINI_TIMEOUT_SECS", default_value_t = 60, global = true)]
    pub gemini_timeout_secs: u64,

    /// Author stamped on generated drafts.
    #[arg(long, env = "DEFAULT_AUTHOR", global = true)]
    pub default_author: Option<String>,
}

impl Config {
    pub fn gemini_timeout(&self) -> Duration {
        Duration::from_secs(self.gemini_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5002".into(),
            pg_url: None,
            workers: 2,
            site_url: "http://localhost:5002".into(),
            whatsapp_phone: None,
            admin_token: None,
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.into(),
            gemini_base_url: DEFAULT_BASE_URL.into(),
            gemini_timeout_secs: 60,
            default_author: None,
        }
    }
}
