pub mod domain;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod report;
pub mod scan;
pub mod screen;
pub mod time;
pub mod universe;

pub mod config {
    use anyhow::Context;
    use std::str::FromStr;

    /// Secrets and endpoints. Tunables live in `scan::ScanConfig`.
    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub notify_phone: Option<String>,
        pub notify_api_key: Option<String>,
        pub notify_webhook_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub yahoo_base_url: Option<String>,
        pub hsi_components_url: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                notify_phone: env_string("NOTIFY_PHONE"),
                notify_api_key: env_string("NOTIFY_APIKEY"),
                notify_webhook_url: env_string("NOTIFY_WEBHOOK_URL"),
                sentry_dsn: env_string("SENTRY_DSN"),
                yahoo_base_url: env_string("YAHOO_BASE_URL"),
                hsi_components_url: env_string("HSI_COMPONENTS_URL"),
            })
        }

        pub fn require_notify_phone(&self) -> anyhow::Result<&str> {
            self.notify_phone
                .as_deref()
                .context("NOTIFY_PHONE is required")
        }
    }

    fn env_string(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    /// Parses an env var, treating unset or unparsable values as absent.
    pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }
}
