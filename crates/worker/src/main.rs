use screener_core::config::Settings;
use screener_core::ingest::yahoo::YahooClient;
use screener_core::notify::callmebot::CallMeBotNotifier;
use screener_core::notify::{LogNotifier, Notifier};
use screener_core::scan::{deliver, ScanConfig, Scanner};
use screener_core::universe::listings::HttpListingSource;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let config = ScanConfig::from_env();
    config.validate()?;

    let yahoo = Arc::new(YahooClient::from_settings(&settings)?);
    let listings = Arc::new(HttpListingSource::from_settings(&settings)?);
    let scanner = Scanner::new(config, listings, yahoo.clone(), yahoo);

    tracing::info!("starting US/HK pattern scan");
    let report = scanner.run(chrono::Utc::now()).await;

    for err in &report.stats.errors {
        tracing::warn!(stage = err.stage.as_str(), subject = %err.subject, detail = %err.detail, "recovered scan error");
    }
    for (signal, count) in &report.stats.hits {
        tracing::info!(%signal, count, "signal matches");
    }

    let (notifier, recipient) = match settings.require_notify_phone() {
        Ok(phone) => {
            let notifier: Box<dyn Notifier> = Box::new(CallMeBotNotifier::from_settings(&settings)?);
            (notifier, phone)
        }
        Err(err) => {
            tracing::warn!(error = %err, "no recipient configured; logging digest instead");
            let notifier: Box<dyn Notifier> = Box::new(LogNotifier);
            (notifier, "log")
        }
    };

    if let Some(err) = deliver(notifier.as_ref(), recipient, &report).await {
        sentry_anyhow::capture_anyhow(&anyhow::Error::new(err));
    }

    tracing::info!("scan finished");
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
