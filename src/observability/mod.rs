use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initializes tracing for the given component.
///
/// Uses `EnvFilter` (RUST_LOG) with a safe `info` default so production never
/// runs at TRACE by accident.
pub fn init_observability(component: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Default `SystemTime` formatter prints RFC3339 in UTC (`...Z`).
    // Use local time so a configured TZ shows its offset in logs.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()?;

    let environment =
        std::env::var("STAGE").unwrap_or_else(|_| "unknown".to_string());
    info!(component, environment = %environment, "Observability initialized");

    Ok(())
}
