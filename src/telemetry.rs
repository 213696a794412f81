use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "notification_service=info,tower_http=info,sqlx=warn";

/// Installs the global subscriber. `RUST_LOG` overrides the default filter;
/// `format` selects `json` (default) or `pretty` output.
pub fn init(format: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = match format {
        "pretty" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .pretty()
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .flatten_event(true)
            .boxed(),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
    {
        eprintln!("Logging already initialized: {e}");
    }
}
