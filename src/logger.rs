use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("keypleless_reader=debug,info")
        } else {
            EnvFilter::new("keypleless_reader=info")
        }
    })
}

/// Human readable output. A second call is a no-op.
pub fn init_logger(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}

/// One JSON object per event, for log collectors.
pub fn init_json_logger() {
    let _ = tracing_subscriber::registry()
        .with(default_filter(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .json(),
        )
        .try_init();
}
