//! Diagnostic output for log builds.

/// Install a stderr subscriber at DEBUG.
#[cfg(feature = "log")]
pub fn init() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(LevelFilter::DEBUG)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(false),
        )
        .init();
}

/// Diagnostics are discarded without the `log` feature.
#[cfg(not(feature = "log"))]
pub fn init() {}
