use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize structured logging with tracing.
///
/// `RUST_LOG` wins when set. Otherwise podsync logs at info, or debug
/// with `verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "podsync=debug" } else { "podsync=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
