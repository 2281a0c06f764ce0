use std::io::IsTerminal;

use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer, filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Logs go to stderr so `--json` output on stdout stays parseable.
pub fn init_tracing(log_level: Level) {
    let log_filter = EnvFilter::builder()
        .with_default_directive(Directive::from(log_level))
        .from_env_lossy();

    let include_target = matches!(log_level, Level::DEBUG | Level::TRACE);

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(include_target)
        .with_ansi(std::io::stderr().is_terminal());

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(log_filter))
        .init();
}
