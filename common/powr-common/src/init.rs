//! Tracing initialization shared by POWR binaries

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
///
/// Logs go to stderr so stdout stays free for command output. `RUST_LOG`
/// is honoured; otherwise `default_level` applies to the named crate.
///
/// Set `LOG_FORMAT=json` for structured JSON lines.
///
/// # Example
///
/// ```rust,ignore
/// powr_common::init_tracing("powr_tracker", "info")?;
/// ```
pub fn init_tracing(crate_name: &str, default_level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn").add_directive(format!("{}={}", crate_name, default_level).parse()?),
    };

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}
