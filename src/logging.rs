use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::ExporterLoggingConfig;

/// Install the global tracing dispatcher from the validated logging section.
///
/// Called exactly once, after configuration has been resolved and validated
/// and before any concurrent unit starts. `RUST_LOG` still wins over the
/// configured level when set, so operators can raise verbosity per-run
/// without editing the file.
pub fn init(cfg: &ExporterLoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(&cfg.level)));

    let registry = tracing_subscriber::registry().with(filter);

    if cfg.format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json().with_target(true)).try_init()?;
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()?;
    }

    tracing::info!(
        level = %cfg.level,
        format = %cfg.format,
        "logger initialized"
    );

    Ok(())
}

/// Map the configured level onto an EnvFilter directive. Validation has
/// already constrained the value; anything else falls back to info.
fn level_directive(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}
