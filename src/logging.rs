//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! The level filter comes from the `ASSETPIPE_LOG` environment variable
//! (e.g. `info`, `debug`, `assetpipe::watch=trace`) and defaults to `info`.
//!
//! Log lines go to stderr through the progress bar writer, so they don't tear
//! the spinners drawn for running tasks.

use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const ENV: &str = "ASSETPIPE_LOG";

/// Installs the global subscriber. Call once at startup.
pub fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let indicatif = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(indicatif.get_stderr_writer()),
        )
        .with(indicatif)
        .try_init()?;

    Ok(())
}
