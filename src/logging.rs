//! Logging initialization
//!
//! Android routes `tracing` events (and `log` records, through the
//! subscriber's log bridge) to logcat under the `MetronomePlayer` tag.
//! Desktop builds print to stderr. Safe to call any number of times.

use once_cell::sync::OnceCell;

static LOGGING: OnceCell<()> = OnceCell::new();

/// Logcat tag used on Android.
pub const LOG_TAG: &str = "MetronomePlayer";

/// Install the global subscriber once per process.
pub fn init_logging() {
    LOGGING.get_or_init(|| {
        install_subscriber();
        tracing::debug!("Logging initialized");
    });
}

#[cfg(target_os = "android")]
fn install_subscriber() {
    use tracing_subscriber::prelude::*;

    match tracing_android::layer(LOG_TAG) {
        Ok(layer) => {
            // Another library in the process may already own the global
            // subscriber; keep theirs.
            let _ = tracing_subscriber::registry().with(layer).try_init();
        }
        Err(err) => {
            log::warn!("Failed to create logcat layer: {}", err);
        }
    }
}

#[cfg(not(target_os = "android"))]
fn install_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
        tracing::info!("still logging after repeated init");
    }
}
