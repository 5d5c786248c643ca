use std::sync::OnceLock;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

/// Checked before `RUST_LOG`.
pub const LOG_ENV: &str = "SPECTROSTREAM_LOG";

/// wgpu internals are held at `warn` unless a filter variable says otherwise.
const DEFAULT_DIRECTIVES: &str = "spectrostream=info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

static TELEMETRY_INIT: OnceLock<()> = OnceLock::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(DEFAULT_DIRECTIVES))
        .unwrap_or_else(|_| EnvFilter::default().add_directive(Level::INFO.into()))
}

/// Install the global subscriber. Worker threads are named, so their names
/// are printed alongside each event.
pub fn init() {
    TELEMETRY_INIT.get_or_init(|| {
        let result = fmt()
            .with_env_filter(env_filter())
            .with_target(false)
            .with_thread_names(true)
            .compact()
            .try_init();

        if let Err(err) = result {
            eprintln!("[telemetry] failed to initialise tracing subscriber: {err}");
        }
    });
}

/// Like [`init`], but writes through the test harness so output is captured
/// per test.
pub fn init_for_tests() {
    TELEMETRY_INIT.get_or_init(|| {
        let _ = fmt()
            .with_env_filter(env_filter())
            .with_target(false)
            .with_thread_names(true)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_parse() {
        assert!(EnvFilter::try_new(DEFAULT_DIRECTIVES).is_ok());
    }

    #[test]
    fn repeated_initialisation_is_harmless() {
        init_for_tests();
        init_for_tests();
        init();
        tracing::info!("[telemetry] still alive");
    }
}
