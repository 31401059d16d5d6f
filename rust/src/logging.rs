// Log routing for the chat core. Records carry ids, kinds, statuses and
// error classes; message bodies and auth tokens never reach a log line.

use tracing_subscriber::EnvFilter;

/// Send pipeline at debug, HTTP client at info, socket frames quiet.
const DEFAULT_FILTER: &str = "courier_core=debug,reqwest=info,tungstenite=warn,info";

/// Overrides `DEFAULT_FILTER` on every platform, e.g. `COURIER_LOG=courier_core=trace`.
const FILTER_ENV: &str = "COURIER_LOG";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the subscriber once per process; later calls are no-ops.
///
/// iOS logs to os_log under `com.courier.app` and appends to
/// `<data_dir>/courier.log` so support can pull send failures off a device.
/// Android goes to logcat tagged `courier`. Everything else prints to stderr.
pub fn init_logging(#[allow(unused)] data_dir: &str) {
    #[cfg(target_os = "ios")]
    {
        use tracing_subscriber::prelude::*;

        let _ = std::fs::create_dir_all(data_dir);
        let file_layer = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(std::path::Path::new(data_dir).join("courier.log"))
            .ok()
            .map(|file| {
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
            });

        let _ = tracing_subscriber::registry()
            .with(filter())
            .with(tracing_oslog::OsLogger::new("com.courier.app", "core"))
            .with(file_layer)
            .try_init();
    }

    #[cfg(target_os = "android")]
    {
        use tracing_subscriber::prelude::*;

        let _ = tracing_subscriber::registry()
            .with(paranoid_android::layer("courier").with_filter(filter()))
            .try_init();
    }

    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(false)
            .try_init();
    }
}
