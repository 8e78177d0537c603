//! Structured diagnostics for the batch and framing layers.
//!
//! A streaming insert pipeline needs visibility into when blocks are flushed,
//! how big they are on the wire and why a batch was poisoned. The `log_metric!`
//! macro emits one key/value line per event on the `chwire::metrics` log
//! target, so applications can route or silence it with their `log` backend.

use std::sync::Once;

use log::LevelFilter;

/// Logs a structured key-value metric string on the `chwire::metrics` target.
///
/// # Example
/// ```
/// use chwire::log_metric;
/// let rows = 4;
/// log_metric!("event"="flush", "table"="events", "rows"=&rows);
/// ```
#[macro_export]
macro_rules! log_metric {
    ($($key:literal = $value:expr),+ $(,)?) => {
        if ::log::log_enabled!(target: "chwire::metrics", ::log::Level::Debug) {
            let mut parts: Vec<String> = Vec::new();
            $(
                parts.push(format!("\"{}\": \"{}\"", $key, $value));
            )+
            ::log::debug!(target: "chwire::metrics", "CHWIRE_METRIC: {{ {} }}", parts.join(", "));
        }
    };
}

static INIT_LOGGER: Once = Once::new();

/// Installs an `env_logger` backend printing chwire diagnostics to stderr.
///
/// Intended for examples and debugging sessions; libraries embedding chwire
/// should configure their own logger instead. Calling it twice is harmless.
pub fn enable_verbose_logging(level: LevelFilter) {
    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.is_test(false);
        builder.filter_level(level);
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args())
        });
        // Another logger may already be installed by the host application.
        let _ = builder.try_init();
    });
}
