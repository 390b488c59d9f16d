use std::io::Write;
use std::sync::Once;

use log::{Level, LevelFilter};

static INIT_LOGGER: Once = Once::new();

/// Install the process-wide logger. `RUST_LOG` overrides `level`; calls after
/// the first one are ignored.
pub fn init(level: &str) {
    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(level.parse().unwrap_or(LevelFilter::Info));
        if let Ok(spec) = std::env::var("RUST_LOG") {
            builder.parse_filters(&spec);
        }

        builder.format(|buf, record| writeln!(buf, "{}", line(record.level(), record.args())));

        // Another logger may already be installed by the host application.
        let _ = builder.try_init();
    });
}

/// `[LEVEL] message`
fn line(level: Level, message: &std::fmt::Arguments<'_>) -> String {
    format!("[{}] {}", level, message)
}
