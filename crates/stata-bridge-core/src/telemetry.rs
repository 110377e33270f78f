//! Log output for the CLI and for programs embedding the library.

use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the process-wide subscriber, writing to stderr.
///
/// `level` is the floor when `RUST_LOG` is unset or unparsable; valid
/// `RUST_LOG` directives take precedence. With `json` each event is one JSON
/// object per line. Only the first call installs anything.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    let output = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let output = if json {
        output.json().boxed()
    } else {
        output.boxed()
    };
    if tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .is_err()
    {
        tracing::debug!("subscriber already installed; keeping it");
    }
}
