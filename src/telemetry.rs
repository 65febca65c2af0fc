//! Telemetry initialization: tracing subscriber writing to stderr.
//!
//! Stdout is left to command output (tables, JSON) so it can be piped.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive for the given verbosity.
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "dojo_gate=debug"
    } else {
        "dojo_gate=info"
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `--debug` when set.
pub fn init_tracing(debug: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive(debug).into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "dojo_gate=info");
        assert_eq!(default_directive(true), "dojo_gate=debug");
    }
}
