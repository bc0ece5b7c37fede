//! Tracing setup for binaries embedding the cache layer

use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber
///
/// `RUST_LOG` wins when set; otherwise `default_level` (usually `LOG_LEVEL`)
/// is used. Calling this more than once is harmless: later calls leave the
/// first subscriber in place and return `false`.
pub fn init_tracing(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected_quietly() {
        let _ = init_tracing("debug");
        assert!(!init_tracing("info"));
    }
}
