use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `directive` is an `EnvFilter`
/// directive such as `info` or `pruner=debug`; `RUST_LOG` wins when set.
pub fn init_logging(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .try_init();
}
