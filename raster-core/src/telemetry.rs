//! Tracing bootstrap for binaries and integration harnesses.

/// Install a fmt subscriber honoring `RUST_LOG`, falling back to
/// `default_filter`. Returns `false` if a global subscriber already exists.
#[cfg(feature = "tracing-basic")]
pub fn init_tracing(default_filter: &str) -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// No-op when the `tracing-basic` feature is disabled.
#[cfg(not(feature = "tracing-basic"))]
pub fn init_tracing(_default_filter: &str) -> bool {
    false
}
