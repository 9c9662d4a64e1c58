use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber for standalone binaries.
///
/// Filter defaults to `info` for the crate's own events and can be
/// overridden with `RUST_LOG`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("catalogd=info,warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
