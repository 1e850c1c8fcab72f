use tracing::Level;

/// Installs the default tracing subscriber for hosts that do not bring their
/// own. Call once at startup.
pub fn init_logging() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}
