use tracing::Level;

/// Parse a configured log level. Unknown values fall back to `info`.
pub fn parse_level(text: &str) -> Level {
    match text.trim() {
        t if t.eq_ignore_ascii_case("warning") => Level::WARN,
        t => t.parse().unwrap_or(Level::INFO),
    }
}

/// Install the fmt subscriber at `default_level`.
///
/// Receive pumps run on tokio worker threads, so thread names are included.
pub fn init(default_level: &str) {
    // try_init: tests and embedding hosts may already have a subscriber installed
    let _ = tracing_subscriber::fmt()
        .with_max_level(parse_level(default_level))
        .with_target(false)
        .with_thread_names(true)
        .try_init();
}
