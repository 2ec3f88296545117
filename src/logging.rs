use tracing::Level;

/// Map the `-v` count to a level: info by default, then debug, then trace.
pub fn level(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the stderr log subscriber. Records inside a rank span carry the rank.
/// Calls after the first are no-ops.
pub fn init(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level(verbosity))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
