use tracing_subscriber::EnvFilter;

/// Env var selecting the log line format; `json` switches to structured output.
pub const LOG_FORMAT_ENV: &str = "MULESIEVE_LOG_FORMAT";

/// Install the global subscriber. Level comes from `RUST_LOG`, default `info`.
/// Logs go to stderr so stdout stays free for tool output.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    // a second init (tests, embedding) keeps the first subscriber
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
