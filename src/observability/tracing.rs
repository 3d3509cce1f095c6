use tracing::Span;
use tracing_subscriber::EnvFilter;
use crate::types::tick::TickSource;

/// Installs the global subscriber. `RUST_LOG` overrides the default `info`.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = if json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already set: {}", e);
    }
}

pub fn trace_connection_attempt(source: TickSource, attempt: u32) -> Span {
    tracing::info_span!(
        "connection_attempt",
        source = %source,
        attempt,
    )
}

pub fn trace_poll_cycle(cycle: u64, symbols: usize) -> Span {
    tracing::debug_span!(
        "poll_cycle",
        cycle,
        symbols,
    )
}
