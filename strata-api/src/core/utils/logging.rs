use tracing_subscriber::{
    fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Filter honouring `RUST_LOG` when set, falling back to `log_level` for the strata crates.
pub fn get_log_env(log_level: String) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "strata={log_level},strata_core={log_level},strata_api={log_level}"
        ))
    })
}

/// Installs a global fmt subscriber. Later calls are no-ops, so tests can call this freely.
pub fn init_global_logger(log_level: String) {
    let _ = tracing_subscriber::registry()
        .with(get_log_env(log_level))
        .with(fmt::layer().with_span_events(FmtSpan::CLOSE))
        .try_init();
}

pub fn global_info_logger() {
    init_global_logger("INFO".to_string())
}

pub fn global_debug_logger() {
    init_global_logger("DEBUG".to_string())
}

pub fn global_trace_logger() {
    init_global_logger("TRACE".to_string())
}
