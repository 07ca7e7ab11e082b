use env_logger::Env;
use log::{log, Level};
use serde::Serialize;
use serde_json::json;

pub const LOG_VERSION: u32 = 1;

/// Audit records are JSON lines under the `audit` target so operators can
/// route them separately from plain process logs.
const AUDIT_TARGET: &str = "audit";

pub fn init(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default)).init();
}

/// Identity of this bridge instance, attached once at startup.
#[derive(Debug, Clone, Serialize)]
pub struct LogSource {
    pub instance_public_key: String,
    pub bridge_wallet_address: String,
    pub stellar_network: String,
    pub tfchain_url: String,
}

pub fn log_source(source: &LogSource) {
    log!(
        target: AUDIT_TARGET,
        Level::Info,
        "{}",
        json!({ "version": LOG_VERSION, "source": source })
    );
}

pub fn event(action: &str, category: &str, trace_id: &str, message: &str) {
    emit(Level::Info, "event", action, category, trace_id, message);
}

pub fn alert(action: &str, category: &str, trace_id: &str, message: &str) {
    emit(Level::Warn, "alert", action, category, trace_id, message);
}

pub fn failure(action: &str, category: &str, trace_id: &str, message: &str) {
    emit(Level::Error, "error", action, category, trace_id, message);
}

pub fn metric(action: &str, category: &str, trace_id: &str, value: &str) {
    log!(
        target: AUDIT_TARGET,
        Level::Info,
        "{}",
        json!({
            "version": LOG_VERSION,
            "event_action": action,
            "event_kind": "metric",
            "category": category,
            "trace_id": trace_id,
            "value": value,
        })
    );
}

fn emit(level: Level, kind: &str, action: &str, category: &str, trace_id: &str, message: &str) {
    log!(
        target: AUDIT_TARGET,
        level,
        "{}",
        json!({
            "version": LOG_VERSION,
            "event_action": action,
            "event_kind": kind,
            "category": category,
            "trace_id": trace_id,
            "message": message,
        })
    );
}
