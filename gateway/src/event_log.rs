//! Structured invocation events — one log record per completed invocation
//!
//! Sensitive parameter fields are replaced with a placeholder before the
//! event is emitted. Matching is case-insensitive and applies at any
//! nesting depth.

use serde_json::Value;
use tracing::info;

use crate::config::LoggingConfig;
use crate::dispatch::InvocationRecord;

const REDACTED: &str = "[redacted]";

/// Emits one structured event per invocation with sensitive fields masked
pub struct EventLog {
    redact_fields: Vec<String>,
}

impl EventLog {
    pub fn new(config: &LoggingConfig) -> Self {
        Self {
            redact_fields: config
                .redact_fields
                .iter()
                .map(|f| f.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Emit the event for a terminal invocation state
    pub fn emit(&self, record: &InvocationRecord) {
        let params = self.redact(&record.params);
        info!(
            request_id = %record.request_id,
            operation = %record.operation,
            caller = %record.caller,
            outcome = record.outcome.as_str(),
            duration_ms = record.duration_ms,
            started_at = %record.started_at.to_rfc3339(),
            params = %params,
            "invocation finished"
        );
    }

    /// Copy of `value` with every configured field masked, at any depth
    pub fn redact(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, inner)| {
                        if self.is_sensitive(key) {
                            (key.clone(), Value::String(REDACTED.to_string()))
                        } else {
                            (key.clone(), self.redact(inner))
                        }
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact(v)).collect()),
            other => other.clone(),
        }
    }

    fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        self.redact_fields.iter().any(|f| *f == key)
    }
}
