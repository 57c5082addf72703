//! Parameter validation — shape, format, and character-class checks
//!
//! Every violation is collected before failing so the caller sees all
//! problems in one response. Parameters only cross into the rest of the
//! pipeline as one of the typed variants below.

use serde::Serialize;
use serde_json::Value;

use crate::config::ValidationConfig;

/// Characters rejected in free-text fields to block injection into
/// downstream rendering
const FORBIDDEN_CHARS: [char; 3] = ['<', '>', '\0'];

/// One (field, reason) pair from a failed validation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Validated, strongly-typed parameters for each supported operation
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedParams {
    ListWatches,
    GetWatch {
        watch_id: String,
    },
    CreateWatch {
        url: String,
        tag: Option<String>,
        paused: Option<bool>,
    },
    DeleteWatch {
        watch_id: String,
    },
    TriggerCheck {
        watch_id: String,
    },
    GetHistory {
        watch_id: String,
        limit: Option<u64>,
    },
    SystemInfo,
}

impl ValidatedParams {
    pub fn operation(&self) -> &'static str {
        match self {
            ValidatedParams::ListWatches => "list_watches",
            ValidatedParams::GetWatch { .. } => "get_watch",
            ValidatedParams::CreateWatch { .. } => "create_watch",
            ValidatedParams::DeleteWatch { .. } => "delete_watch",
            ValidatedParams::TriggerCheck { .. } => "trigger_check",
            ValidatedParams::GetHistory { .. } => "get_history",
            ValidatedParams::SystemInfo => "system_info",
        }
    }
}

/// Validation rules derived from configuration
#[derive(Debug, Clone)]
pub struct Validator {
    max_param_len: usize,
}

impl Validator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            max_param_len: config.max_param_len,
        }
    }

    /// Check an operation's raw parameter map, collecting every violation
    pub fn validate(
        &self,
        operation: &str,
        params: &Value,
    ) -> Result<ValidatedParams, Vec<FieldViolation>> {
        let mut violations = Vec::new();

        let params = match params {
            Value::Object(map) => map.clone(),
            Value::Null => serde_json::Map::new(),
            _ => {
                return Err(vec![FieldViolation::new("params", "must be a JSON object")]);
            }
        };

        let validated = match operation {
            "list_watches" => Some(ValidatedParams::ListWatches),
            "system_info" => Some(ValidatedParams::SystemInfo),
            "get_watch" => self
                .watch_id(&params, &mut violations)
                .map(|watch_id| ValidatedParams::GetWatch { watch_id }),
            "delete_watch" => self
                .watch_id(&params, &mut violations)
                .map(|watch_id| ValidatedParams::DeleteWatch { watch_id }),
            "trigger_check" => self
                .watch_id(&params, &mut violations)
                .map(|watch_id| ValidatedParams::TriggerCheck { watch_id }),
            "get_history" => {
                let watch_id = self.watch_id(&params, &mut violations);
                let limit = optional_integer(&params, "limit", &mut violations);
                watch_id.map(|watch_id| ValidatedParams::GetHistory { watch_id, limit })
            }
            "create_watch" => {
                let url = self.watch_url(&params, &mut violations);
                let tag = self.optional_text(&params, "tag", &mut violations);
                let paused = optional_bool(&params, "paused", &mut violations);
                url.map(|url| ValidatedParams::CreateWatch { url, tag, paused })
            }
            other => {
                return Err(vec![FieldViolation::new(
                    "operation",
                    format!("unknown operation: {other}"),
                )]);
            }
        };

        match validated {
            Some(v) if violations.is_empty() => Ok(v),
            _ => Err(violations),
        }
    }

    /// Required `watch_id` field: a hyphenated UUID
    fn watch_id(
        &self,
        params: &serde_json::Map<String, Value>,
        violations: &mut Vec<FieldViolation>,
    ) -> Option<String> {
        let raw = required_string(params, "watch_id", violations)?;
        if is_uuid_shaped(&raw) {
            Some(raw)
        } else {
            violations.push(FieldViolation::new(
                "watch_id",
                "must be a hyphenated UUID",
            ));
            None
        }
    }

    /// Required `url` field: absolute http(s) URL within the length limit
    fn watch_url(
        &self,
        params: &serde_json::Map<String, Value>,
        violations: &mut Vec<FieldViolation>,
    ) -> Option<String> {
        let raw = required_string(params, "url", violations)?;

        if raw.chars().count() > self.max_param_len {
            violations.push(FieldViolation::new(
                "url",
                format!("exceeds maximum length of {} characters", self.max_param_len),
            ));
            return None;
        }

        match url::Url::parse(&raw) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Some(raw),
            Ok(parsed) => {
                violations.push(FieldViolation::new(
                    "url",
                    format!("scheme '{}' is not allowed, use http or https", parsed.scheme()),
                ));
                None
            }
            Err(_) => {
                violations.push(FieldViolation::new("url", "must be an absolute URL"));
                None
            }
        }
    }

    /// Optional free-text field: trimmed, bounded, no markup/control characters
    fn optional_text(
        &self,
        params: &serde_json::Map<String, Value>,
        field: &str,
        violations: &mut Vec<FieldViolation>,
    ) -> Option<String> {
        let value = params.get(field)?;
        let raw = match value.as_str() {
            Some(s) => s.trim().to_string(),
            None => {
                violations.push(FieldViolation::new(field, "must be a string"));
                return None;
            }
        };
        if raw.is_empty() {
            return None;
        }
        if raw.chars().count() > self.max_param_len {
            violations.push(FieldViolation::new(
                field,
                format!("exceeds maximum length of {} characters", self.max_param_len),
            ));
            return None;
        }
        if raw.chars().any(|c| FORBIDDEN_CHARS.contains(&c)) {
            violations.push(FieldViolation::new(
                field,
                "contains forbidden characters (<, > or NUL)",
            ));
            return None;
        }
        Some(raw)
    }
}

/// Required string field, non-empty after trimming
fn required_string(
    params: &serde_json::Map<String, Value>,
    field: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<String> {
    match params.get(field) {
        None | Some(Value::Null) => {
            violations.push(FieldViolation::new(field, "is required"));
            None
        }
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                violations.push(FieldViolation::new(field, "must not be empty"));
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(_) => {
            violations.push(FieldViolation::new(field, "must be a string"));
            None
        }
    }
}

/// Optional boolean: native bool or the unambiguous strings "true"/"false"
fn optional_bool(
    params: &serde_json::Map<String, Value>,
    field: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<bool> {
    match params.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => {
                violations.push(FieldViolation::new(field, "must be a boolean"));
                None
            }
        },
        Some(_) => {
            violations.push(FieldViolation::new(field, "must be a boolean"));
            None
        }
    }
}

/// Optional positive integer: native integer or an unambiguous digit string
fn optional_integer(
    params: &serde_json::Map<String, Value>,
    field: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<u64> {
    let invalid = |violations: &mut Vec<FieldViolation>| {
        violations.push(FieldViolation::new(field, "must be a positive integer"));
        None
    };
    match params.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) if v >= 1 => Some(v),
            _ => invalid(violations),
        },
        Some(Value::String(s)) => match s.trim().parse::<u64>() {
            Ok(v) if v >= 1 => Some(v),
            _ => invalid(violations),
        },
        Some(_) => invalid(violations),
    }
}

/// Fixed-shape hyphenated UUID check: 8-4-4-4-12 lowercase/uppercase hex
fn is_uuid_shaped(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }
    s.char_indices().all(|(i, c)| match i {
        8 | 13 | 18 | 23 => c == '-',
        _ => c.is_ascii_hexdigit(),
    })
}
