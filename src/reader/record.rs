use serde_json::Value;

/// One record from a source file, in canonical decoded form.
///
/// Every format decoder produces the same shape: a JSON object per record.
/// A record that cannot be decoded becomes a `Malformed` marker so the
/// caller can count it without stopping the stream.
#[derive(Debug, Clone)]
pub enum RawRecord {
    Parsed {
        /// Zero-based position in the source file
        index: u64,
        body: Value,
    },
    Malformed {
        index: u64,
        error: String,
    },
}

impl RawRecord {
    pub fn index(&self) -> u64 {
        match self {
            RawRecord::Parsed { index, .. } | RawRecord::Malformed { index, .. } => *index,
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            RawRecord::Parsed { body, .. } => Some(body),
            RawRecord::Malformed { .. } => None,
        }
    }
}

/// Coerce a canonical field to an integer.
///
/// JSON sources carry real numbers; CSV sources carry numeric strings.
/// Both arrive here, so both are accepted.
pub fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Coerce a canonical field to a float, with the same string tolerance
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
