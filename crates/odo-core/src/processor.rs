use crate::sample::Sample;
use chrono::Local;
use serde_json::Value;
use thiserror::Error;

/// Why a serial line was rejected. Always recoverable: the line is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("line is not valid JSON text: {reason}")]
    Malformed { reason: String },

    #[error("field '{field}' is missing")]
    MissingField { field: String },

    #[error("field '{field}' is not a real number: {raw}")]
    NotNumeric { field: String, raw: String },
}

/// Turns one serial payload such as `{"speed": "12.5"}` into a speed sample.
#[derive(Debug, Clone)]
pub struct SampleProcessor {
    field: String,
}

impl Default for SampleProcessor {
    fn default() -> Self {
        Self::new("speed")
    }
}

impl SampleProcessor {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    pub fn process(&self, raw: &[u8]) -> Result<Sample, DecodeError> {
        let text = std::str::from_utf8(raw).map_err(|e| DecodeError::Malformed {
            reason: e.to_string(),
        })?;
        let value: Value = serde_json::from_str(text).map_err(|e| DecodeError::Malformed {
            reason: e.to_string(),
        })?;

        let field = value
            .as_object()
            .and_then(|obj| obj.get(&self.field))
            .ok_or_else(|| DecodeError::MissingField {
                field: self.field.clone(),
            })?;

        let speed = self.parse_number(field)?;
        Ok(Sample::serial(Local::now(), speed))
    }

    fn parse_number(&self, field: &Value) -> Result<f64, DecodeError> {
        let parsed = match field {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(DecodeError::NotNumeric {
                field: self.field.clone(),
                raw: field.to_string(),
            }),
        }
    }
}
