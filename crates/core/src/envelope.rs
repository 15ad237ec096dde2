use serde_json::Value;
use thiserror::Error;

use crate::types::TriggerType;

/// Errors raised while reading a webhook payload.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("failed to parse webhook payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Parsed view over one webhook delivery payload.
///
/// The platform varies field names across trigger types, so every accessor
/// is a best-effort chain over the known spellings. Absent and malformed
/// fields both surface as `None`; the dispatcher decides what is fatal.
#[derive(Debug, Clone)]
pub struct DeliveryEnvelope {
    payload: Value,
}

impl DeliveryEnvelope {
    pub fn parse(raw: &[u8]) -> Result<Self, EnvelopeError> {
        let payload = serde_json::from_slice(raw)?;
        Ok(Self { payload })
    }

    pub fn from_value(payload: Value) -> Self {
        Self { payload }
    }

    /// Delivery id supplied by the platform, when present.
    pub fn delivery_id(&self) -> Option<String> {
        self.payload.get("delivery_id").and_then(as_string)
    }

    pub fn trigger(&self) -> Option<TriggerType> {
        lookup(&self.payload, &["trigger_type"])
            .or_else(|| lookup(&self.payload, &["trigger"]))
            .and_then(as_string)
            .map(|value| TriggerType::parse(&value))
    }

    pub fn event_id(&self) -> Option<i64> {
        lookup(&self.payload, &["event_id"])
            .or_else(|| lookup(&self.payload, &["event", "id"]))
            .or_else(|| lookup(&self.payload, &["booking", "event_id"]))
            .and_then(as_i64)
    }

    pub fn site_id(&self) -> Option<i64> {
        lookup(&self.payload, &["location_id"])
            .or_else(|| lookup(&self.payload, &["site_id"]))
            .or_else(|| lookup(&self.payload, &["event", "location_id"]))
            .and_then(as_i64)
    }

    /// Last-updated marker used in the idempotency key. Absent values
    /// collapse to `"0"` so the key is always well formed.
    pub fn updated_at(&self) -> String {
        lookup(&self.payload, &["updated_at"])
            .or_else(|| lookup(&self.payload, &["event", "updated_at"]))
            .and_then(as_string)
            .unwrap_or_else(|| "0".to_string())
    }

    /// Event date carried inline with the delivery, when present. Feeds the
    /// gate when authoritative validation is skipped.
    pub fn event_date(&self) -> Option<String> {
        lookup(&self.payload, &["event_date"])
            .or_else(|| lookup(&self.payload, &["event", "event_date"]))
            .and_then(as_string)
    }
}

fn lookup<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = payload;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
