use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Classification of an inbound webhook delivery.
///
/// Only a fixed subset of triggers leads to order injection; everything else
/// is acknowledged and dropped. Unrecognized values are preserved verbatim so
/// acknowledgments and logs show what the platform actually sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TriggerType {
    CreateEvent,
    UpdateEvent,
    StatusChangeEvent,
    CreateBooking,
    UpdateBooking,
    DeleteEvent,
    Unknown(String),
}

impl TriggerType {
    /// Parses a trigger value from a webhook payload.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "CREATE_EVENT" => Self::CreateEvent,
            "UPDATE_EVENT" => Self::UpdateEvent,
            "STATUS_CHANGE_EVENT" => Self::StatusChangeEvent,
            "CREATE_BOOKING" => Self::CreateBooking,
            "UPDATE_BOOKING" => Self::UpdateBooking,
            "DELETE_EVENT" => Self::DeleteEvent,
            _ => Self::Unknown(value.trim().to_string()),
        }
    }

    /// Returns the canonical trigger string used in acknowledgments.
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateEvent => "CREATE_EVENT",
            Self::UpdateEvent => "UPDATE_EVENT",
            Self::StatusChangeEvent => "STATUS_CHANGE_EVENT",
            Self::CreateBooking => "CREATE_BOOKING",
            Self::UpdateBooking => "UPDATE_BOOKING",
            Self::DeleteEvent => "DELETE_EVENT",
            Self::Unknown(value) => value,
        }
    }

    /// Returns the label used for metrics, bounded to the known set.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::CreateEvent => "CREATE_EVENT",
            Self::UpdateEvent => "UPDATE_EVENT",
            Self::StatusChangeEvent => "STATUS_CHANGE_EVENT",
            Self::CreateBooking => "CREATE_BOOKING",
            Self::UpdateBooking => "UPDATE_BOOKING",
            Self::DeleteEvent => "DELETE_EVENT",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Returns `true` when the trigger may lead to order injection.
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            Self::CreateEvent | Self::UpdateEvent | Self::StatusChangeEvent
        )
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Acknowledgment body returned for every webhook delivery.
///
/// The HTTP status is always 200; outcome is encoded here so the platform
/// never sees a 5xx and starts a redelivery storm. `ok=false` is reserved
/// for outcomes an operator should investigate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    pub processed: bool,
    pub reason: Option<String>,
    pub trigger: Option<String>,
    pub delivery_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderDetail>,
}

impl Ack {
    /// Benign skip: acknowledged, nothing processed, nothing to investigate.
    pub fn skipped(
        delivery_id: impl Into<String>,
        trigger: Option<&TriggerType>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            ok: true,
            processed: false,
            reason: Some(reason.into()),
            trigger: trigger.map(|value| value.as_str().to_string()),
            delivery_id: delivery_id.into(),
            order: None,
        }
    }

    /// Failure outcome the operator should look at.
    pub fn rejected(
        delivery_id: impl Into<String>,
        trigger: Option<&TriggerType>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            ok: false,
            processed: false,
            reason: Some(reason.into()),
            trigger: trigger.map(|value| value.as_str().to_string()),
            delivery_id: delivery_id.into(),
            order: None,
        }
    }

    /// Delivery fully processed, optionally with the injected order summary.
    pub fn completed(
        delivery_id: impl Into<String>,
        trigger: &TriggerType,
        reason: Option<String>,
        order: Option<OrderDetail>,
    ) -> Self {
        Self {
            ok: true,
            processed: true,
            reason,
            trigger: Some(trigger.as_str().to_string()),
            delivery_id: delivery_id.into(),
            order,
        }
    }
}

/// Financial summary of an injected POS order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    /// POS order id. Absent in dry-run mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub payment_type: String,
}

/// Outcome of one injection attempt.
///
/// Exactly one of `detail` or `reason` carries the story when `success` is
/// false; `success=true` with no detail means "acknowledged, nothing to do".
#[derive(Debug, Clone, PartialEq)]
pub struct InjectionResult {
    pub success: bool,
    pub detail: Option<OrderDetail>,
    pub reason: Option<String>,
}

impl InjectionResult {
    /// An order was written to the POS.
    pub fn created(detail: OrderDetail) -> Self {
        Self {
            success: true,
            detail: Some(detail),
            reason: None,
        }
    }

    /// Full pipeline ran without POS writes; detail mirrors a real run.
    pub fn dry_run(detail: OrderDetail) -> Self {
        Self {
            success: true,
            detail: Some(detail),
            reason: Some("DRY_RUN".to_string()),
        }
    }

    /// Nothing to do; acknowledged as success with a descriptive reason.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: None,
            reason: Some(reason.into()),
        }
    }

    /// Injection failed before or at the POS-write boundary.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: None,
            reason: Some(reason.into()),
        }
    }
}
