use std::time::Instant;

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use metrics::{counter, histogram};
use tracing::{error, info, warn};
use uuid::Uuid;

use seat_bridge_core::{timegate, Ack, DeliveryEnvelope, DeliveryKey};
use seat_bridge_tripleseat::TripleseatError;

use crate::injector::{self, InjectionContext};
use crate::notify::InjectionSummary;
use crate::router::AppState;
use crate::signature::{self, SIGNATURE_HEADER};

/// Webhook entry point. Always answers 200 with an [`Ack`] body: the
/// platform treats any non-2xx as a delivery failure and retries, so
/// outcome and reason are carried in the body instead of the status line.
pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Json<Ack> {
    let started = Instant::now();
    let fallback_id = Uuid::new_v4().to_string();
    let notifier = state.notifier().clone();

    let ack = match tokio::spawn(process(state, headers, body, fallback_id.clone())).await {
        Ok(ack) => ack,
        Err(err) => {
            error!(
                stage = "ingress",
                delivery_id = fallback_id.as_str(),
                error = %err,
                "webhook processing panicked"
            );
            notifier
                .send(&InjectionSummary {
                    delivery_id: &fallback_id,
                    event_id: None,
                    outcome: "failure",
                    reason: Some("UNEXPECTED_ERROR"),
                    order: None,
                })
                .await;
            Ack::rejected(fallback_id, None, "UNEXPECTED_ERROR")
        }
    };

    let outcome = if ack.processed {
        "processed"
    } else if ack.ok {
        "skipped"
    } else {
        "failed"
    };
    histogram!("webhook_ack_latency_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());

    Json(ack)
}

async fn process(state: AppState, headers: HeaderMap, body: Bytes, fallback_id: String) -> Ack {
    let settings = state.settings();

    if settings.skip_signature_verification {
        warn!(
            stage = "ingress",
            delivery_id = fallback_id.as_str(),
            "signature verification is disabled"
        );
    } else {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        let secret = settings.webhook_secret.as_deref().map(str::as_bytes);
        if let Err(failure) = signature::verify(secret, header, &body) {
            counter!("webhook_invalid_signature_total").increment(1);
            warn!(
                stage = "ingress",
                delivery_id = fallback_id.as_str(),
                reason = failure.reason(),
                "rejected delivery signature"
            );
            return Ack::skipped(
                fallback_id,
                None,
                format!("SIGNATURE_VERIFICATION_FAILED_{}", failure.reason()),
            );
        }
    }

    let envelope = match DeliveryEnvelope::parse(&body) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(
                stage = "ingress",
                delivery_id = fallback_id.as_str(),
                error = %err,
                "unparseable delivery payload"
            );
            return Ack::skipped(fallback_id, None, "INVALID_JSON_PAYLOAD");
        }
    };
    let delivery_id = envelope.delivery_id().unwrap_or(fallback_id);

    let Some(trigger) = envelope.trigger() else {
        info!(
            stage = "ingress",
            delivery_id = delivery_id.as_str(),
            "payload carries no trigger type"
        );
        return Ack::skipped(delivery_id, None, "MISSING_TRIGGER_TYPE");
    };
    counter!("webhook_ingress_total", "trigger" => trigger.metric_label()).increment(1);

    if !trigger.is_actionable() {
        info!(
            stage = "ingress",
            delivery_id = delivery_id.as_str(),
            trigger = %trigger,
            "trigger does not lead to injection"
        );
        return Ack::skipped(delivery_id, Some(&trigger), "TRIGGER_TYPE_NOT_ACTIONABLE");
    }

    let Some(event_id) = envelope.event_id() else {
        info!(
            stage = "ingress",
            delivery_id = delivery_id.as_str(),
            trigger = %trigger,
            "payload carries no event id"
        );
        return Ack::skipped(delivery_id, Some(&trigger), "NO_EVENT_DATA");
    };

    let key = DeliveryKey::new(trigger.clone(), event_id, envelope.updated_at());
    if state.idempotency().contains(&key) {
        info!(
            stage = "ingress",
            delivery_id = delivery_id.as_str(),
            event_id,
            "delivery already handled"
        );
        return Ack::skipped(delivery_id, Some(&trigger), "DUPLICATE_DELIVERY");
    }

    // Validation asks the platform for the event so the decision rests on
    // current data, not on whatever the delivery happened to carry.
    let validated = if settings.skip_event_validation {
        None
    } else {
        match state.tripleseat().fetch_event(event_id).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                state.idempotency().register(&key);
                info!(
                    stage = "ingress",
                    delivery_id = delivery_id.as_str(),
                    event_id,
                    "event not found upstream"
                );
                return Ack::skipped(delivery_id, Some(&trigger), "EVENT_NOT_FOUND");
            }
            Err(TripleseatError::AuthorizationDenied { status }) => {
                state.idempotency().register(&key);
                warn!(
                    stage = "ingress",
                    delivery_id = delivery_id.as_str(),
                    event_id,
                    status = status.as_u16(),
                    "events platform denied access to the event"
                );
                return Ack::skipped(
                    delivery_id,
                    Some(&trigger),
                    "TRIPLESEAT_AUTHORIZATION_DENIED",
                );
            }
            Err(err) => {
                warn!(
                    stage = "ingress",
                    delivery_id = delivery_id.as_str(),
                    event_id,
                    error = %err,
                    "event validation fetch failed"
                );
                return Ack::rejected(delivery_id, Some(&trigger), "EVENT_FETCH_FAILED");
            }
        }
    };

    let site_id = validated
        .as_ref()
        .and_then(|record| record.location_id)
        .or_else(|| envelope.site_id());
    let Some(site_id) = site_id else {
        info!(
            stage = "ingress",
            delivery_id = delivery_id.as_str(),
            event_id,
            "neither event nor payload names a site"
        );
        return Ack::skipped(delivery_id, Some(&trigger), "MISSING_SITE_ID");
    };

    if !settings.location_allowed(site_id) {
        info!(
            stage = "ingress",
            delivery_id = delivery_id.as_str(),
            event_id,
            site_id,
            "site is not on the allowlist"
        );
        return Ack::skipped(delivery_id, Some(&trigger), "LOCATION_NOT_ALLOWED");
    }

    if let Some(record) = &validated {
        if !record.is_definite() {
            state.idempotency().register(&key);
            info!(
                stage = "ingress",
                delivery_id = delivery_id.as_str(),
                event_id,
                status = record.status.as_deref().unwrap_or("unknown"),
                "event has not reached a definite status"
            );
            return Ack::skipped(delivery_id, Some(&trigger), "EVENT_NOT_DEFINITE");
        }
    }

    let mapping = match state
        .storage()
        .venue_mappings()
        .fetch_by_site(site_id)
        .await
    {
        Ok(mapping) => mapping,
        Err(err) => {
            error!(
                stage = "ingress",
                delivery_id = delivery_id.as_str(),
                site_id,
                error = %err,
                "venue mapping lookup failed"
            );
            state
                .notifier()
                .send(&InjectionSummary {
                    delivery_id: &delivery_id,
                    event_id: Some(event_id),
                    outcome: "failure",
                    reason: Some("UNEXPECTED_ERROR"),
                    order: None,
                })
                .await;
            return Ack::rejected(delivery_id, Some(&trigger), "UNEXPECTED_ERROR");
        }
    };

    let event_date = validated
        .as_ref()
        .and_then(|record| record.event_date.clone())
        .or_else(|| envelope.event_date());
    let timezone = mapping.as_ref().map(|found| found.timezone.as_str());
    let decision = timegate::evaluate(event_date.as_deref(), timezone, state.now());
    if !decision.is_proceed() {
        // Gate skips register: the platform redelivers the same payload
        // unchanged, and an edited event arrives under a fresh updated_at.
        state.idempotency().register(&key);
        info!(
            stage = "gate",
            delivery_id = delivery_id.as_str(),
            event_id,
            decision = decision.reason(),
            "gate held the delivery back"
        );
        return Ack::skipped(delivery_id, Some(&trigger), decision.reason());
    }

    let ctx = InjectionContext {
        delivery_id: &delivery_id,
        event_id,
        site_id,
        mapping: mapping.as_ref(),
    };
    let result = injector::inject(&state, &ctx).await;

    let label = if result.success {
        if result.detail.is_some() {
            if result.reason.as_deref() == Some("DRY_RUN") {
                "dry_run"
            } else {
                "created"
            }
        } else {
            "skipped"
        }
    } else {
        "failed"
    };
    counter!("injection_total", "result" => label).increment(1);

    if result.success {
        state.idempotency().register(&key);
        match result.detail {
            Some(detail) => {
                state
                    .notifier()
                    .send(&InjectionSummary {
                        delivery_id: &delivery_id,
                        event_id: Some(event_id),
                        outcome: "success",
                        reason: result.reason.as_deref(),
                        order: Some(&detail),
                    })
                    .await;
                Ack::completed(delivery_id, &trigger, result.reason, Some(detail))
            }
            None => {
                let reason = result.reason.unwrap_or_else(|| String::from("SKIPPED"));
                info!(
                    stage = "ingress",
                    delivery_id = delivery_id.as_str(),
                    event_id,
                    reason = reason.as_str(),
                    "injection skipped"
                );
                Ack::skipped(delivery_id, Some(&trigger), reason)
            }
        }
    } else {
        let reason = result
            .reason
            .unwrap_or_else(|| String::from("UNEXPECTED_ERROR"));
        state
            .notifier()
            .send(&InjectionSummary {
                delivery_id: &delivery_id,
                event_id: Some(event_id),
                outcome: "failure",
                reason: Some(&reason),
                order: None,
            })
            .await;
        error!(
            stage = "ingress",
            delivery_id = delivery_id.as_str(),
            event_id,
            reason = reason.as_str(),
            "injection failed"
        );
        Ack::rejected(delivery_id, Some(&trigger), reason)
    }
}
