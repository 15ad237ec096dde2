use metrics::counter;
use reqwest::Client;
use serde_json::json;
use tracing::warn;
use url::Url;

use seat_bridge_core::OrderDetail;

/// Pushes injection outcomes to an operator-configured endpoint.
///
/// A missing URL disables notifications entirely. Failures are swallowed
/// and counted so a broken sink can never fail the webhook response.
#[derive(Clone)]
pub struct Notifier {
    http: Client,
    url: Option<Url>,
}

/// Summary posted after an injection attempt.
///
/// `event_id` is absent when processing fell over before the payload was
/// parsed, such as a panic inside the dispatch task.
pub struct InjectionSummary<'a> {
    pub delivery_id: &'a str,
    pub event_id: Option<i64>,
    pub outcome: &'static str,
    pub reason: Option<&'a str>,
    pub order: Option<&'a OrderDetail>,
}

impl Notifier {
    pub fn new(url: Option<Url>, http: Client) -> Self {
        Self { http, url }
    }

    pub async fn send(&self, summary: &InjectionSummary<'_>) {
        let Some(url) = &self.url else {
            return;
        };

        let body = json!({
            "delivery_id": summary.delivery_id,
            "event_id": summary.event_id,
            "outcome": summary.outcome,
            "reason": summary.reason,
            "order": summary.order,
        });

        match self.http.post(url.clone()).json(&body).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                counter!("notification_failures_total").increment(1);
                warn!(
                    stage = "notify",
                    delivery_id = summary.delivery_id,
                    status = %response.status(),
                    "notification endpoint rejected the summary"
                );
            }
            Err(err) => {
                counter!("notification_failures_total").increment(1);
                warn!(
                    stage = "notify",
                    delivery_id = summary.delivery_id,
                    error = %err,
                    "failed to deliver notification"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use rust_decimal::Decimal;

    fn order_detail() -> OrderDetail {
        OrderDetail {
            order_id: Some(991),
            subtotal: Decimal::new(2500, 2),
            discount: Decimal::new(500, 2),
            total: Decimal::new(2000, 2),
            payment_type: String::from("Tripleseat"),
        }
    }

    #[tokio::test]
    async fn posts_summary_with_order_detail() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/hooks/orders").json_body_partial(
                    r#"{
                        "delivery_id": "d-1",
                        "event_id": 4411,
                        "outcome": "success",
                        "order": { "order_id": 991, "subtotal": "25.00", "total": "20.00" }
                    }"#,
                );
                then.status(204);
            })
            .await;

        let url = Url::parse(&server.url("/hooks/orders")).expect("url");
        let notifier = Notifier::new(Some(url), Client::new());
        let detail = order_detail();
        notifier
            .send(&InjectionSummary {
                delivery_id: "d-1",
                event_id: Some(4411),
                outcome: "success",
                reason: None,
                order: Some(&detail),
            })
            .await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn disabled_without_url() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(204);
            })
            .await;

        let notifier = Notifier::new(None, Client::new());
        notifier
            .send(&InjectionSummary {
                delivery_id: "d-2",
                event_id: Some(1),
                outcome: "failure",
                reason: Some("ORDER_CREATE_FAILED"),
                order: None,
            })
            .await;

        assert_eq!(mock.hits_async().await, 0);
    }

    #[tokio::test]
    async fn endpoint_failure_is_swallowed() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/hooks/orders");
                then.status(500).body("downstream exploded");
            })
            .await;

        let url = Url::parse(&server.url("/hooks/orders")).expect("url");
        let notifier = Notifier::new(Some(url), Client::new());
        notifier
            .send(&InjectionSummary {
                delivery_id: "d-3",
                event_id: Some(2),
                outcome: "failure",
                reason: Some("ORDER_CREATE_FAILED"),
                order: None,
            })
            .await;

        mock.assert_async().await;
    }
}
