use reqwest::{Client, Method, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use url::Url;

/// Client for the Tripleseat events API.
///
/// Token acquisition and refresh live outside this crate; the client is
/// handed a ready-to-use bearer token through configuration.
#[derive(Clone)]
pub struct TripleseatClient {
    http: Client,
    base_url: Url,
    api_token: String,
}

impl TripleseatClient {
    /// Creates a new client with the provided configuration.
    pub fn new(api_token: impl Into<String>, base_url: Url, http: Client) -> Self {
        Self {
            http,
            base_url,
            api_token: api_token.into(),
        }
    }

    /// Fetches the full event record for the provided id.
    ///
    /// Returns `Ok(None)` when the platform reports the event gone. A 401 or
    /// 403 surfaces as [`TripleseatError::AuthorizationDenied`] so the caller
    /// can treat out-of-scope events as a benign outcome.
    pub async fn fetch_event(&self, event_id: i64) -> Result<Option<EventRecord>, TripleseatError> {
        let url = self.base_url.join(&format!("events/{event_id}.json"))?;
        let response = self.authorized_request(Method::GET, url).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TripleseatError::AuthorizationDenied { status });
        }

        let envelope = parse_json::<EventEnvelope>(response).await?;
        Ok(Some(envelope.event))
    }

    /// Fetches the rendered HTML invoice used as a fallback item source.
    ///
    /// The invoice link on an event may be absolute or relative to the API
    /// base; both forms are accepted.
    pub async fn fetch_invoice_html(&self, invoice_url: &str) -> Result<String, TripleseatError> {
        let url = match Url::parse(invoice_url) {
            Ok(absolute) => absolute,
            Err(_) => self.base_url.join(invoice_url)?,
        };
        let response = self.authorized_request(Method::GET, url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = read_body(response).await;
            return Err(TripleseatError::Status { status, body });
        }
        Ok(response.text().await?)
    }

    fn authorized_request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.api_token))
    }
}

/// An event as returned by `events/{id}.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    #[serde(default)]
    pub location_id: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub event_date: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub guest_count: Option<u32>,
    #[serde(default)]
    pub line_items: Vec<EventLineItem>,
    #[serde(default)]
    pub menu_items: Vec<EventLineItem>,
    #[serde(default)]
    pub invoice: Option<InvoiceSummary>,
}

impl EventRecord {
    /// Returns `true` when the event has reached a confirmed status.
    pub fn is_definite(&self) -> bool {
        self.status
            .as_deref()
            .map(|status| {
                let status = status.trim().to_uppercase();
                status == "DEFINITE" || status == "CONFIRMED"
            })
            .unwrap_or(false)
    }
}

/// A structured line item on an event. Quantity defaults to one when the
/// platform omits it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventLineItem {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub price: Option<Decimal>,
}

fn default_quantity() -> u32 {
    1
}

/// Invoice totals attached to an event. The totals are authoritative when
/// present; `html_url` points at the rendered invoice fallback.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InvoiceSummary {
    #[serde(default)]
    pub subtotal: Option<Decimal>,
    #[serde(default)]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    event: EventRecord,
}

/// Errors produced by the Tripleseat client.
#[derive(Debug, Error)]
pub enum TripleseatError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authorization denied by the events platform ({status})")]
    AuthorizationDenied { status: StatusCode },
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

async fn read_body(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<unavailable>"))
}

async fn parse_json<T>(response: Response) -> Result<T, TripleseatError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = read_body(response).await;
        return Err(TripleseatError::Status { status, body });
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(base_url: &Url) -> TripleseatClient {
        TripleseatClient::new(
            "ts-token",
            base_url.clone(),
            Client::builder().build().expect("client"),
        )
    }

    #[tokio::test]
    async fn fetch_event_unwraps_the_envelope() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/v1/")).expect("url");
        let client = client(&base);

        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/events/4411.json")
                    .header("Authorization", "Bearer ts-token");
                then.status(200).json_body(json!({
                    "event": {
                        "id": 4411,
                        "location_id": 207,
                        "status": "definite",
                        "event_date": "2026-08-22",
                        "name": "Quarterly Offsite",
                        "guest_count": 40,
                        "line_items": [
                            { "name": "Glazed Donut", "quantity": 2, "price": "2.50" },
                            { "name": "Coffee Box" }
                        ],
                        "invoice": {
                            "subtotal": "25.00",
                            "total": 20.0,
                            "html_url": "/invoices/4411"
                        }
                    }
                }));
            })
            .await;

        let event = client
            .fetch_event(4411)
            .await
            .expect("fetch event")
            .expect("event present");
        mock.assert_async().await;

        assert_eq!(event.id, 4411);
        assert_eq!(event.location_id, Some(207));
        assert!(event.is_definite());
        assert_eq!(event.line_items.len(), 2);
        assert_eq!(event.line_items[0].price, Some(Decimal::new(250, 2)));
        assert_eq!(event.line_items[1].quantity, 1);
        let invoice = event.invoice.expect("invoice");
        assert_eq!(invoice.subtotal, Some(Decimal::new(2500, 2)));
        assert_eq!(invoice.total, Some(Decimal::new(20, 0)));
    }

    #[tokio::test]
    async fn missing_event_is_none() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/v1/")).expect("url");
        let client = client(&base);

        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/events/9.json");
                then.status(404).body("not found");
            })
            .await;

        let event = client.fetch_event(9).await.expect("fetch event");
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn authorization_failures_are_distinguished() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/v1/")).expect("url");
        let client = client(&base);

        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/events/9.json");
                then.status(403).body("forbidden");
            })
            .await;

        let err = client.fetch_event(9).await.expect_err("should error");
        assert!(matches!(
            err,
            TripleseatError::AuthorizationDenied {
                status: StatusCode::FORBIDDEN
            }
        ));
    }

    #[tokio::test]
    async fn server_errors_carry_the_body() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/v1/")).expect("url");
        let client = client(&base);

        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/events/9.json");
                then.status(500).body("boom");
            })
            .await;

        let err = client.fetch_event(9).await.expect_err("should error");
        match err {
            TripleseatError::Status { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn invoice_html_accepts_relative_links() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/v1/")).expect("url");
        let client = client(&base);

        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/invoices/4411");
                then.status(200).body("<table></table>");
            })
            .await;

        let html = client
            .fetch_invoice_html("invoices/4411")
            .await
            .expect("fetch invoice");
        mock.assert_async().await;
        assert_eq!(html, "<table></table>");
    }

    #[tokio::test]
    async fn not_confirmed_statuses_are_not_definite() {
        let record: EventRecord = serde_json::from_value(json!({
            "id": 1,
            "status": "TENTATIVE"
        }))
        .expect("decode");
        assert!(!record.is_definite());

        let record: EventRecord = serde_json::from_value(json!({ "id": 2 })).expect("decode");
        assert!(!record.is_definite());
    }
}
