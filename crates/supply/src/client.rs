use reqwest::{header, Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use url::Url;

/// Client for the supply-system REST API.
///
/// The supply feed is a lower-priority sink; callers treat every failure
/// here as non-fatal.
#[derive(Debug, Clone)]
pub struct SupplyClient {
    http: Client,
    base_url: Url,
    api_token: String,
}

impl SupplyClient {
    pub fn new(api_token: impl Into<String>, base_url: Url, http: Client) -> Self {
        Self {
            http,
            base_url,
            api_token: api_token.into(),
        }
    }

    /// Looks up a supply location by its short code. Returns `None` when no
    /// location carries the code.
    pub async fn find_location_by_code(
        &self,
        code: &str,
    ) -> Result<Option<SupplyLocation>, SupplyError> {
        let mut url = self.base_url.join("api/locations/")?;
        url.query_pairs_mut().append_pair("code", code);

        let response = self.authorized_request(Method::GET, url).send().await?;
        let page = parse_json::<ResultPage<SupplyLocation>>(response).await?;
        Ok(page.results.into_iter().next())
    }

    /// Looks up a product by name within a location.
    pub async fn find_product_by_name(
        &self,
        location_id: i64,
        name: &str,
    ) -> Result<Option<SupplyProduct>, SupplyError> {
        let mut url = self.base_url.join("api/products/")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("location_id", &location_id.to_string());
            query.append_pair("name", name);
        }

        let response = self.authorized_request(Method::GET, url).send().await?;
        let page = parse_json::<ResultPage<SupplyProduct>>(response).await?;
        Ok(page.results.into_iter().next())
    }

    /// Creates a supply order and returns its id.
    pub async fn create_order(&self, request: &NewSupplyOrder<'_>) -> Result<i64, SupplyError> {
        let url = self.base_url.join("api/orders/")?;
        let items: Vec<_> = request
            .items
            .iter()
            .map(|item| json!({ "product": item.product, "quantity": item.quantity }))
            .collect();
        let body = json!({
            "location": request.location,
            "external_ref": request.external_ref,
            "notes": request.notes,
            "items": items,
        });

        let response = self
            .authorized_request(Method::POST, url)
            .json(&body)
            .send()
            .await?;
        let created = parse_json::<CreatedOrder>(response).await?;
        Ok(created.id)
    }

    fn authorized_request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Token {}", self.api_token))
    }
}

/// Parameters for creating a supply order.
pub struct NewSupplyOrder<'a> {
    pub location: i64,
    pub external_ref: &'a str,
    pub notes: String,
    pub items: Vec<SupplyOrderItem>,
}

/// One product line on a supply order.
pub struct SupplyOrderItem {
    pub product: i64,
    pub quantity: u32,
}

/// A supply location record.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct SupplyLocation {
    pub id: i64,
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A supply product record.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct SupplyProduct {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ResultPage<T> {
    #[serde(default)]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct CreatedOrder {
    id: i64,
}

/// Errors produced by the supply client.
#[derive(Debug, Error)]
pub enum SupplyError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

async fn parse_json<T>(response: Response) -> Result<T, SupplyError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(SupplyError::Status { status, body });
    }

    Ok(response.json().await?)
}
