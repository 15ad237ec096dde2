use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use url::Url;

/// Client for the Revel POS management API.
///
/// The POS exposes no multi-object transaction, so order creation is a
/// sequence of individual resource writes driven by the caller. Clones share
/// the per-establishment product catalog cache.
#[derive(Clone)]
pub struct RevelClient {
    http: Client,
    base_url: Url,
    api_key: String,
    api_secret: String,
    catalog_cache: Arc<Mutex<HashMap<i64, Arc<Vec<Product>>>>>,
}

impl RevelClient {
    /// Creates a new client with the provided credentials.
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        base_url: Url,
        http: Client,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            catalog_cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Looks up an existing order by its caller-supplied dedup id.
    pub async fn find_order_by_local_id(
        &self,
        establishment: i64,
        local_id: &str,
    ) -> Result<Option<OrderSummary>, RevelError> {
        let mut url = self.base_url.join("resources/Order/")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("local_id", local_id);
            query.append_pair("establishment", &establishment.to_string());
        }

        let response = self.authorized_request(Method::GET, url).send().await?;
        let page = parse_json::<ObjectPage<OrderSummary>>(response).await?;
        Ok(page.objects.into_iter().next())
    }

    /// Creates the order header. The order is created inactive
    /// (`temporary=true`) and stays off the live order view until
    /// [`RevelClient::activate_order`] runs.
    pub async fn create_order(&self, request: &NewOrder<'_>) -> Result<OrderSummary, RevelError> {
        let url = self.base_url.join("resources/Order/")?;
        let body = serde_json::json!({
            "establishment": request.establishment,
            "local_id": request.local_id,
            "created_by": request.created_by,
            "updated_by": request.created_by,
            "dining_option": request.dining_option,
            "notes": request.notes,
            "web_order": true,
            "temporary": true,
            "created_date": to_rfc3339(request.created_at),
            "subtotal": 0,
            "tax": 0,
            "final_total": 0,
        });

        let response = self
            .authorized_request(Method::POST, url)
            .json(&body)
            .send()
            .await?;
        parse_json::<OrderSummary>(response).await
    }

    /// Adds one resolved line item to an existing order.
    pub async fn add_order_item(&self, request: &NewOrderItem) -> Result<(), RevelError> {
        let url = self.base_url.join("resources/OrderItem/")?;
        let body = serde_json::json!({
            "order": request.order,
            "product": request.product,
            "quantity": request.quantity,
            "price": request.price,
        });

        let response = self
            .authorized_request(Method::POST, url)
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await
    }

    /// Applies the pre-configured platform discount to an order.
    pub async fn apply_discount(&self, request: &NewOrderDiscount) -> Result<(), RevelError> {
        let url = self.base_url.join("resources/OrderDiscount/")?;
        let body = serde_json::json!({
            "order": request.order,
            "discount": request.discount,
            "amount": request.amount,
        });

        let response = self
            .authorized_request(Method::POST, url)
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await
    }

    /// Records the pre-configured platform payment type against an order.
    pub async fn apply_payment(&self, request: &NewOrderPayment) -> Result<(), RevelError> {
        let url = self.base_url.join("resources/OrderPayment/")?;
        let body = serde_json::json!({
            "order": request.order,
            "payment_type": request.payment_type,
            "amount": request.amount,
        });

        let response = self
            .authorized_request(Method::POST, url)
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await
    }

    /// Flips the order out of its temporary state so it appears in the
    /// POS live order view.
    pub async fn activate_order(&self, order_id: i64) -> Result<(), RevelError> {
        let url = self
            .base_url
            .join(&format!("resources/Order/{order_id}/"))?;
        let body = serde_json::json!({ "temporary": false });

        let response = self
            .authorized_request(Method::PATCH, url)
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await
    }

    /// Fetches the product catalog for an establishment, following
    /// pagination. Results are cached for the life of the client.
    pub async fn fetch_product_catalog(
        &self,
        establishment: i64,
    ) -> Result<Arc<Vec<Product>>, RevelError> {
        if let Some(products) = self.cached_catalog(establishment) {
            return Ok(products);
        }

        let mut products = Vec::new();
        let mut url = self.base_url.join("resources/Product/")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("establishment", &establishment.to_string());
            query.append_pair("limit", "200");
            query.append_pair("offset", "0");
        }

        loop {
            let response = self
                .authorized_request(Method::GET, url.clone())
                .send()
                .await?;
            let page = parse_json::<ProductPage>(response).await?;
            products.extend(page.objects);

            match page.meta.and_then(|meta| meta.next) {
                Some(next) => url = self.base_url.join(&next)?,
                None => break,
            }
        }

        let products = Arc::new(products);
        self.catalog_cache
            .lock()
            .expect("catalog cache")
            .insert(establishment, Arc::clone(&products));
        Ok(products)
    }

    fn cached_catalog(&self, establishment: i64) -> Option<Arc<Vec<Product>>> {
        self.catalog_cache
            .lock()
            .expect("catalog cache")
            .get(&establishment)
            .cloned()
    }

    fn authorized_request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http.request(method, url).header(
            "API-AUTHENTICATION",
            format!("{}:{}", self.api_key, self.api_secret),
        )
    }
}

/// Parameters for creating an order header.
pub struct NewOrder<'a> {
    pub establishment: i64,
    pub local_id: &'a str,
    pub created_by: i64,
    pub dining_option: i64,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for adding a line item to an order.
pub struct NewOrderItem {
    pub order: i64,
    pub product: i64,
    pub quantity: u32,
    pub price: Decimal,
}

/// Parameters for applying a discount to an order.
pub struct NewOrderDiscount {
    pub order: i64,
    pub discount: i64,
    pub amount: Decimal,
}

/// Parameters for recording a payment against an order.
pub struct NewOrderPayment {
    pub order: i64,
    pub payment_type: i64,
    pub amount: Decimal,
}

/// Minimal order representation returned by the POS.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct OrderSummary {
    pub id: i64,
    #[serde(default)]
    pub local_id: Option<String>,
}

/// A product row from the establishment catalog.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
struct ObjectPage<T> {
    #[serde(default)]
    objects: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ProductPage {
    #[serde(default)]
    objects: Vec<Product>,
    #[serde(default)]
    meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    #[serde(default)]
    next: Option<String>,
}

/// Errors produced by the Revel client.
#[derive(Debug, Error)]
pub enum RevelError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

async fn ensure_success(response: Response) -> Result<(), RevelError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(RevelError::Status { status, body });
    }
    Ok(())
}

async fn parse_json<T>(response: Response) -> Result<T, RevelError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(RevelError::Status { status, body });
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpmock::prelude::*;
    use httpmock::Method as MockMethod;
    use serde_json::json;

    fn client(base_url: &Url) -> RevelClient {
        RevelClient::new(
            "key",
            "secret",
            base_url.clone(),
            Client::builder().build().expect("client"),
        )
    }

    #[tokio::test]
    async fn find_order_returns_first_match() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/")).expect("url");
        let client = client(&base);

        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/resources/Order/")
                    .query_param("local_id", "Tripleseat 4411")
                    .query_param("establishment", "4")
                    .header("API-AUTHENTICATION", "key:secret");
                then.status(200).json_body(json!({
                    "objects": [ { "id": 991, "local_id": "Tripleseat 4411" } ]
                }));
            })
            .await;

        let order = client
            .find_order_by_local_id(4, "Tripleseat 4411")
            .await
            .expect("lookup");
        mock.assert_async().await;

        let order = order.expect("order present");
        assert_eq!(order.id, 991);
        assert_eq!(order.local_id.as_deref(), Some("Tripleseat 4411"));
    }

    #[tokio::test]
    async fn find_order_returns_none_for_empty_page() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/")).expect("url");
        let client = client(&base);

        server
            .mock_async(|when, then| {
                when.method(GET).path("/resources/Order/");
                then.status(200).json_body(json!({ "objects": [] }));
            })
            .await;

        let order = client
            .find_order_by_local_id(4, "Tripleseat 1")
            .await
            .expect("lookup");
        assert!(order.is_none());
    }

    #[tokio::test]
    async fn find_order_tolerates_a_page_without_objects() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/")).expect("url");
        let client = client(&base);

        server
            .mock_async(|when, then| {
                when.method(GET).path("/resources/Order/");
                then.status(200).json_body(json!({}));
            })
            .await;

        let order = client
            .find_order_by_local_id(4, "Tripleseat 1")
            .await
            .expect("lookup");
        assert!(order.is_none());
    }

    #[tokio::test]
    async fn create_order_posts_an_inactive_header() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/")).expect("url");
        let client = client(&base);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/resources/Order/")
                    .json_body_partial(
                        r#"{
                            "establishment": 4,
                            "local_id": "Tripleseat 4411",
                            "created_by": 12,
                            "dining_option": 7,
                            "web_order": true,
                            "temporary": true,
                            "subtotal": 0
                        }"#,
                    );
                then.status(201).json_body(json!({ "id": 991 }));
            })
            .await;

        let order = client
            .create_order(&NewOrder {
                establishment: 4,
                local_id: "Tripleseat 4411",
                created_by: 12,
                dining_option: 7,
                notes: "Tripleseat event 4411".to_string(),
                created_at: Utc.with_ymd_and_hms(2026, 8, 22, 15, 0, 0).unwrap(),
            })
            .await
            .expect("create order");
        mock.assert_async().await;
        assert_eq!(order.id, 991);
    }

    #[tokio::test]
    async fn add_order_item_sends_price_and_quantity() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/")).expect("url");
        let client = client(&base);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/resources/OrderItem/").json_body(json!({
                    "order": 991,
                    "product": 10,
                    "quantity": 2,
                    "price": "2.50",
                }));
                then.status(201).json_body(json!({ "id": 5001 }));
            })
            .await;

        client
            .add_order_item(&NewOrderItem {
                order: 991,
                product: 10,
                quantity: 2,
                price: Decimal::new(250, 2),
            })
            .await
            .expect("add item");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn write_failures_surface_status_and_body() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/")).expect("url");
        let client = client(&base);

        server
            .mock_async(|when, then| {
                when.method(POST).path("/resources/OrderDiscount/");
                then.status(400).body("discount not configured");
            })
            .await;

        let err = client
            .apply_discount(&NewOrderDiscount {
                order: 991,
                discount: 3,
                amount: Decimal::new(500, 2),
            })
            .await
            .expect_err("should fail");
        match err {
            RevelError::Status { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "discount not configured");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn activate_order_patches_temporary_off() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/")).expect("url");
        let client = client(&base);

        let mock = server
            .mock_async(|when, then| {
                when.method(MockMethod::PATCH)
                    .path("/resources/Order/991/")
                    .json_body(json!({ "temporary": false }));
                then.status(200).json_body(json!({ "id": 991 }));
            })
            .await;

        client.activate_order(991).await.expect("activate");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn catalog_follows_pagination_and_caches() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/")).expect("url");
        let client = client(&base);

        let first = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/resources/Product/")
                    .query_param("establishment", "4")
                    .query_param("offset", "0");
                then.status(200).json_body(json!({
                    "objects": [ { "id": 10, "name": "Glazed Donut", "price": 2.5 } ],
                    "meta": { "next": "/resources/Product/?establishment=4&limit=200&offset=200" }
                }));
            })
            .await;
        let second = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/resources/Product/")
                    .query_param("offset", "200");
                then.status(200).json_body(json!({
                    "objects": [ { "id": 12, "name": "Coffee Box", "price": 18.0 } ],
                    "meta": { "next": null }
                }));
            })
            .await;

        let catalog = client.fetch_product_catalog(4).await.expect("catalog");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].name, "Glazed Donut");
        assert_eq!(catalog[1].id, 12);

        // A second fetch is served from the cache without new requests.
        let again = client.fetch_product_catalog(4).await.expect("catalog");
        assert_eq!(again.len(), 2);
        first.assert_async().await;
        second.assert_async().await;
    }
}
