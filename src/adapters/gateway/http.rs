//! HTTP gateway clients - messaging channel, payment provider, product catalog.
//!
//! All three speak JSON over HTTPS with a bearer token. Every mutating call
//! carries an `Idempotency-Key` header (the outbox entry id for messages,
//! the action's idempotency key for payments), so providers can drop
//! retried requests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ContactId, DomainError, ErrorCode, InvocationId};
use crate::domain::session::{CatalogItem, OutboundBody};
use crate::ports::{
    CatalogGateway, GatewayError, MessageSender, PaymentGateway, PaymentInitiation, PaymentRequest,
};

/// Connection settings shared by the gateway clients.
#[derive(Clone)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    api_key: Option<SecretString>,
    pub timeout: Duration,
}

impl HttpGatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<SecretString>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn client(&self) -> Result<Client, GatewayError> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }
}

async fn send(request: RequestBuilder) -> Result<Response, GatewayError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(e.to_string())
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(GatewayError::Transport(format!("{}: {}", status, body)))
    } else {
        Err(GatewayError::Rejected(format!("{}: {}", status, body)))
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    response
        .json()
        .await
        .map_err(|e| GatewayError::Rejected(format!("Unexpected response body: {}", e)))
}

// ════════════════════════════════════════════════════════════════════════════
// Messaging
// ════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct SendMessageBody<'a> {
    to: &'a str,
    #[serde(flatten)]
    body: &'a OutboundBody,
    /// Plain rendering for channels without rich messages.
    fallback_text: String,
}

pub struct HttpMessageSender {
    config: HttpGatewayConfig,
    client: Client,
}

impl HttpMessageSender {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, DomainError> {
        let client = config.client().map_err(gateway_domain_error)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl MessageSender for HttpMessageSender {
    async fn send(
        &self,
        delivery_id: &InvocationId,
        contact_id: &ContactId,
        body: &OutboundBody,
    ) -> Result<(), DomainError> {
        let request = self
            .client
            .post(self.config.url("/messages"))
            .header("Idempotency-Key", delivery_id.as_str())
            .json(&SendMessageBody {
                to: contact_id.as_str(),
                body,
                fallback_text: body.to_plain_text(),
            });
        send(self.config.authorize(request))
            .await
            .map(|_| ())
            .map_err(gateway_domain_error)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Payments
// ════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct PaymentResponse {
    reference: String,
    checkout_url: String,
}

pub struct HttpPaymentGateway {
    config: HttpGatewayConfig,
    client: Client,
}

impl HttpPaymentGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, DomainError> {
        let client = config.client().map_err(gateway_domain_error)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initiate(&self, request: PaymentRequest) -> Result<PaymentInitiation, GatewayError> {
        let http = self
            .client
            .post(self.config.url("/payments"))
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&request);
        let response: PaymentResponse = decode(send(self.config.authorize(http)).await?).await?;
        Ok(PaymentInitiation {
            reference: response.reference,
            checkout_url: response.checkout_url,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Catalog
// ════════════════════════════════════════════════════════════════════════════

pub struct HttpCatalogGateway {
    config: HttpGatewayConfig,
    client: Client,
}

impl HttpCatalogGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, DomainError> {
        let client = config.client().map_err(gateway_domain_error)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl CatalogGateway for HttpCatalogGateway {
    async fn list_products(&self, category: Option<&str>) -> Result<Vec<CatalogItem>, GatewayError> {
        let mut request = self.client.get(self.config.url("/products"));
        if let Some(category) = category {
            request = request.query(&[("category", category)]);
        }
        decode(send(self.config.authorize(request)).await?).await
    }

    async fn find_product(&self, sku: &str) -> Result<Option<CatalogItem>, GatewayError> {
        let request = self
            .client
            .get(self.config.url(&format!("/products/{}", sku.trim())));
        match send(self.config.authorize(request)).await {
            Ok(response) => decode(response).await.map(Some),
            Err(GatewayError::Rejected(msg)) if msg.starts_with("404") => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn gateway_domain_error(e: GatewayError) -> DomainError {
    DomainError::new(ErrorCode::GatewayError, e.to_string())
}
