//! Mock payment gateway and static product catalog.
//!
//! The mock gateway supports:
//! - Failure injection (transport errors, timeouts, rejections)
//! - Deterministic or fixed payment references
//! - Call tracking for assertions
//! - Idempotent replies per idempotency key

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::session::CatalogItem;
use crate::ports::{
    CatalogGateway, GatewayError, PaymentGateway, PaymentInitiation, PaymentRequest,
};

/// Mock payment gateway for tests and local runs.
///
/// ```ignore
/// let gateway = MockPaymentGateway::new().with_reference("PAY-123");
/// gateway.fail_next(2, GatewayError::Transport("reset".into()));
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<GatewayState>>,
}

#[derive(Default)]
struct GatewayState {
    fixed_reference: Option<String>,
    failures_remaining: u32,
    failure: Option<GatewayError>,
    always_fail: Option<GatewayError>,
    latency: Option<Duration>,
    by_key: HashMap<String, PaymentInitiation>,
    calls: Vec<PaymentRequest>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Every initiation returns this reference.
    pub fn with_reference(self, reference: impl Into<String>) -> Self {
        self.state().fixed_reference = Some(reference.into());
        self
    }

    /// Delays every call, to exercise action timeouts.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state().latency = Some(latency);
        self
    }

    /// The next `count` calls fail with `error`.
    pub fn fail_next(&self, count: u32, error: GatewayError) {
        let mut state = self.state();
        state.failures_remaining = count;
        state.failure = Some(error);
    }

    /// Every call fails with `error` until [`Self::recover`].
    pub fn fail_always(&self, error: GatewayError) {
        self.state().always_fail = Some(error);
    }

    pub fn recover(&self) {
        let mut state = self.state();
        state.always_fail = None;
        state.failures_remaining = 0;
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Assertions
    // ════════════════════════════════════════════════════════════════════════════

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    pub fn calls(&self) -> Vec<PaymentRequest> {
        self.state().calls.clone()
    }

    /// Number of distinct idempotency keys that produced a payment.
    pub fn distinct_payments(&self) -> usize {
        self.state().by_key.len()
    }

    fn next_outcome(&self, request: &PaymentRequest) -> Result<PaymentInitiation, GatewayError> {
        let mut state = self.state();
        state.calls.push(request.clone());

        if let Some(err) = state.always_fail.clone() {
            return Err(err);
        }
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(state
                .failure
                .clone()
                .unwrap_or_else(|| GatewayError::Transport("injected".into())));
        }
        if let Some(existing) = state.by_key.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        let reference = state
            .fixed_reference
            .clone()
            .unwrap_or_else(|| format!("PAY-{}", state.by_key.len() + 1));
        let initiation = PaymentInitiation {
            checkout_url: format!("https://pay.example.test/checkout/{}", reference),
            reference,
        };
        state
            .by_key
            .insert(request.idempotency_key.clone(), initiation.clone());
        Ok(initiation)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn initiate(&self, request: PaymentRequest) -> Result<PaymentInitiation, GatewayError> {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.next_outcome(&request)
    }
}

/// Product catalog loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    items: Vec<(Option<String>, CatalogItem)>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, category: Option<&str>, item: CatalogItem) -> Self {
        self.items.push((category.map(str::to_string), item));
        self
    }

    /// Small tea-shop catalog used by the bundled flows.
    pub fn demo() -> Self {
        let item = |sku: &str, name: &str, price_cents: i64| CatalogItem {
            sku: sku.to_string(),
            name: name.to_string(),
            price_cents,
            currency: "USD".to_string(),
        };
        Self::new()
            .with_item(Some("tea"), item("TEA-GREEN", "Green tea", 350))
            .with_item(Some("tea"), item("TEA-BLACK", "Black tea", 300))
            .with_item(Some("snacks"), item("COOKIE", "Butter cookie", 150))
    }
}

#[async_trait]
impl CatalogGateway for StaticCatalog {
    async fn list_products(&self, category: Option<&str>) -> Result<Vec<CatalogItem>, GatewayError> {
        Ok(self
            .items
            .iter()
            .filter(|(cat, _)| match category {
                None => true,
                Some(wanted) => cat.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(wanted)),
            })
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn find_product(&self, sku: &str) -> Result<Option<CatalogItem>, GatewayError> {
        Ok(self
            .items
            .iter()
            .map(|(_, item)| item)
            .find(|item| item.sku.eq_ignore_ascii_case(sku.trim()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ContactId;

    fn request(key: &str) -> PaymentRequest {
        PaymentRequest {
            idempotency_key: key.to_string(),
            contact_id: ContactId::new("+15550100").unwrap(),
            amount_cents: 350,
            currency: "USD".into(),
            description: None,
        }
    }

    #[tokio::test]
    async fn same_key_returns_same_initiation() {
        let gateway = MockPaymentGateway::new();
        let a = gateway.initiate(request("k1")).await.unwrap();
        let b = gateway.initiate(request("k1")).await.unwrap();
        let c = gateway.initiate(request("k2")).await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a.reference, c.reference);
        assert_eq!(gateway.distinct_payments(), 2);
        assert_eq!(gateway.call_count(), 3);
    }

    #[tokio::test]
    async fn injected_failures_precede_success() {
        let gateway = MockPaymentGateway::new().with_reference("PAY-123");
        gateway.fail_next(2, GatewayError::Timeout);

        assert_eq!(gateway.initiate(request("k")).await, Err(GatewayError::Timeout));
        assert_eq!(gateway.initiate(request("k")).await, Err(GatewayError::Timeout));
        assert_eq!(gateway.initiate(request("k")).await.unwrap().reference, "PAY-123");
    }

    #[tokio::test]
    async fn catalog_filters_by_category_and_finds_by_sku() {
        let catalog = StaticCatalog::demo();

        assert_eq!(catalog.list_products(Some("TEA")).await.unwrap().len(), 2);
        assert_eq!(catalog.list_products(None).await.unwrap().len(), 3);
        assert_eq!(
            catalog.find_product("cookie").await.unwrap().unwrap().price_cents,
            150
        );
        assert!(catalog.find_product("nope").await.unwrap().is_none());
    }
}
