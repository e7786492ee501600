//! `create_order` action - persists an order for a catalog product.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::action::{
    ActionDescriptor, ActionError, ActionKind, ActionResult, ActionType, SideEffectCategory,
};
use crate::ports::{ActionHandler, ActionRequest, CatalogGateway, NewOrder, OrderStore};

const MAX_QUANTITY: u32 = 99;

pub struct CreateOrderAction {
    catalog: Arc<dyn CatalogGateway>,
    orders: Arc<dyn OrderStore>,
}

impl CreateOrderAction {
    pub fn new(catalog: Arc<dyn CatalogGateway>, orders: Arc<dyn OrderStore>) -> Self {
        Self { catalog, orders }
    }
}

fn parse_quantity(raw: &str) -> Result<u32, ActionError> {
    let quantity: u32 = raw
        .trim()
        .parse()
        .map_err(|_| ActionError::InvalidParameters(format!("quantity '{}' is not a number", raw)))?;
    if quantity == 0 || quantity > MAX_QUANTITY {
        return Err(ActionError::InvalidParameters(format!(
            "quantity must be between 1 and {}",
            MAX_QUANTITY
        )));
    }
    Ok(quantity)
}

#[async_trait]
impl ActionHandler for CreateOrderAction {
    fn descriptor(&self) -> ActionDescriptor {
        ActionDescriptor::new(ActionType::CreateOrder, SideEffectCategory::PersistenceWrite)
    }

    async fn execute(&self, request: ActionRequest) -> Result<ActionResult, ActionError> {
        let ActionKind::CreateOrder { sku, quantity } = &request.kind else {
            return Err(ActionError::InvalidParameters(format!(
                "expected create_order, got {}",
                request.kind.action_type()
            )));
        };

        let sku = request.render(sku);
        let quantity = parse_quantity(&request.render(quantity))?;

        let Some(product) = self.catalog.find_product(&sku).await? else {
            return Ok(ActionResult::failed(format!("unknown product '{}'", sku.trim())));
        };

        let order = self
            .orders
            .create_order(NewOrder {
                idempotency_key: request.idempotency_key.clone(),
                session_id: request.session_id,
                contact_id: request.contact_id.clone(),
                sku: product.sku.clone(),
                quantity,
                unit_price_cents: product.price_cents,
                currency: product.currency.clone(),
            })
            .await
            .map_err(|e| ActionError::Transport(e.to_string()))?;

        Ok(ActionResult::ok()
            .with_output("order_id", order.id)
            .with_output("sku", order.sku)
            .with_output("product_name", product.name)
            .with_output("quantity", order.quantity)
            .with_output("total_cents", order.total_cents)
            .with_output("currency", order.currency))
    }
}
