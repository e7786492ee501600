//! `show_catalog` action - lists products from the catalog gateway.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::domain::action::{
    ActionDescriptor, ActionError, ActionKind, ActionResult, ActionType, SideEffectCategory,
};
use crate::domain::session::OutboundBody;
use crate::ports::{ActionHandler, ActionRequest, CatalogGateway};

const DEFAULT_TITLE: &str = "Here is what we have:";

pub struct ShowCatalogAction {
    catalog: Arc<dyn CatalogGateway>,
}

impl ShowCatalogAction {
    pub fn new(catalog: Arc<dyn CatalogGateway>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ActionHandler for ShowCatalogAction {
    fn descriptor(&self) -> ActionDescriptor {
        ActionDescriptor::new(ActionType::ShowCatalog, SideEffectCategory::OutboundMessage)
            .timeout(Duration::from_secs(5))
    }

    async fn execute(&self, request: ActionRequest) -> Result<ActionResult, ActionError> {
        let ActionKind::ShowCatalog { category, title } = &request.kind else {
            return Err(ActionError::InvalidParameters(format!(
                "expected show_catalog, got {}",
                request.kind.action_type()
            )));
        };

        let category = category
            .as_deref()
            .map(|c| request.render(c))
            .filter(|c| !c.trim().is_empty());
        let items = self.catalog.list_products(category.as_deref()).await?;

        if items.is_empty() {
            return Ok(ActionResult::failed("catalog is empty").with_output("count", 0));
        }

        let title = title
            .as_deref()
            .map(|t| request.render(t))
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let skus: Vec<&str> = items.iter().map(|i| i.sku.as_str()).collect();

        Ok(ActionResult::ok()
            .with_output("count", items.len())
            .with_output("skus", json!(skus))
            .with_message(OutboundBody::Catalog { title, items }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::actions::test_request;
    use crate::adapters::memory::StaticCatalog;

    #[tokio::test]
    async fn lists_category_as_catalog_message() {
        let action = ShowCatalogAction::new(Arc::new(StaticCatalog::demo()));
        let request = test_request(ActionKind::ShowCatalog {
            category: Some("tea".into()),
            title: None,
        });

        let result = action.execute(request).await.unwrap();

        assert!(result.success);
        assert_eq!(result.outputs["count"], 2);
        match &result.outbound[0] {
            OutboundBody::Catalog { title, items } => {
                assert_eq!(title, DEFAULT_TITLE);
                assert_eq!(items.len(), 2);
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_catalog_is_an_unsuccessful_result() {
        let action = ShowCatalogAction::new(Arc::new(StaticCatalog::new()));
        let request = test_request(ActionKind::ShowCatalog {
            category: None,
            title: None,
        });

        let result = action.execute(request).await.unwrap();
        assert!(!result.success);
        assert!(result.outbound.is_empty());
    }
}
