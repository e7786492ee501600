//! Messages the engine sends back to a contact.

use serde::{Deserialize, Serialize};

/// A product line shown to a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
}

/// Body of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundBody {
    Text { text: String },
    Catalog { title: String, items: Vec<CatalogItem> },
}

impl OutboundBody {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundBody::Text { text: text.into() }
    }

    /// Plain-text rendering, used by channels without rich messages.
    pub fn to_plain_text(&self) -> String {
        match self {
            OutboundBody::Text { text } => text.clone(),
            OutboundBody::Catalog { title, items } => {
                let mut out = title.clone();
                for (idx, item) in items.iter().enumerate() {
                    out.push_str(&format!(
                        "\n{}. {} - {}.{:02} {} ({})",
                        idx + 1,
                        item.name,
                        item.price_cents / 100,
                        item.price_cents % 100,
                        item.currency,
                        item.sku
                    ));
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_renders_numbered_lines() {
        let body = OutboundBody::Catalog {
            title: "Menu".into(),
            items: vec![CatalogItem {
                sku: "TEA".into(),
                name: "Green tea".into(),
                price_cents: 350,
                currency: "USD".into(),
            }],
        };
        assert_eq!(body.to_plain_text(), "Menu\n1. Green tea - 3.50 USD (TEA)");
    }

    #[test]
    fn text_body_serializes_with_tag() {
        let json = serde_json::to_value(OutboundBody::text("hi")).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hi");
    }
}
