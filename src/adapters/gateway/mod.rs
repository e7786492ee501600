//! Outbound gateway adapters over HTTP.

mod http;

pub use http::{HttpCatalogGateway, HttpGatewayConfig, HttpMessageSender, HttpPaymentGateway};
