// src/quote.rs
use crate::models::Quote;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("quote provider returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

/// Source of live prices. A miss of any kind is `None`.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn lookup(&self, symbol: &str) -> Option<Quote>;
}

#[derive(Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
}

#[derive(Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    quote: Option<GlobalQuote>,
}

/// Alpha Vantage `GLOBAL_QUOTE` client. One request per lookup, no retry.
pub struct AlphaVantage {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AlphaVantage {
    /// Fails when the HTTP client cannot be built with its request timeout.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, QuoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    // Errors are stripped of their URL since it carries the API key.
    async fn fetch(&self, symbol: &str) -> Result<String, QuoteError> {
        debug!("Fetching quote for {}", symbol);
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| QuoteError::Http(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuoteError::Status(status));
        }
        response
            .text()
            .await
            .map_err(|e| QuoteError::Http(e.without_url()))
    }
}

#[async_trait]
impl QuoteSource for AlphaVantage {
    async fn lookup(&self, symbol: &str) -> Option<Quote> {
        match self.fetch(symbol).await {
            Ok(body) => {
                let quote = parse_global_quote(symbol, &body);
                if quote.is_none() {
                    warn!("No quote data for {}", symbol);
                }
                quote
            }
            Err(e) => {
                warn!("Quote lookup for {} failed: {}", symbol, e);
                None
            }
        }
    }
}

/// Normalizes a `GLOBAL_QUOTE` body. The provider has no company name, so the
/// uppercased request symbol stands in for it.
pub fn parse_global_quote(requested: &str, body: &str) -> Option<Quote> {
    let response: GlobalQuoteResponse = serde_json::from_str(body).ok()?;
    let quote = response.quote?;
    let symbol = quote.symbol.filter(|s| !s.is_empty())?;
    let price = Decimal::from_str(quote.price?.trim()).ok()?;
    Some(Quote {
        symbol,
        name: requested.to_uppercase(),
        price,
    })
}

/// Trims and uppercases user input; `None` when nothing is left.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() {
        None
    } else {
        Some(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_global_quote() {
        let body = r#"{
            "Global Quote": {
                "01. symbol": "IBM",
                "02. open": "181.0000",
                "05. price": "182.5200",
                "07. latest trading day": "2024-05-03"
            }
        }"#;
        let quote = parse_global_quote("ibm", body).unwrap();
        assert_eq!(quote.symbol, "IBM");
        assert_eq!(quote.name, "IBM");
        assert_eq!(quote.price, dec!(182.52));
    }

    #[test]
    fn empty_global_quote_is_a_miss() {
        assert!(parse_global_quote("ZZZZ", r#"{"Global Quote": {}}"#).is_none());
    }

    #[test]
    fn rate_limit_note_is_a_miss() {
        let body = r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#;
        assert!(parse_global_quote("IBM", body).is_none());
    }

    #[test]
    fn malformed_body_is_a_miss() {
        assert!(parse_global_quote("IBM", "<html>oops</html>").is_none());
        let bad_price = r#"{"Global Quote": {"01. symbol": "IBM", "05. price": "n/a"}}"#;
        assert!(parse_global_quote("IBM", bad_price).is_none());
    }

    #[test]
    fn normalizes_symbols() {
        assert_eq!(normalize_symbol("  aapl "), Some("AAPL".to_string()));
        assert_eq!(normalize_symbol("   "), None);
    }

    fn serve(body: &'static str, status: warp::http::StatusCode) -> String {
        use warp::Filter;

        let route = warp::path("query")
            .and(warp::query::<std::collections::HashMap<String, String>>())
            .map(move |params: std::collections::HashMap<String, String>| {
                let ok = params.get("function").map(String::as_str) == Some("GLOBAL_QUOTE")
                    && params.get("apikey").map(String::as_str) == Some("test_key");
                let status = if ok { status } else { warp::http::StatusCode::UNAUTHORIZED };
                warp::reply::with_status(body, status)
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        format!("http://{}/query", addr)
    }

    #[tokio::test]
    async fn fetches_and_parses_a_quote() {
        let body = r#"{"Global Quote": {"01. symbol": "IBM", "05. price": "182.5200"}}"#;
        let url = serve(body, warp::http::StatusCode::OK);
        let source = AlphaVantage::new(url, "test_key").unwrap();

        let quote = source.lookup("ibm").await.unwrap();
        assert_eq!(quote.symbol, "IBM");
        assert_eq!(quote.price, dec!(182.52));
    }

    #[tokio::test]
    async fn error_status_is_reported_and_a_miss() {
        let url = serve("busy", warp::http::StatusCode::SERVICE_UNAVAILABLE);
        let source = AlphaVantage::new(url, "test_key").unwrap();

        let err = source.fetch("IBM").await.unwrap_err();
        assert!(matches!(
            err,
            QuoteError::Status(status) if status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        ));
        assert!(source.lookup("IBM").await.is_none());
    }

    #[tokio::test]
    async fn transport_errors_do_not_leak_the_api_key() {
        let source = AlphaVantage::new("http://127.0.0.1:9/query", "secret_key").unwrap();
        let err = source.fetch("IBM").await.unwrap_err();
        assert!(matches!(err, QuoteError::Http(_)));
        assert!(!err.to_string().contains("secret_key"));
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_miss() {
        let source = AlphaVantage::new("http://127.0.0.1:9/query", "test_key").unwrap();
        assert!(source.lookup("IBM").await.is_none());
    }
}
