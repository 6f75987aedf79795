//! Market data provider client
//!
//! Thin wrapper over the public Yahoo Finance endpoints: quotes, company
//! profiles (officer lists) and instrument search. FX rates are ordinary
//! quotes for pair symbols of the form `EURUSD=X` (units of quote currency
//! per 1 EUR).
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::error::AgentError;
use crate::Result;
use reqwest::Client;
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Quote for a single symbol. `price` is absent when the provider returns
/// a result without any usable price field.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: Option<f64>,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Officer {
    pub name: String,
    pub title: String,
}

#[derive(Debug, Clone, Default)]
pub struct CompanyProfile {
    pub officers: Vec<Officer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub symbol: String,
}

/// Instrument classes to include in a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Equities,
    AllInstruments,
}

/// Abstraction over the market data provider.
///
/// The capability handlers depend on this trait, not on the HTTP client,
/// so tests can substitute a scripted provider.
#[async_trait::async_trait]
pub trait MarketData: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<Quote>;
    async fn company_profile(&self, symbol: &str) -> Result<CompanyProfile>;
    async fn search(&self, query: &str, scope: SearchScope) -> Result<Vec<SearchHit>>;
}

/// HTTP client for the Yahoo Finance API.
pub struct YahooClient {
    client: Client,
    base_url: String,
}

impl YahooClient {
    pub fn new() -> Self {
        let base_url = env::var("MARKET_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .user_agent("stock-info-agent/0.1")
            .build()
            .expect("Failed to build HTTP client");

        Self { client, base_url }
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                AgentError::MarketDataError(format!("request failed for {}: {}", path, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::MarketDataError(format!(
                "provider returned {} for {}",
                status, path
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AgentError::MarketDataError(format!("invalid JSON from {}: {}", path, e)))
    }
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MarketData for YahooClient {
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        debug!(symbol, "Fetching quote");
        let body = self
            .get_json("/v7/finance/quote", &[("symbols", symbol)])
            .await?;
        Ok(parse_quote(&body))
    }

    async fn company_profile(&self, symbol: &str) -> Result<CompanyProfile> {
        debug!(symbol, "Fetching company profile");
        let path = format!("/v10/finance/quoteSummary/{}", symbol);
        let body = self.get_json(&path, &[("modules", "assetProfile")]).await?;
        Ok(parse_profile(&body))
    }

    async fn search(&self, query: &str, scope: SearchScope) -> Result<Vec<SearchHit>> {
        debug!(query, ?scope, "Searching instruments");
        let body = self
            .get_json(
                "/v1/finance/search",
                &[("q", query), ("quotesCount", "5"), ("newsCount", "0")],
            )
            .await?;
        Ok(parse_search(&body, scope))
    }
}

/// Extract a quote from a `/v7/finance/quote` payload.
///
/// Price lookup order follows the provider convention: `currentPrice`
/// first, then `regularMarketPrice`, then `previousClose` (pair symbols
/// sometimes only carry the close). Currency defaults to USD when omitted.
fn parse_quote(body: &Value) -> Quote {
    let result = body
        .pointer("/quoteResponse/result/0")
        .cloned()
        .unwrap_or(Value::Null);

    let price = ["currentPrice", "regularMarketPrice", "previousClose"]
        .iter()
        .find_map(|field| result.get(field).and_then(Value::as_f64));

    let currency = result
        .get("currency")
        .and_then(Value::as_str)
        .unwrap_or("USD")
        .to_string();

    if price.is_none() {
        warn!("Quote payload carried no price field");
    }

    Quote { price, currency }
}

/// Extract the officer list from a `quoteSummary` assetProfile payload.
/// Entries without a name are dropped; order is preserved.
fn parse_profile(body: &Value) -> CompanyProfile {
    let officers = body
        .pointer("/quoteSummary/result/0/assetProfile/companyOfficers")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let name = entry.get("name").and_then(Value::as_str)?;
                    let title = entry
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    Some(Officer {
                        name: name.to_string(),
                        title: title.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    CompanyProfile { officers }
}

/// Extract ranked search hits, optionally restricted to equities.
fn parse_search(body: &Value, scope: SearchScope) -> Vec<SearchHit> {
    body.get("quotes")
        .and_then(Value::as_array)
        .map(|quotes| {
            quotes
                .iter()
                .filter(|quote| match scope {
                    SearchScope::Equities => {
                        quote.get("quoteType").and_then(Value::as_str) == Some("EQUITY")
                    }
                    SearchScope::AllInstruments => true,
                })
                .filter_map(|quote| quote.get("symbol").and_then(Value::as_str))
                .map(|symbol| SearchHit {
                    symbol: symbol.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}
