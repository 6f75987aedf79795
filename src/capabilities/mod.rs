//! Capability trait, registry and handlers
//!
//! Capabilities are the named operations the model may request: price
//! lookup, CEO lookup, ticker search, user clarification. Each handler
//! catches its own failures and degrades to an absent result; the dispatch
//! loop never sees a handler-level fault, only `None`.

use crate::market::{MarketData, SearchScope};
use crate::models::CapabilityDescriptor;
use crate::operator::Operator;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Display currency all prices are converted to when possible.
const TARGET_CURRENCY: &str = "EUR";

/// Trait for a single capability.
///
/// `invoke` receives the single first value of the model-supplied argument
/// mapping (capabilities are unary in practice), or no argument when the
/// mapping is empty. Malformed or missing input degrades to `None`.
#[async_trait::async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON-schema fragment for the parameter object, exposed verbatim
    /// to the model.
    fn parameters(&self) -> Value;
    async fn invoke(&self, argument: Option<&str>) -> Option<String>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Capability registry for looking up and describing capabilities.
///
/// Built once at startup from the fixed handler set; lookup is by exact,
/// case-sensitive name. Registration order is preserved so the model sees
/// a stable descriptor list.
pub struct CapabilityRegistry {
    by_name: HashMap<String, Arc<dyn Capability>>,
    ordered: Vec<Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            ordered: Vec::new(),
        }
    }

    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        self.by_name
            .insert(capability.name().to_string(), capability.clone());
        self.ordered.push(capability);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.by_name.get(name).cloned()
    }

    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.ordered.iter().map(|c| c.descriptor()).collect()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn string_parameter(name: &str, description: &str) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(
        name.to_string(),
        json!({ "type": "string", "description": description }),
    );
    json!({
        "type": "object",
        "properties": properties,
        "required": [name]
    })
}

fn format_price(price: f64, currency: &str) -> String {
    format!("{:.2} {}", price, currency)
}

/// Pair symbol for the EUR cross rate, e.g. `EURUSD=X` for USD. The quote
/// is the amount of `currency` per 1 EUR, so converting divides by it.
fn fx_pair_symbol(currency: &str) -> String {
    format!("EUR{}=X", currency)
}

//
// ================= Price lookup =================
//

pub struct PriceLookup {
    market: Arc<dyn MarketData>,
}

impl PriceLookup {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait::async_trait]
impl Capability for PriceLookup {
    fn name(&self) -> &'static str {
        "get_stock_price"
    }

    fn description(&self) -> &'static str {
        "Fetches the current stock price for the given ticker symbol, converted to EUR where possible"
    }

    fn parameters(&self) -> Value {
        string_parameter(
            "ticker_symbol",
            "The stock ticker symbol (e.g. 'AAPL', 'MSFT')",
        )
    }

    async fn invoke(&self, argument: Option<&str>) -> Option<String> {
        let symbol = argument?.trim().to_uppercase();
        if symbol.is_empty() {
            return None;
        }

        let quote = match self.market.quote(&symbol).await {
            Ok(quote) => quote,
            Err(e) => {
                warn!(symbol = %symbol, "Price lookup failed: {}", e);
                return None;
            }
        };

        // A result without any price field is an absent result, not a zero.
        let price = quote.price?;

        if quote.currency == TARGET_CURRENCY {
            return Some(format_price(price, TARGET_CURRENCY));
        }

        // Cross rate is quoted as units of the native currency per 1 EUR.
        // Any failure here falls back to the native-currency price.
        match self.market.quote(&fx_pair_symbol(&quote.currency)).await {
            Ok(fx) => match fx.price {
                Some(rate) if rate > 0.0 => Some(format_price(price / rate, TARGET_CURRENCY)),
                _ => Some(format_price(price, &quote.currency)),
            },
            Err(e) => {
                warn!(currency = %quote.currency, "FX rate lookup failed: {}", e);
                Some(format_price(price, &quote.currency))
            }
        }
    }
}

//
// ================= CEO lookup =================
//

pub struct CeoLookup {
    market: Arc<dyn MarketData>,
}

impl CeoLookup {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait::async_trait]
impl Capability for CeoLookup {
    fn name(&self) -> &'static str {
        "get_company_ceo"
    }

    fn description(&self) -> &'static str {
        "Fetches the name of the CEO for the company associated with the ticker symbol"
    }

    fn parameters(&self) -> Value {
        string_parameter("ticker_symbol", "The stock ticker symbol")
    }

    async fn invoke(&self, argument: Option<&str>) -> Option<String> {
        let symbol = argument?.trim().to_uppercase();
        if symbol.is_empty() {
            return None;
        }

        let profile = match self.market.company_profile(&symbol).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(symbol = %symbol, "CEO lookup failed: {}", e);
                return None;
            }
        };

        profile
            .officers
            .iter()
            .find(|officer| {
                let title = officer.title.to_lowercase();
                title.contains("ceo") || title.contains("chief executive")
            })
            .map(|officer| officer.name.clone())
    }
}

//
// ================= Ticker resolution =================
//

pub struct TickerSearch {
    market: Arc<dyn MarketData>,
}

impl TickerSearch {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait::async_trait]
impl Capability for TickerSearch {
    fn name(&self) -> &'static str {
        "find_ticker_symbol"
    }

    fn description(&self) -> &'static str {
        "Tries to identify the stock ticker symbol for a given company name"
    }

    fn parameters(&self) -> Value {
        string_parameter("company_name", "The name of the company")
    }

    async fn invoke(&self, argument: Option<&str>) -> Option<String> {
        let query = argument?.trim();
        if query.is_empty() {
            return None;
        }

        // Equities first, then every instrument class.
        for scope in [SearchScope::Equities, SearchScope::AllInstruments] {
            match self.market.search(query, scope).await {
                Ok(hits) => {
                    if let Some(hit) = hits.first() {
                        return Some(hit.symbol.clone());
                    }
                }
                Err(e) => {
                    warn!(query = %query, ?scope, "Ticker search failed: {}", e);
                }
            }
        }

        None
    }
}

//
// ================= Clarification =================
//

pub struct AskClarification {
    operator: Arc<dyn Operator>,
}

impl AskClarification {
    pub fn new(operator: Arc<dyn Operator>) -> Self {
        Self { operator }
    }
}

#[async_trait::async_trait]
impl Capability for AskClarification {
    fn name(&self) -> &'static str {
        "ask_user_for_clarification"
    }

    fn description(&self) -> &'static str {
        "Poses a question to the user and returns their typed response"
    }

    fn parameters(&self) -> Value {
        string_parameter("question_to_user", "The question to ask the user")
    }

    async fn invoke(&self, argument: Option<&str>) -> Option<String> {
        let question = argument?;
        match self.operator.ask(question).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!("Clarification prompt failed: {}", e);
                None
            }
        }
    }
}

/// Create the default registry with the four stock capabilities.
pub fn build_registry(
    market: Arc<dyn MarketData>,
    operator: Arc<dyn Operator>,
) -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry.register(Arc::new(PriceLookup::new(market.clone())));
    registry.register(Arc::new(CeoLookup::new(market.clone())));
    registry.register(Arc::new(TickerSearch::new(market)));
    registry.register(Arc::new(AskClarification::new(operator)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::market::{CompanyProfile, Officer, Quote, SearchHit};
    use crate::Result;
    use std::sync::Mutex;

    /// Scripted market data provider. Symbols absent from `quotes` fail
    /// the way a dead network would.
    #[derive(Default)]
    struct StubMarket {
        quotes: HashMap<String, Quote>,
        profile: CompanyProfile,
        equity_hits: Vec<SearchHit>,
        all_hits: Vec<SearchHit>,
        quote_calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl MarketData for StubMarket {
        async fn quote(&self, symbol: &str) -> Result<Quote> {
            self.quote_calls.lock().unwrap().push(symbol.to_string());
            self.quotes
                .get(symbol)
                .cloned()
                .ok_or_else(|| AgentError::MarketDataError(format!("no quote for {}", symbol)))
        }

        async fn company_profile(&self, _symbol: &str) -> Result<CompanyProfile> {
            Ok(self.profile.clone())
        }

        async fn search(&self, _query: &str, scope: SearchScope) -> Result<Vec<SearchHit>> {
            Ok(match scope {
                SearchScope::Equities => self.equity_hits.clone(),
                SearchScope::AllInstruments => self.all_hits.clone(),
            })
        }
    }

    struct ScriptedOperator {
        reply: Result<String>,
    }

    #[async_trait::async_trait]
    impl Operator for ScriptedOperator {
        async fn ask(&self, _question: &str) -> Result<String> {
            match &self.reply {
                Ok(reply) => Ok(reply.clone()),
                Err(_) => Err(AgentError::OperatorError("stdin closed".to_string())),
            }
        }
    }

    fn quote(price: Option<f64>, currency: &str) -> Quote {
        Quote {
            price,
            currency: currency.to_string(),
        }
    }

    #[tokio::test]
    async fn test_price_converts_usd_to_eur() {
        let mut market = StubMarket::default();
        market.quotes.insert("AAPL".into(), quote(Some(150.0), "USD"));
        market.quotes.insert("EURUSD=X".into(), quote(Some(1.10), "USD"));

        let lookup = PriceLookup::new(Arc::new(market));
        let result = lookup.invoke(Some("AAPL")).await;
        assert_eq!(result.as_deref(), Some("136.36 EUR"));
    }

    #[tokio::test]
    async fn test_price_already_in_eur_skips_conversion() {
        let mut market = StubMarket::default();
        market.quotes.insert("SAP.DE".into(), quote(Some(200.0), "EUR"));
        let market = Arc::new(market);

        let lookup = PriceLookup::new(market.clone());
        let result = lookup.invoke(Some("sap.de")).await;
        assert_eq!(result.as_deref(), Some("200.00 EUR"));

        // No FX quote was issued.
        assert_eq!(*market.quote_calls.lock().unwrap(), vec!["SAP.DE"]);
    }

    #[tokio::test]
    async fn test_price_missing_price_field_is_absent() {
        let mut market = StubMarket::default();
        market.quotes.insert("AAPL".into(), quote(None, "USD"));

        let lookup = PriceLookup::new(Arc::new(market));
        assert_eq!(lookup.invoke(Some("AAPL")).await, None);
    }

    #[tokio::test]
    async fn test_price_fx_failure_keeps_native_currency() {
        let mut market = StubMarket::default();
        // EURUSD=X intentionally not stubbed, so the FX quote errors.
        market.quotes.insert("AAPL".into(), quote(Some(150.0), "USD"));

        let lookup = PriceLookup::new(Arc::new(market));
        let result = lookup.invoke(Some("AAPL")).await;
        assert_eq!(result.as_deref(), Some("150.00 USD"));
    }

    #[tokio::test]
    async fn test_price_fx_quote_without_rate_keeps_native_currency() {
        let mut market = StubMarket::default();
        market.quotes.insert("AAPL".into(), quote(Some(150.0), "USD"));
        market.quotes.insert("EURUSD=X".into(), quote(None, "USD"));

        let lookup = PriceLookup::new(Arc::new(market));
        let result = lookup.invoke(Some("AAPL")).await;
        assert_eq!(result.as_deref(), Some("150.00 USD"));
    }

    #[tokio::test]
    async fn test_price_provider_failure_is_absent() {
        let lookup = PriceLookup::new(Arc::new(StubMarket::default()));
        assert_eq!(lookup.invoke(Some("AAPL")).await, None);
    }

    #[tokio::test]
    async fn test_price_without_argument_is_absent() {
        let lookup = PriceLookup::new(Arc::new(StubMarket::default()));
        assert_eq!(lookup.invoke(None).await, None);
    }

    #[tokio::test]
    async fn test_ceo_matches_title_substring() {
        let mut market = StubMarket::default();
        market.profile = CompanyProfile {
            officers: vec![
                Officer {
                    name: "John Roe".into(),
                    title: "Chief Financial Officer".into(),
                },
                Officer {
                    name: "Jane Doe".into(),
                    title: "Chief Executive Officer".into(),
                },
            ],
        };

        let lookup = CeoLookup::new(Arc::new(market));
        assert_eq!(lookup.invoke(Some("AAPL")).await.as_deref(), Some("Jane Doe"));
    }

    #[tokio::test]
    async fn test_ceo_absent_when_no_title_matches() {
        let mut market = StubMarket::default();
        market.profile = CompanyProfile {
            officers: vec![Officer {
                name: "John Roe".into(),
                title: "Chief Financial Officer".into(),
            }],
        };

        let lookup = CeoLookup::new(Arc::new(market));
        assert_eq!(lookup.invoke(Some("AAPL")).await, None);
    }

    #[tokio::test]
    async fn test_ticker_prefers_equity_results() {
        let mut market = StubMarket::default();
        market.equity_hits = vec![SearchHit { symbol: "AAPL".into() }];
        market.all_hits = vec![SearchHit {
            symbol: "BTC-USD".into(),
        }];

        let search = TickerSearch::new(Arc::new(market));
        assert_eq!(search.invoke(Some("Apple")).await.as_deref(), Some("AAPL"));
    }

    #[tokio::test]
    async fn test_ticker_falls_back_to_all_instruments() {
        let mut market = StubMarket::default();
        market.all_hits = vec![SearchHit {
            symbol: "BTC-USD".into(),
        }];

        let search = TickerSearch::new(Arc::new(market));
        assert_eq!(
            search.invoke(Some("bitcoin")).await.as_deref(),
            Some("BTC-USD")
        );
    }

    #[tokio::test]
    async fn test_ticker_absent_when_both_scopes_empty() {
        let search = TickerSearch::new(Arc::new(StubMarket::default()));
        assert_eq!(search.invoke(Some("No Such Company")).await, None);
    }

    #[tokio::test]
    async fn test_clarification_returns_reply_verbatim() {
        let capability = AskClarification::new(Arc::new(ScriptedOperator {
            reply: Ok("  the German listing  ".to_string()),
        }));
        assert_eq!(
            capability.invoke(Some("Which listing?")).await.as_deref(),
            Some("  the German listing  ")
        );
    }

    #[tokio::test]
    async fn test_clarification_degrades_on_operator_failure() {
        let capability = AskClarification::new(Arc::new(ScriptedOperator {
            reply: Err(AgentError::OperatorError("stdin closed".to_string())),
        }));
        assert_eq!(capability.invoke(Some("Which listing?")).await, None);
    }

    #[test]
    fn test_registry_lookup_is_case_sensitive() {
        let registry = build_registry(
            Arc::new(StubMarket::default()),
            Arc::new(ScriptedOperator {
                reply: Ok(String::new()),
            }),
        );

        assert!(registry.get("get_stock_price").is_some());
        assert!(registry.get("GET_STOCK_PRICE").is_none());
        assert!(registry.get("no_such_capability").is_none());
    }

    #[test]
    fn test_registry_descriptors_keep_registration_order() {
        let registry = build_registry(
            Arc::new(StubMarket::default()),
            Arc::new(ScriptedOperator {
                reply: Ok(String::new()),
            }),
        );

        let names: Vec<String> = registry
            .descriptors()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "get_stock_price",
                "get_company_ceo",
                "find_ticker_symbol",
                "ask_user_for_clarification"
            ]
        );

        let descriptors = registry.descriptors();
        assert!(descriptors[0].parameters["required"]
            .as_array()
            .unwrap()
            .contains(&json!("ticker_symbol")));
    }
}
