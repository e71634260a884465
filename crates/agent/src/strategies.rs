//! Shipped strategies: retail purchasing and analytics querying.

use crate::strategy::{Decision, Strategy, StrategyContext};
use hyprcat_linkdata::Node;
use serde_json::json;
use tracing::debug;

/// Buys the first affordable, in-stock product from a retail collection.
pub struct RetailStrategy {
    /// Refuse products above this price.
    pub max_price: u64,
}

impl RetailStrategy {
    pub fn new(max_price: u64) -> Self {
        Self { max_price }
    }

    fn product_price(product: &Node) -> Option<u64> {
        product.u64_property("schema:price")
    }

    fn product_stock(product: &Node) -> u64 {
        product
            .u64_property("schema:inventoryLevel")
            .or_else(|| product.u64_property("schema:stock"))
            .unwrap_or(0)
    }
}

impl Strategy for RetailStrategy {
    fn name(&self) -> &str {
        "retail"
    }

    fn description(&self) -> &str {
        "buys in-stock products within budget"
    }

    fn trigger_types(&self) -> &[&str] {
        &["schema:Store", "schema:Product", "hydra:Collection"]
    }

    fn evaluate(&self, ctx: &StrategyContext) -> Option<Decision> {
        for product in ctx.resource.members() {
            let Some(price) = Self::product_price(&product) else {
                continue;
            };
            let stock = Self::product_stock(&product);
            let buy = product
                .operations()
                .into_iter()
                .find(|op| op.method == "POST");
            let Some(buy) = buy else { continue };
            if stock == 0 {
                debug!(product = ?product.id, "skipping out-of-stock product");
                continue;
            }
            if price > self.max_price || ctx.wallet.balance_sat < price {
                debug!(product = ?product.id, price, "skipping unaffordable product");
                continue;
            }
            let input = json!({
                "schema:price": price,
                "schema:itemOffered": product.id,
            });
            return Some(Decision::execute(
                buy,
                Some(input),
                "schema:BuyAction",
                format!(
                    "first in-stock product within budget: {} at {price} SAT",
                    product.title().unwrap_or("unnamed")
                ),
                10,
            ));
        }
        None
    }
}

/// Prefers query affordances on data products, then download affordances.
pub struct AnalyticsStrategy {
    /// Query submitted when the caller has not overridden it.
    pub default_query: String,
}

impl AnalyticsStrategy {
    pub fn new() -> Self {
        Self {
            default_query: "SELECT user_id, total_spend FROM analytics WHERE total_spend > 500"
                .to_string(),
        }
    }

    pub fn with_query(query: impl Into<String>) -> Self {
        Self {
            default_query: query.into(),
        }
    }
}

impl Default for AnalyticsStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for AnalyticsStrategy {
    fn name(&self) -> &str {
        "analytics"
    }

    fn description(&self) -> &str {
        "runs queries against data products and virtual graphs"
    }

    fn trigger_types(&self) -> &[&str] {
        &["dcat:Dataset", "czero:DataProduct", "hyprcat:VirtualGraph"]
    }

    fn evaluate(&self, ctx: &StrategyContext) -> Option<Decision> {
        let operations = ctx.resource.operations();
        let query_op = operations.iter().find(|op| {
            op.returns.as_deref() == Some("czero:ResultSet")
                || op.target_or_default().contains("/query")
        });
        if let Some(op) = query_op {
            return Some(Decision::execute(
                op.clone(),
                Some(json!({"schema:query": self.default_query})),
                "hyprcat:QueryAction",
                "query affordance on a data product",
                8,
            ));
        }
        let download_op = operations.iter().find(|op| {
            op.method == "GET"
                && op
                    .title
                    .as_deref()
                    .map(|t| {
                        let t = t.to_lowercase();
                        t.contains("download") || t.contains("export")
                    })
                    .unwrap_or(false)
        });
        if let Some(op) = download_op {
            return Some(Decision::execute(
                op.clone(),
                None,
                "hyprcat:DownloadAction",
                "download affordance on a data product",
                6,
            ));
        }
        None
    }
}
