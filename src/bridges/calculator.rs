use std::sync::Arc;

use alloy::primitives::U256;
use chrono::Duration;
use tracing::{debug, info};

use super::registry::BridgeRegistry;
use super::traits::{BridgeAdapter, Route, RouteMetrics};
use crate::config::RoutingSettings;
use crate::constants::MAX_ROUTES_PER_QUERY;
use crate::oracle::Clock;
use crate::types::{ChainId, CrossChainToken, RoutePreferences, RoutingMode};

pub type RouteResult<T> = Result<T, RouteError>;

/// Route discovery errors
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("No route found: {from} -> {to} for {amount}")]
    RouteNotFound {
        from: ChainId,
        to: ChainId,
        amount: U256,
    },
}

/// Scores candidate routes across the registry's live adapter set.
///
/// Owns no persistent state: every query is a pure function of registry
/// state plus the query parameters.
#[derive(Debug)]
pub struct RouteCalculator {
    registry: Arc<BridgeRegistry>,
    clock: Arc<dyn Clock>,
    settings: RoutingSettings,
}

impl RouteCalculator {
    pub fn new(
        registry: Arc<BridgeRegistry>,
        clock: Arc<dyn Clock>,
        settings: RoutingSettings,
    ) -> Self {
        Self {
            registry,
            clock,
            settings,
        }
    }

    /// Best route for the request, ranked by the preferred mode
    pub async fn best_route(
        &self,
        token_in: &CrossChainToken,
        token_out: &CrossChainToken,
        amount: U256,
        from: ChainId,
        to: ChainId,
        prefs: &RoutePreferences,
    ) -> RouteResult<Route> {
        let mut routes = self
            .find_routes(token_in, token_out, amount, from, to, prefs, 1)
            .await?;
        // find_routes never returns an empty Ok
        Ok(routes.remove(0))
    }

    /// Up to `max_routes` qualifying routes, sorted ascending by score
    #[allow(clippy::too_many_arguments)]
    pub async fn find_routes(
        &self,
        token_in: &CrossChainToken,
        token_out: &CrossChainToken,
        amount: U256,
        from: ChainId,
        to: ChainId,
        prefs: &RoutePreferences,
        max_routes: usize,
    ) -> RouteResult<Vec<Route>> {
        let candidates = self.registry.candidates_for_route(from, to).await;
        if candidates.is_empty() {
            debug!("No enabled healthy bridge serves {} -> {}", from, to);
            return Err(RouteError::RouteNotFound { from, to, amount });
        }

        // Query all qualifying adapters concurrently
        let quote_futures = candidates.into_iter().map(|adapter| {
            let token_in = token_in.clone();
            let token_out = token_out.clone();
            async move {
                self.quote_adapter(adapter, &token_in, &token_out, amount, from, to)
                    .await
            }
        });
        let mut routes: Vec<Route> = futures::future::join_all(quote_futures)
            .await
            .into_iter()
            .flatten()
            .collect();

        if routes.is_empty() {
            return Err(RouteError::RouteNotFound { from, to, amount });
        }

        self.sort_by_mode(&mut routes, prefs.mode);
        routes.truncate(max_routes.min(self.settings.max_routes).min(MAX_ROUTES_PER_QUERY));

        info!(
            "🏆 Best of {} route(s) {} -> {}: {} ({} wei, {} min)",
            routes.len(),
            from,
            to,
            routes[0].bridge,
            routes[0].metrics.total_cost_wei,
            routes[0].metrics.estimated_time_minutes
        );
        Ok(routes)
    }

    /// One adapter's candidate route, or None if it doesn't qualify
    async fn quote_adapter(
        &self,
        adapter: Arc<dyn BridgeAdapter>,
        token_in: &CrossChainToken,
        token_out: &CrossChainToken,
        amount: U256,
        from: ChainId,
        to: ChainId,
    ) -> Option<Route> {
        if !adapter.supports_route(token_in, token_out, from, to).await {
            return None;
        }

        let liquidity = match adapter.available_liquidity(token_in, from, to).await {
            Ok(liquidity) => liquidity,
            Err(e) => {
                debug!("❌ {} liquidity query failed: {}", adapter.name(), e);
                return None;
            }
        };
        if liquidity < amount {
            debug!(
                "{} skipped: liquidity {} < requested {}",
                adapter.name(),
                liquidity,
                amount
            );
            return None;
        }

        let metrics = match adapter
            .route_metrics(token_in, token_out, amount, from, to)
            .await
        {
            Ok(metrics) => metrics,
            Err(e) => {
                debug!("❌ {} quote failed: {}", adapter.name(), e);
                return None;
            }
        };

        self.build_route(adapter.name(), token_in, token_out, amount, from, to, metrics)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_route(
        &self,
        bridge: &str,
        token_in: &CrossChainToken,
        token_out: &CrossChainToken,
        amount: U256,
        from: ChainId,
        to: ChainId,
        metrics: RouteMetrics,
    ) -> Option<Route> {
        // Protocol fee comes out of the transferred amount
        let amount_out = amount.checked_sub(metrics.protocol_fee_wei)?;
        if amount_out.is_zero() {
            return None;
        }
        let now = self.clock.now();
        Some(Route {
            bridge: bridge.to_string(),
            token_in: token_in.clone(),
            token_out: token_out.clone(),
            amount_in: amount,
            amount_out,
            source_chain: from,
            dest_chain: to,
            metrics,
            route_data: serde_json::json!({
                "bridge": bridge,
                "corridor": format!("{}_{}", from.name(), to.name()),
            }),
            deadline: now + Duration::seconds(self.settings.cache_ttl_secs as i64),
        })
    }

    fn sort_by_mode(&self, routes: &mut [Route], mode: RoutingMode) {
        match mode {
            RoutingMode::Cheapest => {
                routes.sort_by(|a, b| a.metrics.total_cost_wei.cmp(&b.metrics.total_cost_wei));
            }
            RoutingMode::Fastest => {
                routes.sort_by(|a, b| {
                    (a.metrics.estimated_time_minutes, a.metrics.total_cost_wei)
                        .cmp(&(b.metrics.estimated_time_minutes, b.metrics.total_cost_wei))
                });
            }
            RoutingMode::Balanced => {
                let penalty = U256::from(self.settings.time_penalty_wei_per_minute);
                routes.sort_by(|a, b| {
                    let score_a = a.metrics.total_cost_wei
                        + penalty * U256::from(a.metrics.estimated_time_minutes);
                    let score_b = b.metrics.total_cost_wei
                        + penalty * U256::from(b.metrics.estimated_time_minutes);
                    score_a.cmp(&score_b)
                });
            }
        }
    }
}
