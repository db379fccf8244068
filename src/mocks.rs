use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use uuid::Uuid;

use crate::bridges::traits::{
    BridgeAdapter, BridgeError, BridgeResult, Route, RouteMetrics, TransferStatus,
};
use crate::types::{ChainId, CrossChainToken};

/// Configurable protocol simulator.
///
/// Stands in for a real bridge integration in tests and the demo binary:
/// fixed fee/gas/time tables, a liquidity pool that execution draws down,
/// and knobs to flip health, activity and failure behavior at runtime.
#[derive(Debug)]
pub struct SimulatedAdapter {
    name: String,
    fee_bps: u32,
    gas_fee_wei: U256,
    estimated_minutes: u64,
    min_amount: U256,
    max_amount: U256,
    chains: Vec<ChainId>,
    tokens: Vec<String>,
    success_rate: u8,
    congestion: u8,

    /// Complete transfers synchronously instead of leaving them pending
    resolve_immediately: bool,

    liquidity: Mutex<U256>,
    healthy: AtomicBool,
    active: AtomicBool,
    fail_next: AtomicBool,
    metrics_calls: AtomicU64,
    transfers: Mutex<HashMap<String, TransferStatus>>,
}

pub struct SimulatedAdapterBuilder {
    adapter: SimulatedAdapter,
}

impl SimulatedAdapterBuilder {
    pub fn fee_bps(mut self, fee_bps: u32) -> Self {
        self.adapter.fee_bps = fee_bps;
        self
    }

    pub fn gas_fee_wei(mut self, gas: U256) -> Self {
        self.adapter.gas_fee_wei = gas;
        self
    }

    pub fn minutes(mut self, minutes: u64) -> Self {
        self.adapter.estimated_minutes = minutes;
        self
    }

    pub fn liquidity(mut self, liquidity: U256) -> Self {
        self.adapter.liquidity = Mutex::new(liquidity);
        self
    }

    pub fn bounds(mut self, min: U256, max: U256) -> Self {
        self.adapter.min_amount = min;
        self.adapter.max_amount = max;
        self
    }

    pub fn chains(mut self, chains: Vec<ChainId>) -> Self {
        self.adapter.chains = chains;
        self
    }

    pub fn tokens(mut self, tokens: Vec<&str>) -> Self {
        self.adapter.tokens = tokens.into_iter().map(String::from).collect();
        self
    }

    pub fn success_rate(mut self, rate: u8) -> Self {
        self.adapter.success_rate = rate;
        self
    }

    pub fn congestion(mut self, congestion: u8) -> Self {
        self.adapter.congestion = congestion;
        self
    }

    /// Leave executed transfers in Pending until resolved explicitly
    pub fn pending_resolution(mut self) -> Self {
        self.adapter.resolve_immediately = false;
        self
    }

    pub fn build(self) -> SimulatedAdapter {
        self.adapter
    }
}

impl SimulatedAdapter {
    pub fn builder(name: &str) -> SimulatedAdapterBuilder {
        SimulatedAdapterBuilder {
            adapter: SimulatedAdapter {
                name: name.to_string(),
                fee_bps: 10,
                gas_fee_wei: U256::from(1_000_000_000_000_000u64), // 0.001 ETH
                estimated_minutes: 5,
                min_amount: U256::from(1u64),
                max_amount: U256::MAX,
                chains: ChainId::all().to_vec(),
                tokens: vec!["USDC".into(), "USDT".into(), "WETH".into()],
                success_rate: 99,
                congestion: 10,
                resolve_immediately: true,
                liquidity: Mutex::new(
                    U256::from(1_000_000u64) * U256::from(10u64).pow(U256::from(18u64)),
                ),
                healthy: AtomicBool::new(true),
                active: AtomicBool::new(true),
                fail_next: AtomicBool::new(false),
                metrics_calls: AtomicU64::new(0),
                transfers: Mutex::new(HashMap::new()),
            },
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn set_liquidity(&self, liquidity: U256) {
        *self.liquidity.lock().unwrap() = liquidity;
    }

    /// Make the next execute_bridge call fail
    pub fn fail_next_execution(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Resolve a pending transfer (asynchronous-completion simulation)
    pub fn resolve(&self, id: &str, success: bool) {
        let mut transfers = self.transfers.lock().unwrap();
        if let Some(status) = transfers.get_mut(id) {
            *status = if success {
                TransferStatus::Completed
            } else {
                TransferStatus::Failed
            };
        }
    }

    /// How many times route_metrics was queried
    pub fn metrics_call_count(&self) -> u64 {
        self.metrics_calls.load(Ordering::SeqCst)
    }

    fn route_supported(&self, token_in: &CrossChainToken, token_out: &CrossChainToken, from: ChainId, to: ChainId) -> bool {
        from != to
            && self.chains.contains(&from)
            && self.chains.contains(&to)
            && token_in.symbol == token_out.symbol
            && self.tokens.contains(&token_in.symbol)
    }
}

#[async_trait]
impl BridgeAdapter for SimulatedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn supports_route(
        &self,
        token_in: &CrossChainToken,
        token_out: &CrossChainToken,
        from: ChainId,
        to: ChainId,
    ) -> bool {
        self.route_supported(token_in, token_out, from, to)
    }

    async fn route_metrics(
        &self,
        token_in: &CrossChainToken,
        token_out: &CrossChainToken,
        amount: U256,
        from: ChainId,
        to: ChainId,
    ) -> BridgeResult<RouteMetrics> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        if !self.tokens.contains(&token_in.symbol) {
            return Err(BridgeError::TokenNotSupported {
                token: token_in.symbol.clone(),
            });
        }
        if !self.route_supported(token_in, token_out, from, to) {
            return Err(BridgeError::UnsupportedRoute { from, to });
        }

        let protocol_fee = amount * U256::from(self.fee_bps) / U256::from(10_000u64);
        Ok(RouteMetrics {
            estimated_gas_wei: self.gas_fee_wei,
            protocol_fee_wei: protocol_fee,
            total_cost_wei: self.gas_fee_wei + protocol_fee,
            estimated_time_minutes: self.estimated_minutes,
            available_liquidity: *self.liquidity.lock().unwrap(),
            success_rate: self.success_rate,
            // Simulated utilization noise
            congestion: self.congestion.saturating_add(fastrand::u8(0..3)).min(100),
        })
    }

    async fn execute_bridge(
        &self,
        route: &Route,
        _recipient: Address,
        _auth: &[u8],
    ) -> BridgeResult<String> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(BridgeError::BridgeInactive);
        }
        if route.amount_in < self.min_amount {
            return Err(BridgeError::AmountBelowMinimum {
                amount: route.amount_in,
                min: self.min_amount,
            });
        }
        if route.amount_in > self.max_amount {
            return Err(BridgeError::AmountAboveMaximum {
                amount: route.amount_in,
                max: self.max_amount,
            });
        }

        let mut liquidity = self.liquidity.lock().unwrap();
        if *liquidity < route.amount_in {
            return Err(BridgeError::InsufficientLiquidity {
                available: *liquidity,
                required: route.amount_in,
            });
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(BridgeError::ExecutionFailed {
                reason: "simulated failure".to_string(),
            });
        }
        *liquidity -= route.amount_in;
        drop(liquidity);

        let id = Uuid::new_v4().to_string();
        let status = if self.resolve_immediately {
            TransferStatus::Completed
        } else {
            TransferStatus::Pending
        };
        self.transfers.lock().unwrap().insert(id.clone(), status);
        Ok(id)
    }

    async fn transfer_status(&self, id: &str) -> BridgeResult<TransferStatus> {
        self.transfers
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .ok_or_else(|| BridgeError::TransferNotFound { id: id.to_string() })
    }

    async fn estimate_gas(&self, _route: &Route) -> BridgeResult<U256> {
        Ok(self.gas_fee_wei)
    }

    async fn available_liquidity(
        &self,
        _token: &CrossChainToken,
        _from: ChainId,
        _to: ChainId,
    ) -> BridgeResult<U256> {
        Ok(*self.liquidity.lock().unwrap())
    }

    async fn success_rate(&self) -> BridgeResult<u8> {
        Ok(self.success_rate)
    }

    async fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn transfer_limits(&self, _token: &CrossChainToken) -> BridgeResult<(U256, U256)> {
        Ok((self.min_amount, self.max_amount))
    }
}
