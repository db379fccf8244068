use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ChainId, CrossChainToken};

/// Bridge operation result type
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced at the adapter boundary
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Unsupported route: {from} -> {to}")]
    UnsupportedRoute { from: ChainId, to: ChainId },

    #[error("Token not supported: {token}")]
    TokenNotSupported { token: String },

    #[error("Insufficient liquidity: {available} < {required}")]
    InsufficientLiquidity { available: U256, required: U256 },

    #[error("Bridge is not active")]
    BridgeInactive,

    #[error("Transfer amount too low: {amount} < {min}")]
    AmountBelowMinimum { amount: U256, min: U256 },

    #[error("Transfer amount too high: {amount} > {max}")]
    AmountAboveMaximum { amount: U256, max: U256 },

    #[error("Transfer not found: {id}")]
    TransferNotFound { id: String },

    #[error("Execution failed: {reason}")]
    ExecutionFailed { reason: String },
}

/// Live pricing snapshot for one candidate route.
///
/// Recomputed on every query; never persisted on its own, only embedded in
/// the Route that carried it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteMetrics {
    /// Estimated execution cost on the source chain (wei)
    pub estimated_gas_wei: U256,

    /// Protocol fee deducted from the transferred amount (wei)
    pub protocol_fee_wei: U256,

    /// Gas plus protocol fee (wei)
    pub total_cost_wei: U256,

    /// Estimated completion time in minutes
    pub estimated_time_minutes: u64,

    /// Liquidity currently available on this route
    pub available_liquidity: U256,

    /// Historical success rate, 0-100
    pub success_rate: u8,

    /// Current congestion level, 0-100
    pub congestion: u8,
}

/// A fully-priced transfer plan through one adapter.
///
/// Immutable once returned; callers must re-query after `deadline`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    /// Adapter identifier (its stable `name()`)
    pub bridge: String,

    pub token_in: CrossChainToken,
    pub token_out: CrossChainToken,

    pub amount_in: U256,
    pub amount_out: U256,

    pub source_chain: ChainId,
    pub dest_chain: ChainId,

    pub metrics: RouteMetrics,

    /// Adapter-specific opaque data
    pub route_data: serde_json::Value,

    /// Route is unusable past this instant
    pub deadline: DateTime<Utc>,
}

impl Route {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

/// A transfer split across several routes.
///
/// Invariant: `amounts` sums to `total_amount` exactly and is parallel to
/// `routes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiPathRoute {
    pub routes: Vec<Route>,
    pub amounts: Vec<U256>,
    pub total_amount: U256,
}

impl MultiPathRoute {
    pub fn validate(&self) -> bool {
        if self.routes.is_empty() || self.routes.len() != self.amounts.len() {
            return false;
        }
        let sum = self
            .amounts
            .iter()
            .fold(U256::ZERO, |acc, amount| acc + *amount);
        sum == self.total_amount
    }
}

/// Transfer lifecycle: Pending -> Confirmed -> {Completed | Failed},
/// Failed -> Refunded via explicit recovery only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransferStatus {
    /// Custody of input funds has been taken
    Pending,

    /// The adapter accepted the request
    Confirmed,

    /// Recipient credited on the destination chain
    Completed,

    /// Adapter resolution failed; funds remain in custody
    Failed,

    /// Administrative recovery returned funds to the sender
    Refunded,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Refunded
        )
    }
}

/// One ledger entry per executed route leg; append-only, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: Uuid,
    pub sender: Address,
    pub recipient: Address,
    pub route: Route,
    pub status: TransferStatus,

    /// Identifier the adapter returned on acceptance
    pub adapter_transfer_id: Option<String>,

    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Cross-chain bridge adapter capability.
///
/// Every protocol-specific implementation satisfies this contract; the
/// registry, calculator and switch consume nothing else.
#[async_trait]
pub trait BridgeAdapter: Send + Sync + std::fmt::Debug {
    /// Stable adapter identifier, no side effects
    fn name(&self) -> &str;

    /// Pure predicate; must be consistent with `route_metrics` (false here
    /// means metrics for the same parameters must fail)
    async fn supports_route(
        &self,
        token_in: &CrossChainToken,
        token_out: &CrossChainToken,
        from: ChainId,
        to: ChainId,
    ) -> bool;

    /// Current pricing for a route, reflecting live liquidity
    async fn route_metrics(
        &self,
        token_in: &CrossChainToken,
        token_out: &CrossChainToken,
        amount: U256,
        from: ChainId,
        to: ChainId,
    ) -> BridgeResult<RouteMetrics>;

    /// Take custody intent for `route.amount_in` and initiate the
    /// transfer. Returns the adapter's transfer identifier. May resolve
    /// synchronously or leave the transfer pending.
    async fn execute_bridge(
        &self,
        route: &Route,
        recipient: Address,
        auth: &[u8],
    ) -> BridgeResult<String>;

    /// Resolution state of a previously initiated transfer
    async fn transfer_status(&self, id: &str) -> BridgeResult<TransferStatus>;

    async fn estimate_gas(&self, route: &Route) -> BridgeResult<U256>;

    async fn available_liquidity(
        &self,
        token: &CrossChainToken,
        from: ChainId,
        to: ChainId,
    ) -> BridgeResult<U256>;

    /// Historical success rate, 0-100
    async fn success_rate(&self) -> BridgeResult<u8>;

    async fn is_healthy(&self) -> bool;

    /// Adapter-specific [min, max] bounds for one transfer
    async fn transfer_limits(&self, token: &CrossChainToken) -> BridgeResult<(U256, U256)>;
}
