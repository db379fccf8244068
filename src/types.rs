use std::collections::HashMap;

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported chains
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChainId {
    Ethereum,
    Polygon,
    BSC,
    Arbitrum,
    Optimism,
    Avalanche,
}

impl ChainId {
    pub fn name(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ethereum",
            ChainId::Polygon => "polygon",
            ChainId::BSC => "bsc",
            ChainId::Arbitrum => "arbitrum",
            ChainId::Optimism => "optimism",
            ChainId::Avalanche => "avalanche",
        }
    }

    pub fn all() -> [ChainId; 6] {
        [
            ChainId::Ethereum,
            ChainId::Polygon,
            ChainId::BSC,
            ChainId::Arbitrum,
            ChainId::Optimism,
            ChainId::Avalanche,
        ]
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Token that exists on multiple chains
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrossChainToken {
    pub symbol: String,
    pub addresses: HashMap<ChainId, Address>,
    pub decimals: u8,
}

impl CrossChainToken {
    pub fn new(symbol: &str, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            addresses: HashMap::new(),
            decimals,
        }
    }

    pub fn address_on(&self, chain: ChainId) -> Option<Address> {
        self.addresses.get(&chain).copied()
    }
}

/// Route optimization objective
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum RoutingMode {
    /// Minimize total cost (gas + protocol fees)
    Cheapest,
    /// Minimize completion time, ties broken by cost
    Fastest,
    /// Cost plus a per-minute time penalty
    #[default]
    Balanced,
}

impl RoutingMode {
    pub fn name(&self) -> &'static str {
        match self {
            RoutingMode::Cheapest => "cheapest",
            RoutingMode::Fastest => "fastest",
            RoutingMode::Balanced => "balanced",
        }
    }
}

/// Caller preferences for route discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePreferences {
    pub mode: RoutingMode,

    /// Max acceptable slippage in basis points
    pub max_slippage_bps: u32,

    /// Allow splitting the transfer across multiple bridges
    pub allow_multi_path: bool,
}

impl Default for RoutePreferences {
    fn default() -> Self {
        Self {
            mode: RoutingMode::Balanced,
            max_slippage_bps: 50,
            allow_multi_path: false,
        }
    }
}

/// Per-user rate limiting and daily volume accounting.
///
/// The daily counter resets lazily: the next write after a full day has
/// elapsed starts a new window. There is no background timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLimits {
    pub daily_transferred: U256,
    pub window_started_at: DateTime<Utc>,
    pub last_transfer_at: Option<DateTime<Utc>>,
    pub transfer_count: u64,
    pub whitelisted: bool,
}

impl UserLimits {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            daily_transferred: U256::ZERO,
            window_started_at: now,
            last_transfer_at: None,
            transfer_count: 0,
            whitelisted: false,
        }
    }

    /// Start a new daily window if a full day has elapsed.
    pub fn roll_window(&mut self, now: DateTime<Utc>) {
        if now - self.window_started_at >= chrono::Duration::days(1) {
            self.daily_transferred = U256::ZERO;
            self.window_started_at = now;
        }
    }
}
