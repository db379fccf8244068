use alloy::primitives::U256;
use once_cell::sync::Lazy;

// Route cache
pub const DEFAULT_ROUTE_CACHE_TTL_SECS: u64 = 60;
pub const MAX_ROUTES_PER_QUERY: usize = 10;

// Multi-path splitting
pub const MAX_SPLIT_ROUTES: usize = 3;

// Rate limiting (in seconds)
pub const MIN_TRANSFER_INTERVAL_SECS: u64 = 10;

// Balanced-mode scoring: wei of cost added per minute of estimated time
pub const DEFAULT_TIME_PENALTY_WEI_PER_MINUTE: u64 = 1;

// Daily volume cap for non-whitelisted users: 1000 ETH
pub static DEFAULT_DAILY_LIMIT_WEI: Lazy<U256> =
    Lazy::new(|| U256::from(1_000u64) * U256::from(10u64).pow(U256::from(18u64)));

// Registry health evaluation
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_FAILURE_RATE_THRESHOLD_BPS: u32 = 2000; // 20%
pub const MIN_TRANSFERS_FOR_HEALTH_EVAL: u64 = 10;

// Reliability score adjustments (basis points)
pub const BPS_SCALE: u32 = 10_000;
pub const RELIABILITY_VOLUME_BONUS_BPS: u32 = 1000;
pub const RELIABILITY_VOLUME_PENALTY_BPS: u32 = 1000;
pub const RELIABILITY_SPEED_BONUS_BPS: u32 = 500;
pub const FAST_COMPLETION_MINUTES: u64 = 15;

// Cumulative volume thresholds for the reliability bonus/penalty: 10k ETH / 10 ETH
pub static HIGH_VOLUME_THRESHOLD_WEI: Lazy<U256> =
    Lazy::new(|| U256::from(10_000u64) * U256::from(10u64).pow(U256::from(18u64)));
pub static LOW_VOLUME_THRESHOLD_WEI: Lazy<U256> =
    Lazy::new(|| U256::from(10u64) * U256::from(10u64).pow(U256::from(18u64)));

// Performance EMA weights: new sample contributes 10%
pub const EMA_KEEP_WEIGHT: u64 = 9;
pub const EMA_TOTAL_WEIGHT: u64 = 10;
