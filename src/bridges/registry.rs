use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::traits::BridgeAdapter;
use crate::constants::{
    BPS_SCALE, DEFAULT_FAILURE_RATE_THRESHOLD_BPS, DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
    EMA_KEEP_WEIGHT, EMA_TOTAL_WEIGHT, FAST_COMPLETION_MINUTES, HIGH_VOLUME_THRESHOLD_WEI,
    LOW_VOLUME_THRESHOLD_WEI, MIN_TRANSFERS_FOR_HEALTH_EVAL, RELIABILITY_SPEED_BONUS_BPS,
    RELIABILITY_VOLUME_BONUS_BPS, RELIABILITY_VOLUME_PENALTY_BPS,
};
use crate::events::{EventBus, SwitchEvent};
use crate::oracle::Clock;
use crate::types::ChainId;

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry-level errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Bridge already registered: {name}")]
    BridgeAlreadyRegistered { name: String },

    #[error("Bridge not registered: {name}")]
    BridgeNotRegistered { name: String },

    #[error("Adapter does not implement the bridge capability")]
    InvalidBridgeAdapter,

    #[error("Health check for {name} throttled, retry in {retry_in_secs}s")]
    HealthCheckThrottled { name: String, retry_in_secs: i64 },
}

/// Lifecycle and health bookkeeping for one registered adapter.
/// Owned exclusively by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeInfo {
    pub name: String,
    pub enabled: bool,
    pub healthy: bool,
    pub registered_at: DateTime<Utc>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub total_transfers: u64,
    pub failed_transfers: u64,
    pub total_volume: U256,
    pub supported_chains: Vec<ChainId>,
    pub supported_tokens: Vec<String>,
}

/// Exponentially smoothed performance data per adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub avg_gas_wei: U256,
    pub avg_completion_minutes: u64,

    /// Success rate in basis points
    pub success_rate_bps: u32,

    /// Derived reliability score in basis points, capped at 10000
    pub reliability_score_bps: u32,

    pub samples: u64,
}

impl PerformanceMetrics {
    /// Fresh adapters start with a perfect record
    fn initial() -> Self {
        Self {
            avg_gas_wei: U256::ZERO,
            avg_completion_minutes: 0,
            success_rate_bps: BPS_SCALE,
            reliability_score_bps: BPS_SCALE,
            samples: 0,
        }
    }
}

/// Health evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    pub health_check_interval_secs: u64,
    pub failure_rate_threshold_bps: u32,
    pub min_transfers_for_health: u64,

    /// Disable an adapter automatically when health degrades
    pub auto_disable: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            health_check_interval_secs: DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
            failure_rate_threshold_bps: DEFAULT_FAILURE_RATE_THRESHOLD_BPS,
            min_transfers_for_health: MIN_TRANSFERS_FOR_HEALTH_EVAL,
            auto_disable: true,
        }
    }
}

/// Owns the set of registered adapters, their enable/health state and
/// per-adapter performance metrics.
#[derive(Debug)]
pub struct BridgeRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn BridgeAdapter>>>,
    info: RwLock<HashMap<String, BridgeInfo>>,
    metrics: RwLock<HashMap<String, PerformanceMetrics>>,
    settings: RegistrySettings,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl BridgeRegistry {
    pub fn new(settings: RegistrySettings, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
            info: RwLock::new(HashMap::new()),
            metrics: RwLock::new(HashMap::new()),
            settings,
            clock,
            events,
        }
    }

    /// Register a new adapter, enabled and healthy, with a perfect
    /// starting record.
    pub async fn register_bridge(
        &self,
        adapter: Arc<dyn BridgeAdapter>,
        chains: Vec<ChainId>,
        tokens: Vec<String>,
    ) -> RegistryResult<()> {
        // Probe the capability before taking any lock for writing
        let name = adapter.name().to_string();
        if name.is_empty() {
            return Err(RegistryError::InvalidBridgeAdapter);
        }

        let mut adapters = self.adapters.write().await;
        if adapters.contains_key(&name) {
            return Err(RegistryError::BridgeAlreadyRegistered { name });
        }

        let now = self.clock.now();
        let mut info = self.info.write().await;
        let mut metrics = self.metrics.write().await;

        info.insert(
            name.clone(),
            BridgeInfo {
                name: name.clone(),
                enabled: true,
                healthy: true,
                registered_at: now,
                last_health_check: None,
                total_transfers: 0,
                failed_transfers: 0,
                total_volume: U256::ZERO,
                supported_chains: chains,
                supported_tokens: tokens,
            },
        );
        metrics.insert(name.clone(), PerformanceMetrics::initial());
        adapters.insert(name.clone(), adapter);

        info!("🌉 Registered bridge adapter: {}", name);
        self.events
            .publish(SwitchEvent::BridgeAdapterRegistered { bridge: name });
        Ok(())
    }

    /// Remove an adapter. Removing an unknown adapter is a no-op.
    pub async fn deregister_bridge(&self, name: &str, reason: &str) {
        let mut adapters = self.adapters.write().await;
        if adapters.remove(name).is_some() {
            self.info.write().await.remove(name);
            self.metrics.write().await.remove(name);
            warn!("Deregistered bridge {}: {}", name, reason);
        }
    }

    pub async fn enable_bridge(&self, name: &str) -> RegistryResult<()> {
        self.set_enabled(name, true, "enabled by operator").await
    }

    pub async fn disable_bridge(&self, name: &str, reason: &str) -> RegistryResult<()> {
        self.set_enabled(name, false, reason).await
    }

    async fn set_enabled(&self, name: &str, enabled: bool, reason: &str) -> RegistryResult<()> {
        let mut info = self.info.write().await;
        let entry = info
            .get_mut(name)
            .ok_or_else(|| RegistryError::BridgeNotRegistered {
                name: name.to_string(),
            })?;
        if entry.enabled == enabled {
            return Ok(()); // idempotent
        }
        entry.enabled = enabled;
        info!(
            "Bridge {} {}: {}",
            name,
            if enabled { "enabled" } else { "disabled" },
            reason
        );
        self.events.publish(SwitchEvent::BridgeAdapterStatusChanged {
            bridge: name.to_string(),
            enabled,
            healthy: entry.healthy,
        });
        Ok(())
    }

    /// Re-evaluate an adapter's health. Throttled per adapter to at most
    /// once per configured interval; health is the conjunction of the
    /// adapter's self-report, the observed failure rate and the smoothed
    /// success rate.
    pub async fn perform_health_check(&self, name: &str) -> RegistryResult<bool> {
        let now = self.clock.now();
        let adapter = {
            let adapters = self.adapters.read().await;
            adapters
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::BridgeNotRegistered {
                    name: name.to_string(),
                })?
        };

        {
            let info = self.info.read().await;
            if let Some(entry) = info.get(name) {
                if let Some(last) = entry.last_health_check {
                    let elapsed = (now - last).num_seconds();
                    let interval = self.settings.health_check_interval_secs as i64;
                    if elapsed < interval {
                        return Err(RegistryError::HealthCheckThrottled {
                            name: name.to_string(),
                            retry_in_secs: interval - elapsed,
                        });
                    }
                }
            }
        }

        let self_report = adapter.is_healthy().await;

        let mut info = self.info.write().await;
        let metrics = self.metrics.read().await;
        let entry = info
            .get_mut(name)
            .ok_or_else(|| RegistryError::BridgeNotRegistered {
                name: name.to_string(),
            })?;

        let failure_ok = if entry.total_transfers >= self.settings.min_transfers_for_health {
            let failure_bps =
                (entry.failed_transfers * BPS_SCALE as u64 / entry.total_transfers) as u32;
            failure_bps <= self.settings.failure_rate_threshold_bps
        } else {
            true
        };
        let success_ok = metrics
            .get(name)
            .map(|m| m.success_rate_bps >= BPS_SCALE - self.settings.failure_rate_threshold_bps)
            .unwrap_or(true);

        let healthy = self_report && failure_ok && success_ok;
        let degraded = entry.healthy && !healthy;
        entry.healthy = healthy;
        entry.last_health_check = Some(now);

        if degraded {
            warn!(
                "Bridge {} health degraded (self_report={}, failure_ok={}, success_ok={})",
                name, self_report, failure_ok, success_ok
            );
        }
        if degraded && self.settings.auto_disable && entry.enabled {
            entry.enabled = false;
            warn!("Bridge {} auto-disabled after failed health check", name);
        }
        self.events.publish(SwitchEvent::BridgeAdapterStatusChanged {
            bridge: name.to_string(),
            enabled: entry.enabled,
            healthy,
        });
        Ok(healthy)
    }

    /// Record a terminal transfer outcome attributable to an adapter and
    /// refresh its smoothed metrics.
    pub async fn record_outcome(
        &self,
        name: &str,
        gas_wei: U256,
        completion_minutes: u64,
        success: bool,
        volume: U256,
    ) {
        let mut info = self.info.write().await;
        let Some(entry) = info.get_mut(name) else {
            debug!("Outcome for unregistered bridge {} dropped", name);
            return;
        };
        entry.total_transfers += 1;
        if !success {
            entry.failed_transfers += 1;
        }
        entry.total_volume += volume;

        let mut metrics = self.metrics.write().await;
        let Some(m) = metrics.get_mut(name) else {
            return;
        };

        // 90/10 exponential moving average
        if m.samples == 0 {
            m.avg_gas_wei = gas_wei;
            m.avg_completion_minutes = completion_minutes;
        } else {
            m.avg_gas_wei = (m.avg_gas_wei * U256::from(EMA_KEEP_WEIGHT) + gas_wei)
                / U256::from(EMA_TOTAL_WEIGHT);
            m.avg_completion_minutes =
                (m.avg_completion_minutes * EMA_KEEP_WEIGHT + completion_minutes)
                    / EMA_TOTAL_WEIGHT;
        }
        m.samples += 1;
        m.success_rate_bps = ((entry.total_transfers - entry.failed_transfers)
            * BPS_SCALE as u64
            / entry.total_transfers) as u32;

        // Reliability: success rate, volume bonus/penalty, speed bonus
        let mut score = m.success_rate_bps as i64;
        if entry.total_volume >= *HIGH_VOLUME_THRESHOLD_WEI {
            score += RELIABILITY_VOLUME_BONUS_BPS as i64;
        } else if entry.total_volume < *LOW_VOLUME_THRESHOLD_WEI {
            score -= RELIABILITY_VOLUME_PENALTY_BPS as i64;
        }
        if m.avg_completion_minutes < FAST_COMPLETION_MINUTES {
            score += RELIABILITY_SPEED_BONUS_BPS as i64;
        }
        m.reliability_score_bps = score.clamp(0, BPS_SCALE as i64) as u32;

        debug!(
            "📊 {} outcome recorded: success={}, success_rate={}bps, reliability={}bps",
            name, success, m.success_rate_bps, m.reliability_score_bps
        );
    }

    /// Names of all enabled adapters
    pub async fn enabled_bridges(&self) -> Vec<String> {
        let info = self.info.read().await;
        info.values()
            .filter(|entry| entry.enabled)
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Names of enabled and healthy adapters serving a chain
    pub async fn bridges_for_chain(&self, chain: ChainId) -> Vec<String> {
        let info = self.info.read().await;
        info.values()
            .filter(|entry| entry.enabled && entry.healthy && entry.supported_chains.contains(&chain))
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Enabled, healthy adapters that serve both ends of a route
    pub async fn candidates_for_route(
        &self,
        from: ChainId,
        to: ChainId,
    ) -> Vec<Arc<dyn BridgeAdapter>> {
        let info = self.info.read().await;
        let adapters = self.adapters.read().await;
        info.values()
            .filter(|entry| {
                entry.enabled
                    && entry.healthy
                    && entry.supported_chains.contains(&from)
                    && entry.supported_chains.contains(&to)
            })
            .filter_map(|entry| adapters.get(&entry.name).cloned())
            .collect()
    }

    pub async fn supports_chain(&self, name: &str, chain: ChainId) -> bool {
        let info = self.info.read().await;
        info.get(name)
            .map(|entry| entry.supported_chains.contains(&chain))
            .unwrap_or(false)
    }

    pub async fn bridge_details(&self, name: &str) -> Option<BridgeInfo> {
        self.info.read().await.get(name).cloned()
    }

    pub async fn adapter(&self, name: &str) -> Option<Arc<dyn BridgeAdapter>> {
        self.adapters.read().await.get(name).cloned()
    }

    pub async fn metrics(&self, name: &str) -> Option<PerformanceMetrics> {
        self.metrics.read().await.get(name).cloned()
    }
}
