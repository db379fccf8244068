use alloy::primitives::U256;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::bridges::registry::RegistrySettings;
use crate::constants::{
    DEFAULT_DAILY_LIMIT_WEI, DEFAULT_ROUTE_CACHE_TTL_SECS, DEFAULT_TIME_PENALTY_WEI_PER_MINUTE,
    MAX_ROUTES_PER_QUERY, MAX_SPLIT_ROUTES, MIN_TRANSFER_INTERVAL_SECS,
};
use crate::types::ChainId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    pub chain: ChainId,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSettings {
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSettings {
    pub cache_ttl_secs: u64,
    pub max_routes: usize,
    pub max_split_routes: usize,

    /// Balanced-mode weight: wei of cost added per minute of travel time
    pub time_penalty_wei_per_minute: u64,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_ROUTE_CACHE_TTL_SECS,
            max_routes: MAX_ROUTES_PER_QUERY,
            max_split_routes: MAX_SPLIT_ROUTES,
            time_penalty_wei_per_minute: DEFAULT_TIME_PENALTY_WEI_PER_MINUTE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    pub min_transfer_interval_secs: u64,
    pub daily_limit_wei: U256,

    /// Switch fee in basis points, collected on every execution
    pub fee_bps: u32,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            min_transfer_interval_secs: MIN_TRANSFER_INTERVAL_SECS,
            daily_limit_wei: *DEFAULT_DAILY_LIMIT_WEI,
            fee_bps: 10,
        }
    }
}

/// Top-level switch configuration, loadable from TOML with env overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchConfig {
    #[serde(default = "default_chains")]
    pub chains: Vec<ChainSettings>,

    #[serde(default = "default_tokens")]
    pub tokens: Vec<TokenSettings>,

    #[serde(default)]
    pub routing: RoutingSettings,

    #[serde(default)]
    pub limits: LimitSettings,

    #[serde(default)]
    pub registry: RegistrySettings,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            tokens: default_tokens(),
            routing: RoutingSettings::default(),
            limits: LimitSettings::default(),
            registry: RegistrySettings::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_chains() -> Vec<ChainSettings> {
    ChainId::all()
        .into_iter()
        .map(|chain| ChainSettings {
            chain,
            enabled: true,
        })
        .collect()
}

fn default_tokens() -> Vec<TokenSettings> {
    [("USDC", 6u8), ("USDT", 6), ("WETH", 18)]
        .into_iter()
        .map(|(symbol, decimals)| TokenSettings {
            symbol: symbol.to_string(),
            decimals,
        })
        .collect()
}

impl SwitchConfig {
    /// Load configuration from a TOML file, with `SWITCH_`-prefixed
    /// environment variables taking precedence. A missing file yields the
    /// defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(std::path::Path::new(path)).required(false))
            .add_source(config::Environment::with_prefix("SWITCH").separator("__"))
            .build()
            .context("failed to assemble configuration sources")?;

        settings
            .try_deserialize()
            .context("failed to parse switch configuration")
    }

    pub fn enabled_chains(&self) -> Vec<ChainId> {
        self.chains
            .iter()
            .filter(|settings| settings.enabled)
            .map(|settings| settings.chain)
            .collect()
    }

    pub fn token_symbols(&self) -> Vec<String> {
        self.tokens
            .iter()
            .map(|settings| settings.symbol.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_all_chains() {
        let config = SwitchConfig::default();
        assert_eq!(config.enabled_chains().len(), ChainId::all().len());
        assert!(config.token_symbols().contains(&"USDC".to_string()));
        assert_eq!(config.routing.cache_ttl_secs, DEFAULT_ROUTE_CACHE_TTL_SECS);
        assert_eq!(config.routing.max_split_routes, MAX_SPLIT_ROUTES);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SwitchConfig::default();
        let rendered = toml::to_string(&config).unwrap();
        let parsed: SwitchConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.routing.cache_ttl_secs, config.routing.cache_ttl_secs);
        assert_eq!(parsed.limits.daily_limit_wei, config.limits.daily_limit_wei);
        assert_eq!(parsed.chains.len(), config.chains.len());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = SwitchConfig::load("/nonexistent/switch").unwrap();
        assert_eq!(
            config.limits.min_transfer_interval_secs,
            MIN_TRANSFER_INTERVAL_SECS
        );
        assert_eq!(config.limits.daily_limit_wei, *DEFAULT_DAILY_LIMIT_WEI);
    }
}
