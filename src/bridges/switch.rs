use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::calculator::{RouteCalculator, RouteError};
use super::registry::{BridgeRegistry, RegistryError, RegistryResult};
use super::traits::{
    BridgeAdapter, BridgeError, MultiPathRoute, Route, Transfer, TransferStatus,
};
use crate::config::SwitchConfig;
use crate::constants::BPS_SCALE;
use crate::events::{EventBus, SwitchEvent};
use crate::oracle::{Clock, CustodyError, FeeEngine, TokenVault};
use crate::types::{ChainId, CrossChainToken, RoutePreferences, UserLimits};

pub type SwitchResult<T> = Result<T, SwitchError>;

/// Orchestrator-level errors, ordered by detection phase
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    // -- validation: before any state mutation --
    #[error("Chain not supported: {chain}")]
    ChainNotSupported { chain: ChainId },

    #[error("Token not supported: {token}")]
    TokenNotSupported { token: String },

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Invalid recipient")]
    InvalidRecipient,

    #[error("Invalid slippage: {bps} bps")]
    InvalidSlippage { bps: u32 },

    #[error("Route expired at {deadline}")]
    RouteExpired { deadline: DateTime<Utc> },

    #[error("Multi-path route violates its amount invariants")]
    InvalidMultiPath,

    // -- policy: after identity checks, before custody --
    #[error("Address is blacklisted: {address}")]
    Blacklisted { address: Address },

    #[error("Daily limit exceeded: {attempted} > {limit}")]
    DailyLimitExceeded { attempted: U256, limit: U256 },

    #[error("Transfer too frequent, retry in {retry_in_secs}s")]
    TransferTooFrequent { retry_in_secs: i64 },

    #[error("Switch is paused")]
    Paused,

    // -- discovery --
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("No adapter registered for bridge {bridge}")]
    BridgeAdapterNotSet { bridge: String },

    // -- adapter boundary, propagated without retry --
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    // -- execution --
    #[error("Multi-path execution failed: {failed} of {total} legs failed")]
    MultiPathExecutionFailed { failed: usize, total: usize },

    #[error("Transfer not found: {id}")]
    TransferNotFound { id: Uuid },

    #[error("Transfer {id} cannot be refunded from {status:?}")]
    NotRefundable { id: Uuid, status: TransferStatus },

    // -- authorization / custody --
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid permit data")]
    InvalidPermitData,

    #[error("Custody failed: {0}")]
    CustodyFailed(CustodyError),
}

fn map_custody(err: CustodyError) -> SwitchError {
    match err {
        CustodyError::PermitRejected => SwitchError::InvalidPermitData,
        other => SwitchError::CustodyFailed(other),
    }
}

/// Capability token gating the admin surface. Only the holder of the cap
/// issued at construction can mutate switch policy.
#[derive(Debug, Clone)]
pub struct AdminCap {
    key: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteCacheKey {
    token_in: String,
    token_out: String,
    amount: U256,
    source: ChainId,
    dest: ChainId,
    mode: crate::types::RoutingMode,
    max_routes: usize,
}

/// Cached discovery result. Validity is derived from `cached_at` and the
/// TTL at read time, never stored as a flag.
#[derive(Debug, Clone)]
struct CachedRoutes {
    routes: Vec<Route>,
    cached_at: DateTime<Utc>,
    ttl: Duration,
}

impl CachedRoutes {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.cached_at < self.ttl
    }
}

/// Public entry point: validates requests, consults the calculator with
/// caching, enforces per-user rate and daily limits, executes single and
/// multi-path transfers and keeps the transfer ledger.
#[derive(Debug)]
pub struct SettlementSwitch {
    registry: Arc<BridgeRegistry>,
    calculator: RouteCalculator,
    vault: Arc<dyn TokenVault>,
    fees: Arc<dyn FeeEngine>,
    clock: Arc<dyn Clock>,
    events: EventBus,

    route_cache: DashMap<RouteCacheKey, CachedRoutes>,
    ledger: DashMap<Uuid, Transfer>,
    user_history: DashMap<Address, Vec<Uuid>>,

    /// Per-user critical section for the limits read-check-write sequence
    user_limits: DashMap<Address, Arc<Mutex<UserLimits>>>,
    daily_limit_overrides: DashMap<Address, U256>,
    blacklist: DashSet<Address>,

    supported_chains: DashSet<ChainId>,
    supported_tokens: DashSet<String>,

    paused: AtomicBool,
    default_daily_limit: RwLock<U256>,
    cache_ttl: RwLock<Duration>,
    min_transfer_interval: Duration,
    max_split_routes: usize,

    admin_key: Uuid,
}

impl SettlementSwitch {
    pub fn new(
        config: &SwitchConfig,
        registry: Arc<BridgeRegistry>,
        vault: Arc<dyn TokenVault>,
        fees: Arc<dyn FeeEngine>,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> (Arc<Self>, AdminCap) {
        let calculator =
            RouteCalculator::new(registry.clone(), clock.clone(), config.routing.clone());
        let admin_key = Uuid::new_v4();

        let switch = Arc::new(Self {
            registry,
            calculator,
            vault,
            fees,
            clock,
            events,
            route_cache: DashMap::new(),
            ledger: DashMap::new(),
            user_history: DashMap::new(),
            user_limits: DashMap::new(),
            daily_limit_overrides: DashMap::new(),
            blacklist: DashSet::new(),
            supported_chains: config.enabled_chains().into_iter().collect(),
            supported_tokens: config.token_symbols().into_iter().collect(),
            paused: AtomicBool::new(false),
            default_daily_limit: RwLock::new(config.limits.daily_limit_wei),
            cache_ttl: RwLock::new(Duration::seconds(config.routing.cache_ttl_secs as i64)),
            min_transfer_interval: Duration::seconds(
                config.limits.min_transfer_interval_secs as i64,
            ),
            max_split_routes: config.routing.max_split_routes,
            admin_key,
        });
        (switch, AdminCap { key: admin_key })
    }

    // ------------------------------------------------------------------
    // Route discovery
    // ------------------------------------------------------------------

    /// Best route for the request, served from cache when fresh
    pub async fn find_optimal_route(
        &self,
        token_in: &CrossChainToken,
        token_out: &CrossChainToken,
        amount: U256,
        from: ChainId,
        to: ChainId,
        prefs: &RoutePreferences,
    ) -> SwitchResult<Route> {
        let mut routes = self
            .find_multiple_routes(token_in, token_out, amount, from, to, prefs, 1)
            .await?;
        Ok(routes.remove(0))
    }

    /// Up to `max_routes` ranked routes, served from cache when fresh
    #[allow(clippy::too_many_arguments)]
    pub async fn find_multiple_routes(
        &self,
        token_in: &CrossChainToken,
        token_out: &CrossChainToken,
        amount: U256,
        from: ChainId,
        to: ChainId,
        prefs: &RoutePreferences,
        max_routes: usize,
    ) -> SwitchResult<Vec<Route>> {
        self.validate_query(token_in, token_out, amount, from, to, prefs)?;

        let key = RouteCacheKey {
            token_in: token_in.symbol.clone(),
            token_out: token_out.symbol.clone(),
            amount,
            source: from,
            dest: to,
            mode: prefs.mode,
            max_routes,
        };
        let now = self.clock.now();
        if let Some(cached) = self.route_cache.get(&key) {
            if cached.is_fresh(now) {
                debug!("Route cache hit for {} -> {}", from, to);
                return Ok(cached.routes.clone());
            }
        }

        let routes = self
            .calculator
            .find_routes(token_in, token_out, amount, from, to, prefs, max_routes)
            .await?;

        let best = &routes[0];
        self.events.publish(SwitchEvent::RouteCalculated {
            bridge: best.bridge.clone(),
            source_chain: from,
            dest_chain: to,
            amount_in: best.amount_in,
            amount_out: best.amount_out,
        });
        self.events.publish(SwitchEvent::RouteCacheUpdated {
            bridge: best.bridge.clone(),
            source_chain: from,
            dest_chain: to,
        });
        let ttl = *self.cache_ttl.read().unwrap();
        self.route_cache.insert(
            key,
            CachedRoutes {
                routes: routes.clone(),
                cached_at: now,
                ttl,
            },
        );
        Ok(routes)
    }

    /// Split a large transfer across up to `max_split_routes` ranked
    /// routes. Allocation is `remaining / legs_left` per leg, with the
    /// last leg taking the exact remainder, so the sum always matches the
    /// requested total.
    #[allow(clippy::too_many_arguments)]
    pub async fn find_multi_path_route(
        &self,
        token_in: &CrossChainToken,
        token_out: &CrossChainToken,
        total_amount: U256,
        from: ChainId,
        to: ChainId,
        prefs: &RoutePreferences,
    ) -> SwitchResult<MultiPathRoute> {
        self.validate_query(token_in, token_out, total_amount, from, to, prefs)?;

        // Screen candidates at the per-share size so adapters that can
        // carry a share (but not the whole) still qualify
        let split = U256::from(self.max_split_routes as u64);
        let mut share = total_amount / split;
        if share.is_zero() {
            share = total_amount;
        }
        let routes = self
            .calculator
            .find_routes(token_in, token_out, share, from, to, prefs, self.max_split_routes)
            .await?;

        let legs = routes.len().min(self.max_split_routes);
        let mut amounts = Vec::with_capacity(legs);
        let mut remaining = total_amount;
        for i in 0..legs {
            let left = (legs - i) as u64;
            let allocation = if i == legs - 1 {
                remaining
            } else {
                remaining / U256::from(left)
            };
            amounts.push(allocation);
            remaining -= allocation;
        }

        let multi_path = MultiPathRoute {
            routes: routes.into_iter().take(legs).collect(),
            amounts,
            total_amount,
        };
        debug_assert!(multi_path.validate());
        info!(
            "Split {} across {} leg(s): {:?}",
            total_amount, legs, multi_path.amounts
        );
        Ok(multi_path)
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Execute a single previously discovered route.
    ///
    /// Order of effects is fixed: validation, per-user limit commit,
    /// custody debit and fee collection, ledger append, and only then the
    /// adapter call. Adapter code can never observe half-applied limits.
    pub async fn execute_bridge(
        &self,
        route: &Route,
        sender: Address,
        recipient: Address,
        auth: &[u8],
    ) -> SwitchResult<Uuid> {
        self.ensure_not_paused()?;
        self.ensure_not_blacklisted(sender)?;
        self.ensure_not_blacklisted(recipient)?;
        if route.amount_in.is_zero() || route.amount_out.is_zero() {
            return Err(SwitchError::InvalidAmount);
        }
        if recipient == Address::ZERO {
            return Err(SwitchError::InvalidRecipient);
        }
        if route.is_expired(self.clock.now()) {
            return Err(SwitchError::RouteExpired {
                deadline: route.deadline,
            });
        }
        let adapter = self
            .registry
            .adapter(&route.bridge)
            .await
            .ok_or_else(|| SwitchError::BridgeAdapterNotSet {
                bridge: route.bridge.clone(),
            })?;

        // Policy checks and the limits write share one critical section
        // per sender; custody is debited inside it so a rejected debit
        // leaves the counters untouched.
        let now = self
            .check_and_commit_limits(sender, route.amount_in, |_| {
                self.vault
                    .debit(
                        sender,
                        &route.token_in.symbol,
                        route.source_chain,
                        route.amount_in,
                        auth,
                    )
                    .map_err(map_custody)
            })
            .await?;

        let fee = self.fees.calculate_fee(route.amount_in);
        self.fees.collect_fee(sender, fee);

        // Ledger commit before handing control to adapter code
        let transfer_id = Uuid::new_v4();
        self.ledger.insert(
            transfer_id,
            Transfer {
                id: transfer_id,
                sender,
                recipient,
                route: route.clone(),
                status: TransferStatus::Pending,
                adapter_transfer_id: None,
                initiated_at: now,
                completed_at: None,
            },
        );
        self.user_history
            .entry(sender)
            .or_default()
            .push(transfer_id);
        self.events.publish(SwitchEvent::TransferInitiated {
            transfer_id,
            bridge: route.bridge.clone(),
            sender,
            recipient,
            amount: route.amount_in,
        });
        info!(
            "🚀 Transfer {} via {}: {} {} {} -> {}",
            transfer_id,
            route.bridge,
            route.amount_in,
            route.token_in.symbol,
            route.source_chain,
            route.dest_chain
        );

        match adapter.execute_bridge(route, recipient, auth).await {
            Ok(adapter_id) => {
                if let Some(mut transfer) = self.ledger.get_mut(&transfer_id) {
                    transfer.status = TransferStatus::Confirmed;
                    transfer.adapter_transfer_id = Some(adapter_id.clone());
                }
                // Adapters may resolve synchronously; pick that up now
                if let Ok(status) = adapter.transfer_status(&adapter_id).await {
                    if status.is_terminal() {
                        self.apply_resolution(transfer_id, status).await;
                    }
                }
                Ok(transfer_id)
            }
            Err(e) => {
                warn!("Transfer {} rejected by {}: {}", transfer_id, route.bridge, e);
                self.mark_failed(transfer_id, &e.to_string()).await;
                Err(e.into())
            }
        }
    }

    /// Execute every leg of a multi-path route independently. A failed
    /// leg is recorded and does not roll back earlier legs.
    pub async fn execute_multi_path(
        &self,
        multi_path: &MultiPathRoute,
        sender: Address,
        recipient: Address,
        auth: &[u8],
    ) -> SwitchResult<Vec<Uuid>> {
        self.ensure_not_paused()?;
        self.ensure_not_blacklisted(sender)?;
        self.ensure_not_blacklisted(recipient)?;
        if !multi_path.validate() {
            return Err(SwitchError::InvalidMultiPath);
        }
        if multi_path.total_amount.is_zero() {
            return Err(SwitchError::InvalidAmount);
        }
        if recipient == Address::ZERO {
            return Err(SwitchError::InvalidRecipient);
        }
        let now = self.clock.now();
        if multi_path.routes.iter().any(|route| route.is_expired(now)) {
            return Err(SwitchError::RouteExpired {
                deadline: multi_path
                    .routes
                    .iter()
                    .map(|route| route.deadline)
                    .min()
                    .unwrap_or(now),
            });
        }

        // Rate and daily limits apply to the total, committed once
        self.check_and_commit_limits(sender, multi_path.total_amount, |_| Ok(()))
            .await?;

        let mut transfer_ids = Vec::with_capacity(multi_path.routes.len());
        let mut failed = 0usize;
        for (route, allocation) in multi_path.routes.iter().zip(&multi_path.amounts) {
            match self
                .execute_leg(route, *allocation, sender, recipient, auth)
                .await
            {
                Ok(id) => transfer_ids.push(id),
                Err(e) => {
                    warn!("Multi-path leg via {} failed: {}", route.bridge, e);
                    failed += 1;
                }
            }
        }

        self.events.publish(SwitchEvent::MultiPathTransferInitiated {
            transfer_ids: transfer_ids.clone(),
            total_amount: multi_path.total_amount,
        });
        if failed > 0 {
            return Err(SwitchError::MultiPathExecutionFailed {
                failed,
                total: multi_path.routes.len(),
            });
        }
        Ok(transfer_ids)
    }

    /// One leg: custody, ledger, adapter. Limits were already committed
    /// for the whole multi-path amount.
    async fn execute_leg(
        &self,
        route: &Route,
        allocation: U256,
        sender: Address,
        recipient: Address,
        auth: &[u8],
    ) -> SwitchResult<Uuid> {
        let adapter = self
            .registry
            .adapter(&route.bridge)
            .await
            .ok_or_else(|| SwitchError::BridgeAdapterNotSet {
                bridge: route.bridge.clone(),
            })?;

        // Scale the quoted route to this leg's allocation
        let leg_route = scale_route(route, allocation);

        self.vault
            .debit(
                sender,
                &leg_route.token_in.symbol,
                leg_route.source_chain,
                allocation,
                auth,
            )
            .map_err(map_custody)?;
        let fee = self.fees.calculate_fee(allocation);
        self.fees.collect_fee(sender, fee);

        let transfer_id = Uuid::new_v4();
        let now = self.clock.now();
        self.ledger.insert(
            transfer_id,
            Transfer {
                id: transfer_id,
                sender,
                recipient,
                route: leg_route.clone(),
                status: TransferStatus::Pending,
                adapter_transfer_id: None,
                initiated_at: now,
                completed_at: None,
            },
        );
        self.user_history
            .entry(sender)
            .or_default()
            .push(transfer_id);
        self.events.publish(SwitchEvent::TransferInitiated {
            transfer_id,
            bridge: leg_route.bridge.clone(),
            sender,
            recipient,
            amount: allocation,
        });

        match adapter.execute_bridge(&leg_route, recipient, auth).await {
            Ok(adapter_id) => {
                if let Some(mut transfer) = self.ledger.get_mut(&transfer_id) {
                    transfer.status = TransferStatus::Confirmed;
                    transfer.adapter_transfer_id = Some(adapter_id.clone());
                }
                if let Ok(status) = adapter.transfer_status(&adapter_id).await {
                    if status.is_terminal() {
                        self.apply_resolution(transfer_id, status).await;
                    }
                }
                Ok(transfer_id)
            }
            Err(e) => {
                self.mark_failed(transfer_id, &e.to_string()).await;
                Err(e.into())
            }
        }
    }

    /// Route discovery and execution in one call
    #[allow(clippy::too_many_arguments)]
    pub async fn bridge_with_auto_route(
        &self,
        token_in: &CrossChainToken,
        token_out: &CrossChainToken,
        amount: U256,
        from: ChainId,
        to: ChainId,
        prefs: &RoutePreferences,
        sender: Address,
        recipient: Address,
        auth: &[u8],
    ) -> SwitchResult<Uuid> {
        let route = self
            .find_optimal_route(token_in, token_out, amount, from, to, prefs)
            .await?;
        self.execute_bridge(&route, sender, recipient, auth).await
    }

    /// Poll the adapter for a non-terminal transfer and apply its
    /// resolution if one is available. Lazy counterpart to asynchronous
    /// adapter completion; there is no background poller.
    pub async fn resolve_transfer(&self, id: Uuid) -> SwitchResult<TransferStatus> {
        let (bridge, adapter_id, status) = {
            let transfer = self
                .ledger
                .get(&id)
                .ok_or(SwitchError::TransferNotFound { id })?;
            (
                transfer.route.bridge.clone(),
                transfer.adapter_transfer_id.clone(),
                transfer.status,
            )
        };
        if status.is_terminal() {
            return Ok(status);
        }
        let Some(adapter_id) = adapter_id else {
            return Ok(status);
        };
        let adapter = self
            .registry
            .adapter(&bridge)
            .await
            .ok_or(SwitchError::BridgeAdapterNotSet { bridge })?;
        let adapter_status = adapter.transfer_status(&adapter_id).await?;
        if adapter_status.is_terminal() {
            self.apply_resolution(id, adapter_status).await;
            return Ok(adapter_status);
        }
        Ok(adapter_status)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn transfer(&self, id: Uuid) -> Option<Transfer> {
        self.ledger.get(&id).map(|transfer| transfer.clone())
    }

    pub fn user_transfers(&self, user: Address) -> Vec<Transfer> {
        self.user_history
            .get(&user)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.ledger.get(id).map(|transfer| transfer.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn user_limits(&self, user: Address) -> Option<UserLimits> {
        let cell = self.user_limits.get(&user)?.clone();
        let limits = cell.lock().await;
        Some(limits.clone())
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &Arc<BridgeRegistry> {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Admin surface, capability-gated
    // ------------------------------------------------------------------

    fn authorize(&self, cap: &AdminCap) -> SwitchResult<()> {
        if cap.key != self.admin_key {
            return Err(SwitchError::Unauthorized);
        }
        Ok(())
    }

    pub fn pause(&self, cap: &AdminCap) -> SwitchResult<()> {
        self.authorize(cap)?;
        self.paused.store(true, Ordering::SeqCst);
        warn!("⛔ Switch paused");
        self.events.publish(SwitchEvent::EmergencyPause { paused: true });
        Ok(())
    }

    pub fn unpause(&self, cap: &AdminCap) -> SwitchResult<()> {
        self.authorize(cap)?;
        self.paused.store(false, Ordering::SeqCst);
        info!("Switch unpaused");
        self.events.publish(SwitchEvent::EmergencyPause { paused: false });
        Ok(())
    }

    pub fn set_chain_support(
        &self,
        cap: &AdminCap,
        chain: ChainId,
        supported: bool,
    ) -> SwitchResult<()> {
        self.authorize(cap)?;
        if supported {
            self.supported_chains.insert(chain);
        } else {
            self.supported_chains.remove(&chain);
        }
        self.events
            .publish(SwitchEvent::ChainConfigUpdated { chain, supported });
        Ok(())
    }

    pub fn set_token_support(
        &self,
        cap: &AdminCap,
        symbol: &str,
        supported: bool,
    ) -> SwitchResult<()> {
        self.authorize(cap)?;
        if supported {
            self.supported_tokens.insert(symbol.to_string());
        } else {
            self.supported_tokens.remove(symbol);
        }
        Ok(())
    }

    pub fn set_default_daily_limit(&self, cap: &AdminCap, limit: U256) -> SwitchResult<()> {
        self.authorize(cap)?;
        *self.default_daily_limit.write().unwrap() = limit;
        Ok(())
    }

    pub fn set_user_daily_limit(
        &self,
        cap: &AdminCap,
        user: Address,
        limit: Option<U256>,
    ) -> SwitchResult<()> {
        self.authorize(cap)?;
        match limit {
            Some(limit) => {
                self.daily_limit_overrides.insert(user, limit);
            }
            None => {
                self.daily_limit_overrides.remove(&user);
            }
        }
        self.events.publish(SwitchEvent::UserLimitsUpdated { user });
        Ok(())
    }

    pub async fn set_user_whitelist(
        &self,
        cap: &AdminCap,
        user: Address,
        whitelisted: bool,
    ) -> SwitchResult<()> {
        self.authorize(cap)?;
        let now = self.clock.now();
        let cell = self
            .user_limits
            .entry(user)
            .or_insert_with(|| Arc::new(Mutex::new(UserLimits::new(now))))
            .clone();
        let mut limits = cell.lock().await;
        limits.whitelisted = whitelisted;
        self.events.publish(SwitchEvent::UserLimitsUpdated { user });
        Ok(())
    }

    pub fn set_blacklisted(
        &self,
        cap: &AdminCap,
        user: Address,
        blacklisted: bool,
    ) -> SwitchResult<()> {
        self.authorize(cap)?;
        if blacklisted {
            self.blacklist.insert(user);
        } else {
            self.blacklist.remove(&user);
        }
        self.events
            .publish(SwitchEvent::BlacklistUpdated { user, blacklisted });
        Ok(())
    }

    pub fn set_cache_ttl(&self, cap: &AdminCap, ttl_secs: u64) -> SwitchResult<()> {
        self.authorize(cap)?;
        *self.cache_ttl.write().unwrap() = Duration::seconds(ttl_secs as i64);
        Ok(())
    }

    /// Administrative recovery: return a failed transfer's input funds to
    /// the sender. Only reachable from Failed, never automatic.
    pub fn refund_transfer(&self, cap: &AdminCap, id: Uuid) -> SwitchResult<()> {
        self.authorize(cap)?;
        let mut transfer = self
            .ledger
            .get_mut(&id)
            .ok_or(SwitchError::TransferNotFound { id })?;
        if transfer.status != TransferStatus::Failed {
            return Err(SwitchError::NotRefundable {
                id,
                status: transfer.status,
            });
        }
        self.vault.credit(
            transfer.sender,
            &transfer.route.token_in.symbol,
            transfer.route.source_chain,
            transfer.route.amount_in,
        );
        transfer.status = TransferStatus::Refunded;
        info!("↩️ Transfer {} refunded to {}", id, transfer.sender);
        Ok(())
    }

    pub async fn register_bridge(
        &self,
        cap: &AdminCap,
        adapter: Arc<dyn BridgeAdapter>,
        chains: Vec<ChainId>,
        tokens: Vec<String>,
    ) -> SwitchResult<()> {
        self.authorize(cap)?;
        self.registry
            .register_bridge(adapter, chains, tokens)
            .await?;
        Ok(())
    }

    pub async fn enable_bridge(&self, cap: &AdminCap, name: &str) -> SwitchResult<()> {
        self.authorize(cap)?;
        self.registry.enable_bridge(name).await?;
        Ok(())
    }

    pub async fn disable_bridge(
        &self,
        cap: &AdminCap,
        name: &str,
        reason: &str,
    ) -> SwitchResult<()> {
        self.authorize(cap)?;
        self.registry.disable_bridge(name, reason).await?;
        Ok(())
    }

    /// Health checks are throttled by the registry, not capability-gated
    pub async fn health_check(&self, name: &str) -> RegistryResult<bool> {
        self.registry.perform_health_check(name).await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_not_paused(&self) -> SwitchResult<()> {
        if self.paused.load(Ordering::SeqCst) {
            return Err(SwitchError::Paused);
        }
        Ok(())
    }

    fn ensure_not_blacklisted(&self, address: Address) -> SwitchResult<()> {
        if self.blacklist.contains(&address) {
            return Err(SwitchError::Blacklisted { address });
        }
        Ok(())
    }

    fn validate_query(
        &self,
        token_in: &CrossChainToken,
        token_out: &CrossChainToken,
        amount: U256,
        from: ChainId,
        to: ChainId,
        prefs: &RoutePreferences,
    ) -> SwitchResult<()> {
        if amount.is_zero() {
            return Err(SwitchError::InvalidAmount);
        }
        if prefs.max_slippage_bps > BPS_SCALE {
            return Err(SwitchError::InvalidSlippage {
                bps: prefs.max_slippage_bps,
            });
        }
        // Configuration gates run before any adapter is consulted
        for chain in [from, to] {
            if !self.supported_chains.contains(&chain) {
                return Err(SwitchError::ChainNotSupported { chain });
            }
        }
        for token in [token_in, token_out] {
            if !self.supported_tokens.contains(&token.symbol) {
                return Err(SwitchError::TokenNotSupported {
                    token: token.symbol.clone(),
                });
            }
        }
        Ok(())
    }

    /// Serialize the limits read-check-write per sender. `debit` runs
    /// inside the critical section, after the policy checks and before
    /// the counters commit, so a rejected debit changes nothing.
    async fn check_and_commit_limits<F>(
        &self,
        sender: Address,
        amount: U256,
        debit: F,
    ) -> SwitchResult<DateTime<Utc>>
    where
        F: FnOnce(&UserLimits) -> SwitchResult<()>,
    {
        let now = self.clock.now();
        let cell = self
            .user_limits
            .entry(sender)
            .or_insert_with(|| Arc::new(Mutex::new(UserLimits::new(now))))
            .clone();
        let mut limits = cell.lock().await;

        let now = self.clock.now();
        if let Some(last) = limits.last_transfer_at {
            let elapsed = now - last;
            if elapsed < self.min_transfer_interval {
                return Err(SwitchError::TransferTooFrequent {
                    retry_in_secs: (self.min_transfer_interval - elapsed).num_seconds().max(1),
                });
            }
        }
        limits.roll_window(now);
        if !limits.whitelisted {
            let limit = self
                .daily_limit_overrides
                .get(&sender)
                .map(|entry| *entry)
                .unwrap_or_else(|| *self.default_daily_limit.read().unwrap());
            let attempted = limits.daily_transferred + amount;
            if attempted > limit {
                return Err(SwitchError::DailyLimitExceeded { attempted, limit });
            }
        }

        debit(&limits)?;

        limits.daily_transferred += amount;
        limits.last_transfer_at = Some(now);
        limits.transfer_count += 1;
        Ok(now)
    }

    /// Apply a terminal adapter resolution to the ledger and the registry
    async fn apply_resolution(&self, id: Uuid, status: TransferStatus) {
        let now = self.clock.now();
        let Some(mut transfer) = self.ledger.get_mut(&id) else {
            return;
        };
        if transfer.status.is_terminal() {
            return;
        }
        transfer.status = status;
        transfer.completed_at = Some(now);
        let route = transfer.route.clone();
        drop(transfer);

        let success = status == TransferStatus::Completed;
        self.registry
            .record_outcome(
                &route.bridge,
                route.metrics.estimated_gas_wei,
                route.metrics.estimated_time_minutes,
                success,
                route.amount_in,
            )
            .await;

        if success {
            // Destination-side settlement: credit the recipient
            if let Some(transfer) = self.ledger.get(&id) {
                self.vault.credit(
                    transfer.recipient,
                    &route.token_out.symbol,
                    route.dest_chain,
                    route.amount_out,
                );
            }
            info!("✅ Transfer {} completed via {}", id, route.bridge);
            self.events.publish(SwitchEvent::TransferCompleted {
                transfer_id: id,
                bridge: route.bridge,
            });
        } else {
            warn!("Transfer {} failed via {}", id, route.bridge);
            self.events.publish(SwitchEvent::TransferFailed {
                transfer_id: id,
                bridge: route.bridge,
                reason: "adapter reported failure".to_string(),
            });
        }
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) {
        let now = self.clock.now();
        let Some(mut transfer) = self.ledger.get_mut(&id) else {
            return;
        };
        transfer.status = TransferStatus::Failed;
        transfer.completed_at = Some(now);
        let route = transfer.route.clone();
        drop(transfer);

        self.registry
            .record_outcome(
                &route.bridge,
                route.metrics.estimated_gas_wei,
                route.metrics.estimated_time_minutes,
                false,
                route.amount_in,
            )
            .await;
        self.events.publish(SwitchEvent::TransferFailed {
            transfer_id: id,
            bridge: route.bridge,
            reason: reason.to_string(),
        });
    }
}

/// Rescale a quoted route to a different input amount, keeping the quoted
/// in/out ratio.
fn scale_route(route: &Route, amount_in: U256) -> Route {
    let amount_out = if route.amount_in.is_zero() {
        amount_in
    } else {
        amount_in * route.amount_out / route.amount_in
    };
    Route {
        amount_in,
        amount_out,
        ..route.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridges::registry::RegistrySettings;
    use crate::mocks::SimulatedAdapter;
    use crate::oracle::{BasisPointFeeEngine, InMemoryVault, ManualClock};

    const ETH: ChainId = ChainId::Ethereum;
    const ARB: ChainId = ChainId::Arbitrum;

    fn usdc() -> CrossChainToken {
        CrossChainToken::new("USDC", 6)
    }

    struct Harness {
        switch: Arc<SettlementSwitch>,
        cap: AdminCap,
        clock: Arc<ManualClock>,
        vault: Arc<InMemoryVault>,
        sender: Address,
        recipient: Address,
    }

    async fn harness(adapters: &[Arc<SimulatedAdapter>]) -> Harness {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let events = EventBus::default();
        let registry = Arc::new(BridgeRegistry::new(
            RegistrySettings::default(),
            clock.clone(),
            events.clone(),
        ));
        for adapter in adapters {
            registry
                .register_bridge(adapter.clone(), ChainId::all().to_vec(), vec!["USDC".into()])
                .await
                .unwrap();
        }
        let vault = Arc::new(InMemoryVault::new());
        let fees = Arc::new(BasisPointFeeEngine::new(10));
        let config = SwitchConfig::default();
        let (switch, cap) = SettlementSwitch::new(
            &config,
            registry,
            vault.clone(),
            fees,
            clock.clone(),
            events,
        );
        let sender = Address::from([0xAA; 20]);
        let recipient = Address::from([0xBB; 20]);
        vault.fund(
            sender,
            "USDC",
            ETH,
            U256::from(10u64).pow(U256::from(20u64)),
        );
        Harness {
            switch,
            cap,
            clock,
            vault,
            sender,
            recipient,
        }
    }

    fn prefs() -> RoutePreferences {
        RoutePreferences::default()
    }

    #[tokio::test]
    async fn test_execute_bridge_happy_path() {
        let adapter = Arc::new(SimulatedAdapter::builder("alpha").build());
        let h = harness(&[adapter]).await;
        let amount = U256::from(1_000_000u64);
        let before = h.vault.balance_of(h.sender, "USDC", ETH);

        let route = h
            .switch
            .find_optimal_route(&usdc(), &usdc(), amount, ETH, ARB, &prefs())
            .await
            .unwrap();
        let id = h
            .switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap();

        let transfer = h.switch.transfer(id).unwrap();
        assert_eq!(transfer.status, TransferStatus::Completed);
        assert!(transfer.completed_at.is_some());
        assert_eq!(h.vault.balance_of(h.sender, "USDC", ETH), before - amount);
        // Destination-side settlement credited the recipient
        assert_eq!(
            h.vault.balance_of(h.recipient, "USDC", ARB),
            route.amount_out
        );
        assert_eq!(h.switch.user_transfers(h.sender).len(), 1);

        let limits = h.switch.user_limits(h.sender).await.unwrap();
        assert_eq!(limits.transfer_count, 1);
        assert_eq!(limits.daily_transferred, amount);
    }

    #[tokio::test]
    async fn test_rate_limit_enforced_per_sender() {
        let adapter = Arc::new(SimulatedAdapter::builder("alpha").build());
        let h = harness(&[adapter]).await;
        let amount = U256::from(1_000u64);

        let route = h
            .switch
            .find_optimal_route(&usdc(), &usdc(), amount, ETH, ARB, &prefs())
            .await
            .unwrap();
        h.switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap();
        let balance_after_first = h.vault.balance_of(h.sender, "USDC", ETH);

        // Immediately again: rejected, state unchanged
        let err = h
            .switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchError::TransferTooFrequent { .. }));
        assert_eq!(h.switch.user_transfers(h.sender).len(), 1);
        assert_eq!(h.vault.balance_of(h.sender, "USDC", ETH), balance_after_first);

        // Past the interval the same call goes through
        h.clock.advance(Duration::seconds(11));
        h.switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap();
        assert_eq!(h.switch.user_transfers(h.sender).len(), 2);
    }

    #[tokio::test]
    async fn test_daily_limit_enforced_unless_whitelisted() {
        let adapter = Arc::new(SimulatedAdapter::builder("alpha").fee_bps(0).build());
        let h = harness(&[adapter]).await;
        h.switch
            .set_default_daily_limit(&h.cap, U256::from(1_000u64))
            .unwrap();

        let route = h
            .switch
            .find_optimal_route(&usdc(), &usdc(), U256::from(600u64), ETH, ARB, &prefs())
            .await
            .unwrap();
        h.switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap();

        h.clock.advance(Duration::seconds(11));
        let err = h
            .switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchError::DailyLimitExceeded { .. }));
        // The rejected attempt left the counter untouched
        let limits = h.switch.user_limits(h.sender).await.unwrap();
        assert_eq!(limits.daily_transferred, U256::from(600u64));

        // Whitelisted senders bypass the cap
        h.switch
            .set_user_whitelist(&h.cap, h.sender, true)
            .await
            .unwrap();
        h.switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_daily_window_resets_lazily() {
        let adapter = Arc::new(SimulatedAdapter::builder("alpha").fee_bps(0).build());
        let h = harness(&[adapter]).await;
        h.switch
            .set_default_daily_limit(&h.cap, U256::from(1_000u64))
            .unwrap();

        let route = h
            .switch
            .find_optimal_route(&usdc(), &usdc(), U256::from(900u64), ETH, ARB, &prefs())
            .await
            .unwrap();
        h.switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap();

        // Next day the window rolls on the next write
        h.clock.advance(Duration::days(1) + Duration::seconds(1));
        let route = h
            .switch
            .find_optimal_route(&usdc(), &usdc(), U256::from(900u64), ETH, ARB, &prefs())
            .await
            .unwrap();
        h.switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap();
        let limits = h.switch.user_limits(h.sender).await.unwrap();
        assert_eq!(limits.daily_transferred, U256::from(900u64));
    }

    #[tokio::test]
    async fn test_blacklist_blocks_execution() {
        let adapter = Arc::new(SimulatedAdapter::builder("alpha").build());
        let h = harness(&[adapter]).await;
        let route = h
            .switch
            .find_optimal_route(&usdc(), &usdc(), U256::from(1_000u64), ETH, ARB, &prefs())
            .await
            .unwrap();

        h.switch.set_blacklisted(&h.cap, h.sender, true).unwrap();
        let err = h
            .switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchError::Blacklisted { .. }));

        h.switch.set_blacklisted(&h.cap, h.sender, false).unwrap();
        h.switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pause_gates_execution_not_queries() {
        let adapter = Arc::new(SimulatedAdapter::builder("alpha").build());
        let h = harness(&[adapter]).await;
        let route = h
            .switch
            .find_optimal_route(&usdc(), &usdc(), U256::from(1_000u64), ETH, ARB, &prefs())
            .await
            .unwrap();

        h.switch.pause(&h.cap).unwrap();
        assert!(h.switch.is_paused());
        let err = h
            .switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchError::Paused));
        // Discovery is a query and stays available
        h.switch
            .find_optimal_route(&usdc(), &usdc(), U256::from(1_000u64), ETH, ARB, &prefs())
            .await
            .unwrap();

        h.switch.unpause(&h.cap).unwrap();
        h.switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_route_cache_hit_and_expiry() {
        let adapter = Arc::new(SimulatedAdapter::builder("alpha").build());
        let h = harness(&[adapter.clone()]).await;
        let amount = U256::from(1_000u64);

        let first = h
            .switch
            .find_optimal_route(&usdc(), &usdc(), amount, ETH, ARB, &prefs())
            .await
            .unwrap();
        let calls_after_first = adapter.metrics_call_count();

        // Within TTL: identical route, no further adapter queries
        let second = h
            .switch
            .find_optimal_route(&usdc(), &usdc(), amount, ETH, ARB, &prefs())
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(adapter.metrics_call_count(), calls_after_first);

        // Past TTL: adapters are consulted again
        h.clock.advance(Duration::seconds(61));
        h.switch
            .find_optimal_route(&usdc(), &usdc(), amount, ETH, ARB, &prefs())
            .await
            .unwrap();
        assert!(adapter.metrics_call_count() > calls_after_first);
    }

    #[tokio::test]
    async fn test_expired_route_rejected() {
        let adapter = Arc::new(SimulatedAdapter::builder("alpha").build());
        let h = harness(&[adapter]).await;
        let route = h
            .switch
            .find_optimal_route(&usdc(), &usdc(), U256::from(1_000u64), ETH, ARB, &prefs())
            .await
            .unwrap();

        h.clock.advance(Duration::seconds(61));
        let err = h
            .switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchError::RouteExpired { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_chain_fails_before_adapter_calls() {
        let adapter = Arc::new(SimulatedAdapter::builder("alpha").build());
        let h = harness(&[adapter.clone()]).await;

        h.switch
            .set_chain_support(&h.cap, ChainId::Avalanche, false)
            .unwrap();
        let err = h
            .switch
            .find_optimal_route(
                &usdc(),
                &usdc(),
                U256::from(1_000u64),
                ChainId::Avalanche,
                ARB,
                &prefs(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchError::ChainNotSupported { .. }));
        assert_eq!(adapter.metrics_call_count(), 0);

        let doge = CrossChainToken::new("DOGE", 8);
        let err = h
            .switch
            .find_optimal_route(&doge, &doge, U256::from(1_000u64), ETH, ARB, &prefs())
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchError::TokenNotSupported { .. }));
        assert_eq!(adapter.metrics_call_count(), 0);
    }

    #[tokio::test]
    async fn test_multi_path_split_conserves_total() {
        let a = Arc::new(
            SimulatedAdapter::builder("a")
                .fee_bps(5)
                .liquidity(U256::from(80_000u64))
                .build(),
        );
        let b = Arc::new(
            SimulatedAdapter::builder("b")
                .fee_bps(10)
                .liquidity(U256::from(100_000u64))
                .build(),
        );
        let h = harness(&[a, b]).await;
        let total = U256::from(150_000u64);

        let multi_path = h
            .switch
            .find_multi_path_route(&usdc(), &usdc(), total, ETH, ARB, &prefs())
            .await
            .unwrap();
        assert!(multi_path.validate());
        assert_eq!(multi_path.routes.len(), 2);
        let sum: U256 = multi_path
            .amounts
            .iter()
            .fold(U256::ZERO, |acc, amount| acc + *amount);
        assert_eq!(sum, total);
        // Neither leg exceeds its adapter's available liquidity
        for (route, amount) in multi_path.routes.iter().zip(&multi_path.amounts) {
            assert!(*amount <= route.metrics.available_liquidity);
        }

        let ids = h
            .switch
            .execute_multi_path(&multi_path, h.sender, h.recipient, b"permit")
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        for id in ids {
            assert_eq!(
                h.switch.transfer(id).unwrap().status,
                TransferStatus::Completed
            );
        }
    }

    #[tokio::test]
    async fn test_multi_path_split_handles_odd_remainders() {
        let a = Arc::new(SimulatedAdapter::builder("a").fee_bps(1).build());
        let b = Arc::new(SimulatedAdapter::builder("b").fee_bps(2).build());
        let c = Arc::new(SimulatedAdapter::builder("c").fee_bps(3).build());
        let h = harness(&[a, b, c]).await;

        // 100 / 3 truncates; the last leg absorbs the remainder
        let total = U256::from(100u64);
        let multi_path = h
            .switch
            .find_multi_path_route(&usdc(), &usdc(), total, ETH, ARB, &prefs())
            .await
            .unwrap();
        assert_eq!(multi_path.routes.len(), 3);
        assert_eq!(multi_path.amounts[0], U256::from(33u64));
        assert_eq!(multi_path.amounts[1], U256::from(33u64));
        assert_eq!(multi_path.amounts[2], U256::from(34u64));
    }

    #[tokio::test]
    async fn test_multi_path_leg_failure_leaves_earlier_legs() {
        let a = Arc::new(SimulatedAdapter::builder("a").fee_bps(1).build());
        let b = Arc::new(SimulatedAdapter::builder("b").fee_bps(2).build());
        let h = harness(&[a, b.clone()]).await;

        b.fail_next_execution();
        let multi_path = h
            .switch
            .find_multi_path_route(&usdc(), &usdc(), U256::from(10_000u64), ETH, ARB, &prefs())
            .await
            .unwrap();
        let err = h
            .switch
            .execute_multi_path(&multi_path, h.sender, h.recipient, b"permit")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SwitchError::MultiPathExecutionFailed { failed: 1, total: 2 }
        ));

        // The first leg's transfer stands; the failed leg is recorded
        let transfers = h.switch.user_transfers(h.sender);
        assert_eq!(transfers.len(), 2);
        let completed = transfers
            .iter()
            .filter(|t| t.status == TransferStatus::Completed)
            .count();
        let failed: Vec<_> = transfers
            .iter()
            .filter(|t| t.status == TransferStatus::Failed)
            .collect();
        assert_eq!(completed, 1);
        assert_eq!(failed.len(), 1);

        // Failed leg is refundable, exactly once
        let before = h.vault.balance_of(h.sender, "USDC", ETH);
        h.switch.refund_transfer(&h.cap, failed[0].id).unwrap();
        assert_eq!(
            h.vault.balance_of(h.sender, "USDC", ETH),
            before + failed[0].route.amount_in
        );
        let err = h.switch.refund_transfer(&h.cap, failed[0].id).unwrap_err();
        assert!(matches!(err, SwitchError::NotRefundable { .. }));
    }

    #[tokio::test]
    async fn test_refund_requires_failed_status() {
        let adapter = Arc::new(SimulatedAdapter::builder("alpha").build());
        let h = harness(&[adapter]).await;
        let route = h
            .switch
            .find_optimal_route(&usdc(), &usdc(), U256::from(1_000u64), ETH, ARB, &prefs())
            .await
            .unwrap();
        let id = h
            .switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap();

        let err = h.switch.refund_transfer(&h.cap, id).unwrap_err();
        assert!(matches!(err, SwitchError::NotRefundable { .. }));
    }

    #[tokio::test]
    async fn test_foreign_admin_cap_rejected_before_mutation() {
        let adapter = Arc::new(SimulatedAdapter::builder("alpha").build());
        let h = harness(&[adapter.clone()]).await;
        // A cap issued by a different switch instance does not authorize
        let other = harness(&[Arc::new(SimulatedAdapter::builder("other").build())]).await;

        let err = h.switch.pause(&other.cap).unwrap_err();
        assert!(matches!(err, SwitchError::Unauthorized));
        assert!(!h.switch.is_paused());

        let err = h
            .switch
            .set_blacklisted(&other.cap, h.sender, true)
            .unwrap_err();
        assert!(matches!(err, SwitchError::Unauthorized));
    }

    #[tokio::test]
    async fn test_bridge_with_auto_route() {
        let cheap = Arc::new(SimulatedAdapter::builder("cheap").fee_bps(1).build());
        let pricey = Arc::new(SimulatedAdapter::builder("pricey").fee_bps(50).build());
        let h = harness(&[cheap, pricey]).await;

        let id = h
            .switch
            .bridge_with_auto_route(
                &usdc(),
                &usdc(),
                U256::from(1_000_000u64),
                ETH,
                ARB,
                &RoutePreferences {
                    mode: crate::types::RoutingMode::Cheapest,
                    ..RoutePreferences::default()
                },
                h.sender,
                h.recipient,
                b"permit",
            )
            .await
            .unwrap();
        let transfer = h.switch.transfer(id).unwrap();
        assert_eq!(transfer.route.bridge, "cheap");
        assert_eq!(transfer.status, TransferStatus::Completed);
    }

    #[tokio::test]
    async fn test_resolve_transfer_applies_async_completion() {
        let adapter = Arc::new(
            SimulatedAdapter::builder("alpha").pending_resolution().build(),
        );
        let h = harness(&[adapter.clone()]).await;
        let route = h
            .switch
            .find_optimal_route(&usdc(), &usdc(), U256::from(1_000u64), ETH, ARB, &prefs())
            .await
            .unwrap();
        let id = h
            .switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap();

        // Adapter accepted but has not settled yet
        let transfer = h.switch.transfer(id).unwrap();
        assert_eq!(transfer.status, TransferStatus::Confirmed);
        assert_eq!(
            h.switch.resolve_transfer(id).await.unwrap(),
            TransferStatus::Pending
        );

        adapter.resolve(transfer.adapter_transfer_id.as_ref().unwrap(), true);
        assert_eq!(
            h.switch.resolve_transfer(id).await.unwrap(),
            TransferStatus::Completed
        );
        assert_eq!(
            h.switch.transfer(id).unwrap().status,
            TransferStatus::Completed
        );
        assert_eq!(
            h.vault.balance_of(h.recipient, "USDC", ARB),
            route.amount_out
        );
    }

    #[tokio::test]
    async fn test_failed_adapter_execution_recorded_in_registry() {
        let adapter = Arc::new(SimulatedAdapter::builder("alpha").build());
        let h = harness(&[adapter.clone()]).await;
        let route = h
            .switch
            .find_optimal_route(&usdc(), &usdc(), U256::from(1_000u64), ETH, ARB, &prefs())
            .await
            .unwrap();

        adapter.fail_next_execution();
        let err = h
            .switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchError::Bridge(_)));

        let transfers = h.switch.user_transfers(h.sender);
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].status, TransferStatus::Failed);

        let info = h.switch.registry().bridge_details("alpha").await.unwrap();
        assert_eq!(info.total_transfers, 1);
        assert_eq!(info.failed_transfers, 1);
    }

    #[tokio::test]
    async fn test_transfer_initiated_event_published() {
        let adapter = Arc::new(SimulatedAdapter::builder("alpha").build());
        let h = harness(&[adapter]).await;
        let mut rx = h.switch.events().subscribe();
        let route = h
            .switch
            .find_optimal_route(&usdc(), &usdc(), U256::from(1_000u64), ETH, ARB, &prefs())
            .await
            .unwrap();
        h.switch
            .execute_bridge(&route, h.sender, h.recipient, b"permit")
            .await
            .unwrap();

        let mut saw_initiated = false;
        let mut saw_completed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                SwitchEvent::TransferInitiated { sender, .. } => {
                    assert_eq!(sender, h.sender);
                    saw_initiated = true;
                }
                SwitchEvent::TransferCompleted { .. } => {
                    // Completion must come after initiation
                    assert!(saw_initiated);
                    saw_completed = true;
                }
                _ => {}
            }
        }
        assert!(saw_initiated && saw_completed);
    }
}
