// BridgeSwitch settlement engine library

pub mod bridges;
pub mod config;
pub mod constants;
pub mod events;
pub mod mocks;
pub mod oracle;
pub mod types;

// Re-exports for convenience
pub use bridges::{
    AdminCap, BridgeAdapter, BridgeError, BridgeRegistry, MultiPathRoute, Route, RouteCalculator,
    RouteMetrics, SettlementSwitch, SwitchError, Transfer, TransferStatus,
};
pub use config::SwitchConfig;
pub use events::{EventBus, SwitchEvent};
pub use oracle::{
    BasisPointFeeEngine, Clock, FeeEngine, InMemoryVault, ManualClock, SystemClock, TokenVault,
};
pub use types::{ChainId, CrossChainToken, RoutePreferences, RoutingMode};
