use std::collections::HashMap;
use std::sync::Mutex;

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::types::ChainId;

/// Time source injected into every component that reads "now".
///
/// Scoring, cache expiry, rate limiting and health-check throttling all go
/// through this trait so tests can drive time deterministically.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock that only moves when advanced
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Custody boundary errors
#[derive(Debug, Error)]
pub enum CustodyError {
    #[error("Insufficient balance: {available} < {required}")]
    InsufficientBalance { available: U256, required: U256 },

    #[error("Permit rejected")]
    PermitRejected,
}

/// Token custody primitive with move semantics: a debit either applies
/// entirely or fails entirely, never partially.
pub trait TokenVault: Send + Sync + std::fmt::Debug {
    /// Atomically move `amount` of `token` on `chain` out of `owner`'s
    /// balance and into switch custody.
    fn debit(
        &self,
        owner: Address,
        token: &str,
        chain: ChainId,
        amount: U256,
        permit: &[u8],
    ) -> Result<(), CustodyError>;

    /// Credit `amount` back to `owner` (refund path).
    fn credit(&self, owner: Address, token: &str, chain: ChainId, amount: U256);

    fn balance_of(&self, owner: Address, token: &str, chain: ChainId) -> U256;
}

/// In-memory vault used by tests and the demo binary
#[derive(Debug, Default)]
pub struct InMemoryVault {
    balances: Mutex<HashMap<(Address, String, ChainId), U256>>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fund(&self, owner: Address, token: &str, chain: ChainId, amount: U256) {
        let mut balances = self.balances.lock().unwrap();
        let entry = balances
            .entry((owner, token.to_string(), chain))
            .or_insert(U256::ZERO);
        *entry += amount;
    }
}

impl TokenVault for InMemoryVault {
    fn debit(
        &self,
        owner: Address,
        token: &str,
        chain: ChainId,
        amount: U256,
        permit: &[u8],
    ) -> Result<(), CustodyError> {
        if permit.is_empty() {
            return Err(CustodyError::PermitRejected);
        }
        let mut balances = self.balances.lock().unwrap();
        let key = (owner, token.to_string(), chain);
        let available = balances.get(&key).copied().unwrap_or(U256::ZERO);
        if available < amount {
            return Err(CustodyError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        balances.insert(key, available - amount);
        Ok(())
    }

    fn credit(&self, owner: Address, token: &str, chain: ChainId, amount: U256) {
        let mut balances = self.balances.lock().unwrap();
        let entry = balances
            .entry((owner, token.to_string(), chain))
            .or_insert(U256::ZERO);
        *entry += amount;
    }

    fn balance_of(&self, owner: Address, token: &str, chain: ChainId) -> U256 {
        let balances = self.balances.lock().unwrap();
        balances
            .get(&(owner, token.to_string(), chain))
            .copied()
            .unwrap_or(U256::ZERO)
    }
}

/// Fee computation and collection, side-effecting exactly once per call
pub trait FeeEngine: Send + Sync + std::fmt::Debug {
    fn calculate_fee(&self, amount: U256) -> U256;

    fn collect_fee(&self, payer: Address, amount: U256);

    fn total_collected(&self) -> U256;
}

/// Flat basis-point fee
#[derive(Debug)]
pub struct BasisPointFeeEngine {
    fee_bps: u32,
    collected: Mutex<U256>,
}

impl BasisPointFeeEngine {
    pub fn new(fee_bps: u32) -> Self {
        Self {
            fee_bps,
            collected: Mutex::new(U256::ZERO),
        }
    }
}

impl FeeEngine for BasisPointFeeEngine {
    fn calculate_fee(&self, amount: U256) -> U256 {
        amount * U256::from(self.fee_bps) / U256::from(crate::constants::BPS_SCALE)
    }

    fn collect_fee(&self, _payer: Address, amount: U256) {
        let mut collected = self.collected.lock().unwrap();
        *collected += amount;
    }

    fn total_collected(&self) -> U256 {
        *self.collected.lock().unwrap()
    }
}
