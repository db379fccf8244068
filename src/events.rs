use alloy::primitives::{Address, U256};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::ChainId;

/// Point-in-time facts raised by the switch and the registry.
///
/// Delivery is fire-and-forget: consumers get causal order within one call
/// but no ordering guarantee across different kinds.
#[derive(Debug, Clone)]
pub enum SwitchEvent {
    RouteCalculated {
        bridge: String,
        source_chain: ChainId,
        dest_chain: ChainId,
        amount_in: U256,
        amount_out: U256,
    },
    TransferInitiated {
        transfer_id: Uuid,
        bridge: String,
        sender: Address,
        recipient: Address,
        amount: U256,
    },
    TransferCompleted {
        transfer_id: Uuid,
        bridge: String,
    },
    TransferFailed {
        transfer_id: Uuid,
        bridge: String,
        reason: String,
    },
    MultiPathTransferInitiated {
        transfer_ids: Vec<Uuid>,
        total_amount: U256,
    },
    BridgeAdapterRegistered {
        bridge: String,
    },
    BridgeAdapterStatusChanged {
        bridge: String,
        enabled: bool,
        healthy: bool,
    },
    EmergencyPause {
        paused: bool,
    },
    RouteCacheUpdated {
        bridge: String,
        source_chain: ChainId,
        dest_chain: ChainId,
    },
    ChainConfigUpdated {
        chain: ChainId,
        supported: bool,
    },
    UserLimitsUpdated {
        user: Address,
    },
    BlacklistUpdated {
        user: Address,
        blacklisted: bool,
    },
}

/// Broadcast bus for switch events. Publishing never blocks and never
/// fails; events published with no subscribers are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SwitchEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: SwitchEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SwitchEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::default();
        bus.publish(SwitchEvent::EmergencyPause { paused: true });
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_causal_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(SwitchEvent::EmergencyPause { paused: true });
        bus.publish(SwitchEvent::EmergencyPause { paused: false });

        assert!(matches!(
            rx.recv().await.unwrap(),
            SwitchEvent::EmergencyPause { paused: true }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SwitchEvent::EmergencyPause { paused: false }
        ));
    }
}
