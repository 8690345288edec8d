//! Wallet events - in-process publish/subscribe for session changes
//!
//! The session adapter publishes; the send flow (and the browser bridge,
//! which re-dispatches them as `window` events) subscribe. Delivery is FIFO
//! per subscriber. Subscribers whose receiver was dropped are pruned on the
//! next publish.

use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// DOM event names used by the browser bridge.
pub const CONNECTED_EVENT: &str = "kasware_connected";
pub const DISCONNECTED_EVENT: &str = "kasware_disconnected";
pub const ACCOUNTS_CHANGED_EVENT: &str = "kasware_accounts_changed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WalletEvent {
    Connected { address: String },
    Disconnected,
    AccountsChanged { accounts: Vec<String> },
}

impl WalletEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WalletEvent::Connected { .. } => CONNECTED_EVENT,
            WalletEvent::Disconnected => DISCONNECTED_EVENT,
            WalletEvent::AccountsChanged { .. } => ACCOUNTS_CHANGED_EVENT,
        }
    }
}

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Rc<RefCell<Vec<mpsc::UnboundedSender<WalletEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self { Self::default() }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<WalletEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers.borrow_mut().push(tx);
        rx
    }

    pub fn publish(&self, event: WalletEvent) {
        tracing::debug!(event = event.name(), "wallet event");
        self.subscribers
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize { self.subscribers.borrow().len() }
}
