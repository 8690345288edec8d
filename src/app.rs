//! TipApp - wires the session adapter and the send flow over one event bus
//!
//! Drivers (the browser bridge, the native runtime) own the timers and call
//! in here: `start` once, `on_focus` on window focus, `poll` on the
//! detection interval until it returns [`Poll::Stop`], and `expire` when the
//! reset delay reported by `submit` elapses.

use std::rc::Rc;
use std::time::Duration;

use crate::config::TipConfig;
use crate::events::EventBus;
use crate::provider::ProviderHost;
use crate::send::{FlowState, SendFlow, TransferOutcome, TransferRequest};
use crate::session::{ConnectError, Poll, Session, WalletSession};

/// A submission's outcome plus the reset timer the driver should arm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub outcome: TransferOutcome,
    /// `(generation, delay)` to pass back to [`TipApp::expire`].
    pub reset: Option<(u64, Duration)>,
}

#[derive(Clone)]
pub struct TipApp {
    config: Rc<TipConfig>,
    bus: EventBus,
    session: WalletSession,
    flow: SendFlow,
}

impl TipApp {
    pub fn new(host: Rc<dyn ProviderHost>, config: TipConfig) -> Self {
        let config = Rc::new(config);
        let bus = EventBus::new();
        let session = WalletSession::new(Rc::clone(&host), bus.clone());
        let flow = SendFlow::new(host, Rc::clone(&config), &bus);
        Self { config, bus, session, flow }
    }

    pub fn config(&self) -> &TipConfig { &self.config }
    pub fn bus(&self) -> &EventBus { &self.bus }
    pub fn session(&self) -> &WalletSession { &self.session }
    pub fn flow(&self) -> &SendFlow { &self.flow }

    /// Page load: probe the provider and arm the poll if it is missing.
    pub async fn start(&self) -> bool {
        let found = self.session.start().await;
        tracing::info!(found, "startup provider check");
        found
    }

    pub async fn on_focus(&self) -> bool { self.session.on_focus().await }

    pub async fn poll(&self) -> Poll { self.session.poll().await }

    pub async fn connect(&self) -> Result<String, ConnectError> { self.session.connect().await }

    pub async fn disconnect(&self) { self.session.disconnect().await }

    pub async fn submit(&self, request: TransferRequest) -> Submitted {
        let outcome = self.flow.submit(request).await;
        let reset = self.flow.pending_reset().map(|generation| (generation, self.config.reset_delay));
        Submitted { outcome, reset }
    }

    pub fn expire(&self, generation: u64) -> bool { self.flow.expire(generation) }

    /// Session as the send form sees it.
    pub fn form_session(&self) -> Session { self.flow.session() }

    pub fn state(&self) -> FlowState { self.flow.snapshot() }

    /// Page teardown.
    pub fn close(&self) { self.session.detach(); }
}
