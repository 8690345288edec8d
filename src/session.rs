//! Wallet session adapter
//!
//! Owns the single source of truth for "is an account connected, and which
//! one", bridging the unreliable injected provider into [`WalletEvent`]s.
//!
//! # Detection
//!
//! The extension may inject itself after the page loads, so detection runs:
//!
//! | Trigger | Method | Notes |
//! |---------|--------|-------|
//! | startup | [`WalletSession::start`] | arms the poll if nothing is found |
//! | window focus | [`WalletSession::on_focus`] | always re-checks |
//! | interval | [`WalletSession::poll`] | returns [`Poll::Stop`] forever after the first hit |
//!
//! On first detection the adapter subscribes to `accountsChanged` and
//! restores an existing authorization without prompting. When a re-check
//! finds the provider gone, the session is reset.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::events::{EventBus, WalletEvent};
use crate::provider::{
    account_list, first_supported, is_recognized, EventHandler, Method, ProviderHost, WalletProvider,
    ACCOUNTS_CHANGED, ACCOUNT_QUERY_METHODS, CONNECT_METHODS, SUBSCRIBE_METHODS, UNSUBSCRIBE_METHODS,
};

/// The page's view of the wallet connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub connected: bool,
    pub address: Option<String>,
}

impl Session {
    pub fn connected(address: impl Into<String>) -> Self {
        Self { connected: true, address: Some(address.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("Kasware extension not detected. Please install it first.")]
    NoProvider,
    #[error("Unable to connect to Kasware. The extension API is not compatible.")]
    NoCompatibleMethod,
    #[error("No accounts returned from wallet.")]
    NoAccounts,
    #[error("{0}")]
    ProviderRejected(String),
}

/// What the detection interval should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    Continue,
    Stop,
}

#[derive(Default)]
struct State {
    session: Session,
    detected: bool,
    polling: bool,
    listening: Option<Rc<dyn WalletProvider>>,
}

#[derive(Clone)]
pub struct WalletSession {
    host: Rc<dyn ProviderHost>,
    bus: EventBus,
    state: Rc<RefCell<State>>,
}

impl WalletSession {
    pub fn new(host: Rc<dyn ProviderHost>, bus: EventBus) -> Self {
        Self { host, bus, state: Rc::new(RefCell::new(State::default())) }
    }

    pub fn session(&self) -> Session { self.state.borrow().session.clone() }
    pub fn is_detected(&self) -> bool { self.state.borrow().detected }
    pub fn is_polling(&self) -> bool { self.state.borrow().polling }
    pub fn bus(&self) -> &EventBus { &self.bus }

    /// Whether a recognised provider is injected right now. Pure check, no
    /// side effects on the session.
    pub fn detect_provider(&self) -> bool { self.provider().is_some() }

    fn provider(&self) -> Option<Rc<dyn WalletProvider>> {
        self.host.lookup().filter(|p| is_recognized(p.as_ref()))
    }

    /// Startup check; arms the detection poll when nothing is found.
    pub async fn start(&self) -> bool {
        let found = self.refresh().await.is_some();
        self.state.borrow_mut().polling = !found;
        found
    }

    pub async fn on_focus(&self) -> bool { self.refresh().await.is_some() }

    /// One detection-interval tick.
    pub async fn poll(&self) -> Poll {
        if !self.is_polling() {
            return Poll::Stop;
        }
        if self.refresh().await.is_some() {
            self.state.borrow_mut().polling = false;
            debug!("provider found, detection poll stopped");
            return Poll::Stop;
        }
        Poll::Continue
    }

    async fn refresh(&self) -> Option<Rc<dyn WalletProvider>> {
        let was_detected = self.is_detected();
        match self.provider() {
            Some(provider) => {
                self.state.borrow_mut().detected = true;
                if !was_detected {
                    info!(members = ?provider.member_names(), "Kasware provider detected");
                    self.attach(&provider);
                    self.restore(provider.as_ref()).await;
                }
                Some(provider)
            }
            None => {
                if was_detected {
                    warn!("Kasware provider disappeared");
                    self.detach();
                    let connected = {
                        let mut state = self.state.borrow_mut();
                        state.detected = false;
                        std::mem::take(&mut state.session).connected
                    };
                    if connected {
                        self.bus.publish(WalletEvent::Disconnected);
                    }
                }
                None
            }
        }
    }

    /// Adopt an authorization granted on an earlier visit, without prompting.
    async fn restore(&self, provider: &dyn WalletProvider) {
        let accounts = match first_supported(provider, ACCOUNT_QUERY_METHODS) {
            Some(method) => match provider.call(method, Vec::new()).await {
                Ok(value) => account_list(&value),
                Err(e) => {
                    error!(%method, error = %e, "checking existing connection failed");
                    return;
                }
            },
            None => provider.selected_address().into_iter().collect(),
        };
        if let Some(address) = accounts.into_iter().next() {
            info!(%address, "restored existing wallet connection");
            self.adopt(address);
        }
    }

    /// Prompt the user through the first connection method the provider has.
    pub async fn connect(&self) -> Result<String, ConnectError> {
        let provider = self.refresh().await.ok_or(ConnectError::NoProvider)?;
        let method = first_supported(provider.as_ref(), CONNECT_METHODS).ok_or(ConnectError::NoCompatibleMethod)?;
        debug!(%method, "requesting wallet connection");

        let result = provider.call(method, Vec::new()).await.map_err(|e| {
            error!(%method, error = %e, "connection rejected");
            ConnectError::ProviderRejected(e.message)
        })?;
        let address = account_list(&result).into_iter().next().ok_or(ConnectError::NoAccounts)?;

        info!(%address, "wallet connected");
        // restore() may already have adopted it during refresh
        if self.session() != Session::connected(address.as_str()) {
            self.adopt(address.clone());
        }
        Ok(address)
    }

    /// Clear local state, then make a best-effort provider disconnect.
    /// The page is disconnected before the provider call settles, so a
    /// wallet that never answers cannot keep the send form enabled.
    pub async fn disconnect(&self) {
        Self::clear(&self.state, &self.bus);
        info!("wallet disconnected");

        let Some(provider) = self.host.lookup() else {
            return;
        };
        if provider.has_method(Method::Disconnect) {
            if let Err(e) = provider.call(Method::Disconnect, Vec::new()).await {
                warn!(error = %e, "provider disconnect failed");
            }
        }
    }

    /// Apply an `accountsChanged` payload as if the provider fired it.
    pub fn handle_accounts_changed(&self, payload: Value) {
        Self::apply_accounts(&self.state, &self.bus, payload);
    }

    fn adopt(&self, address: String) {
        self.state.borrow_mut().session = Session::connected(address.clone());
        self.bus.publish(WalletEvent::Connected { address });
    }

    fn clear(state: &RefCell<State>, bus: &EventBus) {
        state.borrow_mut().session = Session::default();
        bus.publish(WalletEvent::Disconnected);
    }

    fn apply_accounts(state: &RefCell<State>, bus: &EventBus, payload: Value) {
        let accounts = account_list(&payload);
        let Some(first) = accounts.first().cloned() else {
            debug!("accountsChanged with no accounts");
            Self::clear(state, bus);
            return;
        };
        info!(address = %first, count = accounts.len(), "accounts changed");
        state.borrow_mut().session = Session::connected(first.clone());
        bus.publish(WalletEvent::Connected { address: first });
        bus.publish(WalletEvent::AccountsChanged { accounts });
    }

    fn attach(&self, provider: &Rc<dyn WalletProvider>) {
        if self.state.borrow().listening.is_some() {
            return;
        }
        let Some(registrar) = first_supported(provider.as_ref(), SUBSCRIBE_METHODS) else {
            debug!("provider offers no event subscription");
            return;
        };
        let weak: Weak<RefCell<State>> = Rc::downgrade(&self.state);
        let bus = self.bus.clone();
        let handler: EventHandler = Rc::new(move |payload| {
            if let Some(state) = weak.upgrade() {
                Self::apply_accounts(&state, &bus, payload);
            }
        });
        match provider.listen(registrar, ACCOUNTS_CHANGED, handler) {
            Ok(()) => {
                debug!(%registrar, "subscribed to accountsChanged");
                self.state.borrow_mut().listening = Some(Rc::clone(provider));
            }
            Err(e) => error!(%registrar, error = %e, "setting up event listeners failed"),
        }
    }

    /// Unregister the `accountsChanged` listener, if one is active.
    pub fn detach(&self) {
        let Some(provider) = self.state.borrow_mut().listening.take() else {
            return;
        };
        match first_supported(provider.as_ref(), UNSUBSCRIBE_METHODS) {
            Some(remover) => {
                if let Err(e) = provider.unlisten(remover, ACCOUNTS_CHANGED) {
                    error!(%remover, error = %e, "removing event listeners failed");
                }
            }
            None => debug!("provider offers no way to unsubscribe"),
        }
    }
}
