//! Send flow controller - primary transfer plus attached fee transfer
//!
//! ```text
//! Idle ─▶ Validating ─▶ AwaitingConfirmation ─▶ Processing ─▶ Success
//!              │                 │                         └▶ AmbiguousPending
//!              └────────────────┴─────────────────────────────▶ Error
//! ```
//!
//! `AwaitingConfirmation` covers the primary `sendKaspa` call, while the
//! wallet prompts the user. `Processing` covers the fee transfer and result
//! extraction. Success and AmbiguousPending return to Idle after the reset
//! delay (see [`SendFlow::pending_reset`] / [`SendFlow::expire`]) or on the
//! next submission. Error can be resubmitted immediately.
//!
//! The fee transfer is issued strictly after the primary call returns, only
//! when the primary outcome is not fatal, and its own result is logged and
//! otherwise ignored.

use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::address::{check_address, AddressIssue};
use crate::amount::{Amount, AmountError};
use crate::config::TipConfig;
use crate::events::{EventBus, WalletEvent};
use crate::provider::{account_list, Method, ProviderError, ProviderHost, WalletProvider};
use crate::session::Session;

/// Shown instead of an id when the wallet accepted the transfer without one.
pub const NO_HASH_PLACEHOLDER: &str = "Transaction submitted (hash not returned)";
/// Shown when the wallet's reply was truncated.
pub const AMBIGUOUS_MARKER: &str = "Transaction may have been submitted (check your wallet)";
/// Identifier fields checked on an object result, in order.
pub const TX_ID_FIELDS: &[&str] = &["hash", "txid", "transactionId", "txHash"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Idle,
    Validating,
    AwaitingConfirmation,
    Processing,
    Success,
    AmbiguousPending,
    Error,
}

/// Alert copy for a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notice {
    pub title: &'static str,
    pub description: &'static str,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Validating => "validating",
            Status::AwaitingConfirmation => "awaiting_confirmation",
            Status::Processing => "processing",
            Status::Success => "success",
            Status::AmbiguousPending => "ambiguous_pending",
            Status::Error => "error",
        }
    }

    /// A provider call is outstanding; the form must not resubmit.
    pub fn is_busy(&self) -> bool { matches!(self, Status::AwaitingConfirmation | Status::Processing) }

    /// Terminal states that auto-reset to Idle.
    pub fn resets_after_delay(&self) -> bool { matches!(self, Status::Success | Status::AmbiguousPending) }

    pub fn notice(&self) -> Option<Notice> {
        let (title, description) = match self {
            Status::Idle | Status::Validating => return None,
            Status::AwaitingConfirmation => ("Waiting for confirmation...", "Please confirm the transaction in your Kasware wallet."),
            Status::Processing => ("Processing transaction...", "Your transaction is being processed. Please wait..."),
            Status::Success => ("Transaction Successful!", "Your Kaspa tokens have been sent successfully."),
            Status::AmbiguousPending => (
                "Transaction Submitted",
                "Your transaction may have been submitted. Please check your wallet for confirmation.",
            ),
            Status::Error => ("Error", "Please check the recipient address and amount."),
        };
        Some(Notice { title, description })
    }
}

/// Errors surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SendError {
    #[error("Please connect your Kasware wallet first")]
    NoWalletConnected,
    #[error("{reason}")]
    InvalidRecipient { reason: String },
    #[error("Please enter a valid amount")]
    InvalidAmount,
    #[error("The wallet doesn't support the required sendKaspa method.")]
    ProviderIncompatible,
    /// Non-fatal: the transfer may have gone through.
    #[error("{message}")]
    AmbiguousResponse { message: String },
    #[error("{message}")]
    ProviderRejected { message: String, diagnostics: String },
    #[error("A transfer is already in progress")]
    Busy,
}

/// The three form inputs, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub recipient: String,
    pub amount: String,
    pub note: Option<String>,
}

impl TransferRequest {
    pub fn new(recipient: impl Into<String>, amount: impl Into<String>) -> Self {
        Self { recipient: recipient.into(), amount: amount.into(), note: None }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self { self.note = Some(note.into()); self }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub recipient: String,
    pub amount: Amount,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransferOutcome {
    Success { tx_id: String },
    AmbiguousSubmission { raw_message: String },
    Failure { error: SendError },
}

impl TransferOutcome {
    pub fn status(&self) -> Status {
        match self {
            TransferOutcome::Success { .. } => Status::Success,
            TransferOutcome::AmbiguousSubmission { .. } => Status::AmbiguousPending,
            TransferOutcome::Failure { .. } => Status::Error,
        }
    }
}

/// Everything the form renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    pub status: Status,
    pub error: Option<SendError>,
    pub tx_display: Option<String>,
    pub debug_info: Option<String>,
    pub form: TransferRequest,
    /// Bumped on every submission; stale reset timers compare against it.
    pub generation: u64,
}

impl FlowState {
    pub fn error_message(&self) -> Option<String> { self.error.as_ref().map(|e| e.to_string()) }
}

/// Label and enabled flag of the submit button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitControl {
    pub label: &'static str,
    pub enabled: bool,
}

pub fn submit_control(status: Status, connected: bool) -> SubmitControl {
    let label = match status {
        Status::AwaitingConfirmation => "Awaiting Confirmation",
        Status::Processing => "Processing...",
        _ if !connected => "Connect Wallet to Send",
        _ => "Send Kaspa",
    };
    SubmitControl { label, enabled: connected && !status.is_busy() }
}

/// Syntax checks that must pass before any provider call.
pub fn validate(config: &TipConfig, request: &TransferRequest) -> Result<Transfer, SendError> {
    let recipient = request.recipient.trim();
    check_address(&config.address, recipient).map_err(|issue| {
        let reason = match issue {
            AddressIssue::Empty => "Recipient address is required".to_string(),
            AddressIssue::MissingPrefix => {
                format!("Invalid address format. Kaspa addresses must start with '{}'", config.address.prefix)
            }
            AddressIssue::BadLength => "Invalid Kaspa address format. Please check the address and try again.".to_string(),
        };
        SendError::InvalidRecipient { reason }
    })?;

    let amount = Amount::parse_positive(&request.amount).map_err(|e: AmountError| {
        debug!(error = %e, input = %request.amount, "amount rejected");
        SendError::InvalidAmount
    })?;

    let note = request.note.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
    Ok(Transfer { recipient: recipient.to_string(), amount, note })
}

/// `sendKaspa` argument object. Amounts go over the wire as decimal strings.
pub fn transfer_args(to: &str, amount: Amount, note: Option<&str>) -> Value {
    let mut args = json!({ "to": to, "amount": amount.to_string() });
    if let Some(note) = note {
        args["message"] = json!(note);
    }
    args
}

/// A plain string result, else the first non-empty identifier field.
pub fn extract_tx_id(result: &Value) -> String {
    let found = match result {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => TX_ID_FIELDS.iter().find_map(|f| map.get(*f).and_then(Value::as_str).filter(|s| !s.is_empty())),
        _ => None,
    };
    match found {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => NO_HASH_PLACEHOLDER.to_string(),
    }
}

fn diagnostics(error: &ProviderError, members: &[String]) -> String {
    format!(
        "Error details: {}\nStack: {}\nAvailable provider methods: {}",
        error.message,
        error.stack.as_deref().unwrap_or("No stack trace available"),
        members.join(", ")
    )
}

struct Inner {
    state: FlowState,
    session: Session,
    events: mpsc::UnboundedReceiver<WalletEvent>,
    watchers: Vec<mpsc::UnboundedSender<Status>>,
}

#[derive(Clone)]
pub struct SendFlow {
    host: Rc<dyn ProviderHost>,
    config: Rc<TipConfig>,
    inner: Rc<RefCell<Inner>>,
}

impl SendFlow {
    /// The flow learns about the session only through `bus`.
    pub fn new(host: Rc<dyn ProviderHost>, config: Rc<TipConfig>, bus: &EventBus) -> Self {
        let inner = Inner { state: FlowState::default(), session: Session::default(), events: bus.subscribe(), watchers: Vec::new() };
        Self { host, config, inner: Rc::new(RefCell::new(inner)) }
    }

    pub fn config(&self) -> &TipConfig { &self.config }

    pub fn snapshot(&self) -> FlowState { self.inner.borrow().state.clone() }

    pub fn status(&self) -> Status { self.inner.borrow().state.status }

    /// Session as seen through the event channel.
    pub fn session(&self) -> Session {
        self.sync_events();
        self.inner.borrow().session.clone()
    }

    pub fn submit_control(&self) -> SubmitControl {
        let connected = self.session().connected;
        submit_control(self.status(), connected)
    }

    /// Receive every status transition from now on.
    pub fn watch_status(&self) -> mpsc::UnboundedReceiver<Status> {
        let (tx, rx) = mpsc::unbounded();
        self.inner.borrow_mut().watchers.push(tx);
        rx
    }

    /// Drain pending session events into the local view.
    pub fn sync_events(&self) {
        let mut inner = self.inner.borrow_mut();
        while let Ok(Some(event)) = inner.events.try_next() {
            inner.session = match event {
                WalletEvent::Connected { address } => Session::connected(address),
                WalletEvent::Disconnected => Session::default(),
                WalletEvent::AccountsChanged { accounts } => match accounts.into_iter().next() {
                    Some(first) => Session::connected(first),
                    None => Session::default(),
                },
            };
        }
    }

    /// Ask the provider directly whether an account is already connected.
    pub async fn check_wallet_connection(&self) -> bool {
        let session = match self.host.lookup() {
            Some(provider) => {
                debug!(members = ?provider.member_names(), "available Kasware methods");
                let accounts = if provider.has_method(Method::GetAccounts) {
                    match provider.call(Method::GetAccounts, Vec::new()).await {
                        Ok(value) => account_list(&value),
                        Err(e) => {
                            error!(error = %e, "checking wallet connection failed");
                            Vec::new()
                        }
                    }
                } else {
                    Vec::new()
                };
                accounts.into_iter().next().map(Session::connected).unwrap_or_default()
            }
            None => Session::default(),
        };
        self.sync_events();
        let connected = session.connected;
        self.inner.borrow_mut().session = session;
        connected
    }

    fn set_status(&self, status: Status) {
        let mut inner = self.inner.borrow_mut();
        inner.state.status = status;
        inner.watchers.retain(|tx| tx.unbounded_send(status).is_ok());
    }

    fn update(&self, f: impl FnOnce(&mut FlowState)) { f(&mut self.inner.borrow_mut().state); }

    fn fail(&self, error: SendError) -> TransferOutcome {
        warn!(error = %error, "transfer failed");
        self.update(|s| {
            if let SendError::ProviderRejected { diagnostics, .. } = &error {
                s.debug_info = Some(diagnostics.clone());
            }
            s.error = Some(error.clone());
        });
        self.set_status(Status::Error);
        TransferOutcome::Failure { error }
    }

    /// Run one submission to its terminal status.
    pub async fn submit(&self, request: TransferRequest) -> TransferOutcome {
        if self.status().is_busy() {
            return TransferOutcome::Failure { error: SendError::Busy };
        }
        self.sync_events();
        self.update(|s| {
            let generation = s.generation + 1;
            *s = FlowState { form: request.clone(), generation, ..FlowState::default() };
        });

        let session = self.session();
        if !session.connected {
            return self.fail(SendError::NoWalletConnected);
        }

        self.set_status(Status::Validating);
        let transfer = match validate(&self.config, &request) {
            Ok(t) => t,
            Err(e) => return self.fail(e),
        };

        self.set_status(Status::AwaitingConfirmation);
        if session.address.is_none() {
            return self.fail(SendError::NoWalletConnected);
        }
        let Some(provider) = self.host.lookup() else {
            return self.fail(SendError::NoWalletConnected);
        };
        if !provider.has_method(Method::SendKaspa) {
            return self.fail(SendError::ProviderIncompatible);
        }

        let fee = self.config.fee.fee_for(transfer.amount);
        info!(to = %transfer.recipient, amount = %transfer.amount, %fee, "sending transfer");
        self.update(|s| s.debug_info = Some(format!("Preparing to send {} KAS to {}", transfer.amount, transfer.recipient)));

        let args = transfer_args(&transfer.recipient, transfer.amount, transfer.note.as_deref());
        let primary = match provider.call(Method::SendKaspa, vec![args]).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_truncated_response() => {
                warn!(error = %e, "truncated wallet response, transfer may have been sent");
                Err(e.message)
            }
            Err(e) => {
                let members = provider.member_names();
                error!(error = %e, ?members, "primary transfer failed");
                let diagnostics = diagnostics(&e, &members);
                return self.fail(SendError::ProviderRejected { message: e.message, diagnostics });
            }
        };

        self.set_status(Status::Processing);
        self.send_fee(provider.as_ref(), fee).await;

        let outcome = match primary {
            Ok(result) => {
                let tx_id = extract_tx_id(&result);
                info!(%tx_id, "transfer successful");
                let fee_spec = &self.config.fee;
                self.update(|s| {
                    s.tx_display = Some(tx_id.clone());
                    s.debug_info = Some(format!(
                        "Transaction sent with amount {} KAS. Fee of {} KAS was sent to {}. Result: {}",
                        transfer.amount, fee, fee_spec.address, result
                    ));
                });
                TransferOutcome::Success { tx_id }
            }
            Err(raw_message) => {
                self.update(|s| {
                    s.tx_display = Some(AMBIGUOUS_MARKER.to_string());
                    s.error = Some(SendError::AmbiguousResponse { message: raw_message.clone() });
                    s.debug_info = Some(format!(
                        "Main transaction possibly sent with amount {}, but received an invalid response: {}. Fee transaction of {} KAS was attempted.",
                        transfer.amount, raw_message, fee
                    ));
                });
                TransferOutcome::AmbiguousSubmission { raw_message }
            }
        };
        self.set_status(outcome.status());
        outcome
    }

    /// Fee transfer. Never retried; the result only reaches the log.
    async fn send_fee(&self, provider: &dyn WalletProvider, fee: Amount) {
        let spec = &self.config.fee;
        debug!(amount = %fee, to = %spec.address, "sending fee transfer");
        let args = transfer_args(&spec.address, fee, Some(&spec.memo));
        match provider.call(Method::SendKaspa, vec![args]).await {
            Ok(result) => info!(%result, "fee transfer result"),
            Err(e) => warn!(error = %e, "fee transfer failed"),
        }
    }

    /// Generation of the displayed submission if it is waiting to auto-reset.
    pub fn pending_reset(&self) -> Option<u64> {
        let inner = self.inner.borrow();
        inner.state.status.resets_after_delay().then_some(inner.state.generation)
    }

    /// Reset timer fired. Only resets if `generation` is still on screen.
    pub fn expire(&self, generation: u64) -> bool {
        if self.pending_reset() != Some(generation) {
            return false;
        }
        self.reset();
        true
    }

    /// Clear the form and return to Idle. Refused while a call is outstanding.
    pub fn reset(&self) -> bool {
        if self.status().is_busy() {
            return false;
        }
        self.update(|s| *s = FlowState { generation: s.generation, ..FlowState::default() });
        self.set_status(Status::Idle);
        true
    }
}
