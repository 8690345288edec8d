//! Integration Tests: tipping through an in-memory Kasware wallet
//!
//! These tests verify:
//! 1. Primary transfer then fee transfer, with their wire arguments
//! 2. Truncated replies are ambiguous, every other rejection is fatal
//! 3. Fee failures never change the primary outcome
//! 4. Status transitions, auto-reset and stale reset timers
//! 5. The busy guard while the wallet is prompting

use async_trait::async_trait;
use futures::channel::oneshot;
use kaspatip::config::FEE_ADDRESS;
use kaspatip::provider::EventHandler;
use kaspatip::runtime::reset_after;
use kaspatip::send::{AMBIGUOUS_MARKER, NO_HASH_PLACEHOLDER};
use kaspatip::{
    MemoryHost, MemoryProvider, Method, ProviderError, ProviderHost, SendError, Status, TipApp, TipConfig,
    TransferOutcome, TransferRequest, WalletProvider,
};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

// The maintainers' own address doubles as a well-formed recipient
const RECIPIENT: &str = "kaspa:qzqp7lkqwe06hnnywhdsem4jap6zqdtlya9jrdkc97294v2xju8rx3jm9tf6m";
const ACCOUNT: &str = "kaspa:qypr7ayn2hvzr2d9ny0gd5qjy7ufkqpe4z5ddrvvqv3nq8h0xkw9sckkx7rm4";

async fn connected_app(provider: Rc<MemoryProvider>) -> TipApp {
    let app = TipApp::new(Rc::new(MemoryHost::with_provider(provider)), TipConfig::fast_test());
    assert!(app.start().await);
    app.connect().await.expect("connect");
    app
}

fn wallet() -> Rc<MemoryProvider> {
    Rc::new(MemoryProvider::new().with_accounts(&[ACCOUNT]))
}

/// Test: a tip sends the amount, then 0.1% to the fee address
#[tokio::test]
async fn tip_sends_primary_then_fee() {
    let provider = wallet();
    let app = connected_app(Rc::clone(&provider)).await;

    let submitted = app.submit(TransferRequest::new(RECIPIENT, "10")).await;
    assert_eq!(submitted.outcome, TransferOutcome::Success { tx_id: "memtx0001".into() });

    let sends = provider.calls_to(Method::SendKaspa);
    assert_eq!(sends.len(), 2);
    assert_eq!(sends[0], vec![json!({"to": RECIPIENT, "amount": "10"})]);
    assert_eq!(sends[1], vec![json!({"to": FEE_ADDRESS, "amount": "0.01", "message": "KaspaTip fee"})]);

    let state = app.state();
    assert_eq!(state.status, Status::Success);
    assert_eq!(state.tx_display.as_deref(), Some("memtx0001"));
    assert!(state.error.is_none());
    assert_eq!(submitted.reset, Some((state.generation, Duration::from_millis(50))));
}

/// Test: the note travels with the primary transfer only
#[tokio::test]
async fn note_is_attached_to_primary() {
    let provider = wallet();
    let app = connected_app(Rc::clone(&provider)).await;

    app.submit(TransferRequest::new(format!("  {RECIPIENT}  "), "1.5").with_note("thanks!")).await;

    let sends = provider.calls_to(Method::SendKaspa);
    assert_eq!(sends[0], vec![json!({"to": RECIPIENT, "amount": "1.5", "message": "thanks!"})]);
    assert_eq!(sends[1][0]["amount"], "0.0015");
    assert_eq!(sends[1][0]["message"], "KaspaTip fee");
}

/// Test: no provider at all
#[tokio::test]
async fn absent_provider() {
    let app = TipApp::new(Rc::new(MemoryHost::new()), TipConfig::fast_test());
    assert!(!app.start().await);
    assert!(!app.session().detect_provider());
    assert!(app.connect().await.is_err());

    let submitted = app.submit(TransferRequest::new(RECIPIENT, "10")).await;
    assert_eq!(submitted.outcome, TransferOutcome::Failure { error: SendError::NoWalletConnected });
    assert_eq!(app.state().status, Status::Error);
    assert!(submitted.reset.is_none());
}

/// Test: provider present but the page never connected
#[tokio::test]
async fn disconnected_session_makes_no_calls() {
    let provider = wallet();
    let app = TipApp::new(Rc::new(MemoryHost::with_provider(Rc::clone(&provider))), TipConfig::fast_test());
    assert!(app.start().await);

    let submitted = app.submit(TransferRequest::new(RECIPIENT, "10")).await;
    assert_eq!(submitted.outcome, TransferOutcome::Failure { error: SendError::NoWalletConnected });
    assert_eq!(app.state().error_message().as_deref(), Some("Please connect your Kasware wallet first"));
    assert!(provider.calls_to(Method::SendKaspa).is_empty());
}

/// Test: invalid input never reaches the wallet
#[tokio::test]
async fn invalid_input_is_rejected_before_sending() {
    let provider = wallet();
    let app = connected_app(Rc::clone(&provider)).await;

    let outcome = app.submit(TransferRequest::new("bitcoin:qzqp7l", "10")).await.outcome;
    assert!(matches!(outcome, TransferOutcome::Failure { error: SendError::InvalidRecipient { .. } }));

    let outcome = app.submit(TransferRequest::new("kaspa:short", "10")).await.outcome;
    assert!(matches!(outcome, TransferOutcome::Failure { error: SendError::InvalidRecipient { .. } }));

    for amount in ["0", "-1", "", "ten"] {
        let outcome = app.submit(TransferRequest::new(RECIPIENT, amount)).await.outcome;
        assert_eq!(outcome, TransferOutcome::Failure { error: SendError::InvalidAmount }, "amount {amount:?}");
    }

    assert!(provider.calls_to(Method::SendKaspa).is_empty());
    assert_eq!(app.state().status, Status::Error);
}

/// Test: wallet without sendKaspa
#[tokio::test]
async fn provider_without_send_is_incompatible() {
    let provider = Rc::new(MemoryProvider::new().without_method(Method::SendKaspa).with_accounts(&[ACCOUNT]));
    let app = connected_app(provider).await;

    let outcome = app.submit(TransferRequest::new(RECIPIENT, "1")).await.outcome;
    assert_eq!(outcome, TransferOutcome::Failure { error: SendError::ProviderIncompatible });
}

/// Test: truncated reply is ambiguous and the fee is still attempted
#[tokio::test]
async fn truncated_reply_is_ambiguous() {
    let provider = wallet();
    let app = connected_app(Rc::clone(&provider)).await;
    provider.fail_next(Method::SendKaspa, ProviderError::new("SyntaxError: Unexpected end of JSON input"));

    let submitted = app.submit(TransferRequest::new(RECIPIENT, "2")).await;
    assert_eq!(
        submitted.outcome,
        TransferOutcome::AmbiguousSubmission { raw_message: "SyntaxError: Unexpected end of JSON input".into() }
    );

    let sends = provider.calls_to(Method::SendKaspa);
    assert_eq!(sends.len(), 2);
    assert_eq!(sends[1][0]["to"], FEE_ADDRESS);
    assert_eq!(sends[1][0]["amount"], "0.002");

    let state = app.state();
    assert_eq!(state.status, Status::AmbiguousPending);
    assert_eq!(state.tx_display.as_deref(), Some(AMBIGUOUS_MARKER));
    assert!(matches!(state.error, Some(SendError::AmbiguousResponse { .. })));
    assert!(submitted.reset.is_some());
}

/// Test: any other rejection is fatal and skips the fee
#[tokio::test]
async fn rejection_is_fatal_and_skips_fee() {
    let provider = wallet();
    let app = connected_app(Rc::clone(&provider)).await;
    provider.fail_next(Method::SendKaspa, ProviderError::new("User rejected").with_stack("at sendKaspa"));

    let submitted = app.submit(TransferRequest::new(RECIPIENT, "10")).await;
    let TransferOutcome::Failure { error: SendError::ProviderRejected { message, diagnostics } } = submitted.outcome.clone() else {
        panic!("expected a rejection, got {:?}", submitted.outcome);
    };
    assert_eq!(message, "User rejected");
    assert!(diagnostics.contains("Stack: at sendKaspa"));
    assert!(diagnostics.contains("sendKaspa"));

    assert_eq!(provider.calls_to(Method::SendKaspa).len(), 1);
    let state = app.state();
    assert_eq!(state.status, Status::Error);
    assert_eq!(state.error_message().as_deref(), Some("User rejected"));
    assert_eq!(state.debug_info, Some(diagnostics));
    assert!(submitted.reset.is_none());
}

/// Test: a failed fee transfer leaves the primary success intact
#[tokio::test]
async fn fee_failure_does_not_change_outcome() {
    let provider = wallet();
    let app = connected_app(Rc::clone(&provider)).await;
    provider.respond_next(Method::SendKaspa, json!("abc123"));
    provider.fail_next(Method::SendKaspa, ProviderError::new("Insufficient funds for fee"));

    let outcome = app.submit(TransferRequest::new(RECIPIENT, "10")).await.outcome;
    assert_eq!(outcome, TransferOutcome::Success { tx_id: "abc123".into() });
    assert_eq!(provider.calls_to(Method::SendKaspa).len(), 2);
    assert!(app.state().error.is_none());
}

/// Test: a failed fee transfer after a truncated reply stays ambiguous
#[tokio::test]
async fn fee_failure_keeps_ambiguous_status() {
    let provider = wallet();
    let app = connected_app(Rc::clone(&provider)).await;
    provider.fail_next(Method::SendKaspa, ProviderError::new("Unexpected end of JSON input"));
    provider.fail_next(Method::SendKaspa, ProviderError::new("Insufficient funds for fee"));

    let submitted = app.submit(TransferRequest::new(RECIPIENT, "5")).await;
    assert_eq!(
        submitted.outcome,
        TransferOutcome::AmbiguousSubmission { raw_message: "Unexpected end of JSON input".into() }
    );
    assert_eq!(provider.calls_to(Method::SendKaspa).len(), 2);

    let state = app.state();
    assert_eq!(state.status, Status::AmbiguousPending);
    assert_eq!(state.tx_display.as_deref(), Some(AMBIGUOUS_MARKER));
    assert!(matches!(state.error, Some(SendError::AmbiguousResponse { .. })));
    assert!(submitted.reset.is_some());
}

/// Test: a result without an identifier shows the placeholder
#[tokio::test]
async fn missing_tx_id_shows_placeholder() {
    let provider = wallet();
    let app = connected_app(Rc::clone(&provider)).await;
    provider.respond_next(Method::SendKaspa, json!({"status": "ok"}));

    let outcome = app.submit(TransferRequest::new(RECIPIENT, "1")).await.outcome;
    assert_eq!(outcome, TransferOutcome::Success { tx_id: NO_HASH_PLACEHOLDER.into() });
}

/// Test: status watchers see every transition in order
#[tokio::test]
async fn status_transitions() {
    let app = connected_app(wallet()).await;
    let mut statuses = app.flow().watch_status();

    app.submit(TransferRequest::new(RECIPIENT, "10")).await;
    let mut seen = Vec::new();
    while let Ok(Some(status)) = statuses.try_next() {
        seen.push(status);
    }
    assert_eq!(seen, vec![Status::Validating, Status::AwaitingConfirmation, Status::Processing, Status::Success]);
}

/// Test: the reset timer returns the form to Idle, once
#[tokio::test]
async fn reset_timer_clears_form() {
    let app = connected_app(wallet()).await;
    let submitted = app.submit(TransferRequest::new(RECIPIENT, "10").with_note("hi")).await;
    assert_eq!(app.state().form.note.as_deref(), Some("hi"));

    assert!(reset_after(&app, &submitted).await);
    let state = app.state();
    assert_eq!(state.status, Status::Idle);
    assert_eq!(state.form, TransferRequest::default());
    assert!(state.tx_display.is_none());

    let (generation, _) = submitted.reset.expect("reset");
    assert!(!app.expire(generation));
}

/// Test: a timer armed for an older submission does nothing
#[tokio::test]
async fn stale_reset_is_ignored() {
    let app = connected_app(wallet()).await;
    let first = app.submit(TransferRequest::new(RECIPIENT, "1")).await;
    let second = app.submit(TransferRequest::new(RECIPIENT, "2")).await;

    let (stale, _) = first.reset.expect("first reset");
    let (current, _) = second.reset.expect("second reset");
    assert!(!app.expire(stale));
    assert_eq!(app.state().status, Status::Success);
    assert!(app.expire(current));
    assert_eq!(app.state().status, Status::Idle);
}

/// Test: errors stay until the next submission
#[tokio::test]
async fn error_does_not_auto_reset() {
    let app = connected_app(wallet()).await;
    let submitted = app.submit(TransferRequest::new(RECIPIENT, "0")).await;
    assert!(submitted.reset.is_none());
    assert!(!reset_after(&app, &submitted).await);
    assert_eq!(app.state().status, Status::Error);

    let outcome = app.submit(TransferRequest::new(RECIPIENT, "1")).await.outcome;
    assert!(matches!(outcome, TransferOutcome::Success { .. }));
}

/// Holds `sendKaspa` until released, like a wallet waiting on the user.
struct PromptingWallet {
    wallet: MemoryProvider,
    prompt: RefCell<Option<oneshot::Receiver<()>>>,
}

#[async_trait(?Send)]
impl WalletProvider for PromptingWallet {
    fn has_method(&self, method: Method) -> bool { self.wallet.has_method(method) }
    fn identity_flag(&self) -> bool { self.wallet.identity_flag() }
    fn selected_address(&self) -> Option<String> { self.wallet.selected_address() }
    fn member_names(&self) -> Vec<String> { self.wallet.member_names() }

    async fn call(&self, method: Method, args: Vec<Value>) -> Result<Value, ProviderError> {
        if method == Method::SendKaspa {
            let prompt = self.prompt.borrow_mut().take();
            if let Some(prompt) = prompt {
                let _ = prompt.await;
            }
        }
        self.wallet.call(method, args).await
    }

    fn listen(&self, registrar: Method, event: &str, handler: EventHandler) -> Result<(), ProviderError> {
        self.wallet.listen(registrar, event, handler)
    }

    fn unlisten(&self, remover: Method, event: &str) -> Result<(), ProviderError> {
        self.wallet.unlisten(remover, event)
    }
}

struct PromptingHost(Rc<PromptingWallet>);

impl ProviderHost for PromptingHost {
    fn lookup(&self) -> Option<Rc<dyn WalletProvider>> { Some(Rc::clone(&self.0) as Rc<dyn WalletProvider>) }
}

/// Test: a second submission while the wallet prompts is refused
#[tokio::test]
async fn busy_guard_refuses_resubmission() {
    let (confirm, prompt) = oneshot::channel();
    let wallet = Rc::new(PromptingWallet {
        wallet: MemoryProvider::new().with_accounts(&[ACCOUNT]),
        prompt: RefCell::new(Some(prompt)),
    });
    let app = TipApp::new(Rc::new(PromptingHost(Rc::clone(&wallet))), TipConfig::fast_test());
    app.start().await;
    app.connect().await.expect("connect");

    let first = app.submit(TransferRequest::new(RECIPIENT, "10"));
    let second = async {
        while !app.flow().status().is_busy() {
            tokio::task::yield_now().await;
        }
        let control = app.flow().submit_control();
        let refused_reset = app.flow().reset();
        let busy = app.submit(TransferRequest::new(RECIPIENT, "99")).await;
        let _ = confirm.send(());
        (control, refused_reset, busy)
    };
    let (first, (control, refused_reset, busy)) = tokio::join!(first, second);

    assert_eq!(busy.outcome, TransferOutcome::Failure { error: SendError::Busy });
    assert!(busy.reset.is_none());
    assert_eq!(control.label, "Awaiting Confirmation");
    assert!(!control.enabled);
    assert!(!refused_reset);

    assert!(matches!(first.outcome, TransferOutcome::Success { .. }));
    assert_eq!(app.state().form.amount, "10");
    assert_eq!(wallet.wallet.calls_to(Method::SendKaspa).len(), 2);
}
