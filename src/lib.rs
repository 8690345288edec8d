//! KaspaTip: send Kaspa through the Kasware browser wallet, with a 0.1%
//! developer fee attached to every transfer.
//!
//! Nothing here signs or builds transactions. The injected extension does
//! all of that; this crate probes it, tracks the connected account, and runs
//! the two-step "primary transfer, then fee transfer" flow.
//!
//! # Architecture
//!
//! ```text
//! TipApp
//!   │
//!   ├── WalletSession (session adapter)
//!   │     ├── detection: startup / focus / poll until found
//!   │     ├── connect / disconnect / accountsChanged
//!   │     └── publishes ─┐
//!   │                    ▼
//!   ├── EventBus ── Connected | Disconnected | AccountsChanged
//!   │                    │
//!   │                    ▼ subscribes
//!   └── SendFlow (send flow controller)
//!         ├── validate → sendKaspa(primary) → sendKaspa(fee)
//!         └── Status: Idle → Validating → AwaitingConfirmation
//!                     → Processing → Success | AmbiguousPending | Error
//!
//! ProviderHost ── window.kasware (wasm) | MemoryHost (tests, CLI)
//! ```
//!
//! # Features
//!
//! - `native` - tokio timers, signal handling, log subscriber, `kaspatip` CLI
//! - `wasm` - `TipWidget` for the browser, bound to `window.kasware`
//!
//! # Usage
//!
//! ```ignore
//! use kaspatip::{MemoryHost, MemoryProvider, TipApp, TipConfig, TransferRequest};
//! use std::rc::Rc;
//!
//! let provider = Rc::new(MemoryProvider::new().with_accounts(&["kaspa:qq..."]));
//! let app = TipApp::new(Rc::new(MemoryHost::with_provider(provider)), TipConfig::default());
//! app.start().await;
//! app.connect().await?;
//! let submitted = app.submit(TransferRequest::new("kaspa:qz...", "10")).await;
//! ```

// =============================================================================
// Shared modules (compile everywhere)
// =============================================================================
pub mod address;
pub mod amount;
pub mod app;
pub mod config;
pub mod events;
pub mod provider;
pub mod send;
pub mod session;

// =============================================================================
// Native-only modules (tokio, log subscriber)
// =============================================================================
#[cfg(feature = "native")]
pub mod logging;
#[cfg(feature = "native")]
pub mod runtime;

// =============================================================================
// WASM-only modules (browser, wasm-bindgen)
// =============================================================================
#[cfg(feature = "wasm")]
pub mod wasm;

// =============================================================================
// Re-exports
// =============================================================================
pub use address::{format_address, is_valid_address, short_address};
pub use amount::{fee_preview, Amount, AmountError, FeeSpec};
pub use app::{Submitted, TipApp};
pub use config::TipConfig;
pub use events::{EventBus, WalletEvent};
pub use provider::{MemoryHost, MemoryProvider, Method, ProviderError, ProviderHost, WalletProvider};
pub use send::{submit_control, SendError, SendFlow, Status, SubmitControl, TransferOutcome, TransferRequest};
pub use session::{ConnectError, Poll, Session, WalletSession};

#[cfg(feature = "native")]
pub use runtime::{install_signal_handlers, Shutdown};

#[cfg(feature = "wasm")]
pub use wasm::TipWidget;
