//! Provider - the injected wallet extension, seen only through probing
//!
//! The extension is an opaque object. Every member is optional: callers ask
//! [`WalletProvider::has_method`] before calling, and walk a fixed priority
//! list per concern, using the first member present and never merging
//! answers from several.
//!
//! ```text
//! ProviderHost (window.kasware, or in-memory)
//!     │ lookup()
//!     ▼
//! WalletProvider
//!     ├── isKasware / selectedAddress        (properties)
//!     ├── getAccounts / accounts             (account query)
//!     ├── requestAccounts / enable / connect (connection)
//!     ├── disconnect
//!     ├── sendKaspa                          (transfer)
//!     └── on / addListener / addEventListener        (subscribe)
//!         removeListener / off / removeEventListener (unsubscribe)
//! ```

mod memory;

pub use memory::{MemoryHost, MemoryProvider};

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use thiserror::Error;

/// Event name the extension fires when the active account changes.
pub const ACCOUNTS_CHANGED: &str = "accountsChanged";

/// Members the adapter knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GetAccounts,
    Accounts,
    RequestAccounts,
    Enable,
    Connect,
    Disconnect,
    SendKaspa,
    On,
    AddListener,
    AddEventListener,
    RemoveListener,
    Off,
    RemoveEventListener,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GetAccounts => "getAccounts",
            Method::Accounts => "accounts",
            Method::RequestAccounts => "requestAccounts",
            Method::Enable => "enable",
            Method::Connect => "connect",
            Method::Disconnect => "disconnect",
            Method::SendKaspa => "sendKaspa",
            Method::On => "on",
            Method::AddListener => "addListener",
            Method::AddEventListener => "addEventListener",
            Method::RemoveListener => "removeListener",
            Method::Off => "off",
            Method::RemoveEventListener => "removeEventListener",
        }
    }
}

/// A member name the adapter does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown provider method '{0}'")]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        ALL_METHODS.iter().copied().find(|m| m.as_str() == name).ok_or_else(|| UnknownMethod(name.to_string()))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

pub const ALL_METHODS: &[Method] = &[
    Method::GetAccounts,
    Method::Accounts,
    Method::RequestAccounts,
    Method::Enable,
    Method::Connect,
    Method::Disconnect,
    Method::SendKaspa,
    Method::On,
    Method::AddListener,
    Method::AddEventListener,
    Method::RemoveListener,
    Method::Off,
    Method::RemoveEventListener,
];

/// Any of these marks the object as a real wallet during detection.
pub const DETECT_METHODS: &[Method] = &[Method::GetAccounts, Method::Accounts, Method::RequestAccounts, Method::Enable];
/// Silent "who is connected" query, in priority order.
pub const ACCOUNT_QUERY_METHODS: &[Method] = &[Method::GetAccounts, Method::Accounts];
/// User-prompting connection, in priority order.
pub const CONNECT_METHODS: &[Method] = &[Method::RequestAccounts, Method::Enable, Method::Connect];
pub const SUBSCRIBE_METHODS: &[Method] = &[Method::On, Method::AddListener, Method::AddEventListener];
pub const UNSUBSCRIBE_METHODS: &[Method] = &[Method::RemoveListener, Method::Off, Method::RemoveEventListener];

/// Callback registered for provider-pushed events. Receives the raw payload.
pub type EventHandler = Rc<dyn Fn(Value)>;

/// An error raised by the extension, in the shape of a JS `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    pub stack: Option<String>,
}

/// Signature of Kasware's truncated-response bug: the transfer may have been
/// broadcast even though its reply failed to parse. Kasware-specific; other
/// messages must not be matched.
pub const TRUNCATED_RESPONSE: &str = "Unexpected end of JSON input";

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), stack: None }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn missing(method: Method) -> Self {
        Self::new(format!("provider has no '{method}' method"))
    }

    pub fn is_truncated_response(&self) -> bool {
        self.message.contains(TRUNCATED_RESPONSE)
    }
}

/// The injected wallet object.
///
/// Single-threaded: implementations live on the page's event loop.
#[async_trait(?Send)]
pub trait WalletProvider {
    /// Whether `method` is present and callable.
    fn has_method(&self, method: Method) -> bool;

    /// The `isKasware` identity flag.
    fn identity_flag(&self) -> bool;

    /// The `selectedAddress` property, when it is a string.
    fn selected_address(&self) -> Option<String>;

    /// Every member name on the object, for diagnostics.
    fn member_names(&self) -> Vec<String>;

    /// Call `method` with positional arguments and await its result.
    async fn call(&self, method: Method, args: Vec<Value>) -> Result<Value, ProviderError>;

    /// Register `handler` for `event` through the `registrar` convention.
    fn listen(&self, registrar: Method, event: &str, handler: EventHandler) -> Result<(), ProviderError>;

    /// Undo every registration made for `event`, through `remover`.
    fn unlisten(&self, remover: Method, event: &str) -> Result<(), ProviderError>;
}

/// First method of `candidates` the provider exposes.
pub fn first_supported(provider: &dyn WalletProvider, candidates: &[Method]) -> Option<Method> {
    candidates.iter().copied().find(|m| provider.has_method(*m))
}

/// Where the provider lives: `window.kasware` in a browser.
pub trait ProviderHost {
    /// The provider object, if one is injected right now.
    fn lookup(&self) -> Option<Rc<dyn WalletProvider>>;
}

/// Detection rule: the object exists and either carries the identity flag,
/// exposes an account/connection method, or has a `selectedAddress`.
pub fn is_recognized(provider: &dyn WalletProvider) -> bool {
    provider.identity_flag()
        || first_supported(provider, DETECT_METHODS).is_some()
        || provider.selected_address().is_some()
}

/// Normalise an account-list payload: arrays keep their string entries, a
/// lone string becomes a one-element list, anything else is empty.
pub fn account_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        Value::String(s) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
