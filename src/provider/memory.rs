//! In-memory provider and host
//!
//! Behaves like a Kasware extension closely enough to drive the session
//! adapter and the send flow without a browser: it holds accounts, tracks
//! authorization, records every call, and lets callers script failures and
//! replies per method.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use super::{EventHandler, Method, ProviderError, ProviderHost, WalletProvider, ALL_METHODS};

#[derive(Default)]
struct Inner {
    methods: HashSet<Method>,
    identity_flag: bool,
    selected_address: Option<String>,
    accounts: Vec<String>,
    authorized: bool,
    scripted: HashMap<Method, VecDeque<Result<Value, ProviderError>>>,
    calls: Vec<(Method, Vec<Value>)>,
    listeners: Vec<(Method, String, EventHandler)>,
    sent: u64,
}

pub struct MemoryProvider {
    inner: RefCell<Inner>,
}

impl Default for MemoryProvider {
    fn default() -> Self { Self::new() }
}

impl MemoryProvider {
    /// A Kasware-shaped provider: identity flag, `getAccounts`,
    /// `requestAccounts`, `disconnect`, `sendKaspa`, `on`, `removeListener`.
    pub fn new() -> Self {
        Self::bare().with_identity_flag().with_methods(&[
            Method::GetAccounts,
            Method::RequestAccounts,
            Method::Disconnect,
            Method::SendKaspa,
            Method::On,
            Method::RemoveListener,
        ])
    }

    /// An object with no recognised members at all.
    pub fn bare() -> Self { Self { inner: RefCell::new(Inner::default()) } }

    pub fn with_identity_flag(mut self) -> Self { self.inner.get_mut().identity_flag = true; self }

    pub fn with_methods(mut self, methods: &[Method]) -> Self {
        self.inner.get_mut().methods.extend(methods.iter().copied());
        self
    }

    pub fn without_method(mut self, method: Method) -> Self {
        self.inner.get_mut().methods.remove(&method);
        self
    }

    pub fn with_selected_address(mut self, address: impl Into<String>) -> Self {
        self.inner.get_mut().selected_address = Some(address.into());
        self
    }

    /// Accounts held by the wallet, returned once the page is authorized.
    pub fn with_accounts(mut self, accounts: &[&str]) -> Self {
        self.inner.get_mut().accounts = accounts.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Start already authorized, as if the user connected on a previous visit.
    pub fn authorized(mut self) -> Self { self.inner.get_mut().authorized = true; self }

    /// Make the next call to `method` fail with `error`.
    pub fn fail_next(&self, method: Method, error: ProviderError) {
        self.inner.borrow_mut().scripted.entry(method).or_default().push_back(Err(error));
    }

    /// Make the next call to `method` resolve to `value`.
    pub fn respond_next(&self, method: Method, value: Value) {
        self.inner.borrow_mut().scripted.entry(method).or_default().push_back(Ok(value));
    }

    pub fn calls(&self) -> Vec<(Method, Vec<Value>)> { self.inner.borrow().calls.clone() }

    pub fn calls_to(&self, method: Method) -> Vec<Vec<Value>> {
        self.inner.borrow().calls.iter().filter(|(m, _)| *m == method).map(|(_, a)| a.clone()).collect()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.borrow().listeners.iter().filter(|(_, e, _)| e == event).count()
    }

    /// Registrar used for each active listener, in registration order.
    pub fn registrars(&self) -> Vec<Method> {
        self.inner.borrow().listeners.iter().map(|(m, _, _)| *m).collect()
    }

    /// Fire `event` with `payload` to every registered handler.
    pub fn emit(&self, event: &str, payload: Value) {
        let handlers: Vec<EventHandler> = self
            .inner
            .borrow()
            .listeners
            .iter()
            .filter(|(_, e, _)| e == event)
            .map(|(_, _, h)| Rc::clone(h))
            .collect();
        for handler in handlers {
            handler(payload.clone());
        }
    }

    /// Switch the wallet's accounts (user picked another account or locked it).
    pub fn set_accounts(&self, accounts: &[&str]) {
        self.inner.borrow_mut().accounts = accounts.iter().map(|a| a.to_string()).collect();
    }

    fn granted_accounts(inner: &Inner) -> Value {
        if inner.authorized { json!(inner.accounts) } else { json!([]) }
    }
}

#[async_trait(?Send)]
impl WalletProvider for MemoryProvider {
    fn has_method(&self, method: Method) -> bool { self.inner.borrow().methods.contains(&method) }

    fn identity_flag(&self) -> bool { self.inner.borrow().identity_flag }

    fn selected_address(&self) -> Option<String> { self.inner.borrow().selected_address.clone() }

    fn member_names(&self) -> Vec<String> {
        let inner = self.inner.borrow();
        let mut names: Vec<String> = ALL_METHODS
            .iter()
            .filter(|m| inner.methods.contains(m))
            .map(|m| m.as_str().to_string())
            .collect();
        if inner.identity_flag { names.insert(0, "isKasware".into()); }
        if inner.selected_address.is_some() { names.push("selectedAddress".into()); }
        names
    }

    async fn call(&self, method: Method, args: Vec<Value>) -> Result<Value, ProviderError> {
        let mut inner = self.inner.borrow_mut();
        inner.calls.push((method, args));
        if !inner.methods.contains(&method) {
            return Err(ProviderError::missing(method));
        }
        if let Some(reply) = inner.scripted.get_mut(&method).and_then(VecDeque::pop_front) {
            if reply.is_ok() && matches!(method, Method::RequestAccounts | Method::Enable | Method::Connect) {
                inner.authorized = true;
            }
            return reply;
        }
        match method {
            Method::GetAccounts | Method::Accounts => Ok(Self::granted_accounts(&inner)),
            Method::RequestAccounts | Method::Enable => {
                inner.authorized = true;
                Ok(json!(inner.accounts))
            }
            Method::Connect => {
                inner.authorized = true;
                Ok(inner.accounts.first().map(|a| json!(a)).unwrap_or(Value::Null))
            }
            Method::Disconnect => {
                inner.authorized = false;
                Ok(Value::Null)
            }
            Method::SendKaspa => {
                inner.sent += 1;
                Ok(json!({ "txid": format!("memtx{:04}", inner.sent) }))
            }
            _ => Ok(Value::Null),
        }
    }

    fn listen(&self, registrar: Method, event: &str, handler: EventHandler) -> Result<(), ProviderError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.methods.contains(&registrar) {
            return Err(ProviderError::missing(registrar));
        }
        inner.listeners.push((registrar, event.to_string(), handler));
        Ok(())
    }

    fn unlisten(&self, remover: Method, event: &str) -> Result<(), ProviderError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.methods.contains(&remover) {
            return Err(ProviderError::missing(remover));
        }
        inner.listeners.retain(|(_, e, _)| e != event);
        Ok(())
    }
}

/// Stand-in for `window`: holds at most one provider, which can be injected
/// late or removed to simulate the extension coming and going.
#[derive(Default)]
pub struct MemoryHost {
    slot: RefCell<Option<Rc<MemoryProvider>>>,
    lookups: Cell<u64>,
}

impl MemoryHost {
    pub fn new() -> Self { Self::default() }

    pub fn with_provider(provider: Rc<MemoryProvider>) -> Self {
        let host = Self::new();
        host.inject(provider);
        host
    }

    pub fn inject(&self, provider: Rc<MemoryProvider>) { *self.slot.borrow_mut() = Some(provider); }

    pub fn remove(&self) { self.slot.borrow_mut().take(); }

    /// How many times the page looked for the provider.
    pub fn lookups(&self) -> u64 { self.lookups.get() }
}

impl ProviderHost for MemoryHost {
    fn lookup(&self) -> Option<Rc<dyn WalletProvider>> {
        self.lookups.set(self.lookups.get() + 1);
        self.slot.borrow().as_ref().map(|p| Rc::clone(p) as Rc<dyn WalletProvider>)
    }
}
