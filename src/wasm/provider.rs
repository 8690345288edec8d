//! `window.kasware`, seen through `Reflect`
//!
//! Every member is looked up at call time, so an extension that patches
//! itself after injection is still seen correctly.

use async_trait::async_trait;
use js_sys::{Array, Function, Object, Promise, Reflect};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use super::to_js;
use crate::provider::{EventHandler, Method, ProviderError, ProviderHost, WalletProvider};

/// Global the extension injects itself under.
pub const INJECTION_KEY: &str = "kasware";

type Listener = Closure<dyn FnMut(JsValue)>;

pub struct InjectedProvider {
    object: JsValue,
    listeners: RefCell<Vec<(String, Listener)>>,
}

impl InjectedProvider {
    pub fn new(object: JsValue) -> Self {
        Self { object, listeners: RefCell::new(Vec::new()) }
    }

    fn member(&self, name: &str) -> JsValue {
        Reflect::get(&self.object, &JsValue::from_str(name)).unwrap_or(JsValue::UNDEFINED)
    }

    fn function(&self, method: Method) -> Result<Function, ProviderError> {
        self.member(method.as_str())
            .dyn_into::<Function>()
            .map_err(|_| ProviderError::missing(method))
    }
}

/// Convert a thrown / rejected JS value. `Error` objects keep their stack.
fn error_from_js(value: JsValue) -> ProviderError {
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        let message = String::from(err.message());
        let stack = Reflect::get(&value, &JsValue::from_str("stack")).ok().and_then(|s| s.as_string());
        return ProviderError { message, stack };
    }
    if let Some(message) = value.as_string() {
        return ProviderError::new(message);
    }
    let message = Reflect::get(&value, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{value:?}"));
    ProviderError::new(message)
}

fn value_from_js(value: JsValue) -> Value {
    if value.is_undefined() || value.is_null() {
        return Value::Null;
    }
    serde_wasm_bindgen::from_value(value).unwrap_or(Value::Null)
}

#[async_trait(?Send)]
impl WalletProvider for InjectedProvider {
    fn has_method(&self, method: Method) -> bool { self.member(method.as_str()).is_function() }

    fn identity_flag(&self) -> bool { self.member("isKasware").as_bool() == Some(true) }

    fn selected_address(&self) -> Option<String> { self.member("selectedAddress").as_string() }

    fn member_names(&self) -> Vec<String> {
        match self.object.dyn_ref::<Object>() {
            Some(object) => Object::keys(object).iter().filter_map(|k| k.as_string()).collect(),
            None => Vec::new(),
        }
    }

    async fn call(&self, method: Method, args: Vec<Value>) -> Result<Value, ProviderError> {
        let function = self.function(method)?;
        let js_args = Array::new();
        for arg in &args {
            js_args.push(&to_js(arg).map_err(|e| ProviderError::new(e.to_string()))?);
        }

        let result = function.apply(&self.object, &js_args).map_err(error_from_js)?;
        let resolved = match result.dyn_into::<Promise>() {
            Ok(promise) => JsFuture::from(promise).await.map_err(error_from_js)?,
            Err(value) => value,
        };
        Ok(value_from_js(resolved))
    }

    fn listen(&self, registrar: Method, event: &str, handler: EventHandler) -> Result<(), ProviderError> {
        let function = self.function(registrar)?;
        let listener: Listener = Closure::new(move |payload: JsValue| handler(value_from_js(payload)));
        function
            .call2(&self.object, &JsValue::from_str(event), listener.as_ref())
            .map_err(error_from_js)?;
        self.listeners.borrow_mut().push((event.to_string(), listener));
        Ok(())
    }

    fn unlisten(&self, remover: Method, event: &str) -> Result<(), ProviderError> {
        let function = self.function(remover)?;
        let (matching, rest): (Vec<_>, Vec<_>) = self.listeners.borrow_mut().drain(..).partition(|(e, _)| e == event);
        *self.listeners.borrow_mut() = rest;
        for (_, listener) in &matching {
            function
                .call2(&self.object, &JsValue::from_str(event), listener.as_ref())
                .map_err(error_from_js)?;
        }
        Ok(())
    }
}

/// `window` as a provider host. The wrapper is cached per injected object so
/// listener closures stay alive between lookups.
#[derive(Default)]
pub struct WindowHost {
    cached: RefCell<Option<Rc<InjectedProvider>>>,
}

impl ProviderHost for WindowHost {
    fn lookup(&self) -> Option<Rc<dyn WalletProvider>> {
        let window = web_sys::window()?;
        let object = Reflect::get(&window, &JsValue::from_str(INJECTION_KEY)).ok()?;
        let mut cached = self.cached.borrow_mut();
        if object.is_undefined() || object.is_null() {
            cached.take();
            return None;
        }
        let provider = match cached.as_ref() {
            Some(p) if Object::is(&p.object, &object) => Rc::clone(p),
            _ => {
                let p = Rc::new(InjectedProvider::new(object));
                *cached = Some(Rc::clone(&p));
                p
            }
        };
        Some(provider as Rc<dyn WalletProvider>)
    }
}
