//! WASM module: KaspaTip in the browser
//!
//! Binds the core to `window.kasware` and to the page:
//! - `WindowHost` / `InjectedProvider`: the extension object, probed via `Reflect`
//! - `TipWidget`: JS-facing API for the form and the connect button
//! - session events re-dispatched as `window` `CustomEvent`s
//!
//! Architecture:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         TipWidget (JS API)              │
//! │  connect, disconnect, submit, state     │
//! └─────────────────┬───────────────────────┘
//!                   │ focus listener, setInterval, setTimeout
//! ┌─────────────────▼───────────────────────┐
//! │              TipApp                     │
//! │  WalletSession + SendFlow + EventBus    │
//! └─────────────────┬───────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────┐
//! │   WindowHost → InjectedProvider         │
//! │   window.kasware (Reflect + JsFuture)   │
//! └─────────────────────────────────────────┘
//! ```

mod provider;
mod widget;

pub use provider::{InjectedProvider, WindowHost, INJECTION_KEY};
pub use widget::TipWidget;

use serde::Serialize;
use tracing_subscriber::prelude::*;
use wasm_bindgen::prelude::*;

use crate::config::DEFAULT_LOG_FILTER;

/// Initialize WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    init_console_logging(DEFAULT_LOG_FILTER);
}

/// Route `tracing` events to the browser console, `warn!` to `console.warn`
/// and so on. A second call is a no-op.
pub fn init_console_logging(directive: &str) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .without_time() // no SystemTime in the browser
        .with_target(false)
        .with_writer(tracing_web::MakeWebConsoleWriter::new());
    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(tracing_subscriber::EnvFilter::new(directive))
        .try_init();
}

/// Log to browser console
pub fn console_log(s: &str) {
    web_sys::console::log_1(&JsValue::from_str(s));
}

macro_rules! log {
    ($($t:tt)*) => {
        crate::wasm::console_log(&format!($($t)*))
    }
}

pub(crate) use log;

/// Serialize into a plain JS value (maps become objects).
pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    let serializer = serde_wasm_bindgen::Serializer::new().serialize_maps_as_objects(true);
    value.serialize(&serializer)
}
