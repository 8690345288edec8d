//! TipWidget - the JS-facing tip form
//!
//! ```javascript
//! const widget = new TipWidget();
//! window.addEventListener("kasware_connected", (e) => render(e.detail.address));
//!
//! await widget.connect();
//! const outcome = await widget.submit("kaspa:qz...", "10", "thanks");
//! console.log(widget.status, widget.submitLabel, widget.feePreview("10"));
//! ```

use futures::StreamExt;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CustomEvent, CustomEventInit, Window};

use super::provider::WindowHost;
use super::{log, to_js};
use crate::address::short_address;
use crate::amount::fee_preview;
use crate::app::{Submitted, TipApp};
use crate::config::TipConfig;
use crate::events::WalletEvent;
use crate::send::TransferRequest;
use crate::session::Poll;

const CONNECT_LABEL: &str = "Connect Wallet";

fn window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("no window"))
}

fn js_err(e: impl std::fmt::Display) -> JsValue { JsValue::from_str(&e.to_string()) }

fn millis(duration: std::time::Duration) -> i32 { i32::try_from(duration.as_millis()).unwrap_or(i32::MAX) }

/// The detection interval. Cleared for good once the provider shows up.
#[derive(Default)]
struct PollSlot {
    id: Cell<Option<i32>>,
    callback: RefCell<Option<Closure<dyn FnMut()>>>,
}

impl PollSlot {
    fn arm(self: &Rc<Self>, app: &TipApp) -> Result<(), JsValue> {
        if self.id.get().is_some() {
            return Ok(());
        }
        let timeout = millis(app.config().poll_interval);
        let slot = Rc::downgrade(self);
        let app = app.clone();
        let callback: Closure<dyn FnMut()> = Closure::new(move || {
            let app = app.clone();
            let slot = slot.clone();
            wasm_bindgen_futures::spawn_local(async move {
                if app.poll().await == Poll::Stop {
                    if let Some(slot) = slot.upgrade() {
                        slot.cancel();
                    }
                }
            });
        });

        let id = window()?
            .set_interval_with_callback_and_timeout_and_arguments_0(callback.as_ref().unchecked_ref(), timeout)?;
        self.id.set(Some(id));
        *self.callback.borrow_mut() = Some(callback);
        Ok(())
    }

    fn cancel(&self) {
        if let Some(id) = self.id.take() {
            if let Some(window) = web_sys::window() {
                window.clear_interval_with_handle(id);
            }
        }
        self.callback.borrow_mut().take();
    }
}

/// Re-dispatch bus events as `window` CustomEvents.
fn forward_events(app: &TipApp) {
    let mut events = app.bus().subscribe();
    wasm_bindgen_futures::spawn_local(async move {
        while let Some(event) = events.next().await {
            if let Err(e) = dispatch(&event) {
                log!("[kaspatip] dispatching {} failed: {:?}", event.name(), e);
            }
        }
    });
}

fn dispatch(event: &WalletEvent) -> Result<(), JsValue> {
    let detail = match event {
        WalletEvent::Connected { address } => json!({ "address": address }),
        WalletEvent::Disconnected => json!({}),
        WalletEvent::AccountsChanged { accounts } => json!({ "accounts": accounts }),
    };
    let init = CustomEventInit::new();
    init.set_detail(&to_js(&detail).map_err(js_err)?);
    let custom = CustomEvent::new_with_event_init_dict(event.name(), &init)?;
    window()?.dispatch_event(&custom)?;
    Ok(())
}

/// Tip form bound to `window.kasware`.
#[wasm_bindgen]
pub struct TipWidget {
    app: TipApp,
    poll: Rc<PollSlot>,
    on_focus: Closure<dyn FnMut()>,
}

#[wasm_bindgen]
impl TipWidget {
    /// Probe for the wallet now, on every window focus, and once a second
    /// until it is found.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<TipWidget, JsValue> {
        let app = TipApp::new(Rc::new(WindowHost::default()), TipConfig::default());
        let poll = Rc::new(PollSlot::default());
        forward_events(&app);

        let focus_app = app.clone();
        let on_focus: Closure<dyn FnMut()> = Closure::new(move || {
            let app = focus_app.clone();
            wasm_bindgen_futures::spawn_local(async move {
                app.on_focus().await;
            });
        });
        window()?.add_event_listener_with_callback("focus", on_focus.as_ref().unchecked_ref())?;

        let start_app = app.clone();
        let start_poll = Rc::clone(&poll);
        wasm_bindgen_futures::spawn_local(async move {
            if !start_app.start().await && start_app.session().is_polling() {
                if let Err(e) = start_poll.arm(&start_app) {
                    log!("[kaspatip] detection interval failed: {:?}", e);
                }
            }
        });

        Ok(TipWidget { app, poll, on_focus })
    }

    /// Ask the wallet for access. Resolves to the connected address.
    pub async fn connect(&self) -> Result<String, JsValue> {
        self.app.connect().await.map_err(js_err)
    }

    pub async fn disconnect(&self) {
        self.app.disconnect().await;
    }

    /// Send `amount` KAS to `recipient`, then the fee. Resolves to the
    /// serialized outcome; the form resets itself after the reset delay.
    pub async fn submit(&self, recipient: String, amount: String, note: Option<String>) -> Result<JsValue, JsValue> {
        let mut request = TransferRequest::new(recipient, amount);
        if let Some(note) = note {
            request = request.with_note(note);
        }
        let submitted = self.app.submit(request).await;
        self.schedule_reset(&submitted)?;
        to_js(&submitted.outcome).map_err(js_err)
    }

    fn schedule_reset(&self, submitted: &Submitted) -> Result<(), JsValue> {
        let Some((generation, delay)) = submitted.reset else {
            return Ok(());
        };
        let app = self.app.clone();
        let expire = Closure::once_into_js(move || {
            app.expire(generation);
        });
        window()?.set_timeout_with_callback_and_timeout_and_arguments_0(expire.unchecked_ref(), millis(delay))?;
        Ok(())
    }

    /// Full form state: status, error, tx display, debug info, inputs.
    pub fn state(&self) -> Result<JsValue, JsValue> {
        to_js(&self.app.state()).map_err(js_err)
    }

    #[wasm_bindgen(getter)]
    pub fn status(&self) -> String { self.app.flow().status().as_str().to_string() }

    #[wasm_bindgen(getter, js_name = errorMessage)]
    pub fn error_message(&self) -> Option<String> { self.app.state().error_message() }

    #[wasm_bindgen(getter, js_name = noticeTitle)]
    pub fn notice_title(&self) -> Option<String> {
        self.app.flow().status().notice().map(|n| n.title.to_string())
    }

    #[wasm_bindgen(getter, js_name = noticeDescription)]
    pub fn notice_description(&self) -> Option<String> {
        self.app.flow().status().notice().map(|n| n.description.to_string())
    }

    #[wasm_bindgen(getter, js_name = submitLabel)]
    pub fn submit_label(&self) -> String { self.app.flow().submit_control().label.to_string() }

    #[wasm_bindgen(getter, js_name = submitEnabled)]
    pub fn submit_enabled(&self) -> bool { self.app.flow().submit_control().enabled }

    #[wasm_bindgen(js_name = feePreview)]
    pub fn fee_preview(&self, amount: &str) -> String { fee_preview(&self.app.config().fee, amount) }

    /// Connect button text: shortened address, or the connect prompt.
    #[wasm_bindgen(getter, js_name = walletLabel)]
    pub fn wallet_label(&self) -> String {
        let session = self.app.session().session();
        match session.address {
            Some(address) if session.connected => short_address(&address),
            _ => CONNECT_LABEL.to_string(),
        }
    }

    #[wasm_bindgen(getter, js_name = isConnected)]
    pub fn is_connected(&self) -> bool { self.app.session().session().connected }

    #[wasm_bindgen(getter, js_name = isProviderDetected)]
    pub fn is_provider_detected(&self) -> bool { self.app.session().is_detected() }

    /// Probe the wallet directly for connected accounts.
    #[wasm_bindgen(js_name = checkWalletConnection)]
    pub async fn check_wallet_connection(&self) -> bool { self.app.flow().check_wallet_connection().await }
}

impl Drop for TipWidget {
    fn drop(&mut self) {
        self.poll.cancel();
        if let Some(window) = web_sys::window() {
            let _ = window.remove_event_listener_with_callback("focus", self.on_focus.as_ref().unchecked_ref());
        }
        self.app.close();
    }
}
