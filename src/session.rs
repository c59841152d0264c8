/// Per-tab state of a content script running on a source site.
///
/// One session is created per page load. It owns the button manager, the
/// mutation observer and the click state, and is torn down on `pagehide`.
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use js_sys::Function;
use log::{debug, error, info, warn};
use uuid::Uuid;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Document, HtmlElement, MutationObserver, MutationObserverInit};

use crate::bridge::RuntimeMessenger;
use crate::config::{Config, SourceSite};
use crate::error::{RelayError, TransferError, js_error};
use crate::messaging::BackgroundFetcher;
use crate::page::DocumentPage;
use crate::poller::{BrowserTimer, Timer, poll_in_rounds};
use crate::transfer::transfer;
use crate::ui::affordance::{AffordanceState, ButtonManager, PageAnchors};
use crate::ui::notify::notify;

const BUTTON_ID: &str = "pgn-relay-button";

thread_local! {
    /// The live session of this page. DOM callbacks only hold weak
    /// references, so this is what keeps a started session alive until
    /// `pagehide`.
    static ACTIVE: RefCell<Option<Rc<SourceSession>>> = const { RefCell::new(None) };
}

pub struct SourceSession {
    id: Uuid,
    config: Config,
    site: SourceSite,
    document: Document,
    buttons: RefCell<ButtonManager<HtmlElement>>,
    state: Cell<AffordanceState>,
    on_click: RefCell<Option<Function>>,
    observer: RefCell<Option<MutationObserver>>,
    pending_reconcile: Cell<Option<i32>>,
    burst_running: Cell<bool>,
    torn_down: Cell<bool>,
}

impl SourceSession {
    pub fn new(config: Config, site: SourceSite, document: Document) -> Rc<Self> {
        let mut buttons = ButtonManager::new();
        buttons.add(BUTTON_ID, &site.anchors);

        Rc::new(SourceSession {
            id: Uuid::new_v4(),
            config,
            site,
            document,
            buttons: RefCell::new(buttons),
            state: Cell::new(AffordanceState::Idle),
            on_click: RefCell::new(None),
            observer: RefCell::new(None),
            pending_reconcile: Cell::new(None),
            burst_running: Cell::new(false),
            torn_down: Cell::new(false),
        })
    }

    /// Wire up the click handler, the observer and teardown, then start
    /// looking for an anchor.
    pub fn start(self: &Rc<Self>) -> Result<(), RelayError> {
        info!("[{}] Source session started on {}", self.id, self.site.name);
        let previous = ACTIVE.with(|active| active.borrow_mut().replace(Rc::clone(self)));
        if let Some(previous) = previous {
            previous.teardown();
        }

        let weak = Rc::downgrade(self);
        let click = Closure::<dyn FnMut()>::new(move || {
            if let Some(session) = weak.upgrade() {
                spawn_local(session.handle_click());
            }
        });
        *self.on_click.borrow_mut() = Some(click.into_js_value().unchecked_into());

        self.observe()?;
        self.listen_for_teardown()?;
        self.run_anchor_burst();
        Ok(())
    }

    fn observe(self: &Rc<Self>) -> Result<(), RelayError> {
        let weak = Rc::downgrade(self);
        let callback = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |_records: js_sys::Array, _observer: MutationObserver| {
                if let Some(session) = weak.upgrade() {
                    session.schedule_reconcile();
                }
            },
        );
        let observer = MutationObserver::new(&callback.into_js_value().unchecked_into())
            .map_err(|e| RelayError::ElementNotFound(format!("mutation observer: {}", js_error(&e))))?;

        let root = self
            .document
            .document_element()
            .ok_or_else(|| RelayError::ElementNotFound("document element".to_string()))?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        observer
            .observe_with_options(&root, &init)
            .map_err(|e| RelayError::ElementNotFound(format!("observe: {}", js_error(&e))))?;

        *self.observer.borrow_mut() = Some(observer);
        Ok(())
    }

    fn listen_for_teardown(self: &Rc<Self>) -> Result<(), RelayError> {
        let window = web_sys::window().ok_or_else(|| RelayError::ElementNotFound("window".to_string()))?;
        let weak = Rc::downgrade(self);
        let on_hide = Closure::once_into_js(move || {
            if let Some(session) = weak.upgrade() {
                session.teardown();
            }
        });
        window
            .add_event_listener_with_callback("pagehide", on_hide.unchecked_ref())
            .map_err(|e| RelayError::ElementNotFound(format!("pagehide listener: {}", js_error(&e))))
    }

    pub fn teardown(&self) {
        if self.torn_down.replace(true) {
            return;
        }
        if let Some(observer) = self.observer.borrow_mut().take() {
            observer.disconnect();
        }
        if let (Some(handle), Some(window)) = (self.pending_reconcile.take(), web_sys::window()) {
            window.clear_timeout_with_handle(handle);
        }
        let released = ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            match active.as_ref() {
                Some(current) if current.id == self.id => active.take(),
                _ => None,
            }
        });
        drop(released);
        info!("[{}] Source session torn down", self.id);
    }

    /// Debounce bursts of DOM mutations into one reconcile.
    fn schedule_reconcile(self: &Rc<Self>) {
        if self.torn_down.get() {
            return;
        }
        let Some(window) = web_sys::window() else {
            return;
        };
        if let Some(handle) = self.pending_reconcile.take() {
            window.clear_timeout_with_handle(handle);
        }

        let weak: Weak<Self> = Rc::downgrade(self);
        let run = Closure::once_into_js(move || {
            if let Some(session) = weak.upgrade() {
                session.pending_reconcile.set(None);
                if let Err(e) = session.reconcile() {
                    debug!("[{}] Reconcile after mutation failed: {}", session.id, e);
                }
            }
        });
        match window.set_timeout_with_callback_and_timeout_and_arguments_0(
            run.unchecked_ref(),
            self.config.timings.mutation_debounce_ms.min(i32::MAX as u32) as i32,
        ) {
            Ok(handle) => self.pending_reconcile.set(Some(handle)),
            Err(e) => debug!("[{}] Could not schedule reconcile: {}", self.id, js_error(&e)),
        }
    }

    /// One pass of the placement reconciler. Returns true when the button is
    /// attached.
    fn reconcile(&self) -> Result<bool, RelayError> {
        if self.torn_down.get() {
            return Ok(false);
        }
        let handler = self.on_click.borrow();
        let Some(on_click) = handler.as_ref() else {
            return Ok(false);
        };

        let dom = PageAnchors::new(&self.document, on_click);
        self.buttons.borrow_mut().reconcile(&dom, self.state.get())
    }

    /// Poll for an anchor in bursts until the button is placed or the page
    /// goes away. Only one burst runs at a time.
    fn run_anchor_burst(self: &Rc<Self>) {
        if self.burst_running.replace(true) {
            return;
        }
        let session = Rc::clone(self);
        spawn_local(async move {
            let placed = poll_in_rounds(
                "anchor",
                &session.config.anchor_poll,
                session.config.timings.long_pause_ms,
                &BrowserTimer,
                || session.reconcile().map(|placed| placed.then_some(())),
                || !session.torn_down.get(),
            )
            .await;
            session.burst_running.set(false);

            match placed {
                Some(()) => info!("[{}] Button placed", session.id),
                None => debug!("[{}] Anchor polling stopped", session.id),
            }
        });
    }

    fn set_state(&self, state: AffordanceState) {
        self.state.set(state);
        if let Err(e) = self.reconcile() {
            debug!("[{}] Could not show {:?}: {}", self.id, state, e);
        }
    }

    async fn handle_click(self: Rc<Self>) {
        let Some(next) = self.state.get().on_click() else {
            debug!("[{}] Click ignored while {:?}", self.id, self.state.get());
            return;
        };
        self.set_state(next);

        let page = DocumentPage::new(self.document.clone());
        let messenger = RuntimeMessenger;
        let fetcher = BackgroundFetcher::new(&messenger);
        let result = transfer(
            &page,
            &self.site,
            &fetcher,
            &messenger,
            &self.config.destination.url,
        )
        .await;

        match result {
            Ok(strategy) => {
                info!("[{}] Transfer complete via {:?}", self.id, strategy);
                self.set_state(AffordanceState::Sent);
                BrowserTimer.sleep(self.config.timings.label_restore_ms).await;
                self.set_state(AffordanceState::Idle);
            }
            Err(e) => {
                match &e {
                    TransferError::Relay(relay) if !relay.is_recoverable() => {
                        error!("[{}] Transfer failed: {}", self.id, e)
                    }
                    _ => warn!("[{}] Transfer failed: {}", self.id, e),
                }
                notify(&self.document, &e.user_message(), self.config.timings.notification_ms);
                self.set_state(AffordanceState::Idle);
            }
        }
    }
}
