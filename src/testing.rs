/// In-memory stand-ins for the browser, shared by the unit tests
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::future::{Future, ready};
use std::rc::Rc;

use crate::config::{DestinationSite, Placement};
use crate::error::RelayError;
use crate::insert::DestinationDom;
use crate::messaging::{Background, ExtMessage, ExtResponse, Fetcher, Messenger, TabOpener, check_response};
use crate::page::PageContext;
use crate::poller::Timer;
use crate::relay::SlotStore;
use crate::ui::affordance::{AffordanceState, AnchorDom};

/// Synthetic page: selector -> values, in document order
pub struct FixturePage {
    url: String,
    texts: HashMap<String, Vec<String>>,
    values: HashMap<String, Vec<String>>,
    attrs: HashMap<(String, String), Vec<String>>,
    invalid: HashSet<String>,
}

impl FixturePage {
    pub fn new(url: &str) -> Self {
        FixturePage {
            url: url.to_string(),
            texts: HashMap::new(),
            values: HashMap::new(),
            attrs: HashMap::new(),
            invalid: HashSet::new(),
        }
    }

    pub fn text(mut self, selector: &str, texts: &[&str]) -> Self {
        self.texts.insert(selector.to_string(), owned(texts));
        self
    }

    pub fn value(mut self, selector: &str, values: &[&str]) -> Self {
        self.values.insert(selector.to_string(), owned(values));
        self
    }

    pub fn attr(mut self, selector: &str, attribute: &str, values: &[&str]) -> Self {
        self.attrs
            .insert((selector.to_string(), attribute.to_string()), owned(values));
        self
    }

    /// Queries for this selector fail like a syntax error would
    pub fn invalid(mut self, selector: &str) -> Self {
        self.invalid.insert(selector.to_string());
        self
    }

    fn check(&self, selector: &str) -> Result<(), RelayError> {
        if self.invalid.contains(selector) {
            Err(RelayError::Parse(format!("bad selector '{}'", selector)))
        } else {
            Ok(())
        }
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl PageContext for FixturePage {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn attribute_values(&self, selector: &str, attribute: &str) -> Result<Vec<String>, RelayError> {
        self.check(selector)?;
        Ok(self
            .attrs
            .get(&(selector.to_string(), attribute.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn text_contents(&self, selector: &str) -> Result<Vec<String>, RelayError> {
        self.check(selector)?;
        Ok(self.texts.get(selector).cloned().unwrap_or_default())
    }

    fn form_values(&self, selector: &str) -> Result<Vec<String>, RelayError> {
        self.check(selector)?;
        Ok(self.values.get(selector).cloned().unwrap_or_default())
    }

    fn today(&self) -> String {
        "2026.10.19".to_string()
    }
}

/// Storage shared between clones, like one extension storage area seen
/// from several contexts
#[derive(Clone, Default)]
pub struct MemoryStore {
    slots: Rc<RefCell<HashMap<String, String>>>,
    failing: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Every operation fails with a storage error
    pub fn failing() -> Self {
        MemoryStore {
            failing: true,
            ..MemoryStore::default()
        }
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.slots.borrow_mut().insert(key.to_string(), value.to_string());
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.slots.borrow().get(key).cloned()
    }

    fn check(&self) -> Result<(), RelayError> {
        if self.failing {
            Err(RelayError::Storage("quota exceeded".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SlotStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RelayError> {
        self.check()?;
        Ok(self.get_raw(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RelayError> {
        self.check()?;
        self.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), RelayError> {
        self.check()?;
        self.slots.borrow_mut().remove(key);
        Ok(())
    }
}

/// Canned HTTP responses; anything unknown is a 404
#[derive(Default)]
pub struct FixtureFetcher {
    responses: HashMap<String, (u16, String)>,
    requests: RefCell<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        FixtureFetcher::default()
    }

    pub fn with(mut self, url: &str, status: u16, body: &str) -> Self {
        self.responses.insert(url.to_string(), (status, body.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl Fetcher for FixtureFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, RelayError> {
        self.requests.borrow_mut().push(url.to_string());
        match self.responses.get(url) {
            Some((status, body)) => check_response(url, *status, body),
            None => check_response(url, 404, "Not Found"),
        }
    }
}

/// Records opened tabs and, if watching a store, the relay slot at the
/// moment each tab was opened
#[derive(Default)]
pub struct RecordingTabs {
    opened: RefCell<Vec<String>>,
    watch: Option<(MemoryStore, String)>,
    slot_at_open: RefCell<Vec<Option<String>>>,
}

impl RecordingTabs {
    pub fn watching(store: &MemoryStore, key: &str) -> Self {
        RecordingTabs {
            watch: Some((store.clone(), key.to_string())),
            ..RecordingTabs::default()
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.borrow().clone()
    }

    pub fn slot_at_open(&self) -> Vec<Option<String>> {
        self.slot_at_open.borrow().clone()
    }
}

impl TabOpener for RecordingTabs {
    async fn open(&self, url: &str) -> Result<(), RelayError> {
        self.opened.borrow_mut().push(url.to_string());
        if let Some((store, key)) = &self.watch {
            self.slot_at_open.borrow_mut().push(store.get_raw(key));
        }
        Ok(())
    }
}

/// Resolves every sleep immediately and remembers the requested delays
#[derive(Default)]
pub struct InstantTimer {
    sleeps: RefCell<Vec<u32>>,
}

impl InstantTimer {
    pub fn new() -> Self {
        InstantTimer::default()
    }

    pub fn sleeps(&self) -> Vec<u32> {
        self.sleeps.borrow().clone()
    }
}

impl Timer for InstantTimer {
    fn sleep(&self, ms: u32) -> impl Future<Output = ()> {
        self.sleeps.borrow_mut().push(ms);
        ready(())
    }
}

/// Delivers messages straight to a background, through the JSON wire format
pub struct InProcessMessenger {
    background: Background<MemoryStore, RecordingTabs, FixtureFetcher>,
}

impl InProcessMessenger {
    pub fn new(background: Background<MemoryStore, RecordingTabs, FixtureFetcher>) -> Self {
        InProcessMessenger { background }
    }

    pub fn background(&self) -> &Background<MemoryStore, RecordingTabs, FixtureFetcher> {
        &self.background
    }
}

impl Messenger for InProcessMessenger {
    async fn send(&self, message: &ExtMessage) -> Result<ExtResponse, RelayError> {
        let wire = serde_json::to_string(message).map_err(|e| RelayError::Messaging(e.to_string()))?;
        let received: ExtMessage =
            serde_json::from_str(&wire).map_err(|e| RelayError::Messaging(e.to_string()))?;

        let response = self.background.dispatch(received).await;

        let wire = serde_json::to_string(&response).map_err(|e| RelayError::Messaging(e.to_string()))?;
        serde_json::from_str(&wire).map_err(|e| RelayError::Messaging(e.to_string()))
    }
}

/// Anchor DOM where nodes are labels: `anchor:<selector>` or `button:<id>:<n>`
#[derive(Default)]
pub struct FakeAnchors {
    present: Vec<String>,
    attached: RefCell<HashSet<String>>,
    created: Cell<u32>,
    placements: RefCell<Vec<(String, Placement)>>,
    renders: RefCell<Vec<AffordanceState>>,
}

impl FakeAnchors {
    pub fn new() -> Self {
        FakeAnchors::default()
    }

    pub fn with_anchor(mut self, selector: &str) -> Self {
        self.present.push(selector.to_string());
        self
    }

    /// A page re-render that throws away the injected buttons
    pub fn detach_all(&self) {
        self.attached.borrow_mut().clear();
    }

    pub fn created(&self) -> u32 {
        self.created.get()
    }

    pub fn placements(&self) -> Vec<(String, Placement)> {
        self.placements.borrow().clone()
    }

    /// Every state written to a button, in order
    pub fn renders(&self) -> Vec<AffordanceState> {
        self.renders.borrow().clone()
    }
}

impl AnchorDom for FakeAnchors {
    type Node = String;

    fn find(&self, selector: &str) -> Result<Option<String>, RelayError> {
        Ok(self
            .present
            .iter()
            .find(|present| *present == selector)
            .map(|present| format!("anchor:{}", present)))
    }

    fn is_attached(&self, node: &String) -> bool {
        self.attached.borrow().contains(node)
    }

    fn create_button(&self, id: &str, _label: &str) -> Result<String, RelayError> {
        self.created.set(self.created.get() + 1);
        Ok(format!("button:{}:{}", id, self.created.get()))
    }

    fn place(&self, button: &String, anchor: &String, placement: Placement) -> Result<(), RelayError> {
        self.attached.borrow_mut().insert(button.clone());
        self.placements.borrow_mut().push((
            anchor.trim_start_matches("anchor:").to_string(),
            placement,
        ));
        Ok(())
    }

    fn render(&self, _button: &String, state: AffordanceState) {
        self.renders.borrow_mut().push(state);
    }
}

/// Destination page whose elements render after a number of lookups
pub struct FakeDestination {
    appear_after: u32,
    has_trigger: bool,
    reject_values: bool,
    fail_lookups: bool,
    lookups: Cell<u32>,
    calls: RefCell<Vec<String>>,
}

impl FakeDestination {
    pub fn appearing_after(lookups: u32) -> Self {
        FakeDestination {
            appear_after: lookups,
            has_trigger: true,
            reject_values: false,
            fail_lookups: false,
            lookups: Cell::new(0),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// The input renders but the trigger never does
    pub fn input_only() -> Self {
        FakeDestination {
            has_trigger: false,
            ..FakeDestination::appearing_after(0)
        }
    }

    pub fn rejecting_values(mut self) -> Self {
        self.reject_values = true;
        self
    }

    /// Lookups before the elements appear fail instead of finding nothing
    pub fn failing_lookups(mut self) -> Self {
        self.fail_lookups = true;
        self
    }

    pub fn lookups(&self) -> u32 {
        self.lookups.get()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn rendered(&self) -> bool {
        self.lookups.get() > self.appear_after
    }
}

impl DestinationDom for FakeDestination {
    type Input = ();
    type Trigger = ();

    fn find_input(&self, _site: &DestinationSite) -> Result<Option<()>, RelayError> {
        self.lookups.set(self.lookups.get() + 1);
        if self.rendered() {
            Ok(Some(()))
        } else if self.fail_lookups {
            Err(RelayError::ElementNotFound("input detached".to_string()))
        } else {
            Ok(None)
        }
    }

    fn find_trigger(&self, _site: &DestinationSite) -> Result<Option<()>, RelayError> {
        Ok((self.has_trigger && self.rendered()).then_some(()))
    }

    fn focus(&self, _input: &()) {
        self.calls.borrow_mut().push("focus".to_string());
    }

    fn set_value(&self, _input: &(), text: &str) -> Result<(), RelayError> {
        if self.reject_values {
            return Err(RelayError::ElementNotFound("value setter".to_string()));
        }
        self.calls.borrow_mut().push(format!("set_value:{}", text));
        Ok(())
    }

    fn blur(&self, _input: &()) {
        self.calls.borrow_mut().push("blur".to_string());
    }

    fn click(&self, _trigger: &()) {
        self.calls.borrow_mut().push("click".to_string());
    }
}
