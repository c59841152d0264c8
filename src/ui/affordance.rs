/// The injected "analyze" button: placement reconciliation and click states.
///
/// Placement is level-triggered. Every change notification recomputes where
/// the button should be (the best anchor currently present) and compares it
/// with where it is, then applies the smallest fix. Button elements are
/// cached per logical id so reconciling never creates duplicates.
use log::{debug, info};
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlButtonElement, HtmlElement};

use crate::config::{AnchorSpec, Placement};
use crate::error::{RelayError, js_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffordanceState {
    Idle,
    Busy,
    /// Transfer succeeded; waiting to restore the idle label
    Sent,
}

impl AffordanceState {
    pub fn label(&self) -> &'static str {
        match self {
            AffordanceState::Idle => "Analyze PGN",
            AffordanceState::Busy => "Extracting…",
            AffordanceState::Sent => "Opened ✓",
        }
    }

    pub fn is_disabled(&self) -> bool {
        !matches!(self, AffordanceState::Idle)
    }

    /// State to enter when clicked, or `None` if the click is ignored.
    pub fn on_click(&self) -> Option<AffordanceState> {
        match self {
            AffordanceState::Idle => Some(AffordanceState::Busy),
            AffordanceState::Busy | AffordanceState::Sent => None,
        }
    }
}

/// Where a button currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actual {
    Absent,
    Attached { anchor: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Keep,
    Insert { anchor: usize },
    /// A higher-priority anchor has appeared
    Relocate { anchor: usize },
    /// No anchor rendered yet
    Wait,
}

/// Diff between actual placement and the best anchor present (index into
/// the priority-sorted anchor list).
pub fn plan(actual: Actual, desired: Option<usize>) -> ReconcileAction {
    match (actual, desired) {
        (Actual::Attached { anchor }, Some(best)) if best < anchor => {
            ReconcileAction::Relocate { anchor: best }
        }
        (Actual::Attached { .. }, _) => ReconcileAction::Keep,
        (Actual::Absent, Some(best)) => ReconcileAction::Insert { anchor: best },
        (Actual::Absent, None) => ReconcileAction::Wait,
    }
}

/// DOM operations the reconciler needs
pub trait AnchorDom {
    type Node: Clone;

    fn find(&self, selector: &str) -> Result<Option<Self::Node>, RelayError>;
    fn is_attached(&self, node: &Self::Node) -> bool;
    fn create_button(&self, id: &str, label: &str) -> Result<Self::Node, RelayError>;
    fn place(&self, button: &Self::Node, anchor: &Self::Node, placement: Placement) -> Result<(), RelayError>;
    fn render(&self, button: &Self::Node, state: AffordanceState);
}

struct ManagedButton<N> {
    id: String,
    anchors: Vec<AnchorSpec>,
    element: Option<N>,
    anchor: Option<usize>,
    /// State last written to the element
    rendered: Option<AffordanceState>,
}

pub struct ButtonManager<N> {
    buttons: Vec<ManagedButton<N>>,
}

impl<N: Clone> Default for ButtonManager<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Clone> ButtonManager<N> {
    pub fn new() -> Self {
        ButtonManager { buttons: Vec::new() }
    }

    /// Register a logical button. Anchors are tried in priority order; ties
    /// keep their configured order.
    pub fn add(&mut self, id: &str, anchors: &[AnchorSpec]) {
        if self.buttons.iter().any(|b| b.id == id) {
            return;
        }
        let mut anchors = anchors.to_vec();
        anchors.sort_by_key(|a| a.priority);
        self.buttons.push(ManagedButton {
            id: id.to_string(),
            anchors,
            element: None,
            anchor: None,
            rendered: None,
        });
    }

    /// Cached button elements, placed or not
    #[cfg(test)]
    pub fn elements(&self) -> impl Iterator<Item = &N> {
        self.buttons.iter().filter_map(|b| b.element.as_ref())
    }

    /// Bring every button to its desired placement and state. Returns true
    /// when all buttons are attached. Elements are only written to when
    /// their state changed, so reconciling from a mutation observer settles.
    pub fn reconcile<D: AnchorDom<Node = N>>(&mut self, dom: &D, state: AffordanceState) -> Result<bool, RelayError> {
        let mut all_placed = true;

        for button in &mut self.buttons {
            let (best, anchor_node) = match best_anchor(dom, &button.anchors) {
                Some((index, node)) => (Some(index), Some(node)),
                None => (None, None),
            };
            let actual = match (&button.element, button.anchor) {
                (Some(element), Some(anchor)) if dom.is_attached(element) => Actual::Attached { anchor },
                _ => Actual::Absent,
            };

            match plan(actual, best) {
                ReconcileAction::Keep => {}
                ReconcileAction::Wait => {
                    button.anchor = None;
                    all_placed = false;
                }
                ReconcileAction::Insert { anchor } | ReconcileAction::Relocate { anchor } => {
                    let element = match button.element.clone() {
                        Some(element) => element,
                        None => {
                            let created = dom.create_button(&button.id, state.label())?;
                            button.element = Some(created.clone());
                            created
                        }
                    };
                    if let Some(anchor_node) = &anchor_node {
                        dom.place(&element, anchor_node, button.anchors[anchor].placement)?;
                        info!("Placed button '{}' at {}", button.id, button.anchors[anchor].selector);
                        button.anchor = Some(anchor);
                    }
                }
            }

            if let Some(element) = &button.element {
                if button.rendered != Some(state) {
                    dom.render(element, state);
                    button.rendered = Some(state);
                }
            }
        }

        Ok(all_placed)
    }
}

fn best_anchor<D: AnchorDom>(dom: &D, anchors: &[AnchorSpec]) -> Option<(usize, D::Node)> {
    anchors.iter().enumerate().find_map(|(index, spec)| match dom.find(&spec.selector) {
        Ok(Some(node)) => Some((index, node)),
        Ok(None) => None,
        Err(e) => {
            debug!("Anchor {} unusable: {}", spec.selector, e);
            None
        }
    })
}

/// Live document; created buttons carry the shared click handler.
pub struct PageAnchors<'a> {
    document: &'a Document,
    on_click: &'a js_sys::Function,
}

impl<'a> PageAnchors<'a> {
    pub fn new(document: &'a Document, on_click: &'a js_sys::Function) -> Self {
        PageAnchors { document, on_click }
    }
}

impl AnchorDom for PageAnchors<'_> {
    type Node = HtmlElement;

    fn find(&self, selector: &str) -> Result<Option<HtmlElement>, RelayError> {
        self.document
            .query_selector(selector)
            .map(|found| found.and_then(|el| el.dyn_into::<HtmlElement>().ok()))
            .map_err(|e| RelayError::Parse(format!("bad selector '{}': {}", selector, js_error(&e))))
    }

    fn is_attached(&self, node: &HtmlElement) -> bool {
        node.is_connected()
    }

    fn create_button(&self, id: &str, label: &str) -> Result<HtmlElement, RelayError> {
        let to_err = |e| RelayError::ElementNotFound(format!("create button: {}", js_error(&e)));
        let element: Element = self.document.create_element("button").map_err(to_err)?;
        element.set_id(id);
        element.set_attribute("type", "button").map_err(to_err)?;
        element.set_text_content(Some(label));
        element
            .add_event_listener_with_callback("click", self.on_click)
            .map_err(to_err)?;
        element.dyn_into::<HtmlElement>().map_err(|_| RelayError::ElementNotFound("button element".to_string()))
    }

    fn place(&self, button: &HtmlElement, anchor: &HtmlElement, placement: Placement) -> Result<(), RelayError> {
        let result = match placement {
            Placement::Before => anchor.before_with_node_1(button),
            Placement::After => anchor.after_with_node_1(button),
            Placement::Prepend => anchor.prepend_with_node_1(button),
            Placement::Append => anchor.append_with_node_1(button),
        };
        result.map_err(|e| RelayError::ElementNotFound(format!("place button: {}", js_error(&e))))
    }

    fn render(&self, button: &HtmlElement, state: AffordanceState) {
        render_state(button, state);
    }
}

/// Reflect an affordance state on a button element, touching only what
/// differs.
pub fn render_state(element: &HtmlElement, state: AffordanceState) {
    if element.text_content().as_deref() != Some(state.label()) {
        element.set_text_content(Some(state.label()));
    }
    if let Some(button) = element.dyn_ref::<HtmlButtonElement>() {
        if button.disabled() != state.is_disabled() {
            button.set_disabled(state.is_disabled());
        }
    }
    let busy = if state == AffordanceState::Busy { "true" } else { "false" };
    if element.get_attribute("aria-busy").as_deref() != Some(busy) {
        let _ = element.set_attribute("aria-busy", busy);
    }
}
