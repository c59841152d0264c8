/// Delivery of a relayed payload into the destination site's form
use js_sys::{Function, Object, Reflect};
use log::{info, warn};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Event, EventInit, HtmlElement, HtmlTextAreaElement};

use crate::config::{DestinationSite, Timings};
use crate::error::{RelayError, js_error};
use crate::notation::NotationPayload;
use crate::poller::{PollOutcome, PollPolicy, Timer, poll_until};
use crate::relay::{Relay, SlotStore};

/// The two elements insertion needs on the destination page
pub trait DestinationDom {
    type Input;
    type Trigger;

    fn find_input(&self, site: &DestinationSite) -> Result<Option<Self::Input>, RelayError>;
    fn find_trigger(&self, site: &DestinationSite) -> Result<Option<Self::Trigger>, RelayError>;
    fn focus(&self, input: &Self::Input);
    /// Write through the platform setter so framework-bound inputs notice.
    fn set_value(&self, input: &Self::Input, text: &str) -> Result<(), RelayError>;
    fn blur(&self, input: &Self::Input);
    fn click(&self, trigger: &Self::Trigger);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Relay slot was empty
    Nothing,
    Delivered,
    /// Elements never appeared or refused the value; payload left in the slot
    Abandoned,
}

/// Wait for input and trigger together, fill the input, press the trigger.
pub async fn insert_and_trigger<D: DestinationDom, Tm: Timer>(
    payload: &NotationPayload,
    site: &DestinationSite,
    dom: &D,
    timer: &Tm,
    policy: &PollPolicy,
    timings: &Timings,
) -> Result<(), RelayError> {
    let outcome = poll_until("destination elements", policy, timer, || {
        let input = dom.find_input(site)?;
        let trigger = dom.find_trigger(site)?;
        Ok::<_, RelayError>(input.zip(trigger))
    })
    .await;

    let (input, trigger) = match outcome {
        PollOutcome::Found(found) => found,
        PollOutcome::Exhausted => {
            return Err(RelayError::ElementNotFound(format!(
                "{} / {}",
                site.input_selector, site.trigger_selector
            )));
        }
    };

    dom.focus(&input);
    timer.sleep(timings.settle_ms).await;
    dom.set_value(&input, payload.as_str())?;
    timer.sleep(timings.settle_ms).await;
    dom.blur(&input);
    timer.sleep(timings.trigger_delay_ms).await;
    dom.click(&trigger);
    Ok(())
}

/// Destination-side flow: take the payload from the relay and insert it.
///
/// The slot is cleared once the trigger click has been attempted, whether or
/// not the site acted on it. If the click silently does nothing the payload
/// is gone.
pub async fn deliver<S: SlotStore, D: DestinationDom, Tm: Timer>(
    relay: &Relay<'_, S>,
    site: &DestinationSite,
    dom: &D,
    timer: &Tm,
    policy: &PollPolicy,
    timings: &Timings,
) -> Result<Delivery, RelayError> {
    let payload = match relay.consume().await? {
        Some(payload) => payload,
        None => return Ok(Delivery::Nothing),
    };

    match insert_and_trigger(&payload, site, dom, timer, policy, timings).await {
        Ok(()) => {
            relay.clear().await?;
            info!("Inserted {} bytes of notation and triggered analysis", payload.as_str().len());
            Ok(Delivery::Delivered)
        }
        Err(RelayError::ElementNotFound(what)) => {
            warn!("Could not insert into destination ({}); leaving payload in place", what);
            Ok(Delivery::Abandoned)
        }
        Err(e) => Err(e),
    }
}

/// Text to show on the destination page for a delivery error, if the user
/// needs to know about it.
pub fn failure_notice(e: &RelayError) -> Option<String> {
    (!e.is_recoverable()).then(|| format!("Could not load the relayed game: {}", e))
}

/// Live destination document
pub struct PageTargets {
    document: Document,
}

impl PageTargets {
    pub fn new(document: Document) -> Self {
        PageTargets { document }
    }

    fn first(&self, selector: &str) -> Result<Option<HtmlElement>, RelayError> {
        self.document
            .query_selector(selector)
            .map(|found| found.and_then(|el| el.dyn_into::<HtmlElement>().ok()))
            .map_err(|e| RelayError::Parse(format!("bad selector '{}': {}", selector, js_error(&e))))
    }

    fn all(&self, selector: &str) -> Result<Vec<HtmlElement>, RelayError> {
        let nodes = self
            .document
            .query_selector_all(selector)
            .map_err(|e| RelayError::Parse(format!("bad selector '{}': {}", selector, js_error(&e))))?;
        Ok((0..nodes.length())
            .filter_map(|i| nodes.item(i))
            .filter_map(|node| node.dyn_into::<HtmlElement>().ok())
            .collect())
    }
}

fn contains_hint(text: &str, hint: &str) -> bool {
    !hint.is_empty() && text.to_lowercase().contains(&hint.to_lowercase())
}

impl DestinationDom for PageTargets {
    type Input = HtmlElement;
    type Trigger = HtmlElement;

    fn find_input(&self, site: &DestinationSite) -> Result<Option<HtmlElement>, RelayError> {
        if let Some(input) = self.first(&site.input_selector)? {
            return Ok(Some(input));
        }
        Ok(self
            .all("textarea, input[type='text'], input:not([type])")?
            .into_iter()
            .find(|el| {
                el.get_attribute("placeholder")
                    .is_some_and(|placeholder| contains_hint(&placeholder, &site.input_placeholder_hint))
            }))
    }

    fn find_trigger(&self, site: &DestinationSite) -> Result<Option<HtmlElement>, RelayError> {
        if let Some(trigger) = self.first(&site.trigger_selector)? {
            return Ok(Some(trigger));
        }
        Ok(self
            .all("button, [role='button'], input[type='submit']")?
            .into_iter()
            .find(|el| {
                let label = el
                    .text_content()
                    .filter(|text| !text.trim().is_empty())
                    .or_else(|| el.get_attribute("value"))
                    .unwrap_or_default();
                contains_hint(&label, &site.trigger_label_hint)
            }))
    }

    fn focus(&self, input: &HtmlElement) {
        let _ = input.focus();
    }

    fn set_value(&self, input: &HtmlElement, text: &str) -> Result<(), RelayError> {
        set_native_value(input, text)
    }

    fn blur(&self, input: &HtmlElement) {
        let _ = input.blur();
    }

    fn click(&self, trigger: &HtmlElement) {
        trigger.click();
    }
}

/// Call the prototype's `value` setter directly, then announce the change.
pub fn set_native_value(element: &HtmlElement, text: &str) -> Result<(), RelayError> {
    let class = if element.is_instance_of::<HtmlTextAreaElement>() {
        "HTMLTextAreaElement"
    } else {
        "HTMLInputElement"
    };
    let to_err = |e: JsValue| RelayError::ElementNotFound(format!("{}.value setter: {}", class, js_error(&e)));

    let constructor = Reflect::get(&js_sys::global(), &class.into()).map_err(to_err)?;
    let prototype = Reflect::get(&constructor, &"prototype".into()).map_err(to_err)?;
    let descriptor = Object::get_own_property_descriptor(prototype.unchecked_ref::<Object>(), &"value".into());
    let setter = Reflect::get(&descriptor, &"set".into()).map_err(to_err)?;

    match setter.dyn_into::<Function>() {
        Ok(setter) => {
            setter.call1(element, &JsValue::from_str(text)).map_err(to_err)?;
        }
        Err(_) => Reflect::set(element, &"value".into(), &JsValue::from_str(text))
            .map(|_| ())
            .map_err(to_err)?,
    }

    for kind in ["input", "change"] {
        let init = EventInit::new();
        init.set_bubbles(true);
        let event = Event::new_with_event_init_dict(kind, &init).map_err(to_err)?;
        element.dispatch_event(&event).map_err(to_err)?;
    }
    Ok(())
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use wasm_bindgen::prelude::Closure;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_native_value_fires_input_event() {
        let document = web_sys::window().unwrap().document().unwrap();
        let area: HtmlElement = document.create_element("textarea").unwrap().dyn_into().unwrap();
        document.body().unwrap().append_child(&area).unwrap();

        let inputs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&inputs);
        let listener = Closure::<dyn FnMut()>::new(move || counter.set(counter.get() + 1));
        area.add_event_listener_with_callback("input", listener.as_ref().unchecked_ref())
            .unwrap();

        set_native_value(&area, "1. e4 *").unwrap();

        let value = area.dyn_ref::<HtmlTextAreaElement>().unwrap().value();
        assert_eq!(value, "1. e4 *");
        assert_eq!(inputs.get(), 1);
    }
}
