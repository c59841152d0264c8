/// Transient on-page notification for failures the user should see
use log::warn;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::Document;

const NOTICE_CLASS: &str = "pgn-relay-notice";

/// Show `message` for `lifetime_ms`, replacing any notice still on screen.
pub fn notify(document: &Document, message: &str, lifetime_ms: u32) {
    if let Err(e) = show(document, message, lifetime_ms) {
        warn!("Could not show notification '{}': {:?}", message, e);
    }
}

fn show(document: &Document, message: &str, lifetime_ms: u32) -> Result<(), JsValue> {
    let stale = document.query_selector_all(&format!(".{}", NOTICE_CLASS))?;
    for i in 0..stale.length() {
        if let Some(node) = stale.item(i).and_then(|n| n.dyn_into::<web_sys::Element>().ok()) {
            node.remove();
        }
    }

    let body = document.body().ok_or_else(|| JsValue::from_str("document has no body"))?;
    let notice = document.create_element("div")?;
    notice.set_class_name(NOTICE_CLASS);
    notice.set_attribute("role", "status")?;
    notice.set_attribute(
        "style",
        "position:fixed;bottom:16px;right:16px;z-index:2147483647;padding:8px 12px;\
         background:#333;color:#fff;border-radius:4px;font:13px sans-serif",
    )?;
    notice.set_text_content(Some(message));
    body.append_child(&notice)?;

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let remove = Closure::once_into_js(move || notice.remove());
    window.set_timeout_with_callback_and_timeout_and_arguments_0(
        remove.unchecked_ref(),
        lifetime_ms.min(i32::MAX as u32) as i32,
    )?;
    Ok(())
}
