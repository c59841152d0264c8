/// Read-only view of the current page used by the extraction strategies
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlInputElement, HtmlTextAreaElement};

use crate::config::FieldSource;
use crate::error::{RelayError, js_error};
use crate::notation::format_pgn_date;

/// Each query returns every match in document order. An invalid selector is
/// an error, which a strategy reports as a miss.
pub trait PageContext {
    fn url(&self) -> String;
    fn attribute_values(&self, selector: &str, attribute: &str) -> Result<Vec<String>, RelayError>;
    fn text_contents(&self, selector: &str) -> Result<Vec<String>, RelayError>;
    /// Current value of inputs and textareas
    fn form_values(&self, selector: &str) -> Result<Vec<String>, RelayError>;
    /// Today's date as a PGN date field
    fn today(&self) -> String;
}

pub fn read_field(page: &dyn PageContext, field: &FieldSource) -> Result<Vec<String>, RelayError> {
    match &field.attribute {
        Some(attribute) => page.attribute_values(&field.selector, attribute),
        None => page.form_values(&field.selector),
    }
}

/// The live document of a content script
pub struct DocumentPage {
    document: Document,
}

impl DocumentPage {
    pub fn new(document: Document) -> Self {
        DocumentPage { document }
    }

    #[cfg(all(test, target_arch = "wasm32"))]
    pub fn current() -> Option<DocumentPage> {
        web_sys::window()
            .and_then(|window| window.document())
            .map(DocumentPage::new)
    }

    fn query(&self, selector: &str) -> Result<Vec<Element>, RelayError> {
        let nodes = self
            .document
            .query_selector_all(selector)
            .map_err(|e| RelayError::Parse(format!("bad selector '{}': {}", selector, js_error(&e))))?;

        Ok((0..nodes.length())
            .filter_map(|i| nodes.item(i))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .collect())
    }
}

impl PageContext for DocumentPage {
    fn url(&self) -> String {
        self.document
            .location()
            .and_then(|location| location.href().ok())
            .unwrap_or_default()
    }

    fn attribute_values(&self, selector: &str, attribute: &str) -> Result<Vec<String>, RelayError> {
        Ok(self
            .query(selector)?
            .iter()
            .filter_map(|el| el.get_attribute(attribute))
            .collect())
    }

    fn text_contents(&self, selector: &str) -> Result<Vec<String>, RelayError> {
        Ok(self
            .query(selector)?
            .iter()
            .filter_map(|el| el.text_content())
            .collect())
    }

    fn form_values(&self, selector: &str) -> Result<Vec<String>, RelayError> {
        Ok(self
            .query(selector)?
            .into_iter()
            .filter_map(|el| {
                if let Some(area) = el.dyn_ref::<HtmlTextAreaElement>() {
                    Some(area.value())
                } else if let Some(input) = el.dyn_ref::<HtmlInputElement>() {
                    Some(input.value())
                } else {
                    el.get_attribute("value")
                }
            })
            .collect())
    }

    fn today(&self) -> String {
        let date = js_sys::Date::new_0();
        format_pgn_date(date.get_full_year(), date.get_month() + 1, date.get_date())
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn mount(html: &str) -> DocumentPage {
        let page = DocumentPage::current().unwrap();
        let host = page.document.create_element("div").unwrap();
        host.set_inner_html(html);
        page.document.body().unwrap().append_child(&host).unwrap();
        page
    }

    #[wasm_bindgen_test]
    fn test_queries_read_live_values() {
        let page = mount(
            r#"<pre class="fx-pgn">1. e4 e5 *</pre>
               <textarea class="fx-field">1. d4 *</textarea>
               <div class="fx-state" data-game='{"pgn":"1. c4 *"}'></div>"#,
        );

        assert_eq!(page.text_contents(".fx-pgn").unwrap(), vec!["1. e4 e5 *"]);
        assert_eq!(page.form_values(".fx-field").unwrap(), vec!["1. d4 *"]);
        assert_eq!(
            page.attribute_values(".fx-state", "data-game").unwrap(),
            vec![r#"{"pgn":"1. c4 *"}"#]
        );
    }

    #[wasm_bindgen_test]
    fn test_invalid_selector_is_an_error() {
        let page = DocumentPage::current().unwrap();
        assert!(matches!(page.text_contents("[[nope"), Err(RelayError::Parse(_))));
    }
}
