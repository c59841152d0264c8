/// Ordered fallback extraction of notation from a source page.
///
/// The export endpoint is tried first; after that each scrape strategy is a
/// plain function of the page and the site table. The first strategy that
/// produces a payload wins and nothing is merged. A strategy error is logged
/// and treated as a miss.
use log::{debug, info};
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::config::SourceSite;
use crate::error::RelayError;
use crate::messaging::Fetcher;
use crate::notation::{
    NotationPayload, looks_like_fen, looks_like_notation, position_stub, strip_noise_tags,
};
use crate::page::{PageContext, read_field};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Network,
    EmbeddedState,
    VisibleMarkup,
    FormField,
    EncodedLink,
    PositionStub,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub payload: NotationPayload,
    pub strategy: Strategy,
}

pub type ScrapeFn = fn(&dyn PageContext, &SourceSite) -> Result<Option<NotationPayload>, RelayError>;

/// Scrape fallbacks in priority order
pub const SCRAPE_CHAIN: &[(Strategy, ScrapeFn)] = &[
    (Strategy::EmbeddedState, from_embedded_state),
    (Strategy::VisibleMarkup, from_visible_markup),
    (Strategy::FormField, from_form_field),
    (Strategy::EncodedLink, from_encoded_link),
    (Strategy::PositionStub, from_position),
];

pub async fn extract<F: Fetcher>(
    page: &dyn PageContext,
    site: &SourceSite,
    fetcher: &F,
) -> Option<Extraction> {
    let network = from_network(page, site, fetcher).await;
    if let Some(payload) = settle(Strategy::Network, network) {
        return Some(Extraction {
            payload,
            strategy: Strategy::Network,
        });
    }

    SCRAPE_CHAIN.iter().find_map(|(strategy, scrape)| {
        settle(*strategy, scrape(page, site)).map(|payload| Extraction {
            payload,
            strategy: *strategy,
        })
    })
}

fn settle(
    strategy: Strategy,
    result: Result<Option<NotationPayload>, RelayError>,
) -> Option<NotationPayload> {
    match result {
        Ok(Some(payload)) => {
            info!("Extracted notation via {:?}", strategy);
            Some(payload)
        }
        Ok(None) => {
            debug!("{:?}: miss", strategy);
            None
        }
        Err(e) => {
            debug!("{:?}: failed, treating as miss: {}", strategy, e);
            None
        }
    }
}

/// A failed query only rules out its own selector; the rest of the list
/// is still tried.
fn skip_invalid(selector: &str, result: Result<Vec<String>, RelayError>) -> Vec<String> {
    result.unwrap_or_else(|e| {
        debug!("Skipping selector '{}': {}", selector, e);
        Vec::new()
    })
}

/// Game identifier from the URL path, else from a page attribute.
pub fn game_id(page: &dyn PageContext, site: &SourceSite) -> Result<Option<String>, RelayError> {
    if let Some(pattern) = &site.game_id_pattern {
        if let Some(id) = game_id_from_url(&page.url(), pattern)? {
            return Ok(Some(id));
        }
    }

    match &site.game_id_attribute {
        Some(field) => Ok(read_field(page, field)?
            .into_iter()
            .map(|id| id.trim().to_string())
            .find(|id| !id.is_empty())),
        None => Ok(None),
    }
}

/// First capture group of `pattern` matched against the URL path.
pub fn game_id_from_url(url: &str, pattern: &str) -> Result<Option<String>, RelayError> {
    let re = Regex::new(pattern)
        .map_err(|e| RelayError::Parse(format!("game id pattern: {}", e)))?;
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => return Ok(None),
    };

    Ok(re
        .captures(&path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string()))
}

async fn from_network<F: Fetcher>(
    page: &dyn PageContext,
    site: &SourceSite,
    fetcher: &F,
) -> Result<Option<NotationPayload>, RelayError> {
    let template = match &site.export_url {
        Some(template) => template,
        None => return Ok(None),
    };
    let id = match game_id(page, site)? {
        Some(id) => id,
        None => return Ok(None),
    };

    let body = fetcher.fetch_text(&template.replace("{id}", &id)).await?;
    Ok(NotationPayload::new(&body))
}

pub fn from_embedded_state(
    page: &dyn PageContext,
    site: &SourceSite,
) -> Result<Option<NotationPayload>, RelayError> {
    for source in &site.embedded_state {
        for raw in skip_invalid(&source.selector, page.attribute_values(&source.selector, &source.attribute)) {
            let state: Value = match serde_json::from_str(&raw) {
                Ok(state) => state,
                Err(e) => {
                    debug!("Malformed state in {}: {}", source.selector, e);
                    continue;
                }
            };

            let field = source
                .field
                .iter()
                .try_fold(&state, |value, key| value.get(key))
                .and_then(Value::as_str)
                .and_then(NotationPayload::new);

            if field.is_some() {
                return Ok(field);
            }
        }
    }
    Ok(None)
}

pub fn from_visible_markup(
    page: &dyn PageContext,
    site: &SourceSite,
) -> Result<Option<NotationPayload>, RelayError> {
    first_notation(&site.notation_text, |selector| page.text_contents(selector))
}

pub fn from_form_field(
    page: &dyn PageContext,
    site: &SourceSite,
) -> Result<Option<NotationPayload>, RelayError> {
    first_notation(&site.notation_fields, |selector| page.form_values(selector))
}

fn first_notation<Q>(selectors: &[String], query: Q) -> Result<Option<NotationPayload>, RelayError>
where
    Q: Fn(&str) -> Result<Vec<String>, RelayError>,
{
    for selector in selectors {
        let found = skip_invalid(selector, query(selector))
            .into_iter()
            .find(|text| looks_like_notation(text))
            .and_then(|text| NotationPayload::new(&text));
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

pub fn from_encoded_link(
    page: &dyn PageContext,
    site: &SourceSite,
) -> Result<Option<NotationPayload>, RelayError> {
    let base = page.url();
    for selector in &site.download_links {
        for href in skip_invalid(selector, page.attribute_values(selector, "href")) {
            let cleaned = decode_link(&href, &base).map(|text| strip_noise_tags(&text));
            if let Some(text) = cleaned.filter(|text| looks_like_notation(text)) {
                return Ok(NotationPayload::new(&text));
            }
        }
    }
    Ok(None)
}

/// Notation embedded in a link: the body of a `data:` URL, or a `pgn` query
/// parameter. Relative links resolve against `base`.
pub fn decode_link(href: &str, base: &str) -> Option<String> {
    if let Some(rest) = href.strip_prefix("data:") {
        let (header, body) = rest.split_once(',')?;
        if header.contains(";base64") {
            debug!("Skipping base64 data link");
            return None;
        }
        return urlencoding::decode(body).ok().map(|text| text.into_owned());
    }

    let link = match Url::parse(href) {
        Ok(link) => link,
        Err(_) => Url::parse(base).ok()?.join(href).ok()?,
    };
    link.query_pairs()
        .find(|(key, _)| key == "pgn")
        .map(|(_, value)| value.into_owned())
}

pub fn from_position(
    page: &dyn PageContext,
    site: &SourceSite,
) -> Result<Option<NotationPayload>, RelayError> {
    for field in &site.position {
        if let Some(fen) = skip_invalid(&field.selector, read_field(page, field))
            .into_iter()
            .find(|value| looks_like_fen(value))
        {
            return Ok(Some(position_stub(&fen, &page.today())));
        }
    }
    Ok(None)
}
