use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{BrowserError, BrowserSession, Locator};
use crate::config::Timings;
use crate::error::{ScrapeError, Stage};
use crate::layout::SiteLayout;
use crate::model::Product;

static PRICE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d.,]*").unwrap());

/// One result tile as read from the page, before any parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawItem {
    pub title: Option<String>,
    pub price: Option<String>,
    pub href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemParseError {
    #[error("item has no price element")]
    MissingPrice,
    #[error("no digits in price text `{0}`")]
    NoDigits(String),
    #[error("price `{0}` is not a number")]
    Malformed(String),
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses the first number in a price label such as `"1.234,56 €"`.
///
/// The last `.` or `,` of the digit run is the decimal separator when one or
/// two digits follow it; every other separator is a thousands mark.
pub fn parse_price(text: &str) -> Result<f64, ItemParseError> {
    let run = PRICE_RUN
        .find(text)
        .ok_or_else(|| ItemParseError::NoDigits(text.trim().to_string()))?
        .as_str()
        .trim_end_matches(|c: char| c == '.' || c == ',');

    let digits = |s: &str| s.chars().filter(|c| c.is_ascii_digit()).collect::<String>();
    let normalized = match run.rfind(|c: char| c == '.' || c == ',') {
        Some(pos) if matches!(run.len() - pos - 1, 1 | 2) => {
            format!("{}.{}", digits(&run[..pos]), &run[pos + 1..])
        }
        _ => digits(run),
    };

    match normalized.parse::<f64>() {
        Ok(price) if price.is_finite() => Ok(price),
        _ => Err(ItemParseError::Malformed(run.to_string())),
    }
}

/// Makes `href` absolute against the site origin. Absolute links are kept as
/// they are; blank or unresolvable ones become `None`.
pub fn normalize_link(origin: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if Url::parse(href).is_ok() {
        return Some(href.to_string());
    }
    origin.join(href).ok().map(String::from)
}

pub fn parse_item(raw: RawItem, origin: &Url) -> Result<Product, ItemParseError> {
    let price_text = raw.price.ok_or(ItemParseError::MissingPrice)?;
    let price = parse_price(&price_text)?;

    let title = raw
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let link = raw.href.and_then(|href| normalize_link(origin, &href));

    Ok(Product { title, price, link })
}

/// Keeps the parseable items, in page order.
pub fn products_from_items(items: Vec<RawItem>, origin: &Url) -> Vec<Product> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, raw)| match parse_item(raw, origin) {
            Ok(product) => Some(product),
            Err(e) => {
                debug!(index, "skipping result item: {e}");
                None
            }
        })
        .collect()
}

// ============================================================================
// Reading the page
// ============================================================================

fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// In-page script returning the raw items as a JSON string.
pub fn extraction_script(layout: &SiteLayout) -> String {
    format!(
        r#"(() => {{
            try {{
                const items = document.querySelectorAll({item});
                return JSON.stringify(Array.from(items, (item) => {{
                    const title = item.querySelector({title});
                    const price = item.querySelector({price});
                    const link = item.querySelector({link});
                    return {{
                        title: title ? title.textContent : null,
                        price: price ? price.textContent : null,
                        href: link ? link.getAttribute("href") : null,
                    }};
                }}));
            }} catch (e) {{
                return JSON.stringify({{ error: String(e) }});
            }}
        }})()"#,
        item = js_string(&layout.result_item),
        title = js_string(&layout.item_title),
        price = js_string(&layout.item_price),
        link = js_string(&layout.item_link),
    )
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptResult {
    Items(Vec<RawItem>),
    Failed { error: String },
}

fn decode_script_result(value: Value) -> Result<Vec<RawItem>, BrowserError> {
    let decoded = match value {
        Value::String(json) => serde_json::from_str(&json),
        other => serde_json::from_value(other),
    };
    match decoded {
        Ok(ScriptResult::Items(items)) => Ok(items),
        Ok(ScriptResult::Failed { error }) => Err(BrowserError::ScriptFailed(error)),
        Err(e) => Err(BrowserError::ScriptFailed(format!("unusable result: {e}"))),
    }
}

fn selector(css: &str) -> Result<Selector, BrowserError> {
    Selector::parse(css).map_err(|e| {
        debug!("selector parse error: {e:?}");
        BrowserError::InvalidSelector(css.to_string())
    })
}

/// Reads the raw items out of serialized page HTML.
pub fn items_from_html(html: &str, layout: &SiteLayout) -> Result<Vec<RawItem>, BrowserError> {
    let item_selector = selector(&layout.result_item)?;
    let title_selector = selector(&layout.item_title)?;
    let price_selector = selector(&layout.item_price)?;
    let link_selector = selector(&layout.item_link)?;

    let text = |el: ElementRef| el.text().collect::<String>();
    let document = Html::parse_document(html);
    Ok(document
        .select(&item_selector)
        .map(|item| RawItem {
            title: item.select(&title_selector).next().map(text),
            price: item.select(&price_selector).next().map(text),
            href: item
                .select(&link_selector)
                .next()
                .and_then(|a| a.value().attr("href").map(str::to_string)),
        })
        .collect())
}

/// Waits for the filtered result list and converts it into products.
pub async fn collect<S>(
    session: &S,
    layout: &SiteLayout,
    timings: &Timings,
    origin: &Url,
) -> Result<Vec<Product>, ScrapeError>
where
    S: BrowserSession + ?Sized,
{
    let fail = |e| ScrapeError::from_browser(Stage::Extract, e);

    session
        .wait_for(&Locator::page(&layout.result_list), timings.element_timeout)
        .await
        .map_err(fail)?;
    sleep(timings.render_grace).await;

    // Page-level script failures fall back to the HTML; a dead browser does not.
    let scripted = match session.evaluate(&extraction_script(layout)).await {
        Ok(value) => decode_script_result(value),
        Err(e) if e.is_layout() => Err(e),
        Err(e) => return Err(fail(e)),
    };
    let items = match scripted {
        Ok(items) => items,
        Err(e) => {
            warn!("extraction script failed ({e}), parsing page HTML instead");
            let html = session.content().await.map_err(fail)?;
            items_from_html(&html, layout).map_err(fail)?
        }
    };

    let products = products_from_items(items, origin);
    info!(count = products.len(), "products extracted");
    Ok(products)
}
