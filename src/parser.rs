use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};

use crate::error::{CatalogError, Result};
use crate::models::Match;

/// Relative prefix shared by every product-listing href on the page.
pub const HREF_PREFIX: &str = "/products/en/";
/// Absolute prefix used to reconstruct full category URLs.
pub const URL_PREFIX: &str = "https://www.digikey.com/products/en/";

/// Scrape the saved listing page into a key -> matches table.
///
/// The page repeats the same link in several contexts (summary line,
/// sidebar), so one key accumulates every occurrence in document order. Keys
/// come back sorted because the builder consumes them in lexicographic
/// order.
pub fn extract_matches(html: &str) -> Result<BTreeMap<String, Vec<Match>>> {
    let doc = Html::parse_document(html);
    let anchor_selector = Selector::parse("a").unwrap();

    let mut hrefs_table: BTreeMap<String, Vec<Match>> = BTreeMap::new();
    for anchor in doc.select(&anchor_selector) {
        let Some(raw_href) = anchor.value().attr("href") else {
            continue;
        };
        if !raw_href.starts_with(HREF_PREFIX) || raw_href == HREF_PREFIX {
            continue;
        }

        // Strip the "?search" suffix, then the fixed prefix; what remains is
        // the key ("audio-products/10", "audio-products/accessories/159").
        let stripped = match raw_href.find('?') {
            Some(index) => &raw_href[..index],
            None => raw_href,
        };
        let key = stripped[HREF_PREFIX.len()..].to_string();

        // The trailing path segment is the numeric nonce; a key without one
        // is its own base. A non-numeric trailing segment means the page no
        // longer matches the structure we assume.
        let (base, nonce) = match key.rfind('/') {
            Some(index) => {
                let nonce = key[index + 1..]
                    .parse::<i64>()
                    .map_err(|_| CatalogError::MalformedHref {
                        href: raw_href.to_string(),
                    })?;
                (key[..index].replace('/', "-"), nonce)
            }
            None => (key.clone(), -1),
        };

        let label = direct_text(anchor);

        // The caption is the text between </a> and </li>, and only matters
        // for classed anchors sitting directly under a list item. The
        // anchor's own subtree is not direct text of the parent, so it is
        // excluded for free.
        let mut caption = String::new();
        if anchor.value().attr("class").is_some() {
            if let Some(parent) = anchor.parent().and_then(ElementRef::wrap) {
                if parent.value().name() == "li" {
                    caption = direct_text(parent);
                }
            }
        }

        let url = format!("{URL_PREFIX}{key}");
        hrefs_table
            .entry(key.clone())
            .or_default()
            .push(Match::new(&key, &base, nonce, &label, &caption, &url));
    }

    Ok(hrefs_table)
}

/// Concatenated direct text children of an element, trimmed. Text inside
/// nested elements is not included.
fn direct_text(element: ElementRef) -> String {
    let mut out = String::new();
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
    out.trim().to_string()
}
