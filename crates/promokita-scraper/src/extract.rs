//! Selector-candidate extraction over fetched markup.
//!
//! Pure function over an HTML string and a [`SelectorSet`]: selector
//! candidates per logical field are tried in listed order and the first
//! producing non-empty text wins. Used by the browser strategy after
//! navigation; kept free of any browser dependency so it is testable against
//! plain fixtures.

use promokita_core::SelectorSet;
use scraper::{ElementRef, Html, Selector};

use crate::types::RawItem;

/// Extract up to `max_items` raw items from `html` using `selectors`.
///
/// Items lacking a title are discarded; title is the only hard-required
/// field at extraction time. Invalid selector strings are skipped, not
/// fatal: a catalog typo degrades one candidate, not the endpoint.
#[must_use]
pub fn extract_items(html: &str, selectors: &SelectorSet, max_items: usize) -> Vec<RawItem> {
    let document = Html::parse_document(html);

    let containers = first_matching_containers(&document, &selectors.container);
    let mut items = Vec::new();

    for container in containers {
        if items.len() >= max_items {
            break;
        }

        let Some(title) = first_text(container, &selectors.title) else {
            continue;
        };

        items.push(RawItem {
            title,
            description: first_text(container, &selectors.description),
            price: first_text(container, &selectors.price),
            original_price: first_text(container, &selectors.original_price),
            discount_text: first_text(container, &selectors.discount),
            code: first_text(container, &selectors.code),
            image_url: first_attr(container, &selectors.image, "src"),
            link: first_attr(container, &selectors.link, "href"),
            valid_until: None,
        });
    }

    items
}

/// Containers from the first candidate selector that matches anything.
fn first_matching_containers<'a>(
    document: &'a Html,
    candidates: &[String],
) -> Vec<ElementRef<'a>> {
    for candidate in candidates {
        let Ok(selector) = Selector::parse(candidate) else {
            tracing::debug!(selector = candidate.as_str(), "skipping unparsable selector");
            continue;
        };
        let matches: Vec<ElementRef<'a>> = document.select(&selector).collect();
        if !matches.is_empty() {
            return matches;
        }
    }
    Vec::new()
}

fn first_text(scope: ElementRef<'_>, candidates: &[String]) -> Option<String> {
    for candidate in candidates {
        let Ok(selector) = Selector::parse(candidate) else {
            continue;
        };
        if let Some(node) = scope.select(&selector).next() {
            let text = node.text().collect::<String>();
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn first_attr(scope: ElementRef<'_>, candidates: &[String], attr: &str) -> Option<String> {
    for candidate in candidates {
        let Ok(selector) = Selector::parse(candidate) else {
            continue;
        };
        if let Some(node) = scope.select(&selector).next() {
            if let Some(value) = node.value().attr(attr) {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors() -> SelectorSet {
        SelectorSet {
            container: vec![".promo-card".to_string(), ".deal".to_string()],
            title: vec![".headline".to_string(), "h3".to_string()],
            discount: vec![".discount".to_string()],
            image: vec!["img".to_string()],
            link: vec!["a".to_string()],
            ..SelectorSet::default()
        }
    }

    #[test]
    fn candidates_are_tried_in_listed_order() {
        // No .promo-card present; the second container candidate matches.
        let html = r#"
            <div class="deal">
                <span class="headline">Diskon 50% Elektronik</span>
                <h3>should not win, .headline is listed first</h3>
                <span class="discount">50%</span>
            </div>
        "#;
        let items = extract_items(html, &selectors(), 10);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Diskon 50% Elektronik");
        assert_eq!(items[0].discount_text.as_deref(), Some("50%"));
    }

    #[test]
    fn untitled_containers_are_discarded() {
        let html = r#"
            <div class="promo-card"><span class="discount">25%</span></div>
            <div class="promo-card"><h3>Gratis Ongkir</h3></div>
        "#;
        let items = extract_items(html, &selectors(), 10);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Gratis Ongkir");
    }

    #[test]
    fn max_items_bounds_extraction() {
        let html: String = (0..10)
            .map(|i| format!("<div class=\"promo-card\"><h3>Deal {i}</h3></div>"))
            .collect();
        let items = extract_items(&html, &selectors(), 3);
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn attributes_come_from_src_and_href() {
        let html = r#"
            <div class="promo-card">
                <h3>Voucher Fashion</h3>
                <img src="https://cdn.example.test/v.jpg">
                <a href="https://example.test/voucher">ambil</a>
            </div>
        "#;
        let items = extract_items(html, &selectors(), 10);
        assert_eq!(
            items[0].image_url.as_deref(),
            Some("https://cdn.example.test/v.jpg")
        );
        assert_eq!(items[0].link.as_deref(), Some("https://example.test/voucher"));
    }

    #[test]
    fn whitespace_in_text_is_collapsed() {
        let html = "<div class=\"promo-card\"><h3>  Flash \n  Sale  </h3></div>";
        let items = extract_items(html, &selectors(), 10);
        assert_eq!(items[0].title, "Flash Sale");
    }

    #[test]
    fn invalid_selector_candidate_is_skipped() {
        let mut sels = selectors();
        sels.container.insert(0, ":::not a selector".to_string());
        let html = "<div class=\"promo-card\"><h3>Promo</h3></div>";
        let items = extract_items(html, &sels, 10);
        assert_eq!(items.len(), 1);
    }
}
