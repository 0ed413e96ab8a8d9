//! Markup to field extraction. Pure functions of the input markup.

use scraper::{ElementRef, Html, Selector};
use scrape_core::{FieldMap, FieldSelectors, FieldValue};
use scrape_logging::scrape_warn;

pub const MAX_LINKS: usize = 50;
pub const MAX_IMAGES: usize = 30;
pub const MAX_LIST_ITEMS: usize = 50;
pub const MAX_TABLES: usize = 10;
pub const MAX_MAIN_CONTENT_CHARS: usize = 5_000;
pub const MIN_PARAGRAPH_CHARS: usize = 20;

const STRIPPED_ELEMENTS: &str = "script, style, noscript, iframe, svg";
const CONTENT_CONTAINERS: &str =
    r#"article, main, [role="main"], .content, .main-content, #content, #main"#;

/// Attribute fallbacks for a single matched node, after its text content.
const SCALAR_ATTRIBUTES: [&str; 6] = ["content", "href", "src", "value", "alt", "title"];
/// Attribute fallbacks per node when a selector matches several nodes.
const LIST_ATTRIBUTES: [&str; 3] = ["content", "href", "src"];

/// Extract caller-named fields.
///
/// Every key of `selectors` is present in the output:
/// - no match: empty string
/// - one match: text, then `content`/`href`/`src`/`value`/`alt`/`title`, then inner markup
/// - several matches: list of per-node values (text, `content`, `href`, `src`), empties dropped
pub fn extract_by_selectors(markup: &str, selectors: &FieldSelectors) -> FieldMap {
    let doc = Html::parse_document(markup);
    let mut fields = FieldMap::new();

    for (field, css) in selectors {
        let selector = match Selector::parse(css) {
            Ok(selector) => selector,
            Err(err) => {
                scrape_warn!("Invalid selector for field {}: {:?} ({})", field, css, err);
                fields.insert(field.clone(), FieldValue::Text(String::new()));
                continue;
            }
        };

        let matches: Vec<ElementRef> = doc.select(&selector).collect();
        let value = match matches.as_slice() {
            [] => FieldValue::Text(String::new()),
            [single] => FieldValue::Text(scalar_value(*single)),
            many => FieldValue::List(
                many.iter()
                    .filter_map(|el| list_value(*el))
                    .collect(),
            ),
        };
        fields.insert(field.clone(), value);
    }

    fields
}

/// Heuristic extraction of a fixed set of page fields.
pub fn extract_full_page(markup: &str) -> FieldMap {
    let mut doc = Html::parse_document(markup);
    strip_non_content(&mut doc);

    let mut fields = FieldMap::new();

    let title = first(&doc, "title")
        .map(element_text)
        .filter(|t| !t.is_empty())
        .or_else(|| first(&doc, "h1").map(element_text))
        .unwrap_or_default();
    fields.insert("title".into(), FieldValue::Text(title));

    let description = meta_content(&doc, r#"meta[name="description"]"#)
        .or_else(|| meta_content(&doc, r#"meta[property="og:description"]"#))
        .unwrap_or_default();
    fields.insert("metaDescription".into(), FieldValue::Text(description));

    for (field, css) in [
        ("metaKeywords", r#"meta[name="keywords"]"#),
        ("ogTitle", r#"meta[property="og:title"]"#),
        ("ogImage", r#"meta[property="og:image"]"#),
        ("ogUrl", r#"meta[property="og:url"]"#),
    ] {
        let value = meta_content(&doc, css).unwrap_or_default();
        fields.insert(field.into(), FieldValue::Text(value));
    }

    let headings = select_all(&doc, "h1, h2, h3, h4, h5, h6")
        .into_iter()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    fields.insert("headings".into(), FieldValue::List(headings));

    let paragraphs = select_all(&doc, "p")
        .into_iter()
        .map(element_text)
        .filter(|t| t.chars().count() > MIN_PARAGRAPH_CHARS)
        .collect();
    fields.insert("paragraphs".into(), FieldValue::List(paragraphs));

    let links = select_all(&doc, "a[href]")
        .into_iter()
        .map(|el| {
            let text = element_text(el);
            let href = el.value().attr("href").unwrap_or_default();
            if text.is_empty() {
                href.to_string()
            } else {
                format!("{text} -> {href}")
            }
        })
        .filter(|entry| !entry.is_empty())
        .take(MAX_LINKS)
        .collect();
    fields.insert("links".into(), FieldValue::List(links));

    let images = select_all(&doc, "img[src]")
        .into_iter()
        .map(|el| {
            let src = el.value().attr("src").unwrap_or_default();
            match el.value().attr("alt").filter(|alt| !alt.is_empty()) {
                Some(alt) => format!("{alt}: {src}"),
                None => src.to_string(),
            }
        })
        .filter(|entry| !entry.is_empty())
        .take(MAX_IMAGES)
        .collect();
    fields.insert("images".into(), FieldValue::List(images));

    let main = first(&doc, CONTENT_CONTAINERS).or_else(|| first(&doc, "body"));
    let main_content = main
        .map(|el| truncate_chars(&collapse_whitespace(&raw_text(el)), MAX_MAIN_CONTENT_CHARS))
        .unwrap_or_default();
    fields.insert("mainContent".into(), FieldValue::Text(main_content));

    let list_items = select_all(&doc, "ul li, ol li")
        .into_iter()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .take(MAX_LIST_ITEMS)
        .collect();
    fields.insert("listItems".into(), FieldValue::List(list_items));

    let tables = select_all(&doc, "table")
        .into_iter()
        .map(|el| collapse_whitespace(&raw_text(el)))
        .filter(|t| !t.is_empty())
        .take(MAX_TABLES)
        .collect();
    fields.insert("tables".into(), FieldValue::List(tables));

    fields
}

fn scalar_value(el: ElementRef) -> String {
    let text = element_text(el);
    if !text.is_empty() {
        return text;
    }
    if let Some(attr) = first_attribute(el, &SCALAR_ATTRIBUTES) {
        return attr;
    }
    el.inner_html().trim().to_string()
}

fn list_value(el: ElementRef) -> Option<String> {
    let text = element_text(el);
    if !text.is_empty() {
        return Some(text);
    }
    first_attribute(el, &LIST_ATTRIBUTES)
}

fn first_attribute(el: ElementRef, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| el.value().attr(name))
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn strip_non_content(doc: &mut Html) {
    let ids: Vec<_> = select_all(doc, STRIPPED_ELEMENTS)
        .into_iter()
        .map(|el| el.id())
        .collect();
    for id in ids {
        // Nested matches may already be gone with their ancestor.
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

// Traverses from the root element so nodes detached by `strip_non_content`
// are never visited.
fn select_all<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => doc.root_element().select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn first<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    doc.root_element().select(&selector).next()
}

fn meta_content(doc: &Html, css: &str) -> Option<String> {
    first(doc, css)
        .and_then(|el| el.value().attr("content"))
        .filter(|content| !content.is_empty())
        .map(str::to_string)
}

fn raw_text(el: ElementRef) -> String {
    el.text().collect()
}

fn element_text(el: ElementRef) -> String {
    raw_text(el).trim().to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_whitespace_joins_runs() {
        assert_eq!(collapse_whitespace("  a \n\t b  c "), "a b c");
        assert_eq!(collapse_whitespace(" \n "), "");
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 3), "abc");
    }

    #[test]
    fn stripping_handles_nested_removed_nodes() {
        let mut doc = Html::parse_document(
            "<body><noscript><iframe src='x'></iframe></noscript><p>kept</p></body>",
        );
        strip_non_content(&mut doc);
        assert!(select_all(&doc, "iframe").is_empty());
        assert!(select_all(&doc, "noscript").is_empty());
        assert_eq!(select_all(&doc, "p").len(), 1);
    }
}
