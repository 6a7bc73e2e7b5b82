//! Plain-text and image extraction from parsed HTML.

use regex::Regex;
use scraper::{Html, Node, Selector};
use std::sync::LazyLock;
use url::Url;

/// Elements whose text never reaches the extracted content.
const STRIPPED_TAGS: &[&str] = &["script", "style", "noscript", "iframe"];

/// Runs of horizontal whitespace, including NBSP and the ideographic space.
static SPACE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\u{00a0}\u{3000}]+").expect("space run regex"));

static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("img selector"));

/// Collapse whitespace runs to one space and trim.
pub fn normalize_line(line: &str) -> String {
    SPACE_RUN_RE.replace_all(line, " ").trim().to_string()
}

/// Visible text of a document, one normalized line per text run, empty lines dropped.
pub fn extract_text(doc: &Html) -> String {
    let mut lines = Vec::new();

    for node in doc.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| STRIPPED_TAGS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        lines.extend(
            text.lines()
                .map(normalize_line)
                .filter(|line| !line.is_empty()),
        );
    }

    lines.join("\n")
}

/// Absolute http(s) image URLs in document order, from `src` or else `data-src`.
pub fn extract_images(doc: &Html, page_url: &Url) -> Vec<String> {
    doc.select(&IMG_SELECTOR)
        .filter_map(|img| {
            let el = img.value();
            let src = el
                .attr("src")
                .filter(|s| !s.trim().is_empty())
                .or_else(|| el.attr("data-src"))?
                .trim();
            let resolved = page_url.join(src).ok()?;
            matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
        })
        .collect()
}
