//! Hyperlink harvesting from release and download pages.
//!
//! Links are gathered two ways: structurally from `a`, `link`, and `area`
//! elements, and by scanning the raw document text for absolute URLs (which
//! catches links embedded in scripts or JSON blobs). Results are resolved
//! against the page URL and de-duplicated in first-seen order.

use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

#[allow(clippy::expect_used, reason = "constant selector")]
static LINK_ELEMENTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href], link[href], area[href]").expect("link selector parses")
});

#[allow(clippy::expect_used, reason = "constant pattern")]
static ABSOLUTE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhttps?://[^\s"'<>()\[\]{}\\]+"#).expect("URL pattern compiles")
});

/// Characters trimmed from the end of URLs found in free text.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];

/// Collects every HTTP(S) link in `html`, resolved against `base`.
///
/// Fragments are dropped. The order is: structured links in document order,
/// then any additional URLs found in the raw text.
///
/// # Examples
///
/// ```
/// use printdeploy_installer::artefact::links::extract_links;
/// use url::Url;
///
/// let base = Url::parse("https://vendor.example/drivers/").expect("base URL");
/// let links = extract_links(&base, r#"<a href="upd-pcl6.zip">Download</a>"#);
/// assert_eq!(links[0].as_str(), "https://vendor.example/drivers/upd-pcl6.zip");
/// ```
#[must_use]
pub fn extract_links(base: &Url, html: &str) -> Vec<Url> {
    let document = Html::parse_document(html);
    let structured = document
        .select(&LINK_ELEMENTS)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_href(base, href));

    // JSON-embedded URLs often escape their slashes.
    let text = html.replace("\\/", "/");
    let scanned: Vec<Url> = ABSOLUTE_URL
        .find_iter(&text)
        .filter_map(|m| Url::parse(m.as_str().trim_end_matches(TRAILING_PUNCTUATION)).ok())
        .filter_map(normalise)
        .collect();

    let mut seen = HashSet::new();
    structured
        .chain(scanned)
        .filter(|url| seen.insert(url.as_str().to_owned()))
        .collect()
}

fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    base.join(href).ok().and_then(normalise)
}

fn normalise(mut url: Url) -> Option<Url> {
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}
