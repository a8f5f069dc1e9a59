//! HTML to readable text.
//!
//! A small regex-driven extractor: enough structure to pull a title, the
//! main text region, outbound links and a few `<meta>` values out of an
//! ordinary web page. It does not build a DOM.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use rustscout_core::{PageData, PageLink};

/// Elements removed together with their content before text extraction.
const STRIPPED_ELEMENTS: [&str; 7] = [
    "script", "style", "noscript", "template", "nav", "header", "footer",
];

pub const NO_TITLE: &str = "No title found";

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

static STRIPPED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    STRIPPED_ELEMENTS
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("valid regex"))
        .collect()
});

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").expect("valid regex"));

static H1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1\b[^>]*>(.*?)</h1\s*>").expect("valid regex"));

static BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</?(?:p|div|br|hr|h[1-6]|li|ul|ol|dl|dt|dd|tr|td|th|table|thead|tbody|section|article|main|aside|blockquote|pre|figure|figcaption|form|label|button)\b[^>]*>",
    )
    .expect("valid regex")
});

static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z][a-zA-Z0-9]{1,31});")
        .expect("valid regex")
});

static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").expect("valid regex"));

static META: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b([^>]*)>").expect("valid regex"));

static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid regex")
});

/// Open and close tags of the main-content candidates, in preference order.
static REGION_TAGS: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    ["main", "article", "div", "body"]
        .map(|tag| Regex::new(&format!(r"(?i)<(/?){tag}\b[^>]*>")).expect("valid regex"))
});

static CONTENT_DIV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<div\b[^>]*\bclass\s*=\s*["'](?:[^"']*\s)?content(?:\s[^"']*)?["'][^>]*>"#)
        .expect("valid regex")
});

/// Extract structured page data from an HTML document.
pub fn extract_page(html: &str, url: &str, max_links: usize) -> PageData {
    let without_comments = COMMENT.replace_all(html, "");
    let title = extract_title(&without_comments);
    let metadata = extract_metadata(&without_comments);

    let mut cleaned = without_comments.into_owned();
    for re in STRIPPED.iter() {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }

    let region = main_region(&cleaned);
    PageData {
        url: url.to_string(),
        title,
        text: visible_text(region),
        links: extract_links(&cleaned, max_links),
        metadata,
    }
}

/// Page title from `<title>`, else the first `<h1>`, else [`NO_TITLE`].
pub fn extract_title(html: &str) -> String {
    [&*TITLE, &*H1]
        .iter()
        .filter_map(|re| re.captures(html))
        .map(|caps| inline_text(&caps[1]))
        .find(|t| !t.is_empty())
        .unwrap_or_else(|| NO_TITLE.to_string())
}

/// The part of the document holding the main content: `<main>`, then
/// `<article>`, then `<div class="content">`, then `<body>`, then everything.
fn main_region(html: &str) -> &str {
    let [main, article, div, body] = &*REGION_TAGS;
    let candidates: [(&Regex, Option<&Regex>); 4] = [
        (main, None),
        (article, None),
        (div, Some(&*CONTENT_DIV)),
        (body, None),
    ];
    candidates
        .into_iter()
        .find_map(|(tag_re, open)| element_inner(html, tag_re, open))
        .unwrap_or(html)
}

/// Inner HTML of the first element matched by `tag_re` (or the first match
/// of `open`), balancing nested elements of the same name. `tag_re` captures
/// the closing slash in group 1.
fn element_inner<'a>(html: &'a str, tag_re: &Regex, open: Option<&Regex>) -> Option<&'a str> {
    let start = match open {
        Some(re) => re.find(html)?.end(),
        None => tag_re
            .captures_iter(html)
            .find(|c| c[1].is_empty())?
            .get(0)?
            .end(),
    };

    let rest = &html[start..];
    let mut depth = 1usize;
    for caps in tag_re.captures_iter(rest) {
        let m = caps.get(0)?;
        if caps[1].is_empty() {
            if !m.as_str().ends_with("/>") {
                depth += 1;
            }
        } else {
            depth -= 1;
            if depth == 0 {
                return Some(&rest[..m.start()]);
            }
        }
    }
    Some(rest)
}

/// Readable text: one line per block element, whitespace collapsed, blank
/// lines removed.
pub fn visible_text(html: &str) -> String {
    let blocks = BLOCK_TAG.replace_all(html, "\n");
    let stripped = ANY_TAG.replace_all(&blocks, "");
    let decoded = decode_entities(&stripped);

    decoded
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text of an inline fragment on a single line.
pub(crate) fn inline_text(html: &str) -> String {
    collapse_whitespace(&decode_entities(&ANY_TAG.replace_all(html, " ")))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Absolute `http(s)` links in document order, at most `max`.
fn extract_links(html: &str, max: usize) -> Vec<PageLink> {
    ANCHOR
        .captures_iter(html)
        .filter_map(|caps| {
            let attrs = parse_attrs(&caps[1]);
            let href = attrs.get("href")?;
            let lower = href.to_ascii_lowercase();
            if !(lower.starts_with("http://") || lower.starts_with("https://")) {
                return None;
            }
            Some(PageLink {
                text: inline_text(&caps[2]),
                url: href.clone(),
            })
        })
        .take(max)
        .collect()
}

/// `description`, `og_title` and `og_description` from `<meta>` tags.
fn extract_metadata(html: &str) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    for caps in META.captures_iter(html) {
        let attrs = parse_attrs(&caps[1]);
        let Some(content) = attrs.get("content").map(|c| collapse_whitespace(c)) else {
            continue;
        };
        if content.is_empty() {
            continue;
        }
        let key = attrs
            .get("name")
            .or_else(|| attrs.get("property"))
            .map(|k| k.to_ascii_lowercase());
        let slot = match key.as_deref() {
            Some("description") => "description",
            Some("og:title") => "og_title",
            Some("og:description") => "og_description",
            _ => continue,
        };
        metadata.entry(slot.to_string()).or_insert(content);
    }
    metadata
}

/// Attribute map of a tag's attribute string; names lowercased, values decoded.
pub(crate) fn parse_attrs(attrs: &str) -> BTreeMap<String, String> {
    ATTR.captures_iter(attrs)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            (caps[1].to_ascii_lowercase(), decode_entities(value).trim().to_string())
        })
        .collect()
}

/// Decode named and numeric character references. Unknown names are kept.
pub fn decode_entities(s: &str) -> String {
    ENTITY
        .replace_all(s, |caps: &Captures| match decode_entity(&caps[1]) {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(dec) = name.strip_prefix('#') {
        return dec.parse().ok().and_then(char::from_u32);
    }
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "middot" => '\u{b7}',
        "bull" => '\u{2022}',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Rust &amp; Friends</title>
  <meta name="description" content="A page about Rust.">
  <meta property="og:title" content="Rust and Friends">
  <meta name="viewport" content="width=device-width">
  <style>body { color: red; }</style>
  <script>var tracking = "<p>not content</p>";</script>
</head>
<body>
  <header><a href="https://example.com/login">Log in</a></header>
  <nav><ul><li>Home</li><li>Blog</li></ul></nav>
  <main>
    <h1>Ownership</h1>
    <p>Each value has   a <b>single</b> owner.</p>
    <!-- <p>hidden comment</p> -->
    <div><p>Borrowing lets you <a href="https://doc.rust-lang.org/book/ch04-02-references-and-borrowing.html">reference</a> data.</p></div>
    <a href="/relative">relative link</a>
  </main>
  <footer>Copyright &copy; 2024</footer>
</body>
</html>"#;

    #[test]
    fn extracts_title_and_metadata() {
        let page = extract_page(PAGE, "https://example.com", 20);
        assert_eq!(page.title, "Rust & Friends");
        assert_eq!(page.metadata.get("description").unwrap(), "A page about Rust.");
        assert_eq!(page.metadata.get("og_title").unwrap(), "Rust and Friends");
        assert!(!page.metadata.contains_key("viewport"));
    }

    #[test]
    fn text_comes_from_main_without_chrome() {
        let page = extract_page(PAGE, "https://example.com", 20);
        assert_eq!(
            page.text,
            "Ownership\nEach value has a single owner.\nBorrowing lets you reference data.\nrelative link"
        );
        assert!(!page.text.contains("Log in"));
        assert!(!page.text.contains("Copyright"));
        assert!(!page.text.contains("not content"));
        assert!(!page.text.contains("hidden comment"));
    }

    #[test]
    fn only_absolute_links_survive() {
        let page = extract_page(PAGE, "https://example.com", 20);
        assert_eq!(page.links.len(), 1);
        assert_eq!(page.links[0].text, "reference");
        assert!(page.links[0].url.starts_with("https://doc.rust-lang.org/"));
    }

    #[test]
    fn link_count_is_capped() {
        let html: String = (0..30)
            .map(|i| format!(r#"<a href="https://example.com/{i}">link {i}</a>"#))
            .collect();
        let page = extract_page(&html, "https://example.com", 20);
        assert_eq!(page.links.len(), 20);
        assert_eq!(page.links[19].url, "https://example.com/19");
    }

    #[test]
    fn title_falls_back_to_h1_then_placeholder() {
        assert_eq!(extract_title("<body><h1> Hello <i>World</i></h1></body>"), "Hello World");
        assert_eq!(extract_title("<body><p>nothing</p></body>"), NO_TITLE);
    }

    #[test]
    fn nested_content_div_is_balanced() {
        let html = r#"<body><div class="sidebar">side</div>
            <div class="post content"><div>inner</div><p>after inner</p></div>
            <div>trailing</div></body>"#;
        let page = extract_page(html, "https://example.com", 20);
        assert_eq!(page.text, "inner\nafter inner");
    }

    #[test]
    fn region_preference_is_main_then_article() {
        let html = "<body><article>post</article><main><p>core</p></main></body>";
        assert_eq!(main_region(html), "<p>core</p>");
        let html = "<body><p>intro</p><article><section>story</section></article></body>";
        assert_eq!(main_region(html), "<section>story</section>");
        assert_eq!(main_region("<p>bare</p>"), "<p>bare</p>");
    }

    #[test]
    fn body_is_used_without_main_or_article() {
        let page = extract_page("<html><body><p>one</p><p>two</p></body></html>", "u", 5);
        assert_eq!(page.text, "one\ntwo");
    }

    #[test]
    fn entities_decode_once() {
        assert_eq!(decode_entities("&amp;lt; &#65;&#x42; &bogus;"), "&lt; AB &bogus;");
    }
}
