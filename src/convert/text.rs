//! Text preparation before a text part is handed to a PDF converter.

use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_8};
use pulldown_cmark::{Options, Parser, html};
use regex::Regex;

const META_CHARSET: &str = r#"<meta charset="utf-8">"#;

static HEAD_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<head(?:\s[^>]*)?>").expect("valid regex"));
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<html(?:\s[^>]*)?>").expect("valid regex"));
static DOCTYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*<!doctype[^>]*>").expect("valid regex"));

/// Decode `payload` from `charset` into UTF-8.
///
/// Unknown or missing charsets are treated as UTF-8; undecodable sequences
/// become U+FFFD rather than failing the part.
pub fn to_utf8(payload: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|c| Encoding::for_label(c.trim().as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, had_errors) = encoding.decode(payload);
    if had_errors {
        tracing::debug!(charset = encoding.name(), "Replaced undecodable bytes in text part");
    }
    text.into_owned()
}

/// Render markdown into a complete UTF-8 HTML document.
pub fn markdown_document(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut body = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut body, Parser::new_ext(markdown, options));

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n{META_CHARSET}\n</head>\n<body>\n{body}</body>\n</html>\n"
    )
}

/// Declare UTF-8 as the first thing in the document head.
///
/// The body has already been decoded to UTF-8, so any charset the sender
/// declared further down must not win.
pub fn inject_meta_charset(document: &str) -> String {
    if let Some(m) = HEAD_TAG.find(document) {
        return splice(document, m.end(), META_CHARSET);
    }
    if let Some(m) = HTML_TAG.find(document) {
        return splice(document, m.end(), &format!("<head>{META_CHARSET}</head>"));
    }
    match DOCTYPE.find(document) {
        Some(m) => splice(document, m.end(), META_CHARSET),
        None => splice(document, 0, META_CHARSET),
    }
}

fn splice(document: &str, at: usize, insert: &str) -> String {
    let mut out = String::with_capacity(document.len() + insert.len());
    out.push_str(&document[..at]);
    out.push_str(insert);
    out.push_str(&document[at..]);
    out
}
