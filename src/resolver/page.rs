//! Regex collectors over arbitrary landing-page HTML.
//!
//! Publisher pages are not well-formed documents; these collectors pull out
//! just the tags the heuristics need (meta, anchors, forms) and tolerate
//! everything else.

use once_cell::sync::Lazy;
use regex::Regex;

static META_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?is)<meta\b[^>]*>"#).unwrap());
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    // Attribute pairs: key="value", key='value', or unquoted (no backreferences in Rust regex)
    Regex::new(r#"(?i)([a-zA-Z_:\-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'<>`]+))"#).unwrap()
});
static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?is)<a\b([^>]*)>(.*?)</a>"#).unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?is)<[^>]*>"#).unwrap());
static FORM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?is)<form\b[^>]*>.*?</form>"#).unwrap());
static FORM_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?is)<form\b[^>]*>"#).unwrap());
static INPUT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?is)<input\b[^>]*>"#).unwrap());

#[derive(Debug, Clone)]
pub struct MetaTag {
    pub name: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct Anchor {
    pub href: String,
    /// Visible text with nested tags stripped and whitespace collapsed.
    pub text: String,
}

/// An HTML form with its hidden inputs harvested, enough for a login POST.
#[derive(Debug, Clone)]
pub struct Form {
    pub id: Option<String>,
    pub action: Option<String>,
    pub hidden: Vec<(String, String)>,
}

/// A landing page reduced to the signals the candidate strategies read.
#[derive(Debug, Default)]
pub struct Page {
    pub meta: Vec<MetaTag>,
    pub anchors: Vec<Anchor>,
}

pub fn parse(html: &str) -> Page {
    Page {
        meta: collect_meta(html),
        anchors: collect_anchors(html),
    }
}

fn collect_meta(html: &str) -> Vec<MetaTag> {
    META_TAG_RE
        .find_iter(html)
        .filter_map(|m| parse_meta_tag(m.as_str()))
        .collect()
}

fn parse_meta_tag(tag: &str) -> Option<MetaTag> {
    let mut name = None;
    let mut content = None;
    for (key, value) in attributes(tag) {
        match key.as_str() {
            "name" => name = Some(value),
            "content" => content = Some(value),
            _ => {}
        }
    }
    Some(MetaTag {
        name,
        content: content?,
    })
}

fn collect_anchors(html: &str) -> Vec<Anchor> {
    ANCHOR_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let attrs = caps.get(1)?.as_str();
            let href = attributes(attrs)
                .into_iter()
                .find(|(k, _)| k == "href")
                .map(|(_, v)| v)?;
            if href.is_empty() {
                return None;
            }
            let inner = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            Some(Anchor {
                href,
                text: normalize_ws(&TAG_RE.replace_all(inner, " ")),
            })
        })
        .collect()
}

pub fn collect_forms(html: &str) -> Vec<Form> {
    FORM_RE
        .find_iter(html)
        .filter_map(|m| parse_form(m.as_str()))
        .collect()
}

fn parse_form(block: &str) -> Option<Form> {
    let open = FORM_OPEN_RE.find(block)?;
    let mut id = None;
    let mut action = None;
    for (key, value) in attributes(open.as_str()) {
        match key.as_str() {
            "id" => id = Some(value),
            "action" => action = Some(value),
            _ => {}
        }
    }
    let hidden = INPUT_RE
        .find_iter(block)
        .filter_map(|m| {
            let attrs = attributes(m.as_str());
            let field = |k: &str| attrs.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());
            if !field("type")?.eq_ignore_ascii_case("hidden") {
                return None;
            }
            Some((field("name")?, field("value").unwrap_or_default()))
        })
        .collect();
    Some(Form { id, action, hidden })
}

/// Lower-cased attribute keys with their raw values.
fn attributes(tag: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(tag)
        .filter_map(|cap| {
            let key = cap.get(1)?.as_str().to_ascii_lowercase();
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .or_else(|| cap.get(4))
                .map(|m| m.as_str().to_string())?;
            Some((key, value))
        })
        .collect()
}

pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}
