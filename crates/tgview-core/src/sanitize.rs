//! HTML escaping and allow-list sanitizing for message text.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Formatting tags the export produces and the feed may keep.
const ALLOWED_TAGS: &[&str] = &[
    "a",
    "b",
    "blockquote",
    "br",
    "code",
    "del",
    "em",
    "i",
    "p",
    "pre",
    "s",
    "span",
    "strike",
    "strong",
    "u",
];

/// Elements removed together with their content.
const DROPPED_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "svg", "math",
];

const VOID_TAGS: &[&str] = &["br"];

#[expect(clippy::expect_used)]
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<\s*(/)?\s*([a-zA-Z][a-zA-Z0-9-]*)([^>]*)>").expect("valid tag pattern")
});

#[expect(clippy::expect_used)]
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*(?:=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("valid attribute pattern")
});

#[expect(clippy::expect_used)]
static MARKUP_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<![^>]*>|<\?[^>]*>").expect("valid declaration pattern")
});

#[expect(clippy::expect_used)]
static DROPPED_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DROPPED_ELEMENTS
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<\s*{tag}\b[^>]*>.*?<\s*/\s*{tag}\s*>"))
                .expect("valid element pattern")
        })
        .collect()
});

/// Escape text for insertion as HTML text or attribute value.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Reduce rich text to the allow-listed formatting tags.
///
/// Script-bearing elements are removed with their content, other unknown
/// tags are unwrapped (text kept), `on*` handlers and any attribute outside
/// the per-tag allow-list are dropped, and links with script-capable schemes
/// lose their `href`.
pub fn sanitize_html(html: &str) -> String {
    let mut cleaned = MARKUP_DECL_RE.replace_all(html, "").into_owned();
    for re in DROPPED_RE.iter() {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }

    let mut out = String::with_capacity(cleaned.len());
    let mut last = 0;
    for caps in TAG_RE.captures_iter(&cleaned) {
        let Some(tag) = caps.get(0) else {
            continue;
        };
        push_text(&mut out, &cleaned[last..tag.start()]);
        out.push_str(&rebuild_tag(&caps));
        last = tag.end();
    }
    push_text(&mut out, &cleaned[last..]);
    out
}

/// Text between tags. Angle brackets never survive unescaped outside a
/// rebuilt tag.
fn push_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

/// Plain-text rendition of rich text: sanitized, tags removed, `<br>`
/// turned into newlines, entities decoded.
pub fn strip_tags(html: &str) -> String {
    let sanitized = sanitize_html(html);
    let text = TAG_RE.replace_all(&sanitized, |caps: &Captures<'_>| {
        if caps[2].eq_ignore_ascii_case("br") {
            "\n"
        } else {
            ""
        }
    });
    decode_entities(&text)
}

fn rebuild_tag(caps: &Captures<'_>) -> String {
    let name = caps[2].to_ascii_lowercase();
    if !ALLOWED_TAGS.contains(&name.as_str()) {
        return String::new();
    }
    if caps.get(1).is_some() {
        return format!("</{name}>");
    }

    let raw_attrs = caps.get(3).map_or("", |m| m.as_str());
    let mut out = format!("<{name}");
    for attr in ATTR_RE.captures_iter(raw_attrs) {
        let attr_name = attr[1].to_ascii_lowercase();
        let value = attr
            .get(2)
            .or_else(|| attr.get(3))
            .or_else(|| attr.get(4))
            .map_or("", |m| m.as_str());
        if !attribute_allowed(&name, &attr_name, value) {
            continue;
        }
        out.push_str(&format!(" {attr_name}=\"{}\"", escape_html(&decode_entities(value))));
    }
    if name == "a" {
        out.push_str(" rel=\"noopener noreferrer\"");
    }
    if VOID_TAGS.contains(&name.as_str()) || raw_attrs.trim_end().ends_with('/') {
        out.push_str(" />");
    } else {
        out.push('>');
    }
    out
}

fn attribute_allowed(tag: &str, attr: &str, value: &str) -> bool {
    if attr.starts_with("on") {
        return false;
    }
    match (tag, attr) {
        ("a", "href") => is_safe_url(value),
        ("a", "title") | (_, "class") => true,
        _ => false,
    }
}

/// Reject script-capable URL schemes, including obfuscated spellings like
/// `java\tscript:` or `&#106;avascript:`.
fn is_safe_url(value: &str) -> bool {
    let normalized: String = decode_entities(value)
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    !["javascript:", "vbscript:", "data:"]
        .iter()
        .any(|scheme| normalized.starts_with(scheme))
}

/// Decode the handful of entities that matter for scheme detection and
/// re-escaping. Unknown entities are left as they are.
fn decode_entities(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let Some(end) = tail.find(';').filter(|&e| e <= 10) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let entity = &tail[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        if let Some(ch) = decoded {
            out.push(ch);
            rest = &tail[end + 1..];
        } else {
            out.push('&');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}
