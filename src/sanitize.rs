//! HTML escaping and the allow-list applied to rendered answers.

use std::sync::LazyLock;

use pulldown_cmark::{Event, HeadingLevel, Tag};
use regex::Regex;

static CHAR_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z][A-Za-z0-9]{1,31});")
        .expect("character reference pattern is valid")
});
static ANY_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#[xX]([0-9a-fA-F]{1,6});?|#([0-9]{1,7});?|([A-Za-z][A-Za-z0-9]{1,31});)")
        .expect("reference decoding pattern is valid")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<!--.*?-->|<(/?)([A-Za-z][A-Za-z0-9-]*)((?:\s+[^\s"'>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*)\s*/?>"#,
    )
    .expect("tag pattern is valid")
});
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute pattern is valid")
});

/// What may survive in rendered answer markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizePolicy {
    pub elements: &'static [&'static str],
    pub attributes: &'static [&'static str],
    pub url_schemes: &'static [&'static str],
}

pub const ANSWER_POLICY: SanitizePolicy = SanitizePolicy {
    elements: &[
        "p", "br", "em", "strong", "i", "b", "ul", "ol", "li", "code", "pre", "h1", "h2", "h3",
        "h4", "h5", "h6", "a", "span", "sup",
    ],
    attributes: &["href", "class", "data-citation-idx", "data-display-idx"],
    url_schemes: &["http", "https", "mailto"],
};

impl Default for SanitizePolicy {
    fn default() -> Self {
        ANSWER_POLICY
    }
}

impl SanitizePolicy {
    pub fn allows_element(&self, name: &str) -> bool {
        self.elements.iter().any(|e| e.eq_ignore_ascii_case(name))
    }

    pub fn allows_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    /// Relative URLs pass; absolute ones need an allowed scheme. The check runs
    /// on the URL as a browser would read it: character references decoded,
    /// whitespace and control characters removed.
    pub fn allows_url(&self, url: &str) -> bool {
        let url: String = decode_char_refs(url)
            .chars()
            .filter(|c| !c.is_control() && !c.is_whitespace())
            .collect();
        let head_end = url.find([':', '/', '?', '#']).unwrap_or(url.len());
        let head = &url[..head_end];
        // A reference that did not decode could still hide a scheme separator.
        if head.contains('&') {
            return false;
        }
        if !url[head_end..].starts_with(':') {
            return true;
        }
        self.url_schemes
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(head))
    }
}

/// Decodes numeric character references and the named ones that matter for
/// URLs and attribute values. Unknown named references are left as they are.
pub fn decode_char_refs(input: &str) -> String {
    ANY_REF_RE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let code = if let Some(hex) = caps.get(1) {
                u32::from_str_radix(hex.as_str(), 16).ok()
            } else if let Some(dec) = caps.get(2) {
                dec.as_str().parse::<u32>().ok()
            } else {
                return match caps.get(3).map(|m| m.as_str()) {
                    Some("amp") => "&".to_string(),
                    Some("lt") => "<".to_string(),
                    Some("gt") => ">".to_string(),
                    Some("quot") => "\"".to_string(),
                    Some("apos") => "'".to_string(),
                    Some("colon") => ":".to_string(),
                    Some("sol") => "/".to_string(),
                    Some("quest") => "?".to_string(),
                    Some("num") => "#".to_string(),
                    Some("period") => ".".to_string(),
                    Some("lpar") => "(".to_string(),
                    Some("rpar") => ")".to_string(),
                    Some("Tab") => "\t".to_string(),
                    Some("NewLine") => "\n".to_string(),
                    Some("nbsp") => "\u{a0}".to_string(),
                    _ => caps[0].to_string(),
                };
            };
            code.filter(|&c| c != 0)
                .and_then(char::from_u32)
                .unwrap_or(char::REPLACEMENT_CHARACTER)
                .to_string()
        })
        .into_owned()
}

/// Escapes every markup character, `&` included. Used for attribute values and
/// for vendor text that must display exactly as written.
pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escapes text for HTML. Existing character references are left alone, so
/// escaping an already escaped string changes nothing.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (i, ch) in input.char_indices() {
        match ch {
            '&' if CHAR_REF_RE.is_match(&input[i..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Rewrites a raw HTML fragment: allowed tags are re-emitted with allowed
/// attributes only, other tags and comments vanish, text is escaped.
pub fn sanitize_fragment(html: &str, policy: &SanitizePolicy) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for caps in TAG_RE.captures_iter(html) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&escape_html(&html[last..whole.start()]));
        last = whole.end();

        let Some(name) = caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) else {
            continue;
        };
        if !policy.allows_element(&name) {
            continue;
        }

        if caps.get(1).is_some_and(|m| !m.as_str().is_empty()) {
            if name != "br" {
                out.push_str(&format!("</{name}>"));
            }
            continue;
        }

        out.push('<');
        out.push_str(&name);
        let attrs = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
        for attr in ATTR_RE.captures_iter(attrs) {
            let Some(attr_name) = attr.get(1).map(|m| m.as_str().to_ascii_lowercase()) else {
                continue;
            };
            if !policy.allows_attribute(&attr_name) {
                continue;
            }
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if attr_name == "href" && !policy.allows_url(value) {
                continue;
            }
            // Canonical form: decoded once, then every `&` escaped, so what the
            // browser decodes is exactly what was checked above.
            out.push_str(&format!(
                r#" {attr_name}="{}""#,
                escape_text(&decode_char_refs(value))
            ));
        }
        out.push('>');
    }

    out.push_str(&escape_html(&html[last..]));
    out
}

/// Element a markdown tag renders to, or `None` for structure that emits no
/// element of its own.
fn element_for(tag: &Tag<'_>) -> Option<&'static str> {
    let name = match tag {
        Tag::Paragraph => "p",
        Tag::Heading { level, .. } => match level {
            HeadingLevel::H1 => "h1",
            HeadingLevel::H2 => "h2",
            HeadingLevel::H3 => "h3",
            HeadingLevel::H4 => "h4",
            HeadingLevel::H5 => "h5",
            HeadingLevel::H6 => "h6",
        },
        Tag::CodeBlock(_) => "pre",
        Tag::List(Some(_)) => "ol",
        Tag::List(None) => "ul",
        Tag::Item => "li",
        Tag::Emphasis => "em",
        Tag::Strong => "strong",
        Tag::Link { .. } => "a",
        Tag::HtmlBlock => return None,
        Tag::BlockQuote(_) => "blockquote",
        Tag::Strikethrough => "del",
        Tag::Image { .. } => "img",
        Tag::Table(_) | Tag::TableHead | Tag::TableRow | Tag::TableCell => "table",
        _ => "div",
    };
    Some(name)
}

fn tag_allowed(tag: &Tag<'_>, policy: &SanitizePolicy) -> bool {
    match element_for(tag) {
        None => true,
        Some("pre") => policy.allows_element("pre") && policy.allows_element("code"),
        Some(name) => {
            policy.allows_element(name)
                && match tag {
                    Tag::Link { dest_url, .. } => policy.allows_url(dest_url),
                    _ => true,
                }
        }
    }
}

/// Filters a markdown event stream against `policy`. Disallowed elements
/// lose their tags but keep their text; raw HTML goes through
/// [`sanitize_fragment`].
pub fn sanitize_events<'a>(
    events: impl IntoIterator<Item = Event<'a>>,
    policy: &SanitizePolicy,
) -> Vec<Event<'a>> {
    let mut out = Vec::new();
    let mut open: Vec<bool> = Vec::new();

    for event in events {
        match event {
            Event::Start(tag) => {
                let keep = tag_allowed(&tag, policy);
                open.push(keep);
                if keep {
                    let tag = match tag {
                        Tag::Link {
                            link_type,
                            dest_url,
                            id,
                            ..
                        } => Tag::Link {
                            link_type,
                            dest_url,
                            title: "".into(),
                            id,
                        },
                        other => other,
                    };
                    out.push(Event::Start(tag));
                }
            }
            Event::End(end) => {
                if open.pop().unwrap_or(false) {
                    out.push(Event::End(end));
                }
            }
            Event::Html(raw) | Event::InlineHtml(raw) => {
                let cleaned = sanitize_fragment(&raw, policy);
                if !cleaned.is_empty() {
                    out.push(Event::InlineHtml(cleaned.into()));
                }
            }
            Event::Code(code) if !policy.allows_element("code") => out.push(Event::Text(code)),
            Event::HardBreak if !policy.allows_element("br") => out.push(Event::SoftBreak),
            Event::Rule if !policy.allows_element("hr") => {}
            Event::InlineMath(math) | Event::DisplayMath(math) => out.push(Event::Text(math)),
            Event::TaskListMarker(_) | Event::FootnoteReference(_) => {}
            other => out.push(other),
        }
    }

    out
}
