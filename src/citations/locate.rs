use std::sync::LazyLock;

use regex::Regex;

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").expect("link pattern is valid"));
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+").expect("heading pattern is valid"));

/// Where a cited excerpt sits inside the answer, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    pub position: usize,
    pub length: usize,
}

impl Located {
    pub fn end(&self) -> usize {
        self.position + self.length
    }
}

/// Finds `excerpt` inside `full_text`, falling back to a markdown-stripped and
/// then a case-insensitive match. The answer itself is never stripped.
pub fn locate(full_text: &str, excerpt: &str) -> Option<Located> {
    if excerpt.is_empty() {
        return None;
    }

    if let Some(position) = full_text.find(excerpt) {
        return Some(Located {
            position,
            length: excerpt.len(),
        });
    }

    let cleaned = strip_markdown(excerpt);
    if cleaned.is_empty() {
        return None;
    }

    if let Some(position) = full_text.find(cleaned.as_str()) {
        return Some(Located {
            position,
            length: cleaned.len(),
        });
    }

    find_case_insensitive(full_text, &cleaned)
}

/// Removes the markdown decoration a model tends to leave in cited segments:
/// link syntax collapses to its text, `**`/`__`/`*`/backticks vanish and
/// heading prefixes are dropped line by line.
pub fn strip_markdown(excerpt: &str) -> String {
    let text = LINK_RE.replace_all(excerpt, "$1");
    let text = HEADING_RE.replace_all(&text, "");
    text.replace("**", "")
        .replace("__", "")
        .replace(['*', '`'], "")
        .trim()
        .to_string()
}

/// Case-insensitive search comparing simple lowercase char by char. The
/// returned length covers the matched bytes of `haystack`.
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<Located> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }

    for (start, _) in haystack.char_indices() {
        if let Some(length) = match_lowercase_at(&haystack[start..], &needle) {
            return Some(Located {
                position: start,
                length,
            });
        }
    }
    None
}

fn match_lowercase_at(rest: &str, needle: &[char]) -> Option<usize> {
    let mut matched = 0usize;
    let mut consumed = 0usize;

    for (offset, ch) in rest.char_indices() {
        for lower in ch.to_lowercase() {
            if matched >= needle.len() || needle[matched] != lower {
                return None;
            }
            matched += 1;
        }
        consumed = offset + ch.len_utf8();
        if matched == needle.len() {
            return Some(consumed);
        }
    }

    (matched == needle.len() && consumed > 0).then_some(consumed)
}

/// Moves `pos` forward to the end of the word it points into, so markers are
/// never inserted mid-token. Whitespace and closing punctuation stop it at once.
pub fn extend_to_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() || !text.is_char_boundary(pos) {
        return pos;
    }

    let mut end = pos;
    for ch in text[pos..].chars() {
        if end == pos && (ch.is_whitespace() || ".,;:!?)]".contains(ch)) {
            return pos;
        }
        if !(ch.is_alphanumeric() || ch == '_') {
            break;
        }
        end += ch.len_utf8();
    }
    end
}
