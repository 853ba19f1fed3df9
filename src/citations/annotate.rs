use std::fmt::Write;
use std::ops::Range;
use std::sync::LazyLock;

use pulldown_cmark::{Event, Options, Parser, Tag};
use regex::Regex;

use super::index::CitationIndex;
use super::locate::{extend_to_boundary, locate};
use crate::models::GroundingSupport;

pub const CITED_TEXT_CLASS: &str = "cited-text";
pub const MARKER_CLASS: &str = "citation-marker";
pub const CITATION_ATTR: &str = "data-citation-idx";
pub const DISPLAY_ATTR: &str = "data-display-idx";

static BLOCK_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[ \t]*(?:[-*+]|\d{1,9}[.)]|#{1,6}|>)[ \t]+)+")
        .expect("block prefix pattern is valid")
});
// A newline that ends the current block: blank line, list item, heading,
// quote or code fence.
static BLOCK_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n[ \t]*(?:\n|(?:[-*+]|\d{1,9}[.)]|#{1,6}|>)[ \t]|```|~~~)")
        .expect("block break pattern is valid")
});

/// One located citation, positioned against the unmodified answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub start: usize,
    pub end: usize,
    pub marker_pos: usize,
    pub citation_idx: usize,
    pub display_indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub citation_idx: usize,
    pub start: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotated {
    pub text: String,
    /// Placed citations sorted by their start in the original answer.
    pub placements: Vec<Placement>,
    /// Valid citations that got no marker.
    pub unplaced: Vec<usize>,
}

/// Locates every indexed support in `answer` and computes its modification.
pub fn plan_modifications(
    answer: &str,
    supports: &[GroundingSupport],
    index: &CitationIndex,
) -> Vec<Modification> {
    let layout = MarkdownLayout::scan(answer);
    let mut modifications = Vec::new();

    for citation_idx in index.citations() {
        let Some(support) = supports.get(citation_idx) else {
            continue;
        };
        let display_indices = index.display_indices_for_citation(citation_idx);
        if display_indices.is_empty() {
            continue;
        }

        let Some(found) = locate(answer, &support.segment.text) else {
            tracing::debug!(citation_idx, "cited segment not found in answer text");
            continue;
        };

        let start = skip_block_prefix(answer, found.position, found.end());
        let Some((start, end, marker_pos)) = layout.fit(answer, start, found.end()) else {
            tracing::debug!(citation_idx, "cited segment sits in code or raw html, skipping");
            continue;
        };

        modifications.push(Modification {
            start,
            end,
            marker_pos,
            citation_idx,
            display_indices: display_indices.to_vec(),
        });
    }

    modifications
}

/// Byte ranges of the answer where inserted tags would not stay raw HTML.
#[derive(Debug, Default)]
struct MarkdownLayout {
    inline_code: Vec<Range<usize>>,
    code_blocks: Vec<Range<usize>>,
    raw_html: Vec<Range<usize>>,
}

impl MarkdownLayout {
    fn scan(answer: &str) -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);

        let mut layout = Self::default();
        for (event, range) in Parser::new_ext(answer, options).into_offset_iter() {
            match event {
                Event::Code(_) => layout.inline_code.push(range),
                Event::Start(Tag::CodeBlock(_)) => layout.code_blocks.push(range),
                Event::Html(_) | Event::InlineHtml(_) => layout.raw_html.push(range),
                _ => {}
            }
        }
        layout
    }

    /// Returns `(start, end, marker_pos)` for a span that renders intact, or
    /// `None` when no such span exists. Spans stop at the end of their block
    /// and swallow any inline code they touch whole.
    fn fit(&self, answer: &str, start: usize, end: usize) -> Option<(usize, usize, usize)> {
        let mut start = start;
        let mut end = end;

        if let Some(brk) = BLOCK_BREAK_RE.find(&answer[start..end]) {
            end = start + answer[start..start + brk.start()].trim_end().len();
        }
        if end <= start {
            return None;
        }
        if self.code_blocks.iter().any(|r| overlaps(r, start, end)) {
            return None;
        }

        for code in &self.inline_code {
            if overlaps(code, start, end) {
                start = start.min(code.start);
                end = end.max(code.end);
            }
        }
        while answer[..start].ends_with('`') {
            start -= 1;
        }
        while answer[end..].starts_with('`') {
            end += 1;
        }

        let marker_pos = extend_to_boundary(answer, end);
        let splits_tag = |pos: usize| self.raw_html.iter().any(|r| r.start < pos && pos < r.end);
        if splits_tag(start) || splits_tag(end) || splits_tag(marker_pos) {
            return None;
        }
        if self
            .inline_code
            .iter()
            .any(|r| r.start < marker_pos && end < r.end)
        {
            return None;
        }

        Some((start, end, marker_pos))
    }
}

fn overlaps(range: &Range<usize>, start: usize, end: usize) -> bool {
    range.start < end && start < range.end
}

/// A span opening a line must not swallow its list, heading or quote marker,
/// or the block would stop parsing as one.
fn skip_block_prefix(answer: &str, start: usize, end: usize) -> usize {
    let at_line_start = start == 0 || answer[..start].ends_with('\n');
    if !at_line_start {
        return start;
    }
    match BLOCK_PREFIX_RE.find(&answer[start..end]) {
        Some(prefix) if prefix.end() < end - start => start + prefix.end(),
        _ => start,
    }
}

/// Wraps each located citation and appends its numbered markers. Edits are
/// folded from the highest start downwards so offsets of the spans still
/// waiting to be applied stay valid.
pub fn annotate(answer: &str, supports: &[GroundingSupport], index: &CitationIndex) -> Annotated {
    let mut modifications = plan_modifications(answer, supports, index);
    modifications.sort_by(|a, b| {
        b.start
            .cmp(&a.start)
            .then_with(|| b.citation_idx.cmp(&a.citation_idx))
    });

    let mut text = answer.to_string();
    let mut placements = Vec::new();
    let mut placed = Vec::new();
    // Start of the lowest span applied so far; later spans must end before it.
    let mut bound = answer.len();

    for mut modification in modifications {
        if modification.marker_pos > bound {
            modification.end = modification.end.min(bound);
            modification.marker_pos = bound;
        }
        if modification.end <= modification.start {
            tracing::debug!(
                citation_idx = modification.citation_idx,
                "cited span overlaps a later citation, skipping"
            );
            continue;
        }

        apply(&mut text, &modification);
        bound = modification.start;
        placed.push(modification.citation_idx);
        placements.push(Placement {
            citation_idx: modification.citation_idx,
            start: modification.start,
        });
    }

    placements.reverse();
    let unplaced = index
        .citations()
        .filter(|idx| !placed.contains(idx))
        .collect();

    Annotated {
        text,
        placements,
        unplaced,
    }
}

fn apply(text: &mut String, modification: &Modification) {
    let citation_idx = modification.citation_idx;

    let mut markers = String::new();
    for display_idx in &modification.display_indices {
        let _ = write!(
            markers,
            r#"<sup class="{MARKER_CLASS}" {CITATION_ATTR}="{citation_idx}" {DISPLAY_ATTR}="{display_idx}">{}</sup>"#,
            display_idx + 1
        );
    }

    text.insert_str(modification.marker_pos, &markers);
    text.insert_str(modification.end, "</span>");
    text.insert_str(
        modification.start,
        &format!(r#"<span class="{CITED_TEXT_CLASS}" {CITATION_ATTR}="{citation_idx}">"#),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GroundingChunk;

    fn web(n: usize) -> Vec<GroundingChunk> {
        (0..n)
            .map(|i| GroundingChunk::Web {
                title: Some(format!("site {i}")),
                uri: format!("https://example.com/{i}"),
            })
            .collect()
    }

    fn span_open(c: usize) -> String {
        format!(r#"<span class="cited-text" data-citation-idx="{c}">"#)
    }

    fn marker(c: usize, d: usize) -> String {
        format!(
            r#"<sup class="citation-marker" data-citation-idx="{c}" data-display-idx="{d}">{}</sup>"#,
            d + 1
        )
    }

    #[test]
    fn wraps_span_and_appends_markers() {
        let answer = "Cats sleep a lot.";
        let supports = vec![GroundingSupport::new("Cats sleep", vec![0, 1])];
        let index = CitationIndex::build(&web(2), &supports);

        let annotated = annotate(answer, &supports, &index);
        let expected = format!(
            "{}Cats sleep</span>{}{} a lot.",
            span_open(0),
            marker(0, 0),
            marker(0, 1)
        );
        assert_eq!(annotated.text, expected);
        assert_eq!(
            annotated.placements,
            vec![Placement {
                citation_idx: 0,
                start: 0
            }]
        );
        assert!(annotated.unplaced.is_empty());
    }

    #[test]
    fn marker_moves_past_partial_word_but_span_does_not() {
        let answer = "the foxes run";
        let supports = vec![GroundingSupport::new("the fox", vec![0])];
        let index = CitationIndex::build(&web(1), &supports);

        let annotated = annotate(answer, &supports, &index);
        let expected = format!("{}the fox</span>es{} run", span_open(0), marker(0, 0));
        assert_eq!(annotated.text, expected);
    }

    #[test]
    fn earlier_span_survives_later_insertion() {
        // "alpha" starts at 5, "gamma" at 21.
        let answer = "one. alpha beta end. gamma delta.";
        assert_eq!(answer.find("alpha"), Some(5));
        assert_eq!(answer.find("gamma"), Some(21));

        let supports = vec![
            GroundingSupport::new("alpha beta", vec![0]),
            GroundingSupport::new("gamma delta", vec![1]),
        ];
        let index = CitationIndex::build(&web(2), &supports);
        let annotated = annotate(answer, &supports, &index);

        let expected = format!(
            "one. {}alpha beta</span>{} end. {}gamma delta</span>{}.",
            span_open(0),
            marker(0, 0),
            span_open(1),
            marker(1, 1)
        );
        assert_eq!(annotated.text, expected);
        let order: Vec<_> = annotated.placements.iter().map(|p| p.citation_idx).collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn unmatched_support_is_silently_left_as_prose() {
        let answer = "Plain answer text.";
        let supports = vec![
            GroundingSupport::new("not in the answer", vec![0]),
            GroundingSupport::new("answer", vec![1]),
        ];
        let index = CitationIndex::build(&web(2), &supports);

        let annotated = annotate(answer, &supports, &index);
        assert!(annotated.text.starts_with("Plain "));
        assert!(!annotated.text.contains(r#"data-citation-idx="0""#));
        assert_eq!(annotated.unplaced, vec![0]);
        assert_eq!(annotated.placements.len(), 1);
    }

    #[test]
    fn overlapping_span_is_clamped_before_next_span() {
        let answer = "red green blue";
        let supports = vec![
            GroundingSupport::new("red green", vec![0]),
            GroundingSupport::new("green blue", vec![1]),
        ];
        let index = CitationIndex::build(&web(2), &supports);

        let annotated = annotate(answer, &supports, &index);
        let expected = format!(
            "{}red </span>{}{}green blue</span>{}",
            span_open(0),
            marker(0, 0),
            span_open(1),
            marker(1, 1)
        );
        assert_eq!(annotated.text, expected);
    }

    #[test]
    fn list_markers_stay_outside_the_span() {
        let answer = "Steps:\n\n- mix flour\n- bake it";
        let supports = vec![GroundingSupport::new("- bake it", vec![0])];
        let index = CitationIndex::build(&web(1), &supports);

        let annotated = annotate(answer, &supports, &index);
        let expected = format!(
            "Steps:\n\n- mix flour\n- {}bake it</span>{}",
            span_open(0),
            marker(0, 0)
        );
        assert_eq!(annotated.text, expected);
    }

    #[test]
    fn span_inside_inline_code_covers_the_whole_code_span() {
        let answer = "Run `cargo build` first.";
        let supports = vec![GroundingSupport::new("cargo build", vec![0])];
        let index = CitationIndex::build(&web(1), &supports);

        let annotated = annotate(answer, &supports, &index);
        let expected = format!(
            "Run {}`cargo build`</span>{} first.",
            span_open(0),
            marker(0, 0)
        );
        assert_eq!(annotated.text, expected);
        assert!(annotated.unplaced.is_empty());
    }

    #[test]
    fn span_inside_fenced_block_is_unplaced() {
        let answer = "Build it:\n\n```\ncargo build --release\n```\n";
        let supports = vec![GroundingSupport::new("cargo build", vec![0])];
        let index = CitationIndex::build(&web(1), &supports);

        let annotated = annotate(answer, &supports, &index);
        assert_eq!(annotated.text, answer);
        assert_eq!(annotated.unplaced, vec![0]);
    }

    #[test]
    fn span_stops_at_paragraph_break() {
        let answer = "Alpha one.\n\nBeta two.";
        let supports = vec![GroundingSupport::new("Alpha one.\n\nBeta two.", vec![0])];
        let index = CitationIndex::build(&web(1), &supports);

        let annotated = annotate(answer, &supports, &index);
        let expected = format!("{}Alpha one.</span>{}\n\nBeta two.", span_open(0), marker(0, 0));
        assert_eq!(annotated.text, expected);
    }

    #[test]
    fn span_stops_at_next_list_item() {
        let answer = "- first item\n- second item";
        let supports = vec![GroundingSupport::new("first item\n- second item", vec![0])];
        let index = CitationIndex::build(&web(1), &supports);

        let annotated = annotate(answer, &supports, &index);
        let expected = format!("- {}first item</span>{}\n- second item", span_open(0), marker(0, 0));
        assert_eq!(annotated.text, expected);
    }

    #[test]
    fn span_may_cross_a_soft_line_break() {
        let answer = "one line\nwraps here";
        let supports = vec![GroundingSupport::new("line\nwraps", vec![0])];
        let index = CitationIndex::build(&web(1), &supports);

        let annotated = annotate(answer, &supports, &index);
        let expected = format!("one {}line\nwraps</span>{} here", span_open(0), marker(0, 0));
        assert_eq!(annotated.text, expected);
    }

    #[test]
    fn duplicate_segments_keep_one_span() {
        let answer = "same words here";
        let supports = vec![
            GroundingSupport::new("same words", vec![0]),
            GroundingSupport::new("same words", vec![1]),
        ];
        let index = CitationIndex::build(&web(2), &supports);

        let annotated = annotate(answer, &supports, &index);
        assert_eq!(annotated.placements.len(), 1);
        assert_eq!(annotated.placements[0].citation_idx, 1);
        assert_eq!(annotated.unplaced, vec![0]);
    }
}
