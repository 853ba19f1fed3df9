use std::fmt::Write;
use std::sync::Arc;

use pulldown_cmark::{html, Options, Parser};

use crate::citations::{annotate, CitationIndex};
use crate::models::{GroundingChunk, RenderedResult, SearchResult, SidebarEntry, SourceView};
use crate::sanitize::{escape_text, sanitize_events, SanitizePolicy};

pub const EMPTY_ANSWER_HTML: &str = r#"<p class="answer-empty">No answer was returned for this query.</p>"#;
pub const NO_CITATIONS_HTML: &str = r#"<p class="citations-empty">No citations for this answer.</p>"#;
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub preview_chars: usize,
    pub policy: SanitizePolicy,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            preview_chars: DEFAULT_PREVIEW_CHARS,
            policy: SanitizePolicy::default(),
        }
    }
}

/// A rendered result together with the index the interaction layer needs.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub result: RenderedResult,
    pub index: Arc<CitationIndex>,
}

pub fn render(result: &SearchResult, options: &RenderOptions) -> Rendered {
    let (chunks, supports) = match &result.grounding_metadata {
        Some(meta) => (
            meta.grounding_chunks.as_slice(),
            meta.grounding_supports.as_slice(),
        ),
        None => (&[][..], &[][..]),
    };
    let index = CitationIndex::build(chunks, supports);

    let answer = result.answer_text();
    let (answer_html, placements, unplaced_citations) = if answer.trim().is_empty() {
        (EMPTY_ANSWER_HTML.to_string(), Vec::new(), index.citations().collect())
    } else {
        let annotated = annotate(answer, supports, &index);
        let placements: Vec<usize> = annotated.placements.iter().map(|p| p.citation_idx).collect();
        (
            markdown_to_html(&annotated.text, &options.policy),
            placements,
            annotated.unplaced,
        )
    };

    if !unplaced_citations.is_empty() {
        tracing::debug!(
            unplaced = unplaced_citations.len(),
            "some citations could not be placed in the answer"
        );
    }

    let sidebar = build_sidebar(chunks, &index, options);
    let sidebar_html = if sidebar.is_empty() {
        NO_CITATIONS_HTML.to_string()
    } else {
        sidebar_markup(&sidebar)
    };

    Rendered {
        result: RenderedResult {
            answer_html,
            has_citations: !sidebar.is_empty(),
            sidebar,
            sidebar_html,
            placements,
            unplaced_citations,
        },
        index: Arc::new(index),
    }
}

pub fn markdown_to_html(markdown: &str, policy: &SanitizePolicy) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let events = sanitize_events(Parser::new_ext(markdown, options), policy);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    out
}

/// One entry per cited chunk, in display order.
pub fn build_sidebar(
    chunks: &[GroundingChunk],
    index: &CitationIndex,
    options: &RenderOptions,
) -> Vec<SidebarEntry> {
    index
        .display_mapping()
        .filter_map(|(original_index, display_index)| {
            let chunk = chunks.get(original_index)?;
            let source = match chunk {
                GroundingChunk::Web { uri, .. } if options.policy.allows_url(uri) => {
                    SourceView::Web { uri: uri.clone() }
                }
                GroundingChunk::Web { uri, .. } => excerpt_view(uri, options.preview_chars),
                GroundingChunk::Document { text, .. } => excerpt_view(text, options.preview_chars),
            };
            let title = chunk.title().map(str::to_string).unwrap_or_else(|| match chunk {
                GroundingChunk::Web { .. } => "Web source".to_string(),
                GroundingChunk::Document { .. } => "Untitled document".to_string(),
            });

            Some(SidebarEntry {
                display_index,
                original_index,
                title,
                source,
            })
        })
        .collect()
}

fn excerpt_view(text: &str, preview_chars: usize) -> SourceView {
    let full_text = text.trim().to_string();
    let truncated = full_text.chars().count() > preview_chars;
    let preview = if truncated {
        let cut: String = full_text.chars().take(preview_chars).collect();
        format!("{}...", cut.trim_end())
    } else {
        full_text.clone()
    };

    SourceView::Excerpt {
        preview,
        full_text,
        truncated,
    }
}

/// Sidebar list markup. Items are addressed by `data-source-idx`; every
/// vendor-supplied string is escaped.
pub fn sidebar_markup(entries: &[SidebarEntry]) -> String {
    let mut out = String::from(r#"<ol class="citation-list">"#);

    for entry in entries {
        let _ = write!(
            out,
            r#"<li class="citation-item" data-source-idx="{}" data-display-idx="{}"><span class="citation-number">{}</span> <span class="citation-title">{}</span>"#,
            entry.original_index,
            entry.display_index,
            entry.label(),
            escape_text(&entry.title)
        );

        match &entry.source {
            SourceView::Web { uri } => {
                let uri = escape_text(uri);
                let _ = write!(
                    out,
                    r#"<a class="citation-link" href="{uri}" target="_blank" rel="noopener noreferrer">{uri}</a>"#
                );
            }
            SourceView::Excerpt {
                preview,
                full_text,
                truncated: true,
            } => {
                let _ = write!(
                    out,
                    r#"<details class="citation-excerpt"><summary>{}</summary><p>{}</p></details>"#,
                    escape_text(preview),
                    escape_text(full_text)
                );
            }
            SourceView::Excerpt { preview, .. } => {
                let _ = write!(out, r#"<p class="citation-excerpt">{}</p>"#, escape_text(preview));
            }
        }
        out.push_str("</li>");
    }

    out.push_str("</ol>");
    out
}
