//! Hover and sticky-click highlighting across markers, cited text and the
//! citation sidebar.
//!
//! Hovering previews a citation while nothing is pinned. Clicking a marker or
//! a sidebar source pins it; clicking the same element again, or anywhere
//! outside the citation UI, unpins it. While something is pinned hover events
//! are ignored.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::citations::CitationIndex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "index", rename_all = "snake_case")]
pub enum StickyMode {
    #[default]
    Idle,
    /// Pinned by clicking the marker of this citation.
    Marker(usize),
    /// Pinned by clicking the sidebar source with this original chunk index.
    Source(usize),
}

/// Element an event landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum Target {
    Marker(usize),
    CitedText(usize),
    Source(usize),
    /// The link embedded in a sidebar source.
    SourceLink(usize),
    /// The expand/collapse summary of a sidebar excerpt.
    SourceSummary(usize),
    Elsewhere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionEvent {
    HoverEnter { target: Target },
    HoverLeave,
    Click { target: Target },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum ScrollTarget {
    Source(usize),
    CitedText(usize),
}

/// Visual state the view should reflect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlights {
    /// Citations whose markers and cited text are highlighted.
    pub citations: BTreeSet<usize>,
    /// Highlighted sidebar sources by original chunk index.
    pub sources: BTreeSet<usize>,
    /// Sidebar sources whose excerpt is expanded.
    pub expanded: BTreeSet<usize>,
    pub scroll_to: Option<ScrollTarget>,
}

impl Highlights {
    pub fn clear(&mut self) {
        self.citations.clear();
        self.sources.clear();
        self.scroll_to = None;
    }

    pub fn collapse(&mut self) {
        self.expanded.clear();
    }

    pub fn is_clear(&self) -> bool {
        self.citations.is_empty() && self.sources.is_empty() && self.scroll_to.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct InteractionController {
    index: Arc<CitationIndex>,
    /// Placed citations in document order.
    placements: Vec<usize>,
    mode: StickyMode,
    highlights: Highlights,
}

impl InteractionController {
    pub fn new(index: Arc<CitationIndex>, placements: Vec<usize>) -> Self {
        Self {
            index,
            placements,
            mode: StickyMode::Idle,
            highlights: Highlights::default(),
        }
    }

    pub fn mode(&self) -> StickyMode {
        self.mode
    }

    pub fn highlights(&self) -> &Highlights {
        &self.highlights
    }

    pub fn reset(&mut self) {
        self.mode = StickyMode::Idle;
        self.highlights = Highlights::default();
    }

    pub fn dispatch(&mut self, event: InteractionEvent) {
        match event {
            InteractionEvent::HoverEnter { target } => self.hover_enter(target),
            InteractionEvent::HoverLeave => self.hover_leave(),
            InteractionEvent::Click { target } => match target {
                Target::Marker(citation_idx) => self.click_marker(citation_idx),
                Target::Source(original_idx) => self.click_source(original_idx),
                // Links and summaries keep their default behaviour; cited text
                // only reacts to hover. None of them count as outside clicks.
                Target::SourceLink(_) | Target::SourceSummary(_) | Target::CitedText(_) => {}
                Target::Elsewhere => self.click_outside(),
            },
        }
    }

    pub fn hover_enter(&mut self, target: Target) {
        if self.mode != StickyMode::Idle {
            return;
        }

        match target {
            Target::Marker(citation_idx) if self.index.has_citation(citation_idx) => {
                self.highlights.clear();
                self.highlight_citation(citation_idx, true);
            }
            Target::CitedText(citation_idx) if self.index.has_citation(citation_idx) => {
                self.highlights.clear();
                self.highlight_citation(citation_idx, false);
            }
            Target::Source(original_idx)
            | Target::SourceLink(original_idx)
            | Target::SourceSummary(original_idx)
                if self.index.has_source(original_idx) =>
            {
                self.highlights.clear();
                self.highlight_source(original_idx);
            }
            _ => {}
        }
    }

    pub fn hover_leave(&mut self) {
        if self.mode == StickyMode::Idle {
            self.highlights.clear();
        }
    }

    pub fn click_marker(&mut self, citation_idx: usize) {
        if !self.index.has_citation(citation_idx) {
            return;
        }
        if self.mode == StickyMode::Marker(citation_idx) {
            self.unpin();
            return;
        }

        self.highlights.collapse();
        self.highlights.clear();
        self.mode = StickyMode::Marker(citation_idx);
        self.highlight_citation(citation_idx, true);

        let index = Arc::clone(&self.index);
        let sources = index.chunks_for_citation(citation_idx);
        self.highlights.expanded.extend(sources.iter().copied());
        self.highlights.scroll_to = sources.first().copied().map(ScrollTarget::Source);
    }

    pub fn click_source(&mut self, original_idx: usize) {
        if !self.index.has_source(original_idx) {
            return;
        }
        if self.mode == StickyMode::Source(original_idx) {
            self.unpin();
            return;
        }

        self.highlights.collapse();
        self.highlights.clear();
        self.mode = StickyMode::Source(original_idx);
        self.highlight_source(original_idx);
        self.highlights.expanded.insert(original_idx);

        let citing = self.index.citations_for_chunk(original_idx);
        self.highlights.scroll_to = self
            .placements
            .iter()
            .find(|idx| citing.contains(idx))
            .copied()
            .map(ScrollTarget::CitedText);
    }

    pub fn click_outside(&mut self) {
        if self.mode != StickyMode::Idle {
            self.unpin();
        }
    }

    fn unpin(&mut self) {
        self.mode = StickyMode::Idle;
        self.highlights.clear();
        self.highlights.collapse();
    }

    fn highlight_citation(&mut self, citation_idx: usize, with_sources: bool) {
        self.highlights.citations.insert(citation_idx);
        if with_sources {
            let index = Arc::clone(&self.index);
            self.highlights
                .sources
                .extend(index.chunks_for_citation(citation_idx).iter().copied());
        }
    }

    fn highlight_source(&mut self, original_idx: usize) {
        self.highlights.sources.insert(original_idx);
        let index = Arc::clone(&self.index);
        self.highlights
            .citations
            .extend(index.citations_for_chunk(original_idx).iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GroundingChunk, GroundingSupport};

    /// Five chunks; citation i cites chunk i, except citation 4 which cites
    /// chunks 1 and 2.
    fn controller() -> InteractionController {
        let chunks: Vec<_> = (0..5)
            .map(|i| GroundingChunk::Document {
                title: Some(format!("doc {i}")),
                text: "text".to_string(),
            })
            .collect();
        let supports = vec![
            GroundingSupport::new("zero", vec![0]),
            GroundingSupport::new("one", vec![1]),
            GroundingSupport::new("two", vec![2]),
            GroundingSupport::new("three", vec![3]),
            GroundingSupport::new("four", vec![1, 2]),
        ];
        let index = Arc::new(CitationIndex::build(&chunks, &supports));
        InteractionController::new(index, vec![3, 4, 0, 1, 2])
    }

    fn click(target: Target) -> InteractionEvent {
        InteractionEvent::Click { target }
    }

    fn hover(target: Target) -> InteractionEvent {
        InteractionEvent::HoverEnter { target }
    }

    #[test]
    fn marker_click_toggles_and_switches_directly() {
        let mut ui = controller();
        ui.dispatch(click(Target::Marker(2)));
        assert_eq!(ui.mode(), StickyMode::Marker(2));

        ui.dispatch(click(Target::Marker(2)));
        assert_eq!(ui.mode(), StickyMode::Idle);
        assert!(ui.highlights().is_clear());
        assert!(ui.highlights().expanded.is_empty());

        ui.dispatch(click(Target::Marker(2)));
        ui.dispatch(click(Target::Marker(3)));
        assert_eq!(ui.mode(), StickyMode::Marker(3));
        assert_eq!(ui.highlights().citations, BTreeSet::from([3]));
        assert_eq!(ui.highlights().expanded, BTreeSet::from([3]));
    }

    #[test]
    fn hover_is_ignored_while_pinned() {
        let mut ui = controller();
        ui.dispatch(click(Target::Marker(2)));
        let pinned = ui.highlights().clone();

        ui.dispatch(hover(Target::Source(0)));
        assert_eq!(ui.highlights(), &pinned);
        ui.dispatch(InteractionEvent::HoverLeave);
        assert_eq!(ui.highlights(), &pinned);
        assert_eq!(ui.mode(), StickyMode::Marker(2));
    }

    #[test]
    fn hover_previews_and_leave_clears() {
        let mut ui = controller();
        ui.dispatch(hover(Target::Marker(4)));
        assert_eq!(ui.highlights().citations, BTreeSet::from([4]));
        assert_eq!(ui.highlights().sources, BTreeSet::from([1, 2]));
        assert!(ui.highlights().expanded.is_empty());
        assert_eq!(ui.highlights().scroll_to, None);

        ui.dispatch(hover(Target::CitedText(0)));
        assert_eq!(ui.highlights().citations, BTreeSet::from([0]));
        assert!(ui.highlights().sources.is_empty());

        ui.dispatch(hover(Target::Source(2)));
        assert_eq!(ui.highlights().sources, BTreeSet::from([2]));
        assert_eq!(ui.highlights().citations, BTreeSet::from([2, 4]));

        ui.dispatch(InteractionEvent::HoverLeave);
        assert!(ui.highlights().is_clear());
        ui.dispatch(InteractionEvent::HoverLeave);
        assert!(ui.highlights().is_clear());
    }

    #[test]
    fn marker_click_expands_every_cited_source_and_scrolls_to_first() {
        let mut ui = controller();
        ui.click_marker(4);
        assert_eq!(ui.highlights().expanded, BTreeSet::from([1, 2]));
        assert_eq!(ui.highlights().sources, BTreeSet::from([1, 2]));
        assert_eq!(ui.highlights().scroll_to, Some(ScrollTarget::Source(1)));
    }

    #[test]
    fn source_click_highlights_citing_spans_and_scrolls_in_document_order() {
        let mut ui = controller();
        ui.dispatch(click(Target::Source(2)));
        assert_eq!(ui.mode(), StickyMode::Source(2));
        assert_eq!(ui.highlights().citations, BTreeSet::from([2, 4]));
        assert_eq!(ui.highlights().expanded, BTreeSet::from([2]));
        // Citation 4 appears before citation 2 in the answer.
        assert_eq!(ui.highlights().scroll_to, Some(ScrollTarget::CitedText(4)));

        ui.dispatch(click(Target::Source(2)));
        assert_eq!(ui.mode(), StickyMode::Idle);
        assert!(ui.highlights().expanded.is_empty());
    }

    #[test]
    fn link_and_summary_clicks_keep_pin() {
        let mut ui = controller();
        ui.dispatch(click(Target::Source(1)));
        ui.dispatch(click(Target::SourceLink(1)));
        ui.dispatch(click(Target::SourceSummary(1)));
        ui.dispatch(click(Target::CitedText(1)));
        assert_eq!(ui.mode(), StickyMode::Source(1));
    }

    #[test]
    fn outside_click_unpins_and_collapses() {
        let mut ui = controller();
        ui.dispatch(click(Target::Marker(1)));
        ui.dispatch(click(Target::Elsewhere));
        assert_eq!(ui.mode(), StickyMode::Idle);
        assert!(ui.highlights().is_clear());
        assert!(ui.highlights().expanded.is_empty());

        ui.dispatch(click(Target::Elsewhere));
        assert_eq!(ui.mode(), StickyMode::Idle);
    }

    #[test]
    fn switching_from_source_to_marker_collapses_previous() {
        let mut ui = controller();
        ui.dispatch(click(Target::Source(0)));
        ui.dispatch(click(Target::Marker(3)));
        assert_eq!(ui.mode(), StickyMode::Marker(3));
        assert_eq!(ui.highlights().expanded, BTreeSet::from([3]));
    }

    #[test]
    fn unknown_targets_are_ignored() {
        let mut ui = controller();
        ui.dispatch(click(Target::Marker(42)));
        ui.dispatch(click(Target::Source(42)));
        ui.dispatch(hover(Target::Marker(42)));
        assert_eq!(ui.mode(), StickyMode::Idle);
        assert!(ui.highlights().is_clear());
    }

    #[test]
    fn events_round_trip_through_json() {
        let event: InteractionEvent =
            serde_json::from_str(r#"{"type":"click","target":{"kind":"marker","index":2}}"#)
                .expect("valid event");
        assert_eq!(event, click(Target::Marker(2)));
        let event: InteractionEvent =
            serde_json::from_str(r#"{"type":"click","target":{"kind":"elsewhere"}}"#)
                .expect("valid event");
        assert_eq!(event, click(Target::Elsewhere));
    }
}
