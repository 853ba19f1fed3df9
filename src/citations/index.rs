use std::collections::{BTreeMap, BTreeSet};

use crate::models::{GroundingChunk, GroundingSupport};

/// Immutable lookup tables tying citations (supports), chunks and the compact
/// display numbering together. Built once per result and shared by the
/// renderer and the interaction controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationIndex {
    /// display index -> original chunk index
    display_order: Vec<usize>,
    /// original chunk index -> display index
    display_of: BTreeMap<usize, usize>,
    citation_to_chunks: BTreeMap<usize, Vec<usize>>,
    chunk_to_citations: BTreeMap<usize, Vec<usize>>,
    citation_to_display: BTreeMap<usize, Vec<usize>>,
}

impl CitationIndex {
    pub fn build(chunks: &[GroundingChunk], supports: &[GroundingSupport]) -> Self {
        let mut citation_to_chunks: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut chunk_to_citations: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut cited = BTreeSet::new();

        for (citation_idx, support) in supports.iter().enumerate() {
            if support.segment.text.trim().is_empty() {
                continue;
            }

            let mut referenced = Vec::new();
            for &chunk_idx in &support.chunk_indices {
                if chunk_idx < chunks.len() && !referenced.contains(&chunk_idx) {
                    referenced.push(chunk_idx);
                }
            }
            if referenced.is_empty() {
                continue;
            }

            for &chunk_idx in &referenced {
                cited.insert(chunk_idx);
                chunk_to_citations
                    .entry(chunk_idx)
                    .or_default()
                    .push(citation_idx);
            }
            citation_to_chunks.insert(citation_idx, referenced);
        }

        // Scanning the chunk list front to back == ascending original index.
        let display_order: Vec<usize> = cited.into_iter().collect();
        let display_of: BTreeMap<usize, usize> = display_order
            .iter()
            .enumerate()
            .map(|(display, &original)| (original, display))
            .collect();

        let citation_to_display = citation_to_chunks
            .iter()
            .map(|(&citation_idx, chunk_indices)| {
                let displays = chunk_indices
                    .iter()
                    .filter_map(|chunk_idx| display_of.get(chunk_idx).copied())
                    .collect();
                (citation_idx, displays)
            })
            .collect();

        Self {
            display_order,
            display_of,
            citation_to_chunks,
            chunk_to_citations,
            citation_to_display,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.citation_to_chunks.is_empty()
    }

    pub fn cited_chunk_count(&self) -> usize {
        self.display_order.len()
    }

    pub fn display_index(&self, original_idx: usize) -> Option<usize> {
        self.display_of.get(&original_idx).copied()
    }

    pub fn original_index(&self, display_idx: usize) -> Option<usize> {
        self.display_order.get(display_idx).copied()
    }

    /// `(original, display)` pairs in display order.
    pub fn display_mapping(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.display_order
            .iter()
            .enumerate()
            .map(|(display, &original)| (original, display))
    }

    pub fn has_citation(&self, citation_idx: usize) -> bool {
        self.citation_to_chunks.contains_key(&citation_idx)
    }

    pub fn has_source(&self, original_idx: usize) -> bool {
        self.display_of.contains_key(&original_idx)
    }

    /// Valid citation indices in ascending order.
    pub fn citations(&self) -> impl Iterator<Item = usize> + '_ {
        self.citation_to_chunks.keys().copied()
    }

    pub fn chunks_for_citation(&self, citation_idx: usize) -> &[usize] {
        self.citation_to_chunks
            .get(&citation_idx)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn citations_for_chunk(&self, original_idx: usize) -> &[usize] {
        self.chunk_to_citations
            .get(&original_idx)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn display_indices_for_citation(&self, citation_idx: usize) -> &[usize] {
        self.citation_to_display
            .get(&citation_idx)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
