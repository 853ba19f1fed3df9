use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interaction::{Highlights, InteractionEvent, StickyMode};

/// Answer returned by the file-search oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

impl SearchResult {
    pub fn answer_text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
    #[serde(default)]
    pub grounding_supports: Vec<GroundingSupport>,
}

/// One retrieved snippet or web reference. Chunks are identified by their
/// position in [`GroundingMetadata::grounding_chunks`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroundingChunk {
    Document {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        text: String,
    },
    Web {
        #[serde(default)]
        title: Option<String>,
        uri: String,
    },
}

impl GroundingChunk {
    pub fn title(&self) -> Option<&str> {
        match self {
            GroundingChunk::Document { title, .. } | GroundingChunk::Web { title, .. } => {
                title.as_deref().filter(|t| !t.trim().is_empty())
            }
        }
    }
}

/// A citation event: a segment of the answer backed by one or more chunks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingSupport {
    #[serde(default)]
    pub segment: Segment,
    #[serde(default)]
    pub chunk_indices: Vec<usize>,
}

impl GroundingSupport {
    pub fn new(text: impl Into<String>, chunk_indices: Vec<usize>) -> Self {
        Self {
            segment: Segment { text: text.into() },
            chunk_indices,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub store_names: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub metadata_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub session_id: String,
    #[serde(flatten)]
    pub query: SearchQuery,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceView {
    Web {
        uri: String,
    },
    Excerpt {
        preview: String,
        full_text: String,
        truncated: bool,
    },
}

/// One row of the citation sidebar. Only cited chunks get an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidebarEntry {
    pub display_index: usize,
    pub original_index: usize,
    pub title: String,
    pub source: SourceView,
}

impl SidebarEntry {
    pub fn label(&self) -> usize {
        self.display_index + 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderedResult {
    pub answer_html: String,
    pub sidebar: Vec<SidebarEntry>,
    pub sidebar_html: String,
    /// Citation indices that received a marker, in document order.
    pub placements: Vec<usize>,
    /// Valid citations the locator could not place in the answer.
    pub unplaced_citations: Vec<usize>,
    pub has_citations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionSnapshot {
    pub mode: StickyMode,
    pub highlights: Highlights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub seq: u64,
    pub query: String,
    pub displayed_at: DateTime<Utc>,
    pub rendered: RenderedResult,
    pub interaction: InteractionSnapshot,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRequest {
    pub event: InteractionEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_id: Option<String>,
    pub reset: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
}
