use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::OracleConfig;
use crate::models::{
    GroundingChunk, GroundingMetadata, GroundingSupport, SearchQuery, SearchResult, Segment,
};

/// Client for the managed file-search service's `generateContent` call.
#[derive(Clone)]
pub struct FileSearchClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
}

impl FileSearchClient {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build file search http client")?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            default_model: config.model.clone(),
        })
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult> {
        if query.query.trim().is_empty() {
            anyhow::bail!("cannot search with an empty query");
        }
        if query.store_names.is_empty() {
            anyhow::bail!("at least one file search store is required");
        }

        let model = query
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.default_model.as_str());
        let model = model.strip_prefix("models/").unwrap_or(model);

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        let mut request = self.client.post(url).json(&GenerateReq::for_query(query));
        if let Some(key) = &self.api_key {
            request = request.header("x-goog-api-key", key);
        }

        let response = request
            .send()
            .await
            .context("failed to call file search generateContent endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "file search generateContent returned {status}: {}",
                normalize_err_body(&body)
            );
        }

        let response = response
            .json::<GenerateResp>()
            .await
            .context("failed to decode file search generateContent response")?;

        Ok(response.into_search_result())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateReq<'a> {
    contents: Vec<Content<'a>>,
    tools: Vec<Tool<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool<'a> {
    file_search: FileSearchTool<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileSearchTool<'a> {
    file_search_store_names: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata_filter: Option<&'a str>,
}

impl<'a> GenerateReq<'a> {
    fn for_query(query: &'a SearchQuery) -> Self {
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![TextPart {
                    text: query.query.trim(),
                }],
            }],
            tools: vec![Tool {
                file_search: FileSearchTool {
                    file_search_store_names: &query.store_names,
                    metadata_filter: query
                        .metadata_filter
                        .as_deref()
                        .map(str::trim)
                        .filter(|f| !f.is_empty()),
                },
            }],
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResp {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    grounding_metadata: Option<WireGrounding>,
}

#[derive(Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Deserialize, Default)]
struct WirePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WireGrounding {
    #[serde(default)]
    grounding_chunks: Vec<WireChunk>,
    #[serde(default)]
    grounding_supports: Vec<WireSupport>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WireChunk {
    #[serde(default)]
    retrieved_context: Option<RetrievedContext>,
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Deserialize, Default)]
struct RetrievedContext {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct WebSource {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WireSupport {
    #[serde(default)]
    segment: Option<WireSegment>,
    #[serde(default)]
    grounding_chunk_indices: Vec<i64>,
}

#[derive(Deserialize, Default)]
struct WireSegment {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResp {
    fn into_search_result(self) -> SearchResult {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return SearchResult::default();
        };

        let text = candidate.content.map(|content| {
            content
                .parts
                .into_iter()
                .filter(|part| !part.thought)
                .filter_map(|part| part.text)
                .collect::<String>()
        });

        let grounding_metadata = candidate.grounding_metadata.map(|meta| GroundingMetadata {
            grounding_chunks: meta.grounding_chunks.into_iter().map(convert_chunk).collect(),
            grounding_supports: meta
                .grounding_supports
                .into_iter()
                .map(|support| GroundingSupport {
                    segment: Segment {
                        text: support.segment.and_then(|s| s.text).unwrap_or_default(),
                    },
                    chunk_indices: support
                        .grounding_chunk_indices
                        .into_iter()
                        .filter_map(|idx| usize::try_from(idx).ok())
                        .collect(),
                })
                .collect(),
        });

        SearchResult {
            text,
            grounding_metadata,
        }
    }
}

// Positions must be preserved, so every wire chunk maps to some chunk.
fn convert_chunk(chunk: WireChunk) -> GroundingChunk {
    match (chunk.web, chunk.retrieved_context) {
        (Some(WebSource { title, uri: Some(uri) }), _) => GroundingChunk::Web { title, uri },
        (_, Some(context)) => GroundingChunk::Document {
            title: context.title,
            text: context.text.unwrap_or_default(),
        },
        (Some(WebSource { title, uri: None }), None) => GroundingChunk::Document {
            title,
            text: String::new(),
        },
        (None, None) => GroundingChunk::Document {
            title: None,
            text: String::new(),
        },
    }
}

fn normalize_err_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(message) = json
            .get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .and_then(|v| v.as_str())
        {
            return message.to_string();
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_stores_and_filter() {
        let query = SearchQuery {
            query: "  what is the refund policy? ".to_string(),
            store_names: vec!["fileSearchStores/policies-123".to_string()],
            model: None,
            metadata_filter: Some("year = 2024".to_string()),
        };

        let body = serde_json::to_value(GenerateReq::for_query(&query)).expect("serializable");
        assert_eq!(
            body,
            serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "what is the refund policy?"}]}],
                "tools": [{"fileSearch": {
                    "fileSearchStoreNames": ["fileSearchStores/policies-123"],
                    "metadataFilter": "year = 2024"
                }}]
            })
        );
    }

    #[test]
    fn blank_filter_is_omitted() {
        let query = SearchQuery {
            query: "q".to_string(),
            store_names: vec!["s".to_string()],
            model: None,
            metadata_filter: Some("   ".to_string()),
        };
        let body = serde_json::to_value(GenerateReq::for_query(&query)).expect("serializable");
        assert!(body["tools"][0]["fileSearch"].get("metadataFilter").is_none());
    }

    #[test]
    fn response_maps_to_search_result() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "Refunds take **14 days**."},
                    {"text": " Contact support."}
                ]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"retrievedContext": {"title": "policy.pdf", "text": "Refunds are issued within 14 days."}},
                        {"web": {"title": "Help", "uri": "https://help.example.com"}},
                        {}
                    ],
                    "groundingSupports": [
                        {"segment": {"startIndex": 0, "endIndex": 24, "text": "Refunds take **14 days**."},
                         "groundingChunkIndices": [0, -1]},
                        {"groundingChunkIndices": [1]}
                    ]
                }
            }]
        });

        let response: GenerateResp = serde_json::from_value(raw).expect("decodes");
        let result = response.into_search_result();

        assert_eq!(
            result.text.as_deref(),
            Some("Refunds take **14 days**. Contact support.")
        );
        let meta = result.grounding_metadata.expect("metadata");
        assert_eq!(meta.grounding_chunks.len(), 3);
        assert_eq!(
            meta.grounding_chunks[1],
            GroundingChunk::Web {
                title: Some("Help".to_string()),
                uri: "https://help.example.com".to_string()
            }
        );
        assert_eq!(meta.grounding_supports[0].chunk_indices, vec![0]);
        assert_eq!(meta.grounding_supports[1].segment.text, "");
    }

    #[test]
    fn empty_response_has_no_text() {
        let result = GenerateResp::default().into_search_result();
        assert_eq!(result, SearchResult::default());
    }

    #[test]
    fn error_body_prefers_vendor_message() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(normalize_err_body(body), "API key not valid");
        assert_eq!(normalize_err_body(r#"{"error": "plain"}"#), "plain");
        assert_eq!(normalize_err_body("  "), "<empty body>");
        assert_eq!(normalize_err_body("gateway timeout"), "gateway timeout");
    }
}
