use std::env;
use std::path::PathBuf;

use crate::render::{RenderOptions, DEFAULT_PREVIEW_CHARS};

#[derive(Clone, Debug)]
pub struct OracleConfig {
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub static_dir: PathBuf,
    pub oracle: OracleConfig,
    pub preview_chars: usize,
    pub session_idle_secs: u64,
    pub max_sessions: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("FILE_SEARCH_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            static_dir: env::var("FILE_SEARCH_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("static")),
            oracle: OracleConfig {
                api_base_url: env::var("FILE_SEARCH_API_BASE")
                    .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
                api_key: env::var("FILE_SEARCH_API_KEY")
                    .or_else(|_| env::var("GEMINI_API_KEY"))
                    .ok()
                    .filter(|key| !key.trim().is_empty()),
                model: env::var("FILE_SEARCH_MODEL")
                    .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
                timeout_secs: env::var("FILE_SEARCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            },
            preview_chars: env::var("EXCERPT_PREVIEW_CHARS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(DEFAULT_PREVIEW_CHARS),
            session_idle_secs: env::var("SESSION_IDLE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            max_sessions: env::var("MAX_SESSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(1000),
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            preview_chars: self.preview_chars,
            ..RenderOptions::default()
        }
    }
}
