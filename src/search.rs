use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use crate::file_search::FileSearchClient;
use crate::interaction::InteractionEvent;
use crate::models::{InteractionSnapshot, ResultSnapshot, SearchQuery, SearchResult};
use crate::render::RenderOptions;
use crate::session::{SearchOutcome, SearchSession, SearchTicket};

#[derive(Debug)]
pub enum SearchReply {
    Displayed(ResultSnapshot),
    Superseded,
    Failed(String),
    /// The session id was never issued or has expired.
    UnknownSession,
}

const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_MAX_SESSIONS: usize = 1000;

/// Runs queries against the oracle and keeps one [`SearchSession`] per viewer.
#[derive(Clone)]
pub struct SearchService {
    client: FileSearchClient,
    options: RenderOptions,
    idle_ttl: Duration,
    max_sessions: usize,
    sessions: Arc<Mutex<HashMap<String, SearchSession>>>,
}

impl SearchService {
    pub fn new(client: FileSearchClient, options: RenderOptions) -> Self {
        Self {
            client,
            options,
            idle_ttl: DEFAULT_IDLE_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sessions idle longer than `idle_ttl` are dropped, and at most
    /// `max_sessions` are kept.
    pub fn with_limits(mut self, idle_ttl: Duration, max_sessions: usize) -> Self {
        self.idle_ttl = idle_ttl;
        self.max_sessions = max_sessions.max(1);
        self
    }

    fn sessions(&self) -> Result<MutexGuard<'_, HashMap<String, SearchSession>>> {
        self.sessions
            .lock()
            .map_err(|_| anyhow::anyhow!("session lock poisoned"))
    }

    pub fn create_session(&self) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        let mut sessions = self.sessions()?;
        self.evict(&mut sessions);
        sessions.insert(session_id.clone(), SearchSession::default());
        Ok(session_id)
    }

    // Makes room for one more session.
    fn evict(&self, sessions: &mut HashMap<String, SearchSession>) {
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|_, session| {
            (now - session.last_active())
                .to_std()
                .map(|idle| idle < self.idle_ttl)
                .unwrap_or(true)
        });

        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, session)| session.last_active())
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = sessions.len(), "evicted search sessions");
        }
    }

    pub fn session_count(&self) -> Result<usize> {
        Ok(self.sessions()?.len())
    }

    pub fn has_session(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions()?.contains_key(session_id))
    }

    /// Drops whatever the session was showing. Returns `false` for an unknown
    /// session.
    pub fn reset_session(&self, session_id: &str) -> Result<bool> {
        Ok(match self.sessions()?.get_mut(session_id) {
            Some(session) => {
                *session = SearchSession::default();
                true
            }
            None => false,
        })
    }

    pub async fn search(&self, session_id: &str, query: &SearchQuery) -> Result<SearchReply> {
        let Some(ticket) = self.begin(session_id)? else {
            return Ok(SearchReply::UnknownSession);
        };
        tracing::info!(
            session_id,
            seq = ticket.seq(),
            stores = query.store_names.len(),
            "running file search"
        );

        let outcome = self.client.search(query).await;
        if let Err(err) = &outcome {
            tracing::warn!(session_id, "file search failed: {err:#}");
        }

        self.complete(session_id, ticket, &query.query, outcome)
    }

    pub fn begin(&self, session_id: &str) -> Result<Option<SearchTicket>> {
        Ok(self
            .sessions()?
            .get_mut(session_id)
            .map(SearchSession::begin))
    }

    pub fn complete(
        &self,
        session_id: &str,
        ticket: SearchTicket,
        query: &str,
        outcome: Result<SearchResult>,
    ) -> Result<SearchReply> {
        let mut sessions = self.sessions()?;
        // Expired while the search was in flight.
        let Some(session) = sessions.get_mut(session_id) else {
            return Ok(SearchReply::UnknownSession);
        };

        let reply = match session.complete(ticket, query, outcome, &self.options) {
            SearchOutcome::Displayed => match session.snapshot() {
                Some(snapshot) => SearchReply::Displayed(snapshot),
                None => SearchReply::Failed("result vanished after display".to_string()),
            },
            SearchOutcome::Stale => SearchReply::Superseded,
            SearchOutcome::Failed(message) => SearchReply::Failed(message),
        };
        Ok(reply)
    }

    pub fn snapshot(&self, session_id: &str) -> Result<Option<ResultSnapshot>> {
        Ok(self
            .sessions()?
            .get(session_id)
            .and_then(SearchSession::snapshot))
    }

    pub fn interact(
        &self,
        session_id: &str,
        event: InteractionEvent,
    ) -> Result<Option<InteractionSnapshot>> {
        Ok(self
            .sessions()?
            .get_mut(session_id)
            .and_then(|session| session.interact(event)))
    }
}
