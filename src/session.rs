use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::interaction::{InteractionController, InteractionEvent};
use crate::models::{InteractionSnapshot, RenderedResult, ResultSnapshot, SearchResult};
use crate::render::{render, RenderOptions};

/// Identifies one search started in a session. Only the newest ticket may
/// change what is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SearchTicket(u64);

impl SearchTicket {
    pub fn seq(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Displayed,
    /// A newer search started before this one resolved.
    Stale,
    /// The oracle failed; the previous result stays on display.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ResultView {
    pub seq: u64,
    pub query: String,
    pub displayed_at: DateTime<Utc>,
    pub rendered: RenderedResult,
    pub controller: InteractionController,
}

impl ResultView {
    pub fn interaction(&self) -> InteractionSnapshot {
        InteractionSnapshot {
            mode: self.controller.mode(),
            highlights: self.controller.highlights().clone(),
        }
    }
}

/// What one viewer currently sees.
#[derive(Debug, Clone)]
pub struct SearchSession {
    latest: u64,
    current: Option<ResultView>,
    last_error: Option<String>,
    last_active: DateTime<Utc>,
}

impl Default for SearchSession {
    fn default() -> Self {
        Self {
            latest: 0,
            current: None,
            last_error: None,
            last_active: Utc::now(),
        }
    }
}

impl SearchSession {
    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub fn begin(&mut self) -> SearchTicket {
        self.last_active = Utc::now();
        self.latest += 1;
        SearchTicket(self.latest)
    }

    pub fn complete(
        &mut self,
        ticket: SearchTicket,
        query: &str,
        outcome: Result<SearchResult>,
        options: &RenderOptions,
    ) -> SearchOutcome {
        if ticket.0 != self.latest {
            tracing::debug!(
                seq = ticket.0,
                latest = self.latest,
                "dropping superseded search response"
            );
            return SearchOutcome::Stale;
        }

        match outcome {
            Ok(result) => {
                let rendered = render(&result, options);
                let controller =
                    InteractionController::new(rendered.index, rendered.result.placements.clone());
                self.current = Some(ResultView {
                    seq: ticket.0,
                    query: query.to_string(),
                    displayed_at: Utc::now(),
                    rendered: rendered.result,
                    controller,
                });
                self.last_error = None;
                SearchOutcome::Displayed
            }
            Err(err) => {
                let message = format!("{err:#}");
                self.last_error = Some(message.clone());
                SearchOutcome::Failed(message)
            }
        }
    }

    pub fn current(&self) -> Option<&ResultView> {
        self.current.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Applies an interaction event to the displayed result, if any.
    pub fn interact(&mut self, event: InteractionEvent) -> Option<InteractionSnapshot> {
        let view = self.current.as_mut()?;
        self.last_active = Utc::now();
        view.controller.dispatch(event);
        Some(view.interaction())
    }

    pub fn snapshot(&self) -> Option<ResultSnapshot> {
        let view = self.current.as_ref()?;
        Some(ResultSnapshot {
            seq: view.seq,
            query: view.query.clone(),
            displayed_at: view.displayed_at,
            rendered: view.rendered.clone(),
            interaction: view.interaction(),
            last_error: self.last_error.clone(),
        })
    }
}
