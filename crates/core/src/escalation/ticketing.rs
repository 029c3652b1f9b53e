//! External ticketing collaborator (GLPI REST API) and its test double.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::types::Ticket;

/// Remote status codes meaning a human finished the ticket.
pub const REMOTE_SOLVED: i64 = 5;
pub const REMOTE_CLOSED: i64 = 6;

/// Remote ticket titles are capped at this many characters.
const REMOTE_TITLE_MAX: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum TicketingError {
    #[error("ticketing unavailable: {0}")]
    Unavailable(String),
    #[error("ticketing authentication failed: {0}")]
    Auth(String),
    #[error("remote ticket not found: {0}")]
    NotFound(String),
    #[error("invalid ticketing response: {0}")]
    InvalidResponse(String),
}

/// Snapshot of a remote ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTicket {
    pub id: String,
    pub status: i64,
    pub name: String,
    pub content: String,
    /// Official solution, then the ticket's own solution field.
    pub solution: Option<String>,
}

impl RemoteTicket {
    pub fn is_finished(&self) -> bool {
        matches!(self.status, REMOTE_SOLVED | REMOTE_CLOSED)
    }
}

#[async_trait]
pub trait Ticketing: Send + Sync {
    fn name(&self) -> &str;

    /// Mirror a local ticket. Returns the remote id.
    async fn create_remote_ticket(&self, ticket: &Ticket) -> Result<String, TicketingError>;

    async fn fetch_remote_ticket(&self, external_id: &str) -> Result<RemoteTicket, TicketingError>;

    /// Follow-up texts, oldest first.
    async fn list_followups(&self, external_id: &str) -> Result<Vec<String>, TicketingError>;
}

// ── GLPI ───────────────────────────────────────────────────────

/// GLPI REST client. Holds one session per process and reopens it once
/// when the server rejects it.
pub struct GlpiClient {
    client: reqwest::Client,
    base_url: String,
    app_token: String,
    user_token: String,
    session: tokio::sync::Mutex<Option<String>>,
}

impl GlpiClient {
    pub fn new(base_url: String, app_token: String, user_token: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            app_token,
            user_token,
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// `GLPI_URL`, `GLPI_APP_TOKEN`, `GLPI_USER_TOKEN`. `None` if any is missing.
    pub fn from_env(timeout: Duration) -> Option<Self> {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        Some(Self::new(var("GLPI_URL")?, var("GLPI_APP_TOKEN")?, var("GLPI_USER_TOKEN")?, timeout))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn open_session(&self) -> Result<String, TicketingError> {
        let resp = self
            .client
            .get(self.url("initSession"))
            .header("App-Token", &self.app_token)
            .header("Authorization", format!("user_token {}", self.user_token))
            .send()
            .await
            .map_err(|e| TicketingError::Unavailable(e.to_string()))?;
        if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(TicketingError::Auth(format!("initSession: {}", resp.status())));
        }
        let body = checked_json(resp).await?;
        let token = body
            .get("session_token")
            .and_then(Value::as_str)
            .ok_or_else(|| TicketingError::InvalidResponse("missing session_token".into()))?;
        tracing::info!("ticketing session opened");
        Ok(token.to_owned())
    }

    async fn session_token(&self, reopen: bool) -> Result<String, TicketingError> {
        let mut guard = self.session.lock().await;
        if let Some(token) = guard.as_ref().filter(|_| !reopen) {
            return Ok(token.clone());
        }
        let token = self.open_session().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Send an authenticated request, reopening the session once on 401.
    async fn send<F>(&self, build: F) -> Result<Value, TicketingError>
    where
        F: Fn(&str) -> reqwest::RequestBuilder + Send + Sync,
    {
        let token = self.session_token(false).await?;
        let resp = build(&token)
            .send()
            .await
            .map_err(|e| TicketingError::Unavailable(e.to_string()))?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return checked_json(resp).await;
        }

        tracing::info!("ticketing session rejected, reopening");
        let token = self.session_token(true).await?;
        let resp = build(&token)
            .send()
            .await
            .map_err(|e| TicketingError::Unavailable(e.to_string()))?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(TicketingError::Auth("session rejected after reopen".into()));
        }
        checked_json(resp).await
    }

    fn authed(&self, builder: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        builder.header("App-Token", &self.app_token).header("Session-Token", token)
    }

    async fn list_contents(&self, path: String) -> Result<Vec<String>, TicketingError> {
        let body = self.send(|t| self.authed(self.client.get(self.url(&path)), t)).await?;
        Ok(contents(&body))
    }
}

async fn checked_json(resp: reqwest::Response) -> Result<Value, TicketingError> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(TicketingError::NotFound(resp.url().path().to_owned()));
    }
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(TicketingError::Unavailable(format!("{status}: {text}")));
    }
    resp.json().await.map_err(|e| TicketingError::InvalidResponse(e.to_string()))
}

/// Trimmed, non-empty `content` fields of a JSON array.
fn contents(body: &Value) -> Vec<String> {
    body.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.get("content").and_then(Value::as_str))
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Body of the remote ticket creation request. New incident, urgency from priority.
fn ticket_payload(ticket: &Ticket) -> Value {
    json!({
        "input": {
            "name": truncate_chars(&ticket.title, REMOTE_TITLE_MAX),
            "content": ticket.description,
            "urgency": ticket.priority.remote_code(),
            "type": 1,
            "status": 1,
        }
    })
}

/// Snapshot from a ticket body. The latest official solution wins over the
/// ticket's own `solution` field.
fn remote_ticket(external_id: &str, body: &Value, official: Option<String>) -> RemoteTicket {
    let text = |k: &str| body.get(k).and_then(Value::as_str).unwrap_or_default().to_owned();
    let own = Some(text("solution").trim().to_owned()).filter(|s| !s.is_empty());
    RemoteTicket {
        id: external_id.to_owned(),
        status: body.get("status").and_then(Value::as_i64).unwrap_or_default(),
        name: text("name"),
        content: text("content"),
        solution: official.or(own),
    }
}

#[async_trait]
impl Ticketing for GlpiClient {
    fn name(&self) -> &str {
        "glpi"
    }

    async fn create_remote_ticket(&self, ticket: &Ticket) -> Result<String, TicketingError> {
        let payload = ticket_payload(ticket);
        let body = self
            .send(|t| self.authed(self.client.post(self.url("Ticket")), t).json(&payload))
            .await?;
        let id = body
            .get("id")
            .and_then(id_string)
            .ok_or_else(|| TicketingError::InvalidResponse("missing ticket id".into()))?;
        tracing::info!(external_id = %id, "remote ticket created");
        Ok(id)
    }

    async fn fetch_remote_ticket(&self, external_id: &str) -> Result<RemoteTicket, TicketingError> {
        let path = format!("Ticket/{external_id}");
        let body = self.send(|t| self.authed(self.client.get(self.url(&path)), t)).await?;

        let official = match self.list_contents(format!("Ticket/{external_id}/ITILSolution")).await {
            Ok(mut solutions) => solutions.pop(),
            Err(e) => {
                tracing::warn!(external_id, error = %e, "could not read remote solutions");
                None
            }
        };
        Ok(remote_ticket(external_id, &body, official))
    }

    async fn list_followups(&self, external_id: &str) -> Result<Vec<String>, TicketingError> {
        self.list_contents(format!("Ticket/{external_id}/ITILFollowup")).await
    }
}

// ── Test double ────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    tickets: HashMap<String, RemoteTicket>,
    followups: HashMap<String, Vec<String>>,
}

/// In-memory ticketing system. `failing()` rejects every call.
#[derive(Debug, Default)]
pub struct MockTicketing {
    state: Mutex<MockState>,
    failing: bool,
}

impl MockTicketing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> Result<(), TicketingError> {
        if self.failing { Err(TicketingError::Unavailable("mock ticketing offline".into())) } else { Ok(()) }
    }

    pub fn created_count(&self) -> usize {
        self.state().tickets.len()
    }

    /// Simulate a technician acting on the remote ticket.
    pub fn set_status(&self, external_id: &str, status: i64, solution: Option<&str>) {
        if let Some(t) = self.state().tickets.get_mut(external_id) {
            t.status = status;
            t.solution = solution.map(str::to_owned);
        }
    }

    pub fn add_followup(&self, external_id: &str, text: &str) {
        self.state().followups.entry(external_id.to_owned()).or_default().push(text.to_owned());
    }
}

#[async_trait]
impl Ticketing for MockTicketing {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_remote_ticket(&self, ticket: &Ticket) -> Result<String, TicketingError> {
        self.check()?;
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id.to_string();
        state.tickets.insert(
            id.clone(),
            RemoteTicket {
                id: id.clone(),
                status: 1,
                name: truncate_chars(&ticket.title, REMOTE_TITLE_MAX),
                content: ticket.description.clone(),
                solution: None,
            },
        );
        Ok(id)
    }

    async fn fetch_remote_ticket(&self, external_id: &str) -> Result<RemoteTicket, TicketingError> {
        self.check()?;
        self.state()
            .tickets
            .get(external_id)
            .cloned()
            .ok_or_else(|| TicketingError::NotFound(external_id.to_owned()))
    }

    async fn list_followups(&self, external_id: &str) -> Result<Vec<String>, TicketingError> {
        self.check()?;
        Ok(self.state().followups.get(external_id).cloned().unwrap_or_default())
    }
}
