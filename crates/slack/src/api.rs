use async_trait::async_trait;
use courier_core::Member;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Slack paginates large listings; this bounds runaway cursor loops.
const MAX_LIST_PAGES: usize = 50;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("slack `{method}` request failed: {source}")]
    Http { method: &'static str, source: reqwest::Error },
    #[error("slack `{method}` reported failure: {error}")]
    Api { method: &'static str, error: String },
    #[error("slack `{method}` returned a malformed response: {detail}")]
    MalformedResponse { method: &'static str, detail: &'static str },
}

/// Posts a text message to a channel, group, or direct conversation.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn post_message(&self, destination: &str, text: &str) -> Result<(), UpstreamError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryMessage {
    /// Raw Slack timestamp, `"seconds.sequence"`.
    pub ts: String,
    pub sender_id: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryPage {
    pub messages: Vec<HistoryMessage>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    token: SecretString,
    base_url: String,
}

impl SlackApiClient {
    pub fn new(token: SecretString) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(token: SecretString, base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), token, base_url: base_url.into() }
    }

    /// Fetches the full workspace membership via `users.list`.
    ///
    /// Follows `response_metadata.next_cursor` until the listing is
    /// exhausted; any non-success response aborts the whole load.
    pub async fn list_members(&self) -> Result<Vec<Member>, UpstreamError> {
        let mut members = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            pages += 1;
            let mut query = vec![("limit", "200".to_owned())];
            if let Some(next) = &cursor {
                query.push(("cursor", next.clone()));
            }

            let payload = self.get_json("users.list", &query).await?;
            members.extend(parse_members(&payload)?);

            cursor = next_cursor(&payload);
            if cursor.is_none() {
                break;
            }
            if pages >= MAX_LIST_PAGES {
                warn!(pages = MAX_LIST_PAGES, "users.list page limit reached; directory may be incomplete");
                break;
            }
        }

        debug!(member_count = members.len(), pages, "membership listing fetched");
        Ok(members)
    }

    /// Fetches one page of `conversations.history`.
    pub async fn fetch_history_page(
        &self,
        conversation: &str,
        cursor: Option<&str>,
    ) -> Result<HistoryPage, UpstreamError> {
        let mut query = vec![("channel", conversation.to_owned())];
        if let Some(next) = cursor {
            query.push(("cursor", next.to_owned()));
        }

        let payload = self.get_json("conversations.history", &query).await?;
        parse_history_page(&payload)
    }

    async fn get_json(
        &self,
        method: &'static str,
        query: &[(&str, String)],
    ) -> Result<Value, UpstreamError> {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, method))
            .bearer_auth(self.token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|source| UpstreamError::Http { method, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Api { method, error: format!("http status {status}") });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|source| UpstreamError::Http { method, source })?;
        ensure_ok(method, payload)
    }
}

#[async_trait]
impl OutboundSender for SlackApiClient {
    async fn post_message(&self, destination: &str, text: &str) -> Result<(), UpstreamError> {
        let method = "chat.postMessage";
        debug!(destination = %destination, "posting outbound message");

        let response = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .bearer_auth(self.token.expose_secret())
            .json(&json!({ "channel": destination, "text": text, "as_user": true }))
            .send()
            .await
            .map_err(|source| UpstreamError::Http { method, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Api { method, error: format!("http status {status}") });
        }

        // Slack returns HTTP 200 for most app-level errors; the body's
        // `ok` flag is the real verdict.
        let payload: Value = response
            .json()
            .await
            .map_err(|source| UpstreamError::Http { method, source })?;
        ensure_ok(method, payload).map(|_| ())
    }
}

fn ensure_ok(method: &'static str, payload: Value) -> Result<Value, UpstreamError> {
    if payload.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(payload);
    }

    let error = payload
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_owned();
    Err(UpstreamError::Api { method, error })
}

fn parse_members(payload: &Value) -> Result<Vec<Member>, UpstreamError> {
    let entries = payload.get("members").and_then(Value::as_array).ok_or(
        UpstreamError::MalformedResponse { method: "users.list", detail: "missing `members` array" },
    )?;

    let members = entries
        .iter()
        .filter_map(|entry| {
            let id = entry.get("id").and_then(Value::as_str)?;
            let display_name = entry
                .get("real_name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .or_else(|| entry.get("name").and_then(Value::as_str))
                .unwrap_or(id);
            Some(Member { id: id.to_owned(), display_name: display_name.to_owned() })
        })
        .collect();

    Ok(members)
}

fn parse_history_page(payload: &Value) -> Result<HistoryPage, UpstreamError> {
    let entries = payload.get("messages").and_then(Value::as_array).ok_or(
        UpstreamError::MalformedResponse {
            method: "conversations.history",
            detail: "missing `messages` array",
        },
    )?;

    let messages = entries
        .iter()
        .filter_map(|entry| {
            let ts = entry.get("ts").and_then(Value::as_str)?;
            let sender_id = entry.get("user").and_then(Value::as_str)?;
            let text = entry.get("text").and_then(Value::as_str)?;
            Some(HistoryMessage {
                ts: ts.to_owned(),
                sender_id: sender_id.to_owned(),
                text: text.to_owned(),
            })
        })
        .collect();

    Ok(HistoryPage {
        messages,
        has_more: payload.get("has_more").and_then(Value::as_bool).unwrap_or(false),
        next_cursor: next_cursor(payload),
    })
}

fn next_cursor(payload: &Value) -> Option<String> {
    payload
        .get("response_metadata")
        .and_then(|metadata| metadata.get("next_cursor"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|cursor| !cursor.is_empty())
        .map(ToOwned::to_owned)
}
