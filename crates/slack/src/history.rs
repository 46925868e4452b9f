use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::{DirectoryError, UserDirectory};
use tracing::{debug, warn};

use crate::api::{HistoryMessage, HistoryPage, SlackApiClient, UpstreamError};

/// Pacing delay applied before the first fetch so that large backfills do
/// not burst the upstream service.
pub const FIRST_FETCH_DELAY: Duration = Duration::from_millis(500);

/// One page worth of conversation history from the upstream service.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_page(
        &self,
        conversation: &str,
        cursor: Option<&str>,
    ) -> Result<HistoryPage, UpstreamError>;
}

#[async_trait]
impl HistorySource for SlackApiClient {
    async fn fetch_page(
        &self,
        conversation: &str,
        cursor: Option<&str>,
    ) -> Result<HistoryPage, UpstreamError> {
        self.fetch_history_page(conversation, cursor).await
    }
}

/// Retrieves a conversation's complete transcript by following the
/// cursor-based pagination protocol.
///
/// Upstream failure mid-pagination is not all-or-nothing: whatever was
/// accumulated before the failure is returned.
pub struct HistoryPaginator {
    source: Arc<dyn HistorySource>,
    directory: Arc<UserDirectory>,
    first_fetch_delay: Duration,
}

impl HistoryPaginator {
    pub fn new(source: Arc<dyn HistorySource>, directory: Arc<UserDirectory>) -> Self {
        Self { source, directory, first_fetch_delay: FIRST_FETCH_DELAY }
    }

    pub fn with_first_fetch_delay(mut self, delay: Duration) -> Self {
        self.first_fetch_delay = delay;
        self
    }

    pub async fn fetch_history(&self, conversation: &str) -> Vec<String> {
        tokio::time::sleep(self.first_fetch_delay).await;

        let mut lines = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = match self.source.fetch_page(conversation, cursor.as_deref()).await {
                Ok(page) => page,
                Err(error) => {
                    warn!(
                        conversation = %conversation,
                        error = %error,
                        accumulated = lines.len(),
                        "history fetch failed; returning partial transcript"
                    );
                    break;
                }
            };

            match self.normalize_page(&page) {
                Ok(page_lines) => lines.extend(page_lines),
                Err(error) => {
                    // Unresolved senders abort the failing page but keep
                    // everything already normalized.
                    warn!(
                        conversation = %conversation,
                        error = %error,
                        accumulated = lines.len(),
                        "history page dropped; returning partial transcript"
                    );
                    break;
                }
            }

            if !page.has_more {
                break;
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                warn!(conversation = %conversation, "upstream reported more history but no cursor");
                break;
            }
        }

        debug!(conversation = %conversation, lines = lines.len(), "history backfill complete");
        lines
    }

    fn normalize_page(&self, page: &HistoryPage) -> Result<Vec<String>, DirectoryError> {
        page.messages.iter().map(|message| self.normalize_message(message)).collect()
    }

    fn normalize_message(&self, message: &HistoryMessage) -> Result<String, DirectoryError> {
        let sender = self.directory.resolve(&message.sender_id)?;
        let rendered_ts = format_timestamp(&message.ts).unwrap_or_else(|| message.ts.clone());
        Ok(format!("{rendered_ts} {sender}: {text}", text = message.text))
    }
}

/// Renders the wall-clock second of a raw Slack timestamp in UTC; the
/// fractional/sequence suffix is discarded.
fn format_timestamp(raw_ts: &str) -> Option<String> {
    let seconds = raw_ts.split('.').next()?.parse::<i64>().ok()?;
    let datetime = DateTime::<Utc>::from_timestamp(seconds, 0)?;
    Some(datetime.format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{format_timestamp, HistoryPaginator, HistorySource};
    use crate::api::{HistoryMessage, HistoryPage, UpstreamError};
    use courier_core::{Member, UserDirectory};

    struct ScriptedHistorySource {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        pages: VecDeque<Result<HistoryPage, UpstreamError>>,
        fetch_calls: usize,
    }

    impl ScriptedHistorySource {
        fn with_script(pages: Vec<Result<HistoryPage, UpstreamError>>) -> Self {
            Self { state: Mutex::new(ScriptedState { pages: pages.into(), fetch_calls: 0 }) }
        }

        async fn fetch_calls(&self) -> usize {
            self.state.lock().await.fetch_calls
        }
    }

    #[async_trait]
    impl HistorySource for ScriptedHistorySource {
        async fn fetch_page(
            &self,
            _conversation: &str,
            _cursor: Option<&str>,
        ) -> Result<HistoryPage, UpstreamError> {
            let mut state = self.state.lock().await;
            state.fetch_calls += 1;
            state.pages.pop_front().unwrap_or(Err(UpstreamError::Api {
                method: "conversations.history",
                error: "script exhausted".to_owned(),
            }))
        }
    }

    fn message(ts: &str, sender_id: &str, text: &str) -> HistoryMessage {
        HistoryMessage { ts: ts.to_owned(), sender_id: sender_id.to_owned(), text: text.to_owned() }
    }

    fn page(messages: Vec<HistoryMessage>, next_cursor: Option<&str>) -> HistoryPage {
        HistoryPage {
            messages,
            has_more: next_cursor.is_some(),
            next_cursor: next_cursor.map(str::to_owned),
        }
    }

    fn directory() -> Arc<UserDirectory> {
        Arc::new(UserDirectory::from_members(vec![
            Member { id: "U1".to_owned(), display_name: "Alice".to_owned() },
            Member { id: "U2".to_owned(), display_name: "Bob".to_owned() },
        ]))
    }

    fn paginator(source: Arc<ScriptedHistorySource>) -> HistoryPaginator {
        HistoryPaginator::new(source, directory()).with_first_fetch_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn pagination_terminates_and_preserves_arrival_order() {
        let source = Arc::new(ScriptedHistorySource::with_script(vec![
            Ok(page(vec![message("1730000000.0001", "U1", "one")], Some("c1"))),
            Ok(page(vec![message("1730000001.0002", "U2", "two")], Some("c2"))),
            Ok(page(vec![message("1730000002.0003", "U1", "three")], None)),
        ]));

        let lines = paginator(source.clone()).fetch_history("C1").await;

        assert_eq!(
            lines,
            vec![
                "2024-10-27 03:33:20 Alice: one",
                "2024-10-27 03:33:21 Bob: two",
                "2024-10-27 03:33:22 Alice: three",
            ]
        );
        assert_eq!(source.fetch_calls().await, 3, "no call after has_more is false");
    }

    #[tokio::test]
    async fn upstream_failure_returns_the_pages_fetched_so_far() {
        let source = Arc::new(ScriptedHistorySource::with_script(vec![
            Ok(page(vec![message("1730000000.0001", "U1", "kept")], Some("c1"))),
            Err(UpstreamError::Api {
                method: "conversations.history",
                error: "ratelimited".to_owned(),
            }),
        ]));

        let lines = paginator(source).fetch_history("C1").await;

        assert_eq!(lines, vec!["2024-10-27 03:33:20 Alice: kept"]);
    }

    #[tokio::test]
    async fn unresolved_sender_drops_the_failing_page_but_keeps_earlier_pages() {
        let source = Arc::new(ScriptedHistorySource::with_script(vec![
            Ok(page(vec![message("1730000000.0001", "U1", "kept")], Some("c1"))),
            Ok(page(vec![message("1730000001.0002", "U9", "stranger")], None)),
        ]));

        let lines = paginator(source).fetch_history("C1").await;

        assert_eq!(lines, vec!["2024-10-27 03:33:20 Alice: kept"]);
    }

    #[tokio::test]
    async fn missing_cursor_despite_more_history_stops_the_loop() {
        let source = Arc::new(ScriptedHistorySource::with_script(vec![Ok(HistoryPage {
            messages: vec![message("1730000000.0001", "U1", "only")],
            has_more: true,
            next_cursor: None,
        })]));

        let lines = paginator(source.clone()).fetch_history("C1").await;

        assert_eq!(lines.len(), 1);
        assert_eq!(source.fetch_calls().await, 1);
    }

    #[test]
    fn timestamp_rendering_discards_the_fractional_suffix() {
        assert_eq!(
            format_timestamp("1730000000.001500").as_deref(),
            Some("2024-10-27 03:33:20")
        );
        assert_eq!(format_timestamp("0").as_deref(), Some("1970-01-01 00:00:00"));
        assert_eq!(format_timestamp("not-a-timestamp"), None);
    }
}
