use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{OutboundSender, UpstreamError};

/// Leading character that marks a message as a command invocation.
pub const COMMAND_SENTINEL: char = '.';

/// Upper bound on the external adage invocation.
pub const FORTUNE_WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
}

/// The fixed command table; nothing is added or removed at runtime.
pub const COMMAND_TABLE: &[CommandSpec] = &[
    CommandSpec { name: "help", description: "list the available commands" },
    CommandSpec { name: "fortune", description: "reply with a short adage" },
    CommandSpec { name: "echo", description: "reply with the given arguments" },
];

#[derive(Debug, Error)]
pub enum FortuneError {
    #[error("fortune invocation failed: {0}")]
    Invocation(String),
}

/// External "produce a short adage" capability.
#[async_trait]
pub trait FortuneSource: Send + Sync {
    async fn fortune(&self) -> Result<String, FortuneError>;
}

/// Deterministic source used for wiring and tests.
pub struct CannedFortuneSource {
    pub adage: &'static str,
}

impl Default for CannedFortuneSource {
    fn default() -> Self {
        Self { adage: "A journey of a thousand miles begins with a single step." }
    }
}

#[async_trait]
impl FortuneSource for CannedFortuneSource {
    async fn fortune(&self) -> Result<String, FortuneError> {
        Ok(self.adage.to_owned())
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Send(#[from] UpstreamError),
}

/// Routes sentinel-prefixed message text to the fixed command table.
///
/// Every reply is addressed to the issuer's identifier; commands always
/// answer privately, never in the channel the message arrived in.
pub struct CommandDispatcher {
    sender: Arc<dyn OutboundSender>,
    fortune: Arc<dyn FortuneSource>,
    fortune_wait: Duration,
}

impl CommandDispatcher {
    pub fn new(sender: Arc<dyn OutboundSender>, fortune: Arc<dyn FortuneSource>) -> Self {
        Self { sender, fortune, fortune_wait: FORTUNE_WAIT }
    }

    pub fn with_fortune_wait(mut self, wait: Duration) -> Self {
        self.fortune_wait = wait;
        self
    }

    pub fn is_command(text: &str) -> bool {
        text.starts_with(COMMAND_SENTINEL)
    }

    pub async fn dispatch(&self, text: &str, issuer_id: &str) -> Result<(), CommandError> {
        let Some(stripped) = text.strip_prefix(COMMAND_SENTINEL) else {
            return Ok(());
        };

        let mut tokens = stripped.split_whitespace();
        let Some(name) = tokens.next() else {
            // A lone sentinel is not an error.
            debug!(issuer = %issuer_id, "sentinel without a command name; ignoring");
            return Ok(());
        };
        let args: Vec<&str> = tokens.collect();

        match name {
            "help" => self.reply(issuer_id, &help_text()).await,
            "echo" => self.reply(issuer_id, &format!("{args:?}")).await,
            "fortune" => self.run_fortune(issuer_id).await,
            unknown => {
                debug!(issuer = %issuer_id, command = %unknown, "unknown command");
                self.reply(issuer_id, &format!("unknown command: {unknown}")).await?;
                self.reply(issuer_id, &help_text()).await
            }
        }
    }

    async fn run_fortune(&self, issuer_id: &str) -> Result<(), CommandError> {
        match tokio::time::timeout(self.fortune_wait, self.fortune.fortune()).await {
            Ok(Ok(adage)) => self.reply(issuer_id, adage.trim()).await,
            Ok(Err(error)) => {
                warn!(error = %error, "fortune invocation failed");
                self.reply(issuer_id, &format!("fortune failed: {error}")).await
            }
            Err(_) => {
                warn!(wait_secs = self.fortune_wait.as_secs_f64(), "fortune timed out");
                self.reply(issuer_id, "fortune timed out; try again later").await
            }
        }
    }

    async fn reply(&self, issuer_id: &str, text: &str) -> Result<(), CommandError> {
        self.sender.post_message(issuer_id, text).await.map_err(CommandError::from)
    }
}

/// Every known command name plus its description, as a preformatted block.
pub fn help_text() -> String {
    let body = COMMAND_TABLE
        .iter()
        .map(|spec| format!("{COMMAND_SENTINEL}{} - {}", spec.name, spec.description))
        .collect::<Vec<_>>()
        .join("\n");
    format!("```\n{body}\n```")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{
        help_text, CannedFortuneSource, CommandDispatcher, FortuneError, FortuneSource,
    };
    use crate::api::{OutboundSender, UpstreamError};

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSender {
        async fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl OutboundSender for RecordingSender {
        async fn post_message(&self, destination: &str, text: &str) -> Result<(), UpstreamError> {
            self.sent.lock().await.push((destination.to_owned(), text.to_owned()));
            Ok(())
        }
    }

    struct SlowFortuneSource;

    #[async_trait]
    impl FortuneSource for SlowFortuneSource {
        async fn fortune(&self) -> Result<String, FortuneError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_owned())
        }
    }

    struct FailingFortuneSource;

    #[async_trait]
    impl FortuneSource for FailingFortuneSource {
        async fn fortune(&self) -> Result<String, FortuneError> {
            Err(FortuneError::Invocation("no such program".to_owned()))
        }
    }

    fn dispatcher(sender: Arc<RecordingSender>) -> CommandDispatcher {
        CommandDispatcher::new(sender, Arc::new(CannedFortuneSource::default()))
    }

    #[tokio::test]
    async fn echo_replies_with_the_argument_tokens() {
        let sender = Arc::new(RecordingSender::default());
        dispatcher(sender.clone()).dispatch(".echo a b", "U1").await.expect("dispatch");

        let sent = sender.sent().await;
        assert_eq!(sent, vec![("U1".to_owned(), r#"["a", "b"]"#.to_owned())]);
    }

    #[tokio::test]
    async fn lone_sentinel_is_a_silent_noop() {
        let sender = Arc::new(RecordingSender::default());
        dispatcher(sender.clone()).dispatch(".", "U1").await.expect("dispatch");

        assert!(sender.sent().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_command_sends_notice_then_help() {
        let sender = Arc::new(RecordingSender::default());
        dispatcher(sender.clone()).dispatch(".xyz", "U1").await.expect("dispatch");

        let sent = sender.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "U1");
        assert!(sent[0].1.contains("unknown command: xyz"));
        assert_eq!(sent[1].0, "U1");
        for name in ["help", "fortune", "echo"] {
            assert!(sent[1].1.contains(name), "help text should mention `{name}`");
        }
    }

    #[tokio::test]
    async fn help_sends_the_preformatted_command_table() {
        let sender = Arc::new(RecordingSender::default());
        dispatcher(sender.clone()).dispatch(".help", "U1").await.expect("dispatch");

        let sent = sender.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, help_text());
        assert!(sent[0].1.starts_with("```\n"));
        assert!(sent[0].1.ends_with("\n```"));
    }

    #[tokio::test]
    async fn fortune_replies_with_the_adage() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = CommandDispatcher::new(
            sender.clone(),
            Arc::new(CannedFortuneSource { adage: "  Fortune favors the bold.  " }),
        );
        dispatcher.dispatch(".fortune", "U1").await.expect("dispatch");

        let sent = sender.sent().await;
        assert_eq!(sent, vec![("U1".to_owned(), "Fortune favors the bold.".to_owned())]);
    }

    #[tokio::test]
    async fn fortune_timeout_is_reported_to_the_issuer() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = CommandDispatcher::new(sender.clone(), Arc::new(SlowFortuneSource))
            .with_fortune_wait(Duration::from_millis(10));
        dispatcher.dispatch(".fortune", "U1").await.expect("dispatch");

        let sent = sender.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("timed out"));
    }

    #[tokio::test]
    async fn fortune_failure_is_reported_to_the_issuer() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = CommandDispatcher::new(sender.clone(), Arc::new(FailingFortuneSource));
        dispatcher.dispatch(".fortune", "U1").await.expect("dispatch");

        let sent = sender.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("fortune failed"));
    }

    #[test]
    fn sentinel_check_only_matches_leading_dot() {
        assert!(CommandDispatcher::is_command(".help"));
        assert!(!CommandDispatcher::is_command("help."));
        assert!(!CommandDispatcher::is_command("plain text"));
    }
}
