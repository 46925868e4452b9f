use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use courier_core::UserDirectory;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::commands::CommandDispatcher;
use crate::events::{classify, ClassifiedEvent, RawEvent};

/// Fixed pause between reads; a deliberate rate limit on polling, not a
/// correctness requirement of the transport.
pub const TICK_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read timed out: {0}")]
    TimedOut(String),
    #[error("transport read failed: {0}")]
    Receive(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Transport-level boundary to the real-time stream.
///
/// Handshake, socket, and frame management live behind this trait;
/// `read_event` blocks until the stream produces a raw event. `Ok(None)`
/// means the peer closed the stream; an empty event means "nothing this
/// tick".
#[async_trait]
pub trait RtmTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn read_event(&self) -> Result<Option<RawEvent>, TransportError>;
}

#[derive(Default)]
pub struct NoopRtmTransport;

#[async_trait]
impl RtmTransport for NoopRtmTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn read_event(&self) -> Result<Option<RawEvent>, TransportError> {
        Ok(None)
    }
}

/// Owns the connect → read → classify → dispatch → pause cycle.
///
/// All work for one event completes before the next read; failures inside
/// one event are contained to that event and logged with the raw payload.
pub struct RtmRunner {
    transport: Arc<dyn RtmTransport>,
    directory: Arc<UserDirectory>,
    dispatcher: CommandDispatcher,
    reconnect_policy: ReconnectPolicy,
    tick_pause: Duration,
}

impl RtmRunner {
    pub fn new(
        transport: Arc<dyn RtmTransport>,
        directory: Arc<UserDirectory>,
        dispatcher: CommandDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, directory, dispatcher, reconnect_policy, tick_pause: TICK_PAUSE }
    }

    pub fn with_tick_pause(mut self, pause: Duration) -> Self {
        self.tick_pause = pause;
        self
    }

    /// Runs the session until the stream closes cleanly or the reconnect
    /// budget is exhausted.
    pub async fn run(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => {
                    info!("rtm stream closed; session complete");
                    return Ok(());
                }
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "rtm session failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "rtm reconnect budget exhausted"
                        );
                        return Err(transport_error.into());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "connecting to rtm stream");
        self.transport.connect().await?;
        info!(attempt, "rtm stream connected");

        loop {
            let Some(event) = self.transport.read_event().await? else {
                info!("rtm stream closed by peer");
                return Ok(());
            };

            self.process_event(event).await;
            tokio::time::sleep(self.tick_pause).await;
        }
    }

    async fn process_event(&self, event: RawEvent) {
        let classified = match classify(&event) {
            Ok(Some(classified)) => classified,
            Ok(None) => return,
            Err(error) => {
                warn!(error = %error, payload = ?event, "skipping malformed event");
                return;
            }
        };

        match classified {
            ClassifiedEvent::PlainMessage { sender_id, text } => {
                let sender = match self.directory.resolve(&sender_id) {
                    Ok(name) => name.to_owned(),
                    Err(error) => {
                        warn!(error = %error, "sender missing from directory");
                        sender_id.clone()
                    }
                };
                info!(sender = %sender, text = %text, "message received");

                if CommandDispatcher::is_command(&text) {
                    if let Err(error) = self.dispatcher.dispatch(&text, &sender_id).await {
                        warn!(error = %error, "command dispatch failed; continuing session loop");
                    }
                }
            }
            ClassifiedEvent::EditedMessage { old_text, new_text } => {
                info!(old = %old_text, new = %new_text, "message edited");
            }
            ClassifiedEvent::DeletedMessage { text } => {
                info!(text = %text, "message deleted");
            }
            ClassifiedEvent::TypingNotice { user_id } => {
                debug!(user = %user_id, "user typing");
            }
            ClassifiedEvent::HandshakeNotice => {
                info!("rtm handshake acknowledged");
            }
            ClassifiedEvent::DesktopNotification => {
                debug!("desktop notification received");
            }
            ClassifiedEvent::Unrecognized { raw } => {
                warn!(payload = ?raw, "unrecognized event");
            }
        }
    }
}
