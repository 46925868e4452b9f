use serde_json::Value;
use thiserror::Error;

/// One tick's worth of raw stream output, exactly as delivered.
///
/// An empty sequence is a valid "no event" signal, not an error.
pub type RawEvent = Vec<Value>;

/// Closed variant over the loosely-typed event stream.
///
/// Downstream code never inspects raw fields again; everything it needs is
/// extracted here, once, with shape violations surfaced as `ClassifyError`.
#[derive(Clone, Debug, PartialEq)]
pub enum ClassifiedEvent {
    PlainMessage { sender_id: String, text: String },
    EditedMessage { old_text: String, new_text: String },
    DeletedMessage { text: String },
    TypingNotice { user_id: String },
    HandshakeNotice,
    DesktopNotification,
    Unrecognized { raw: Value },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("malformed `{event_type}` event: missing or non-string `{field}`")]
    MalformedEvent { event_type: &'static str, field: &'static str, payload: Value },
}

/// Classifies one raw event.
///
/// Returns `Ok(None)` for an empty sequence (the loop skips the tick). A
/// recognizable event with a missing expected field fails with
/// `MalformedEvent` carrying the offending payload; callers log it and
/// continue, it must never terminate the session loop.
pub fn classify(raw: &RawEvent) -> Result<Option<ClassifiedEvent>, ClassifyError> {
    let Some(first) = raw.first() else {
        return Ok(None);
    };

    let event_type = require_str(first, "event", "type")?;
    let event = match event_type {
        "message" => classify_message(first)?,
        "hello" => ClassifiedEvent::HandshakeNotice,
        "user_typing" => {
            ClassifiedEvent::TypingNotice { user_id: require_str(first, "user_typing", "user")?.to_owned() }
        }
        "desktop_notification" => ClassifiedEvent::DesktopNotification,
        _ => ClassifiedEvent::Unrecognized { raw: first.clone() },
    };

    Ok(Some(event))
}

fn classify_message(payload: &Value) -> Result<ClassifiedEvent, ClassifyError> {
    match payload.get("subtype").and_then(Value::as_str) {
        None => Ok(ClassifiedEvent::PlainMessage {
            sender_id: require_str(payload, "message", "user")?.to_owned(),
            text: require_str(payload, "message", "text")?.to_owned(),
        }),
        Some("message_deleted") => Ok(ClassifiedEvent::DeletedMessage {
            text: require_str(payload, "message_deleted", "previous_message.text")?.to_owned(),
        }),
        Some("message_changed") => Ok(ClassifiedEvent::EditedMessage {
            old_text: require_str(payload, "message_changed", "previous_message.text")?.to_owned(),
            new_text: require_str(payload, "message_changed", "message.text")?.to_owned(),
        }),
        Some(_) => Ok(ClassifiedEvent::Unrecognized { raw: payload.clone() }),
    }
}

fn require_str<'a>(
    root: &'a Value,
    event_type: &'static str,
    field: &'static str,
) -> Result<&'a str, ClassifyError> {
    let mut current = root;
    for segment in field.split('.') {
        current = match current.get(segment) {
            Some(value) => value,
            None => {
                return Err(ClassifyError::MalformedEvent {
                    event_type,
                    field,
                    payload: root.clone(),
                })
            }
        };
    }

    current.as_str().ok_or_else(|| ClassifyError::MalformedEvent {
        event_type,
        field,
        payload: root.clone(),
    })
}
