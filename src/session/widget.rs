//! # Widget Trigger Extraction
//!
//! Scans completed responses for embedded UI directives of the form
//! `[[widget:NAME]]{json}` and turns each one into a `widget` message for the
//! client. The JSON payload is brace-balanced, so a regex is not enough; the
//! scanner walks the payload tracking string and escape state.
//!
//! Extraction runs over the full response text after generation finishes and
//! is dispatched on its own task, so a slow client or a large payload never
//! delays `ai_complete`.

use crate::error::VoiceError;
use crate::protocol::ServerMessage;
use crate::session::Session;

use std::sync::Arc;
use tracing::{debug, warn};

const MARKER_OPEN: &str = "[[widget:";
const MARKER_CLOSE: &str = "]]";

/// One extracted UI directive.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetTrigger {
    pub component: String,
    pub data: serde_json::Value,
}

/// Extract every well-formed widget trigger from a response, in order.
///
/// Malformed triggers (unterminated marker, unbalanced braces, invalid JSON)
/// are logged and skipped; they never fail the response.
pub fn extract_widget_triggers(text: &str) -> Vec<WidgetTrigger> {
    let mut triggers = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find(MARKER_OPEN) {
        let name_start = cursor + rel + MARKER_OPEN.len();

        let Some(name_len) = text[name_start..].find(MARKER_CLOSE) else {
            break;
        };
        let component = &text[name_start..name_start + name_len];
        let json_start = name_start + name_len + MARKER_CLOSE.len();

        let Some(json_end) = json_object_end(&text[json_start..]) else {
            warn!(component, "widget trigger has no balanced JSON payload, skipping");
            cursor = json_start;
            continue;
        };

        let payload = &text[json_start..json_start + json_end];
        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(data) => {
                triggers.push(WidgetTrigger {
                    component: component.to_string(),
                    data,
                });
            }
            Err(err) => {
                let err = VoiceError::from(err);
                warn!(component, "skipping widget trigger: {}", err);
            }
        }

        cursor = json_start + json_end;
    }

    triggers
}

/// Byte offset just past the brace-balanced JSON object starting at `text[0]`.
///
/// Tracks string and escape state so braces inside string literals do not
/// count toward the balance. Returns `None` when `text` does not start with
/// `{` or the object never closes.
fn json_object_end(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract and send widget triggers for a completed response, off-task.
pub fn dispatch_widget_triggers(session: Arc<Session>, text: String) {
    tokio::spawn(async move {
        for trigger in extract_widget_triggers(&text) {
            debug!(session_id = %session.id, component = %trigger.component, "dispatching widget");
            if session
                .send(ServerMessage::Widget {
                    component: trigger.component,
                    data: trigger.data,
                })
                .is_err()
            {
                // Client already gone; nothing left to deliver to
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_single_trigger() {
        let text = r#"Here you go. [[widget:weather_card]]{"city":"Oslo","temp":-3}"#;
        let triggers = extract_widget_triggers(text);

        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].component, "weather_card");
        assert_eq!(triggers[0].data, json!({"city": "Oslo", "temp": -3}));
    }

    #[test]
    fn test_nested_objects_and_braces_in_strings() {
        let text = r#"[[widget:chart]]{"series":{"label":"a}b","points":[1,2]},"kind":"bar"} tail"#;
        let triggers = extract_widget_triggers(text);

        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].data["series"]["label"], "a}b");
    }

    /// One good and one malformed trigger: exactly the good one comes out.
    #[test]
    fn test_malformed_payload_is_skipped() {
        let text = concat!(
            r#"[[widget:good]]{"ok":true}"#,
            " and ",
            r#"[[widget:bad]]{"ok":   "#,
            r#"[[widget:also_bad]]{not json}"#,
        );
        let triggers = extract_widget_triggers(text);

        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].component, "good");
    }

    #[test]
    fn test_multiple_triggers_in_order() {
        let text = r#"[[widget:a]]{"n":1} then [[widget:b]]{"n":2}"#;
        let triggers = extract_widget_triggers(text);

        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0].component, "a");
        assert_eq!(triggers[1].component, "b");
    }

    #[test]
    fn test_plain_text_has_no_triggers() {
        assert!(extract_widget_triggers("Just a normal reply, no markup.").is_empty());
        assert!(extract_widget_triggers("").is_empty());
    }

    #[test]
    fn test_marker_without_payload_is_skipped() {
        assert!(extract_widget_triggers("[[widget:orphan]] no braces follow").is_empty());
    }
}
