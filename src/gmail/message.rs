//! Gmail API payload types and message-body extraction.

use base64::Engine;
use serde::Deserialize;

/// `users.getProfile` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email_address: String,
    #[serde(default)]
    pub messages_total: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelList {
    #[serde(default)]
    pub labels: Vec<Label>,
}

/// Bare message reference returned by `users.messages.list` and `send`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
}

/// Full message as returned by `users.messages.get` with `format=full`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
}

impl Message {
    /// Look up a top-level header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload.as_ref()?.headers.iter().find_map(|h| {
            h.name.eq_ignore_ascii_case(name).then_some(h.value.as_str())
        })
    }

    pub fn sender(&self) -> Option<&str> {
        self.header("From")
    }

    pub fn subject(&self) -> Option<&str> {
        self.header("Subject")
    }

    pub fn date(&self) -> Option<&str> {
        self.header("Date")
    }

    /// Extract the readable text of the message: the first `text/plain` part,
    /// falling back to `text/html`, falling back to the snippet.
    pub fn text(&self) -> Option<String> {
        if let Some(payload) = &self.payload {
            if let Some(text) = find_part_text(payload, "text/plain") {
                return Some(text);
            }
            if let Some(text) = find_part_text(payload, "text/html") {
                return Some(text);
            }
        }
        self.snippet.clone()
    }
}

fn find_part_text(part: &MessagePart, mime_type: &str) -> Option<String> {
    if part.mime_type.as_deref().is_some_and(|m| m.starts_with(mime_type))
        && let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref())
        && let Some(decoded) = decode_body(data)
    {
        return Some(decoded);
    }
    part.parts
        .iter()
        .find_map(|child| find_part_text(child, mime_type))
}

/// Gmail body data is base64url, with or without padding depending on the
/// part. Trim padding and decode with the no-pad alphabet to accept both.
fn decode_body(data: &str) -> Option<String> {
    let trimmed = data.trim_end_matches('=');
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .ok()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(text: &str) -> String {
        base64::engine::general_purpose::URL_SAFE.encode(text)
    }

    fn full_message() -> Message {
        let json = format!(
            r#"{{
                "id": "18c2f",
                "threadId": "18c2f",
                "snippet": "Weekly digest snippet",
                "payload": {{
                    "mimeType": "multipart/alternative",
                    "headers": [
                        {{"name": "From", "value": "news@weekly.dev"}},
                        {{"name": "Subject", "value": "This week in Rust"}},
                        {{"name": "Date", "value": "Fri, 28 Aug 2026 08:00:00 +0000"}}
                    ],
                    "parts": [
                        {{
                            "mimeType": "text/plain",
                            "body": {{"data": "{plain}"}}
                        }},
                        {{
                            "mimeType": "text/html",
                            "body": {{"data": "{html}"}}
                        }}
                    ]
                }}
            }}"#,
            plain = encode("Hello newsletter body"),
            html = encode("<p>Hello newsletter body</p>"),
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let message = full_message();
        assert_eq!(message.sender(), Some("news@weekly.dev"));
        assert_eq!(message.subject(), Some("This week in Rust"));
        assert_eq!(message.header("subject"), Some("This week in Rust"));
        assert_eq!(message.header("X-Missing"), None);
    }

    #[test]
    fn test_text_prefers_plain_part() {
        let message = full_message();
        assert_eq!(message.text().as_deref(), Some("Hello newsletter body"));
    }

    #[test]
    fn test_text_falls_back_to_html_then_snippet() {
        let json = format!(
            r#"{{
                "id": "1",
                "snippet": "snippet text",
                "payload": {{
                    "mimeType": "text/html",
                    "headers": [],
                    "body": {{"data": "{html}"}}
                }}
            }}"#,
            html = encode("<b>html body</b>"),
        );
        let message: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(message.text().as_deref(), Some("<b>html body</b>"));

        let bare: Message =
            serde_json::from_str(r#"{"id": "2", "snippet": "only snippet"}"#).unwrap();
        assert_eq!(bare.text().as_deref(), Some("only snippet"));
    }

    #[test]
    fn test_decode_body_with_and_without_padding() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode("padded?");
        assert!(padded.ends_with('='));
        assert_eq!(decode_body(&padded).as_deref(), Some("padded?"));

        let unpadded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("unpadded");
        assert_eq!(decode_body(&unpadded).as_deref(), Some("unpadded"));

        assert!(decode_body("!!not base64!!").is_none());
    }

    #[test]
    fn test_message_list_tolerates_empty_response() {
        let list: MessageList = serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(list.messages.is_empty());
    }
}
