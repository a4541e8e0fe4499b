//! Thin wrappers over the Gmail v1 REST API.
//!
//! Every operation goes through the same request/decode helper so the
//! status-check and error-wrapping boilerplate exists exactly once, and every
//! failure names the operation that produced it.

use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use serde::de::DeserializeOwned;

use crate::auth::Session;
use crate::error::GmailError;
use crate::gmail::message::{LabelList, Message, MessageList, MessageRef, Profile};

const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Resource client for the authenticated user's mailbox. All calls act on the
/// `me` user bound to the session's access token.
#[derive(Debug)]
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl GmailClient {
    pub fn new(session: &Session) -> Result<Self> {
        Self::with_base_url(session, GMAIL_BASE_URL)
    }

    /// Point the client at a different API root. Tests use this to talk to a
    /// local stub server.
    pub fn with_base_url(session: &Session, base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: session.access_token().to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/me/{}", self.base_url, path)
    }

    /// Issue a request, check the status, decode the JSON body. The single
    /// funnel every resource wrapper goes through.
    async fn call<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GmailError> {
        let response = self.send(operation, request).await?;
        response
            .json()
            .await
            .map_err(|source| GmailError::Decode { operation, source })
    }

    /// Same funnel for operations whose success response has no body.
    async fn call_empty(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<(), GmailError> {
        self.send(operation, request).await.map(|_| ())
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, GmailError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|source| GmailError::Transport { operation, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(operation, %status, "gmail call failed");
            return Err(GmailError::Api {
                operation,
                status,
                body,
            });
        }
        Ok(response)
    }

    pub async fn get_profile(&self) -> Result<Profile, GmailError> {
        self.call("get profile", self.http.get(self.url("profile")))
            .await
    }

    pub async fn list_labels(&self) -> Result<LabelList, GmailError> {
        self.call("list labels", self.http.get(self.url("labels")))
            .await
    }

    pub async fn list_messages(&self, max_results: u32) -> Result<MessageList, GmailError> {
        self.call(
            "list messages",
            self.http
                .get(self.url("messages"))
                .query(&[("maxResults", max_results)]),
        )
        .await
    }

    pub async fn get_message(&self, message_id: &str) -> Result<Message, GmailError> {
        self.call(
            "get message",
            self.http
                .get(self.url(&format!("messages/{message_id}")))
                .query(&[("format", "full")]),
        )
        .await
    }

    /// Send an HTML message. The Gmail API takes the whole RFC 2822 message
    /// base64url-encoded in a `raw` field.
    pub async fn send_message(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<MessageRef, GmailError> {
        let raw = encode_rfc2822(from, to, subject, html_body);
        self.call(
            "send message",
            self.http
                .post(self.url("messages/send"))
                .json(&serde_json::json!({ "raw": raw })),
        )
        .await
    }

    /// Permanently delete a message. Unused by the digest pipeline, which
    /// never mutates the source mailbox.
    #[allow(dead_code)]
    pub async fn delete_message(&self, message_id: &str) -> Result<(), GmailError> {
        self.call_empty(
            "delete message",
            self.http
                .delete(self.url(&format!("messages/{message_id}"))),
        )
        .await
    }
}

fn encode_rfc2822(from: &str, to: &str, subject: &str, html_body: &str) -> String {
    let message = format!(
        "From: {from}\r\nTo: {to}\r\nSubject: {subject}\r\n\
         MIME-Version: 1.0\r\nContent-Type: text/html; charset=UTF-8\r\n\r\n{html_body}"
    );
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::StoredToken;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn session() -> Session {
        Session::new(StoredToken {
            user: "alice@example.com".to_string(),
            access_token: "ya29.test".to_string(),
            refresh_token: None,
            scopes: vec!["read".to_string()],
            expiry: Utc::now() + ChronoDuration::hours(1),
        })
    }

    /// One-shot HTTP stub: accepts a single request and replies with the given
    /// status line and JSON body. Returns the base URL and a handle yielding
    /// the raw request it saw.
    fn stub_server(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length: "))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (format!("http://127.0.0.1:{port}"), handle)
    }

    #[tokio::test]
    async fn test_get_profile_echoes_user() {
        let (base_url, server) = stub_server(
            "HTTP/1.1 200 OK",
            r#"{"emailAddress": "alice@example.com", "messagesTotal": 42}"#,
        );

        let client = GmailClient::with_base_url(&session(), &base_url).unwrap();
        let profile = client.get_profile().await.unwrap();

        assert_eq!(profile.email_address, "alice@example.com");
        assert_eq!(profile.messages_total, Some(42));

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /users/me/profile"));
        assert!(request.contains("authorization: Bearer ya29.test"));
    }

    #[tokio::test]
    async fn test_list_messages_passes_max_results() {
        let (base_url, server) = stub_server(
            "HTTP/1.1 200 OK",
            r#"{"messages": [{"id": "m1"}, {"id": "m2"}], "resultSizeEstimate": 2}"#,
        );

        let client = GmailClient::with_base_url(&session(), &base_url).unwrap();
        let list = client.list_messages(5).await.unwrap();

        assert_eq!(list.messages.len(), 2);
        assert_eq!(list.messages[0].id, "m1");

        let request = server.join().unwrap();
        assert!(request.contains("maxResults=5"));
    }

    #[tokio::test]
    async fn test_api_error_names_operation_and_status() {
        let (base_url, server) = stub_server(
            "HTTP/1.1 403 Forbidden",
            r#"{"error": {"code": 403, "message": "insufficient scopes"}}"#,
        );

        let client = GmailClient::with_base_url(&session(), &base_url).unwrap();
        let err = client.get_profile().await.unwrap_err();

        match err {
            GmailError::Api {
                operation, status, ..
            } => {
                assert_eq!(operation, "get profile");
                assert_eq!(status, reqwest::StatusCode::FORBIDDEN);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        server.join().unwrap();
    }

    #[tokio::test]
    async fn test_send_message_posts_raw_payload() {
        let (base_url, server) =
            stub_server("HTTP/1.1 200 OK", r#"{"id": "sent-1", "threadId": "t1"}"#);

        let client = GmailClient::with_base_url(&session(), &base_url).unwrap();
        let sent = client
            .send_message(
                "alice@example.com",
                "digest@example.com",
                "Weekly digest",
                "<p>hi</p>",
            )
            .await
            .unwrap();

        assert_eq!(sent.id, "sent-1");
        let request = server.join().unwrap();
        assert!(request.starts_with("POST /users/me/messages/send"));
        assert!(request.contains("\"raw\""));
    }

    #[test]
    fn test_encode_rfc2822_roundtrip() {
        let raw = encode_rfc2822("a@x.com", "b@y.com", "Sub", "<p>body</p>");
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&raw)
            .unwrap();
        let text = String::from_utf8(decoded).unwrap();

        assert!(text.starts_with("From: a@x.com\r\nTo: b@y.com\r\nSubject: Sub\r\n"));
        assert!(text.contains("Content-Type: text/html"));
        assert!(text.ends_with("<p>body</p>"));
    }
}
