//! Interactive OAuth2 consent flow.
//!
//! Opens a browser to the provider's authorization page and waits for the
//! redirect on a local loopback listener. This is the one blocking wait in
//! the whole credential lifecycle; it runs on a blocking task and is bounded
//! so the process can never hang indefinitely on an abandoned consent.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::TcpListener;
use std::time::{Duration, Instant};

use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::ConsentError;

/// Default bound on the callback wait.
const CONSENT_TIMEOUT_SECS: u64 = 180;

/// The outcome of a completed consent: everything needed to exchange the
/// authorization code for tokens.
#[derive(Debug, Clone)]
pub struct ConsentGrant {
    pub code: String,
    pub redirect_uri: String,
    pub pkce_verifier: String,
}

/// One-method seam around the interactive consent flow, so tests can script
/// it without a browser or a listener.
pub trait ConsentFlow {
    async fn obtain_authorization(&self, scopes: &[String])
    -> Result<ConsentGrant, ConsentError>;
}

/// Real consent flow: loopback listener + system browser.
#[derive(Clone)]
pub struct BrowserConsent {
    client_id: String,
    auth_uri: String,
    timeout: Duration,
}

impl BrowserConsent {
    pub fn new(client_id: &str, auth_uri: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            auth_uri: auth_uri.to_string(),
            timeout: Duration::from_secs(CONSENT_TIMEOUT_SECS),
        }
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn authorization_url(
        &self,
        scopes: &[String],
        redirect_uri: &str,
        challenge: &str,
        state: &str,
    ) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}\
             &code_challenge={}&code_challenge_method=S256\
             &access_type=offline&prompt=consent&state={}",
            self.auth_uri,
            url_encode(&self.client_id),
            url_encode(redirect_uri),
            url_encode(&scopes.join(" ")),
            url_encode(challenge),
            url_encode(state),
        )
    }
}

impl ConsentFlow for BrowserConsent {
    /// The listener wait blocks for up to the configured timeout, so it runs
    /// on a blocking task rather than an async worker.
    async fn obtain_authorization(
        &self,
        scopes: &[String],
    ) -> Result<ConsentGrant, ConsentError> {
        let flow = self.clone();
        let scopes = scopes.to_vec();
        tokio::task::spawn_blocking(move || flow.run_flow(&scopes))
            .await
            .map_err(|e| ConsentError::Callback {
                reason: format!("consent task failed: {e}"),
            })?
    }
}

impl BrowserConsent {
    fn run_flow(&self, scopes: &[String]) -> Result<ConsentGrant, ConsentError> {
        let listener =
            TcpListener::bind("127.0.0.1:0").map_err(ConsentError::Listener)?;
        let port = listener
            .local_addr()
            .map_err(ConsentError::Listener)?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{port}");

        let pkce = PkceChallenge::new()?;
        let state = random_token()?;
        let auth_url = self.authorization_url(scopes, &redirect_uri, &pkce.challenge, &state);

        tracing::debug!(%redirect_uri, "waiting for consent callback");
        println!("Opening your browser to authorize access.");
        println!("If nothing happens, visit:\n  {auth_url}");
        if let Err(e) = open::that(&auth_url) {
            tracing::warn!("failed to open browser: {e}");
        }

        let code = wait_for_callback(&listener, &state, self.timeout)?;

        Ok(ConsentGrant {
            code,
            redirect_uri,
            pkce_verifier: pkce.verifier,
        })
    }
}

/// PKCE verifier and its S256 challenge.
struct PkceChallenge {
    verifier: String,
    challenge: String,
}

impl PkceChallenge {
    fn new() -> Result<Self, ConsentError> {
        let verifier = random_token()?;

        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let challenge =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize());

        Ok(Self {
            verifier,
            challenge,
        })
    }
}

/// 32 random bytes, base64url. Used for the PKCE verifier and the CSRF state.
fn random_token() -> Result<String, ConsentError> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).map_err(|e| ConsentError::Callback {
        reason: format!("failed to generate random bytes: {e}"),
    })?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Accept one connection on the listener, validate the callback, reply to the
/// browser, and return the authorization code.
fn wait_for_callback(
    listener: &TcpListener,
    expected_state: &str,
    timeout: Duration,
) -> Result<String, ConsentError> {
    listener
        .set_nonblocking(true)
        .map_err(ConsentError::Listener)?;

    let start = Instant::now();
    let mut stream = loop {
        match listener.accept() {
            Ok((stream, _)) => break stream,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if start.elapsed() > timeout {
                    return Err(ConsentError::Timeout {
                        seconds: timeout.as_secs(),
                    });
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => return Err(ConsentError::Listener(e)),
        }
    };

    // The redirect arrives as a single HTTP GET; only the request line matters.
    stream
        .set_nonblocking(false)
        .map_err(ConsentError::Listener)?;
    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .map_err(ConsentError::Listener)?;

    let query = request_line
        .split_whitespace()
        .nth(1)
        .and_then(|path| path.split('?').nth(1))
        .unwrap_or("");

    if let Some(error) = query_param(query, "error") {
        let description = query_param(query, "error_description")
            .map(|s| url_decode(&s))
            .unwrap_or_default();
        respond(
            &mut stream,
            &format!(
                "<h1>Authorization failed</h1><p>{}: {}</p>\
                 <p>Close this window and try again.</p>",
                escape_html(&error),
                escape_html(&description)
            ),
        );
        return Err(ConsentError::Denied { error, description });
    }

    let state = query_param(query, "state").ok_or(ConsentError::Callback {
        reason: "no state parameter in callback".to_string(),
    })?;
    if state != expected_state {
        respond(&mut stream, "<h1>Authorization failed</h1>");
        return Err(ConsentError::StateMismatch);
    }

    let code = query_param(query, "code").ok_or(ConsentError::Callback {
        reason: "no authorization code in callback".to_string(),
    })?;

    respond(
        &mut stream,
        "<h1>Authorization successful</h1>\
         <p>You can close this window and return to mailbrief.</p>",
    );

    Ok(code)
}

fn respond(stream: &mut std::net::TcpStream, body: &str) {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n<html><body>{body}</body></html>"
    );
    // Best effort; the grant outcome does not depend on the browser page.
    let _ = stream.write_all(response.as_bytes());
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn url_encode(s: &str) -> String {
    let mut out = String::new();
    for c in s.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => out.push(c),
            _ => {
                for b in c.to_string().as_bytes() {
                    out.push_str(&format!("%{:02X}", b));
                }
            }
        }
    }
    out
}

// Percent-escapes decode to bytes, not chars: a multibyte UTF-8 sequence
// arrives as one escape per byte and is only a string again at the end.
fn url_decode(s: &str) -> String {
    let mut out = Vec::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                out.push(byte);
            }
        } else if c == '+' {
            out.push(b' ');
        } else {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_query_param() {
        let query = "code=4%2FabcDEF&state=xyz&scope=read";
        assert_eq!(query_param(query, "code").as_deref(), Some("4%2FabcDEF"));
        assert_eq!(query_param(query, "state").as_deref(), Some("xyz"));
        assert_eq!(query_param(query, "missing"), None);
    }

    #[test]
    fn test_url_encode_decode() {
        assert_eq!(url_encode("hello"), "hello");
        assert_eq!(url_encode("a b&c=d"), "a%20b%26c%3Dd");
        assert_eq!(url_decode("a%20b%26c%3Dd"), "a b&c=d");
        assert_eq!(url_decode("one+two"), "one two");
    }

    #[test]
    fn test_url_decode_multibyte_utf8() {
        // One escape per byte of the UTF-8 sequence, as providers send it.
        assert_eq!(url_decode("acc%C3%A8s%20refus%C3%A9"), "accès refusé");
        assert_eq!(url_encode("accès"), "acc%C3%A8s");
        assert_eq!(url_decode(&url_encode("日本語")), "日本語");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<script>"), "&lt;script&gt;");
        assert_eq!(escape_html("a&b \"c\""), "a&amp;b &quot;c&quot;");
    }

    #[test]
    fn test_pkce_challenge_matches_verifier() {
        let pkce = PkceChallenge::new().unwrap();

        let mut hasher = Sha256::new();
        hasher.update(pkce.verifier.as_bytes());
        let expected =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize());

        assert_eq!(pkce.challenge, expected);
        assert_ne!(pkce.verifier, pkce.challenge);
    }

    #[test]
    fn test_authorization_url_contains_request() {
        let consent = BrowserConsent::new("client-123", "https://auth.example/o/auth");
        let url = consent.authorization_url(
            &["read write".to_string()],
            "http://127.0.0.1:9999",
            "challenge",
            "state-1",
        );

        assert!(url.starts_with("https://auth.example/o/auth?"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("scope=read%20write"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("state=state-1"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn test_wait_for_callback_returns_code() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = std::thread::spawn(move || {
            let mut stream = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
            stream
                .write_all(b"GET /?code=auth-code-1&state=expected HTTP/1.1\r\n\r\n")
                .unwrap();
            let mut page = String::new();
            let _ = stream.read_to_string(&mut page);
            page
        });

        let code =
            wait_for_callback(&listener, "expected", Duration::from_secs(5)).unwrap();
        assert_eq!(code, "auth-code-1");

        let page = client.join().unwrap();
        assert!(page.contains("Authorization successful"));
    }

    #[test]
    fn test_wait_for_callback_rejects_state_mismatch() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = std::thread::spawn(move || {
            let mut stream = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
            stream
                .write_all(b"GET /?code=auth-code-1&state=forged HTTP/1.1\r\n\r\n")
                .unwrap();
            let mut page = String::new();
            let _ = stream.read_to_string(&mut page);
        });

        let err = wait_for_callback(&listener, "expected", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, ConsentError::StateMismatch));
        client.join().unwrap();
    }

    #[test]
    fn test_wait_for_callback_surfaces_denial() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = std::thread::spawn(move || {
            let mut stream = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
            stream
                .write_all(b"GET /?error=access_denied&state=expected HTTP/1.1\r\n\r\n")
                .unwrap();
            let mut page = String::new();
            let _ = stream.read_to_string(&mut page);
        });

        let err = wait_for_callback(&listener, "expected", Duration::from_secs(5)).unwrap_err();
        match err {
            ConsentError::Denied { error, .. } => assert_eq!(error, "access_denied"),
            other => panic!("unexpected error: {other:?}"),
        }
        client.join().unwrap();
    }

    #[test]
    fn test_wait_for_callback_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();

        let err =
            wait_for_callback(&listener, "expected", Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, ConsentError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_obtain_authorization_times_out_off_the_runtime() {
        // No browser lands on the listener, so the bounded wait expires; the
        // blocking flow runs on a spawn_blocking task.
        let consent = BrowserConsent::new("client-123", "http://127.0.0.1:9/never")
            .with_timeout(Duration::from_millis(50));

        let err = consent
            .obtain_authorization(&["read".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ConsentError::Timeout { .. }));
    }
}
