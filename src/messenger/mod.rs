//! # Forum Private-Message Client
//!
//! This module delivers a single private message to a single forum user by
//! posting the compose form, then classifies what the forum answered so the
//! dispatcher knows whether trying again could help.
//!
//! ## Request
//!
//! One `POST` to the compose endpoint (`pmsnew.php?mdl=post`) with an
//! `application/x-www-form-urlencoded` body:
//!
//! | Field | Value |
//! |---|---|
//! | `csrf_hash` | session token from the compose page |
//! | `req_addressee` | recipient username |
//! | `req_subject` | message subject |
//! | `req_message` | message body |
//! | `submit` | `Submit` |
//!
//! The logged-in session travels as cookies. The client reads them from a jar
//! shared with the page scraper: it is seeded from `FORUM_COOKIE` and takes
//! every `Set-Cookie` the forum answers with, so a rotated session cookie is
//! what the next request sends.
//!
//! ## Classification
//!
//! - **Terminal**: the page contains `#posterror`. The `strong` elements under
//!   its `.error-list` are the forum's reasons ("inbox full", "message too
//!   long"...). Sending the same form again would fail the same way.
//! - **Retryable**: timeouts, connection errors, unreadable bodies, and
//!   non-success statuses without a validation marker.
//! - **Success**: anything else with a success status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::debug;

use crate::config::Config;
use crate::models::{AttemptOutcome, NotificationRequest};
use crate::traits::Notifier;

/// Browser user agent sent by every forum client
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Private-message client for one forum.
///
/// Holds no per-message state, so one instance serves a whole dispatch run
/// and can be cloned freely. Clones share the connection pool and the
/// session jar.
#[derive(Clone)]
pub struct ForumMessenger {
    /// HTTP client with the per-request timeout applied.
    client: Client,

    /// Full compose URL the form is posted to.
    endpoint: String,
}

impl ForumMessenger {
    /// Creates a messenger for the forum described by `config`.
    ///
    /// ## Errors
    ///
    /// Fails if the HTTP client cannot be built (e.g. TLS backend setup).
    pub fn new(config: &Config, jar: Arc<Jar>) -> anyhow::Result<Self> {
        Self::with_endpoint(config.compose_url(), jar, config.request_timeout)
    }

    /// Creates a messenger posting to an explicit endpoint.
    ///
    /// Every request is bounded by `timeout`; a request that hangs past it
    /// resolves as a retryable failure.
    pub fn with_endpoint(
        endpoint: impl Into<String>,
        jar: Arc<Jar>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .cookie_provider(jar)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Notifier for ForumMessenger {
    async fn send(&self, request: &NotificationRequest<'_>) -> AttemptOutcome {
        let sent = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(encode_form(request))
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return AttemptOutcome::RetryableFailure("request timed out".to_string());
            }
            Err(e) => return AttemptOutcome::RetryableFailure(format!("request failed: {e}")),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return AttemptOutcome::RetryableFailure(format!(
                    "could not read response ({status}): {e}"
                ));
            }
        };

        debug!(
            username = %request.target.username,
            status = %status,
            bytes = body.len(),
            "Compose form answered"
        );

        classify_response(status, &body)
    }
}

/// Builds the URL-encoded compose form body.
pub fn encode_form(request: &NotificationRequest<'_>) -> String {
    let fields = [
        ("csrf_hash", request.session_token()),
        ("req_addressee", request.target.username.as_str()),
        ("req_subject", request.subject()),
        ("req_message", request.body()),
        ("submit", "Submit"),
    ];

    fields
        .iter()
        .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Decides what a compose-form response means for the attempt.
pub fn classify_response(status: StatusCode, body: &str) -> AttemptOutcome {
    if let Some(messages) = extract_post_errors(body) {
        return AttemptOutcome::TerminalFailure(messages);
    }

    if status.is_success() {
        AttemptOutcome::Success
    } else {
        AttemptOutcome::RetryableFailure(format!("server responded with {status}"))
    }
}

/// Returns the forum's validation messages if the page reports a post error.
///
/// Messages are taken verbatim from `#posterror .error-list strong`. When the
/// marker is present but lists nothing, the marker's own text is used so the
/// rejection is never reported without a reason.
pub fn extract_post_errors(html: &str) -> Option<Vec<String>> {
    let document = Html::parse_document(html);
    let marker_selector = Selector::parse("#posterror").ok()?;
    let message_selector = Selector::parse(".error-list strong").ok()?;

    let marker = document.select(&marker_selector).next()?;

    let messages: Vec<String> = marker
        .select(&message_selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();

    if !messages.is_empty() {
        return Some(messages);
    }

    let fallback = marker
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Some(vec![if fallback.is_empty() {
        "message rejected by forum".to_string()
    } else {
        fallback
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DispatchSession, Winner};

    const REJECTED: &str = r#"
        <html><body>
          <div id="posterror" class="block">
            <h2><span>Post errors</span></h2>
            <div class="box"><div class="inbox error-info">
              <p>The following errors need to be corrected before the message can be posted:</p>
              <ul class="error-list">
                <li><strong>Inbox full</strong></li>
                <li><strong>Message too long</strong></li>
              </ul>
            </div></div>
          </div>
        </body></html>"#;

    #[test]
    fn form_body_is_url_encoded() {
        let winner = Winner {
            username: "Tom & Jerry".into(),
            id: 9,
        };
        let session = DispatchSession::new("tok/en=", "You won!", "Congrats\nline two");
        let request = NotificationRequest {
            target: &winner,
            session: &session,
        };

        assert_eq!(
            encode_form(&request),
            "csrf_hash=tok%2Fen%3D&req_addressee=Tom%20%26%20Jerry\
             &req_subject=You%20won%21&req_message=Congrats%0Aline%20two&submit=Submit"
        );
    }

    #[test]
    fn validation_errors_are_terminal() {
        assert_eq!(
            classify_response(StatusCode::OK, REJECTED),
            AttemptOutcome::TerminalFailure(vec![
                "Inbox full".to_string(),
                "Message too long".to_string()
            ])
        );
    }

    #[test]
    fn validation_errors_win_over_error_status() {
        assert!(matches!(
            classify_response(StatusCode::BAD_REQUEST, REJECTED),
            AttemptOutcome::TerminalFailure(_)
        ));
    }

    #[test]
    fn marker_without_list_still_carries_a_reason() {
        let html = r#"<div id="posterror"><p>Flood protection</p></div>"#;
        assert_eq!(
            extract_post_errors(html),
            Some(vec!["Flood protection".to_string()])
        );
    }

    #[test]
    fn plain_success_page() {
        let html = "<html><body><p>Message sent. Redirecting...</p></body></html>";
        assert_eq!(classify_response(StatusCode::OK, html), AttemptOutcome::Success);
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(matches!(
            classify_response(StatusCode::SERVICE_UNAVAILABLE, ""),
            AttemptOutcome::RetryableFailure(_)
        ));
    }
}
