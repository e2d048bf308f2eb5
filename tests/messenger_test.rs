//! Integration tests for ForumMessenger using wiremock

use std::time::Duration;

use giveaway_picker::config::{Config, seeded_jar};
use giveaway_picker::messenger::{ForumMessenger, USER_AGENT};
use giveaway_picker::models::{AttemptOutcome, DispatchSession, NotificationRequest, Winner};
use giveaway_picker::scraper::Scraper;
use giveaway_picker::traits::Notifier;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn winner() -> Winner {
    Winner {
        username: "Alice".into(),
        id: 11,
    }
}

fn session() -> DispatchSession {
    DispatchSession::new("abc123", "You won", "Congratulations!")
}

fn messenger(server: &MockServer, timeout: Duration) -> ForumMessenger {
    ForumMessenger::with_endpoint(
        format!("{}/pmsnew.php?mdl=post", server.uri()),
        seeded_jar(&server.uri(), Some("pun_cookie=session")).unwrap(),
        timeout,
    )
    .unwrap()
}

fn cookie_header(request: &wiremock::Request) -> String {
    request
        .headers
        .get("cookie")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// The compose form is posted with every field and the session cookie
#[tokio::test]
async fn test_posts_compose_form() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pmsnew.php"))
        .and(query_param("mdl", "post"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(header("cookie", "pun_cookie=session"))
        .and(body_string_contains("csrf_hash=abc123"))
        .and(body_string_contains("req_addressee=Alice"))
        .and(body_string_contains("req_subject=You%20won"))
        .and(body_string_contains("req_message=Congratulations%21"))
        .and(body_string_contains("submit=Submit"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>Message sent</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let target = winner();
    let session = session();
    let outcome = messenger(&server, Duration::from_secs(5))
        .send(&NotificationRequest {
            target: &target,
            session: &session,
        })
        .await;

    assert_eq!(outcome, AttemptOutcome::Success);
}

/// A session cookie the forum rotates is what the next POST carries
#[tokio::test]
async fn test_rotated_session_cookie_is_sent_next() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("cookie", "pun_cookie=session"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "pun_cookie=rotated; Path=/")
                .set_body_string("<p>Message sent</p>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(header("cookie", "pun_cookie=rotated"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>Message sent</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let messenger = messenger(&server, Duration::from_secs(5));
    let target = winner();
    let session = session();
    let request = NotificationRequest {
        target: &target,
        session: &session,
    };

    assert_eq!(messenger.send(&request).await, AttemptOutcome::Success);
    assert_eq!(messenger.send(&request).await, AttemptOutcome::Success);

    let received = server.received_requests().await.unwrap();
    let cookies: Vec<String> = received.iter().map(cookie_header).collect();
    assert_eq!(cookies, ["pun_cookie=session", "pun_cookie=rotated"]);
}

/// Cookies set while fetching the compose page reach the messenger's POST
#[tokio::test]
async fn test_scraper_and_messenger_share_the_session() {
    let server = MockServer::start().await;
    let compose_page = r#"<form><input type="hidden" name="csrf_hash" value="fresh"></form>"#;

    Mock::given(method("GET"))
        .and(path("/pmsnew.php"))
        .and(header("cookie", "pun_cookie=session"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "pun_cookie=rotated; Path=/")
                .set_body_string(compose_page),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/pmsnew.php"))
        .and(header("cookie", "pun_cookie=rotated"))
        .and(body_string_contains("csrf_hash=fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>Message sent</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let config = Config::from_lookup(|key| match key {
        "FORUM_BASE_URL" => Some(uri.clone()),
        "FORUM_COOKIE" => Some("pun_cookie=session".to_string()),
        _ => None,
    })
    .unwrap();
    let jar = config.session_jar().unwrap();

    let token = Scraper::new(&config, jar.clone())
        .unwrap()
        .fetch_csrf_token(&config.compose_url())
        .await
        .unwrap();
    assert_eq!(token, "fresh");

    let target = winner();
    let session = DispatchSession::new(token, "You won", "Congratulations!");
    let outcome = ForumMessenger::new(&config, jar)
        .unwrap()
        .send(&NotificationRequest {
            target: &target,
            session: &session,
        })
        .await;

    assert_eq!(outcome, AttemptOutcome::Success);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    assert!(received.iter().all(|request| {
        request
            .headers
            .get("user-agent")
            .is_some_and(|agent| agent == USER_AGENT)
    }));
}

/// Validation errors come back verbatim and are terminal
#[tokio::test]
async fn test_post_error_is_terminal() {
    let server = MockServer::start().await;
    let page = r#"<div id="posterror"><ul class="error-list">
        <li><strong>Alice's inbox is full.</strong></li>
    </ul></div>"#;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&server)
        .await;

    let target = winner();
    let session = session();
    let outcome = messenger(&server, Duration::from_secs(5))
        .send(&NotificationRequest {
            target: &target,
            session: &session,
        })
        .await;

    assert_eq!(
        outcome,
        AttemptOutcome::TerminalFailure(vec!["Alice's inbox is full.".to_string()])
    );
}

/// Server errors without a validation marker may be retried
#[tokio::test]
async fn test_server_error_is_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let target = winner();
    let session = session();
    let outcome = messenger(&server, Duration::from_secs(5))
        .send(&NotificationRequest {
            target: &target,
            session: &session,
        })
        .await;

    assert!(matches!(outcome, AttemptOutcome::RetryableFailure(_)));
}

/// A hung request resolves as retryable once the timeout passes
#[tokio::test]
async fn test_timeout_is_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let target = winner();
    let session = session();
    let outcome = messenger(&server, Duration::from_millis(200))
        .send(&NotificationRequest {
            target: &target,
            session: &session,
        })
        .await;

    assert_eq!(
        outcome,
        AttemptOutcome::RetryableFailure("request timed out".to_string())
    );
}

/// An endpoint whose server has gone away is retryable, not an error
#[tokio::test]
async fn test_unreachable_endpoint_is_retryable() {
    let server = MockServer::start().await;
    let endpoint = format!("{}/pmsnew.php?mdl=post", server.uri());
    drop(server);

    let target = winner();
    let session = session();
    let jar = seeded_jar("http://127.0.0.1", None).unwrap();
    let outcome = ForumMessenger::with_endpoint(endpoint, jar, Duration::from_secs(2))
        .unwrap()
        .send(&NotificationRequest {
            target: &target,
            session: &session,
        })
        .await;

    assert!(matches!(outcome, AttemptOutcome::RetryableFailure(_)));
}
