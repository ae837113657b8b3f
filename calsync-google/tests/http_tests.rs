//! Connector behaviour against a mock Calendar API and token endpoint.

use std::fs;
use std::net::TcpListener;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use calsync_core::{BackendSection, Connector, ConnectorError, EventId, LocalEvent};
use calsync_google::wire::GoogleCalendar;
use calsync_google::{GoogleCalendarConnector, GoogleConfig, Session};

/// The temp dir holds the credentials and token file; keep it alive for the test.
fn fixture(
    server: &MockServer,
    stored: Option<Session>,
    redirect_port: u16,
) -> (TempDir, GoogleCalendarConnector) {
    let dir = TempDir::new().expect("dir");
    let credentials = dir.path().join("credentials.json");
    let secrets = json!({
        "installed": {
            "client_id": "client.apps",
            "client_secret": "s3cret",
            "token_uri": format!("{}/token", server.uri())
        }
    });
    fs::write(&credentials, secrets.to_string()).expect("write secrets");

    let section: BackendSection = [
        ("credentials_file", credentials.to_string_lossy().into_owned()),
        ("api_base", server.uri()),
        ("redirect_port", redirect_port.to_string()),
    ]
    .into_iter()
    .collect();
    let config =
        GoogleConfig::from_section(&section, dir.path(), &dir.path().join("data")).expect("config");
    if let Some(session) = stored {
        session.save(&config.token_file).expect("save token");
    }
    (dir, GoogleCalendarConnector::new(config).expect("connector"))
}

fn token_file(connector: &GoogleCalendarConnector) -> PathBuf {
    connector.config().token_file.clone()
}

fn session(access_token: &str, refresh_token: Option<&str>, valid_for: Duration) -> Session {
    Session {
        access_token: access_token.into(),
        refresh_token: refresh_token.map(Into::into),
        expires_at: Utc::now() + valid_for,
    }
}

fn fresh_session() -> Option<Session> {
    Some(session("ya29.good", Some("1//refresh"), Duration::hours(1)))
}

fn guild() -> GoogleCalendar {
    GoogleCalendar {
        id: "cal".into(),
        summary: "Guild".into(),
    }
}

fn raid(id: i64) -> LocalEvent {
    LocalEvent {
        id: EventId(id),
        title: "Raid".into(),
        start_time: 1_900_000_000,
        end_time: 1_900_003_600,
        creator: "Thrall".into(),
        description: "Bring flasks".into(),
    }
}

/// ureq blocks, so connector calls run on the blocking pool.
async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.expect("blocking task")
}

#[tokio::test]
async fn create_conflict_overwrites_the_deleted_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendars/cal/events"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"error": {"code": 409}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/calendars/cal/events/00042"))
        .and(body_string_contains("\"status\":\"confirmed\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "00042"})))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, mut connector) = fixture(&server, fresh_session(), 8080);
    let result = blocking(move || connector.create_event(&guild(), &raid(42))).await;
    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn get_event_is_none_when_gone_or_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendars/cal/events/00001"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendars/cal/events/00002"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendars/cal/events/00003"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "00003", "status": "cancelled"})),
        )
        .mount(&server)
        .await;

    let (_dir, mut connector) = fixture(&server, fresh_session(), 8080);
    let found = blocking(move || {
        [1, 2, 3]
            .into_iter()
            .map(|id| connector.get_event(&guild(), &raid(id)))
            .collect::<Vec<_>>()
    })
    .await;
    for result in found {
        assert_eq!(result.expect("get_event"), None);
    }
}

#[tokio::test]
async fn removing_an_already_deleted_event_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/calendars/cal/events/00007"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, mut connector) = fixture(&server, fresh_session(), 8080);
    let remote: calsync_google::wire::GoogleEvent =
        serde_json::from_value(json!({"id": "00007", "summary": "Raid"})).expect("event");
    let result = blocking(move || connector.remove_event(&guild(), &remote)).await;
    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn listing_follows_pages_and_drops_cancelled_events() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendars/cal/events"))
        .and(query_param("pageToken", "p2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"items": [{"id": "00003"}]})),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendars/cal/events"))
        .and(query_param("singleEvents", "true"))
        .and(query_param("orderBy", "startTime"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextPageToken": "p2",
            "items": [
                {"id": "00001", "status": "confirmed"},
                {"id": "00002", "status": "cancelled"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, mut connector) = fixture(&server, fresh_session(), 8080);
    let events = blocking(move || connector.get_events(&guild(), 7))
        .await
        .expect("get_events");
    let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["00001", "00003"]);
}

#[tokio::test]
async fn rejected_token_is_refreshed_and_the_call_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .and(header("Authorization", "Bearer revoked"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "ya29.fresh", "expires_in": 3600})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .and(header("Authorization", "Bearer ya29.fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "cal", "summary": "Guild"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let stored = session("revoked", Some("1//refresh"), Duration::hours(1));
    let (_dir, mut connector) = fixture(&server, Some(stored), 8080);
    let token_file = token_file(&connector);
    let found = blocking(move || connector.find_calendar("Guild"))
        .await
        .expect("find_calendar");
    assert_eq!(found, Some(guild()));

    let saved = Session::load(&token_file).expect("load").expect("token file");
    assert_eq!(saved.access_token, "ya29.fresh");
    assert_eq!(saved.refresh_token.as_deref(), Some("1//refresh"));
}

#[tokio::test]
async fn unauthorized_call_without_refresh_token_expires_the_stored_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let stored = session("stale", None, Duration::hours(1));
    let (_dir, mut connector) = fixture(&server, Some(stored), 8080);
    let token_file = token_file(&connector);
    let err = blocking(move || connector.find_calendar("Guild"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Auth(_)), "{err:?}");

    let saved = Session::load(&token_file).expect("load").expect("token file");
    assert_eq!(saved.access_token, "stale");
    assert!(!saved.is_fresh(Utc::now()));
}

#[tokio::test]
async fn revoked_refresh_token_falls_back_to_consent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .expect(1)
        .mount(&server)
        .await;

    // Hold the redirect port so the consent flow fails fast instead of waiting.
    let occupied = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = occupied.local_addr().expect("addr").port();

    let stored = session("expired", Some("1//revoked"), Duration::hours(-1));
    let (_dir, mut connector) = fixture(&server, Some(stored), port);
    let err = blocking(move || connector.ensure_authenticated())
        .await
        .unwrap_err();
    match err {
        ConnectorError::Auth(reason) => assert!(reason.contains("cannot listen"), "{reason}"),
        other => panic!("expected an auth error, got {other:?}"),
    }
    drop(occupied);
}

#[tokio::test]
async fn access_check_makes_one_authenticated_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .and(query_param("maxResults", "1"))
        .and(header("Authorization", "Bearer ya29.good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, mut connector) = fixture(&server, fresh_session(), 8080);
    blocking(move || connector.verify_access())
        .await
        .expect("verify_access");
}

#[tokio::test]
async fn transient_server_errors_stay_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendars/cal/events"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .mount(&server)
        .await;

    let (_dir, mut connector) = fixture(&server, fresh_session(), 8080);
    let err = blocking(move || connector.get_events(&guild(), 7))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Http { status: 503, .. }), "{err:?}");
    assert!(!err.is_fatal());
}
