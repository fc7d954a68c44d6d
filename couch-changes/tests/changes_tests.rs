//! Integration tests for the changes API.
//!
//! These tests start a real HTTP server that mimics a document store's
//! `_changes` endpoint and watch it through the reqwest transport.

use couch_changes::{ChangesOptions, Connection, FeedError, Notifier, PollerState, Since};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use warp::http::StatusCode;
use warp::Filter;

/// Requests seen by the test server as `(database, raw query)`.
type RequestLog = Arc<Mutex<Vec<(String, String)>>>;

/// Start a server for three databases:
/// - `albums` returns sequence 1, then 2, then holds the poll open
/// - `locked` rejects every request with 401
/// - `stalled` never answers
async fn start_server() -> (SocketAddr, RequestLog) {
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));

    let raw_query = warp::query::raw()
        .or(warp::any().map(String::new))
        .unify();

    let routes = warp::get()
        .and(warp::path!(String / "_changes"))
        .and(raw_query)
        .and_then({
            let log = Arc::clone(&log);
            move |db: String, query: String| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().push((db.clone(), query.clone()));
                    Ok::<_, Infallible>(changes_reply(&db, &query).await)
                }
            }
        });

    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    (addr, log)
}

async fn changes_reply(db: &str, query: &str) -> warp::reply::WithStatus<warp::reply::Json> {
    let since = url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == "since")
        .map(|(_, value)| value.into_owned());

    match (db, since.as_deref()) {
        ("albums", None) => ok(json!({
            "results": [{"id": "dark-side", "seq": 1, "changes": [{"rev": "1-a"}]}],
            "last_seq": 1
        })),
        ("albums", Some("1")) => ok(json!({
            "results": [{"id": "abbey-road", "seq": 2, "changes": [{"rev": "1-b"}]}],
            "last_seq": 2
        })),
        ("locked", _) => warp::reply::with_status(
            warp::reply::json(&json!({"error": "unauthorized", "reason": "Name or password is incorrect."})),
            StatusCode::UNAUTHORIZED,
        ),
        _ => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            ok(json!({"results": [], "last_seq": since}))
        }
    }
}

fn ok(body: Value) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(&body), StatusCode::OK)
}

type Delivery = (Option<FeedError>, Value);

fn channel_notifier() -> (Notifier, mpsc::UnboundedReceiver<Delivery>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let notifier = Notifier::callback(move |notification| {
        let _ = tx.send((notification.error.cloned(), notification.result.clone()));
    });
    (notifier, rx)
}

async fn next_delivery(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Timeout waiting for notification")
        .expect("Notifier channel closed")
}

fn connect(addr: SocketAddr) -> Connection {
    Connection::new(&format!("http://{addr}")).expect("Failed to create connection")
}

#[tokio::test]
async fn test_long_poll_follows_sequence() {
    let (addr, log) = start_server().await;
    let connection = connect(addr);
    let albums = connection.database("albums").unwrap();
    let (notifier, mut rx) = channel_notifier();

    albums
        .changes(
            ChangesOptions::long_poll().with_param("include_docs", true),
            notifier,
        )
        .await
        .unwrap();

    let (error, first) = next_delivery(&mut rx).await;
    assert!(error.is_none());
    assert_eq!(first["last_seq"], 1);
    assert_eq!(first["results"][0]["id"], "dark-side");

    let (error, second) = next_delivery(&mut rx).await;
    assert!(error.is_none());
    assert_eq!(second["results"][0]["id"], "abbey-road");

    // Third poll is held open by the server
    timeout(Duration::from_secs(5), async {
        while log.lock().len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Third poll was not issued");

    let poller = albums.changes_poller().unwrap();
    assert_eq!(poller.since(), Some(Since::from(2u64)));
    assert_eq!(poller.state(), PollerState::AwaitingResponse);

    let queries: Vec<String> = log.lock().iter().map(|(_, query)| query.clone()).collect();
    assert_eq!(
        queries,
        vec![
            "include_docs=true&feed=longpoll".to_string(),
            "include_docs=true&feed=longpoll&since=1".to_string(),
            "include_docs=true&feed=longpoll&since=2".to_string(),
        ]
    );

    assert!(albums.stop_changes());
    assert!(albums.changes_poller().is_none());
}

#[tokio::test]
async fn test_long_poll_resumes_from_given_since() {
    let (addr, _log) = start_server().await;
    let connection = connect(addr);
    let albums = connection.database("albums").unwrap();
    let (notifier, mut rx) = channel_notifier();

    albums
        .watch_changes(ChangesOptions::long_poll().with_since(1u64), notifier)
        .unwrap();

    let (_, body) = next_delivery(&mut rx).await;
    assert_eq!(body["last_seq"], 2);
    albums.stop_changes();
}

#[tokio::test]
async fn test_unauthorized_stops_polling() {
    let (addr, log) = start_server().await;
    let connection = connect(addr);
    let locked = connection.database("locked").unwrap();
    let (notifier, mut rx) = channel_notifier();

    locked
        .watch_changes(ChangesOptions::long_poll(), notifier)
        .unwrap();

    let (error, body) = next_delivery(&mut rx).await;
    assert_eq!(error, Some(FeedError::Unauthorized { status: 401 }));
    assert_eq!(body["error"], "unauthorized");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let poller = locked.changes_poller().expect("feed stays registered");
    assert_eq!(poller.state(), PollerState::Stopped);
    assert_eq!(log.lock().len(), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_watchdog_reissues_stalled_poll() {
    let (addr, log) = start_server().await;
    let connection = connect(addr);
    let stalled = connection.database("stalled").unwrap();
    let (notifier, mut rx) = channel_notifier();

    stalled
        .watch_changes(
            ChangesOptions::long_poll().with_poll_interval(Duration::from_millis(100)),
            notifier,
        )
        .unwrap();

    timeout(Duration::from_secs(5), async {
        while log.lock().len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Stalled poll was not reissued");

    let poller = stalled.changes_poller().unwrap();
    assert!(poller.stats().watchdog_expirations >= 2);
    assert!(poller.since().is_none());
    assert!(rx.try_recv().is_err(), "watchdog expiry is silent");

    stalled.stop_changes();
}

#[tokio::test]
async fn test_single_request() {
    let (addr, log) = start_server().await;
    let connection = connect(addr);
    let albums = connection.database("albums").unwrap();
    let (notifier, mut rx) = channel_notifier();

    albums
        .changes(ChangesOptions::once().with_param("include_docs", true), notifier)
        .await
        .unwrap();

    let (error, body) = rx.try_recv().expect("delivered before returning");
    assert!(error.is_none());
    assert_eq!(body["last_seq"], 1);
    assert_eq!(
        *log.lock(),
        vec![("albums".to_string(), "include_docs=true".to_string())]
    );
    assert!(connection.registry().is_empty());
}

#[tokio::test]
async fn test_unreachable_store_reports_transport_error() {
    // Bind and drop a listener to get a port nothing is serving on
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let connection = connect(addr);
    let albums = connection.database("albums").unwrap();
    let (notifier, mut rx) = channel_notifier();

    albums.changes(ChangesOptions::once(), notifier).await.unwrap();

    let (error, body) = rx.try_recv().unwrap();
    assert!(matches!(error, Some(FeedError::Transport(_))));
    assert_eq!(body, Value::Null);
}
