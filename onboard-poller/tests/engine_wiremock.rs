//! End-to-end tests: a polling engine with JSON groups against a mock portal

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use onboard_poller::engine::{EngineConfig, EngineError, PollingEngine};
use onboard_poller::sources::{DataGroup, JsonGroups};
use onboard_poller::transport::{ConnectionError, TransportConfig};

type Engine = Arc<PollingEngine<JsonGroups>>;

fn engine_for(uri: &str, groups: JsonGroups) -> Engine {
    let config = EngineConfig::default()
        .with_period(Duration::from_millis(100))
        .with_ticks_per_period(5)
        .with_start_timeout(Duration::from_secs(5));
    let transport = TransportConfig::new(uri).with_max_retries(0);
    Arc::new(PollingEngine::with_config(transport, config, groups).unwrap())
}

/// `start()` blocks, so run it off the async test's worker threads.
async fn start(engine: &Engine) -> Result<(), EngineError> {
    let engine = Arc::clone(engine);
    tokio::task::spawn_blocking(move || engine.start())
        .await
        .unwrap()
}

async fn stop(engine: &Engine) {
    let engine = Arc::clone(engine);
    tokio::task::spawn_blocking(move || engine.stop())
        .await
        .unwrap();
}

async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

fn cached(engine: &Engine, key: &str) -> Value {
    engine.get(key, Value::Null)
}

async fn mount_json(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn polls_groups_into_the_cache() {
    let server = MockServer::start().await;
    mount_json(&server, "/api1/rs/status", json!({"speed": 80})).await;
    mount_json(&server, "/api1/rs/tripInfo/trip", json!({"trip": {"vzn": "123"}})).await;

    let groups = JsonGroups::parse("status=api1/rs/status,trip=api1/rs/tripInfo/trip").unwrap();
    let engine = engine_for(&server.uri(), groups);

    start(&engine).await.unwrap();
    assert!(engine.is_connected());
    assert_eq!(cached(&engine, "status")["speed"], 80);
    assert_eq!(cached(&engine, "trip")["trip"]["vzn"], "123");
    assert_eq!(engine.cache().keys(), ["status", "trip"]);

    stop(&engine).await;
    assert!(!engine.is_running());
}

#[tokio::test(flavor = "multi_thread")]
async fn portal_error_fails_start() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let groups = JsonGroups::new([DataGroup::new("status", "api1/rs/status")]);
    let engine = engine_for(&server.uri(), groups);

    let err = start(&engine).await.unwrap_err();
    match err {
        EngineError::InitialConnection { endpoint, cause } => {
            assert_eq!(endpoint, server.uri());
            assert!(matches!(
                cause,
                Some(ConnectionError::Api { status: 500, .. })
            ));
        }
        other => panic!("expected InitialConnection, got {other:?}"),
    }
    assert!(!engine.is_connected());
    assert!(engine.cache().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_portal_fails_start_quickly() {
    let groups = JsonGroups::new([DataGroup::new("status", "api1/rs/status")]);
    let engine = engine_for("http://127.0.0.1:9", groups);

    let started = Instant::now();
    let err = start(&engine).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(err.to_string().contains("on-board Wi-Fi"));
    assert!(!engine.is_connected());
}

#[tokio::test(flavor = "multi_thread")]
async fn outage_serves_last_values_then_recovers() {
    let server = MockServer::start().await;
    mount_json(&server, "/api1/rs/status", json!({"speed": 80})).await;

    let groups = JsonGroups::new([DataGroup::new("status", "api1/rs/status")]);
    let engine = engine_for(&server.uri(), groups);
    start(&engine).await.unwrap();

    // The portal goes away.
    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(eventually(Duration::from_secs(2), || engine.stats().failures >= 3).await);
    assert!(engine.is_running());
    assert!(engine.is_connected());
    assert_eq!(cached(&engine, "status")["speed"], 80);

    // And comes back with new data.
    server.reset().await;
    mount_json(&server, "/api1/rs/status", json!({"speed": 160})).await;

    assert!(
        eventually(Duration::from_secs(2), || cached(&engine, "status")["speed"] == 160).await
    );
    assert!(engine.is_connected());

    stop(&engine).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn once_groups_are_fetched_once_per_connection() {
    let server = MockServer::start().await;
    mount_json(&server, "/api1/rs/status", json!({"speed": 80})).await;
    Mock::given(method("GET"))
        .and(path("/bap/api/bap-service-status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bapInstalled": true})))
        .expect(2)
        .mount(&server)
        .await;

    let groups =
        JsonGroups::parse("status=api1/rs/status,bap!=bap/api/bap-service-status").unwrap();
    let engine = engine_for(&server.uri(), groups);

    start(&engine).await.unwrap();
    assert!(eventually(Duration::from_secs(2), || engine.stats().cycles >= 5).await);
    assert_eq!(cached(&engine, "bap")["bapInstalled"], true);

    // A reset forgets what was fetched.
    let resetting = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || resetting.reset())
        .await
        .unwrap();
    assert!(engine.cache().is_empty());

    start(&engine).await.unwrap();
    assert!(eventually(Duration::from_secs(2), || engine.stats().cycles >= 3).await);
    assert_eq!(cached(&engine, "bap")["bapInstalled"], true);

    stop(&engine).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_documents_keep_previous_value() {
    let server = MockServer::start().await;
    mount_json(&server, "/api1/rs/status", json!({"speed": 80})).await;
    Mock::given(method("GET"))
        .and(path("/api1/rs/tripInfo/connection"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"train": "RE 5"}])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api1/rs/tripInfo/connection"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    mount_json(&server, "/api1/rs/tripInfo/trip", json!([])).await;

    let groups = JsonGroups::parse(
        "status=api1/rs/status,connections?=api1/rs/tripInfo/connection,trip=api1/rs/tripInfo/trip",
    )
    .unwrap();
    let engine = engine_for(&server.uri(), groups);

    start(&engine).await.unwrap();
    assert!(eventually(Duration::from_secs(2), || engine.stats().cycles >= 3).await);

    assert_eq!(cached(&engine, "connections"), json!([{"train": "RE 5"}]));
    // Without the flag an empty document replaces the old one.
    assert_eq!(cached(&engine, "trip"), json!([]));

    stop(&engine).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_group_keeps_earlier_groups_fresh() {
    let server = MockServer::start().await;
    mount_json(&server, "/api1/rs/status", json!({"speed": 80})).await;
    mount_json(&server, "/api1/rs/tripInfo/trip", json!({"trip": {}})).await;

    let groups = JsonGroups::parse("status=api1/rs/status,trip=api1/rs/tripInfo/trip").unwrap();
    let engine = engine_for(&server.uri(), groups);
    start(&engine).await.unwrap();

    server.reset().await;
    mount_json(&server, "/api1/rs/status", json!({"speed": 120})).await;
    Mock::given(method("GET"))
        .and(path("/api1/rs/tripInfo/trip"))
        .respond_with(ResponseTemplate::new(501))
        .mount(&server)
        .await;

    assert!(
        eventually(Duration::from_secs(2), || cached(&engine, "status")["speed"] == 120).await
    );
    assert!(eventually(Duration::from_secs(2), || engine.stats().failures >= 2).await);
    assert_eq!(cached(&engine, "trip"), json!({"trip": {}}));

    stop(&engine).await;
}
