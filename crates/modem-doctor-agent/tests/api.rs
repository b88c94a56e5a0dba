//! Status API tests through axum's tower service interface (no TCP).

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use modem_doctor_agent::simulate::{SimulatedLink, SimulatedModem};
use modem_doctor_agent::{portal, AgentState};
use modem_doctor_common::config::WatchdogConfig;
use modem_doctor_engine::test_util::ScriptedProbe;
use modem_doctor_engine::{ProbeResult, Watchdog};

type State = AgentState<ScriptedProbe, SimulatedModem>;

fn test_state(probe: ScriptedProbe) -> Arc<State> {
    let link = Arc::new(SimulatedLink::default());
    let watchdog = Watchdog::new(WatchdogConfig::default(), probe, SimulatedModem::new(link));
    Arc::new(AgentState::new(watchdog, true))
}

/// Helper: parse JSON response body.
async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        let text = String::from_utf8_lossy(&bytes);
        panic!("not valid JSON: {text}");
    })
}

async fn get(app: &Router, uri: &str) -> serde_json::Value {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200, "GET {uri}");
    json_body(resp).await
}

async fn post(app: &Router, uri: &str) -> serde_json::Value {
    let req = axum::http::Request::builder()
        .uri(uri)
        .method("POST")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200, "POST {uri}");
    json_body(resp).await
}

#[tokio::test]
async fn status_before_start_has_defaults() {
    let state = test_state(ScriptedProbe::new());
    let app = portal::router(state);

    let body = get(&app, "/api/status").await;
    assert_eq!(body["watchdog"]["running"], false);
    assert_eq!(body["watchdog"]["enabled"], false);
    assert_eq!(body["watchdog"]["last_action"], "none");
    assert_eq!(body["watchdog"]["last_check"], 0);
    assert_eq!(body["watchdog"]["escalation_level"], 0);
    assert!(body["modem"]["temperature"].is_null());
    assert!(body["signal"]["rsrp"].is_null());
}

#[tokio::test]
async fn log_is_empty_before_start() {
    let app = portal::router(test_state(ScriptedProbe::new()));
    let body = get(&app, "/api/log").await;
    assert_eq!(body["log"], serde_json::json!([]));
}

#[tokio::test(start_paused = true)]
async fn enable_then_disable_round_trip() {
    let state = test_state(ScriptedProbe::new());
    let app = portal::router(state.clone());

    let body = post(&app, "/api/watchdog/enable").await;
    assert_eq!(body["changed"], true);
    let body = post(&app, "/api/watchdog/enable").await;
    assert_eq!(body["changed"], false);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let body = get(&app, "/api/status").await;
    assert_eq!(body["watchdog"]["running"], true);
    assert_eq!(body["watchdog"]["enabled"], true);
    assert_eq!(body["watchdog"]["last_action"], "ok");
    assert_eq!(body["watchdog"]["last_avg_latency"], 30.0);
    assert_eq!(body["modem"]["model"], "RM520N-GL");
    assert!(body["watchdog"]["last_check"].as_i64().unwrap() > 0);
    assert!(body["watchdog"]["last_action_time"].as_i64().unwrap() > 0);

    let body = post(&app, "/api/watchdog/disable").await;
    assert_eq!(body["changed"], true);
    let body = get(&app, "/api/status").await;
    assert_eq!(body["watchdog"]["running"], false);

    let log = get(&app, "/api/log").await;
    let lines = log["log"].as_array().unwrap();
    assert!(lines[0].as_str().unwrap().contains("Watchdog started"));
    assert!(lines
        .last()
        .and_then(|l| l.as_str())
        .is_some_and(|l| l.ends_with("Watchdog stopped")));
}

#[tokio::test(start_paused = true)]
async fn disable_waits_for_in_flight_escalation() {
    let probe = ScriptedProbe::new();
    probe.set_fallback(ProbeResult::down());
    let state = test_state(probe);
    let app = portal::router(state.clone());

    post(&app, "/api/watchdog/enable").await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    post(&app, "/api/watchdog/disable").await;

    let body = get(&app, "/api/status").await;
    assert_eq!(body["watchdog"]["running"], false);
    assert_eq!(body["watchdog"]["escalation_level"], 1);
    assert_eq!(body["watchdog"]["last_action"], "interface_restart");
}

#[tokio::test]
async fn log_lines_parameter_limits_tail() {
    let state = test_state(ScriptedProbe::new());
    for i in 0..50 {
        state.status.append_log(format!("line {i}"));
    }
    let app = portal::router(state);

    let body = get(&app, "/api/log?lines=5").await;
    let lines = body["log"].as_array().unwrap();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].as_str().unwrap().ends_with("line 45"));
    assert!(lines[4].as_str().unwrap().ends_with("line 49"));

    // Default is 30.
    let body = get(&app, "/api/log").await;
    assert_eq!(body["log"].as_array().unwrap().len(), 30);

    let body = get(&app, "/api/log?lines=0").await;
    assert_eq!(body["log"], serde_json::json!([]));
}

#[tokio::test]
async fn bad_lines_parameter_is_rejected() {
    let app = portal::router(test_state(ScriptedProbe::new()));
    let req = axum::http::Request::builder()
        .uri("/api/log?lines=many")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 400);
}
