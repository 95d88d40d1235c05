//! End-to-end scenarios driving the facade through a full
//! authenticate -> register -> select -> serve cycle against mocked
//! Cognit Frontend and Edge Cluster Frontend servers.

use std::time::Duration;

use cognit_core::call::Language;
use cognit_core::config::Config;
use cognit_core::facade::DeviceRuntime;
use cognit_core::requirements::Requirements;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

fn config(cfa_uri: &str) -> Config {
    serde_json::from_value(serde_json::json!({
        "cognit_frontend_engine_endpoint": format!("{cfa_uri}/"),
        "cognit_frontend_engine_usr": "device",
        "cognit_frontend_engine_pwd": "hunter2",
        "queue_bound": 8,
        "probe_period_ms": 20_000,
        "tick_ms": 15,
    }))
    .expect("well-formed config fixture")
}

#[tokio::test(flavor = "multi_thread")]
async fn happy_path_sync_call_round_trips_through_the_fabric() {
    let cfa = MockServer::start().await;
    let eca = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/authenticate"))
        .respond_with(ResponseTemplate::new(200).set_body_json("device-token"))
        .mount(&cfa)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/app_requirements"))
        .respond_with(ResponseTemplate::new(200).set_body_json(1))
        .mount(&cfa)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/app_requirements/1/ec_fe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "NAME": "cluster-a", "TEMPLATE": { "EDGE_CLUSTER_FRONTEND": eca.uri() } },
        ])))
        .mount(&cfa)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/daas/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(77))
        .mount(&cfa)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/functions/77/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "RET_CODE": "SUCCESS",
            "RESULT": 30,
            "ERR": null,
        })))
        .mount(&eca)
        .await;

    let runtime = DeviceRuntime::new(config(&cfa.uri()));
    runtime
        .init(Requirements::default())
        .expect("supervisor should start from a freshly constructed runtime");

    let function = runtime.register_function(Language::Py, "def mul(a, b): return a * b".into());

    let response = tokio::time::timeout(
        Duration::from_secs(10),
        runtime.call(function, vec![serde_json::json!(5), serde_json::json!(6)], None),
    )
    .await
    .expect("call should complete before the test timeout");

    assert_eq!(response.ret_code, cognit_core::call::RetCode::Success);
    assert_eq!(response.result, Some(serde_json::json!(30)));

    runtime.stop().await.expect("a running supervisor should stop cleanly");
}

#[tokio::test]
async fn call_before_init_is_reported_through_the_response_not_a_panic() {
    let cfa = MockServer::start().await;
    let runtime = DeviceRuntime::new(config(&cfa.uri()));
    let function = runtime.register_function(Language::C, "int f(void);".into());

    let response = runtime.call(function, vec![], None).await;
    assert_eq!(response.ret_code, cognit_core::call::RetCode::Error);
    assert!(response.err.unwrap().contains("not running"));
}

#[tokio::test]
async fn init_twice_is_rejected() {
    let cfa = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/authenticate"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&cfa)
        .await;

    let runtime = DeviceRuntime::new(config(&cfa.uri()));
    runtime.init(Requirements::default()).unwrap();
    let second = runtime.init(Requirements::default());
    assert!(second.is_err());
    runtime.stop().await.unwrap();
}

#[tokio::test]
async fn stop_without_init_is_rejected() {
    let cfa = MockServer::start().await;
    let runtime = DeviceRuntime::new(config(&cfa.uri()));
    assert!(runtime.stop().await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn requirements_swap_is_applied_without_losing_the_session() {
    let cfa = MockServer::start().await;
    let eca = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/authenticate"))
        .respond_with(ResponseTemplate::new(200).set_body_json("device-token"))
        .mount(&cfa)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/app_requirements"))
        .respond_with(ResponseTemplate::new(200).set_body_json(1))
        .mount(&cfa)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/app_requirements/1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&cfa)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/app_requirements/1/ec_fe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "NAME": "cluster-a", "TEMPLATE": { "EDGE_CLUSTER_FRONTEND": eca.uri() } },
        ])))
        .mount(&cfa)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/daas/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(5))
        .mount(&cfa)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/functions/5/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "RET_CODE": "SUCCESS",
            "RESULT": 1,
            "ERR": null,
        })))
        .mount(&eca)
        .await;

    let runtime = DeviceRuntime::new(config(&cfa.uri()));
    runtime.init(Requirements::default()).expect("runtime should start");
    let function = runtime.register_function(Language::Py, "def f(): return 1".into());

    let first = tokio::time::timeout(Duration::from_secs(10), runtime.call(function, vec![], None))
        .await
        .expect("first call should complete before the test timeout");
    assert_eq!(first.ret_code, cognit_core::call::RetCode::Success);

    runtime
        .update_requirements(Requirements {
            flavour: Some("EnergyV2".into()),
            ..Default::default()
        })
        .expect("swap to a differing requirements set should be accepted");

    let second = tokio::time::timeout(Duration::from_secs(10), runtime.call(function, vec![], None))
        .await
        .expect("call after the swap should complete before the test timeout");
    assert_eq!(second.ret_code, cognit_core::call::RetCode::Success);

    runtime.stop().await.expect("a running supervisor should stop cleanly");
}
