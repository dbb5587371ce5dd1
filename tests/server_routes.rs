mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use healtrack::ids::ExecutionId;
use healtrack::server;
use healtrack_test_utils::builders::test_started;
use healtrack_test_utils::fake_executor::{FakeExecutor, RunnerScript};
use healtrack_test_utils::{TestEngine, quiet_options, start_engine};

type TestResult = Result<(), Box<dyn Error>>;

fn app() -> (TestEngine, Router) {
    let engine = start_engine(quiet_options(), |tx| {
        FakeExecutor::new(tx).with_script(
            "TC-1",
            RunnerScript::default().then(test_started(ExecutionId::new())),
        )
    });
    let router = server::router(engine.handle.clone());
    (engine, router)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

async fn send(
    router: &Router,
    request: Request<Body>,
) -> Result<(StatusCode, Vec<u8>), Box<dyn Error>> {
    let response = router.clone().oneshot(request).await?;
    let status = response.status();
    let body = with_timeout(to_bytes(response.into_body(), usize::MAX)).await?;
    Ok((status, body.to_vec()))
}

async fn send_json(
    router: &Router,
    request: Request<Body>,
) -> Result<(StatusCode, Value), Box<dyn Error>> {
    let (status, body) = send(router, request).await?;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    Ok((status, value))
}

async fn start(router: &Router) -> Result<String, Box<dyn Error>> {
    let (status, body) = send_json(
        router,
        post_json(
            "/api/v1/executions",
            json!({ "product": "shop", "testClass": "CheckoutTests", "testId": "TC-1" }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = body["data"]["executionId"]
        .as_str()
        .expect("execution id in response")
        .to_string();
    Ok(id)
}

#[tokio::test]
async fn health_reports_ok() -> TestResult {
    init_tracing();
    let (engine, router) = app();

    let (status, body) = send_json(&router, get("/api/v1/health")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");

    engine.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn started_execution_can_be_fetched() -> TestResult {
    init_tracing();
    let (engine, router) = app();

    let id = start(&router).await?;
    let (status, body) = send_json(&router, get(&format!("/api/v1/executions/{id}"))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["executionId"], id.as_str());
    assert_eq!(body["data"]["testKey"]["testId"], "TC-1");

    engine.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn bulk_start_returns_every_id() -> TestResult {
    init_tracing();
    let (engine, router) = app();

    let one = json!({ "product": "shop", "testClass": "CheckoutTests", "testId": "TC-1" });
    let (status, body) = send_json(
        &router,
        post_json("/api/v1/executions/bulk", json!([one.clone(), one])),
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["meta"]["total"], 2);
    assert_eq!(body["data"]["executionIds"].as_array().map(Vec::len), Some(2));

    engine.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn unknown_resources_are_404() -> TestResult {
    init_tracing();
    let (engine, router) = app();
    let missing = ExecutionId::new();

    let (status, body) = send_json(&router, get(&format!("/api/v1/executions/{missing}"))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"]["message"].as_str().is_some());

    let (status, _) = send(&router, get(&format!("/api/v1/executions/{missing}/events"))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &router,
        post_json(&format!("/api/v1/executions/{missing}/stop"), Value::Null),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, get("/api/v1/nothing-here")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, get("/api/v1/executions/not-a-uuid")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    engine.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn event_stream_ends_after_force_complete() -> TestResult {
    init_tracing();
    let (engine, router) = app();
    let id = start(&router).await?;

    let response = router
        .clone()
        .oneshot(get(&format!("/api/v1/executions/{id}/events")))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );

    let (status, _) = send(
        &router,
        post_json(&format!("/api/v1/executions/{id}/force-complete"), Value::Null),
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);

    let body = with_timeout(to_bytes(response.into_body(), usize::MAX)).await?;
    let text = String::from_utf8(body.to_vec())?;
    let types: Vec<String> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|data| serde_json::from_str::<Value>(data).ok())
        .filter_map(|event| event["type"].as_str().map(str::to_string))
        .collect();
    assert_eq!(types.first().map(String::as_str), Some("connected"));
    assert_eq!(types.last().map(String::as_str), Some("test_finished"));

    // The channel is closed now.
    let (status, _) = send(&router, get(&format!("/api/v1/executions/{id}/events"))).await?;
    assert_eq!(status, StatusCode::GONE);

    engine.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn healing_notifications_show_up_on_dashboard() -> TestResult {
    init_tracing();
    let (engine, router) = app();

    for status in ["detected", "analyzing", "fixed"] {
        let (code, _) = send(
            &router,
            post_json(
                "/api/v1/healing",
                json!({
                    "type": "locatorFix",
                    "locatorKey": "login.button",
                    "oldLocator": "#submit",
                    "newLocator": "[data-test=submit]",
                    "status": status
                }),
            ),
        )
        .await?;
        assert_eq!(code, StatusCode::ACCEPTED);
    }

    let (status, body) = send_json(&router, get("/api/v1/dashboard")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["counters"]["totalRuns"], 1);
    assert_eq!(body["data"]["counters"]["successfulFixes"], 1);
    assert_eq!(body["data"]["counters"]["currentlyExecuting"], 0);
    assert_eq!(body["data"]["healing"][0]["status"], "fixed");

    let (status, _) = send(
        &router,
        post_json("/api/v1/healing", json!({ "type": "somethingElse" })),
    )
    .await?;
    assert!(status.is_client_error());

    engine.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn stopped_engine_is_unavailable() -> TestResult {
    init_tracing();
    let (engine, router) = app();

    engine.handle.shutdown().await?;
    with_timeout(engine.task).await??;

    let (status, _) = send(&router, get("/api/v1/dashboard")).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}
