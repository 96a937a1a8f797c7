//! Tests for the REST API, driven through the router without a socket.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use gateflow::agent::UnconfiguredAgent;
use gateflow::api::router;
use gateflow::engine::RunController;
use gateflow::protocol::{SuspendEnvelope, SuspendReason};
use gateflow::storage::MemoryRunStore;
use gateflow::workflow::{StepContext, StepLogic, StepOutcome, StepSpec, WorkflowDefinition, WorkflowRegistry};

struct ApprovalGate;

#[async_trait]
impl StepLogic for ApprovalGate {
    async fn run(&self, input: Value, resume: Option<Value>, _ctx: &StepContext) -> StepOutcome {
        match resume {
            Some(r) if r["approved"] == json!(true) => StepOutcome::Continue(input),
            _ => StepOutcome::Suspend(
                SuspendEnvelope::new(SuspendReason::AwaitingApproval, "approve the draft")
                    .with_required_inputs(["approved"]),
            ),
        }
    }
}

fn app() -> Router {
    let mut registry = WorkflowRegistry::new();
    registry.register(
        WorkflowDefinition::builder("review")
            .description("single approval gate")
            .input_schema(json!({"type": "object", "required": ["draft"]}))
            .step(
                StepSpec::new("approve", ApprovalGate).resume_schema(json!({
                    "type": "object",
                    "required": ["approved"],
                    "properties": { "approved": { "type": "boolean" } }
                })),
            )
            .step(StepSpec::pure("publish", |v: Value, _| {
                StepOutcome::Continue(json!({"published": v["draft"]}))
            }))
            .build()
            .unwrap(),
    );
    let controller = RunController::new(
        registry,
        Arc::new(MemoryRunStore::new()),
        Arc::new(UnconfiguredAgent),
    );
    router(controller, 1 << 20)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn start_review(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/workflows/review/start",
        Some(json!({"inputData": {"draft": "hello"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["runId"].as_str().unwrap().to_string()
}

// --- Service endpoints ---

#[tokio::test]
async fn health_reports_ok() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn workflows_are_listed_with_steps() {
    let app = app();
    let (status, body) = send(&app, "GET", "/workflows", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["workflows"][0]["id"], "review");
    assert_eq!(body["workflows"][0]["steps"][0]["id"], "approve");
    assert_eq!(body["workflows"][0]["steps"][1]["id"], "publish");
}

// --- Run lifecycle ---

#[tokio::test]
async fn start_then_resume_completes() {
    let app = app();

    let (status, body) = send(
        &app,
        "POST",
        "/workflows/review/start",
        Some(json!({"inputData": {"draft": "hello"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "suspended");
    assert_eq!(body["currentStepId"], "approve");
    assert_eq!(body["suspendEnvelope"]["reason"], "awaiting_approval");
    assert_eq!(
        body["suspendEnvelope"]["resumeConditions"]["requiredInputs"],
        json!(["approved"])
    );
    let run_id = body["runId"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/runs/{}/resume", run_id),
        Some(json!({"stepId": "approve", "resumeData": {"approved": true}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["finalResult"], json!({"published": "hello"}));

    let (status, body) = send(&app, "GET", &format!("/runs/{}", run_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["history"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn start_async_returns_run_id() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/workflows/review/start-async",
        Some(json!({"inputData": {"draft": "x"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    let run_id = body["runId"].as_str().unwrap();

    let mut current = Value::Null;
    for _ in 0..50 {
        let (_, body) = send(&app, "GET", &format!("/runs/{}", run_id), None).await;
        current = body["status"].clone();
        if current != "running" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(current, "suspended");
}

#[tokio::test]
async fn runs_are_listed_and_filtered() {
    let app = app();
    let run_id = start_review(&app).await;

    let (status, body) = send(&app, "GET", "/runs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["runs"][0]["runId"], run_id);

    let (_, body) = send(&app, "GET", "/runs?status=completed", None).await;
    assert_eq!(body["total"], 0);

    let (_, body) = send(&app, "GET", "/runs?status=suspended", None).await;
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn delete_removes_run() {
    let app = app();
    let run_id = start_review(&app).await;

    let (status, body) = send(&app, "DELETE", &format!("/runs/{}", run_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], run_id);

    let (status, _) = send(&app, "GET", &format!("/runs/{}", run_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// --- Error mapping ---

#[tokio::test]
async fn unknown_workflow_is_404() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/workflows/nope/start",
        Some(json!({"inputData": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "UnknownWorkflow");
}

#[tokio::test]
async fn unknown_run_is_404() {
    let app = app();
    let (status, body) = send(&app, "GET", "/runs/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFound");
}

#[tokio::test]
async fn invalid_start_input_is_422() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/workflows/review/start",
        Some(json!({"inputData": {"title": "no draft"}})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "SchemaValidationError");
    assert!(!body["details"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn incomplete_resume_is_422() {
    let app = app();
    let run_id = start_review(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/runs/{}/resume", run_id),
        Some(json!({"stepId": "approve", "resumeData": {"note": "forgot"}})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "IncompleteResume");
    assert_eq!(body["details"], json!(["approved"]));
}

#[tokio::test]
async fn wrong_step_is_409() {
    let app = app();
    let run_id = start_review(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/runs/{}/resume", run_id),
        Some(json!({"stepId": "publish", "resumeData": {"approved": true}})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "StepMismatch");
}

#[tokio::test]
async fn resuming_completed_run_is_409() {
    let app = app();
    let run_id = start_review(&app).await;
    let uri = format!("/runs/{}/resume", run_id);
    let body = json!({"stepId": "approve", "resumeData": {"approved": true}});

    let (status, _) = send(&app, "POST", &uri, Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", &uri, Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "InvalidTransition");
}

#[tokio::test]
async fn bad_status_filter_is_400() {
    let app = app();
    let (status, body) = send(&app, "GET", "/runs?status=paused", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "BadRequest");
}
