//! HTTP surface of the drover server.
//!
//! Four task endpoints wrap the caller's request into a prompt, run the
//! agent subprocess to completion, and reconcile its stdout into the JSON
//! response. Request validation happens by hand against optional DTO
//! fields so that a missing field produces the API's own 400 error body
//! rather than a deserializer rejection.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tracing::warn;

use drover_core::agent::{AgentOutcome, AgentRunner, RepoParams, prompt};
use drover_core::reconcile;

use crate::shutdown;

/// Stderr marker the entrypoint emits when the target repository has no
/// commits; the plan endpoint maps it to a friendlier error.
const EMPTY_REPO_MARKER: &str = "You do not have the initial commit yet";

const EMPTY_REPO_MESSAGE: &str = "Repository exists but is empty. The system will attempt to \
                                  initialize it with a README.md file.";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
    details: Option<String>,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
            details: None,
        }
    }

    /// A 500 carrying the agent's stderr so callers can see what the run
    /// actually printed.
    pub fn agent_failure(msg: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
            details: Some(stderr.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.message, "details": details }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// State and request types
// ---------------------------------------------------------------------------

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub runner: AgentRunner,
    /// Server-level API key applied when a request carries none.
    pub fallback_api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlanRequest {
    summary: Option<String>,
    description: Option<String>,
    comment: Option<String>,
    anthropic_api_key: Option<String>,
    #[serde(flatten)]
    repo: RepoParams,
}

#[derive(Debug, Deserialize)]
struct ActRequest {
    plan: Option<String>,
    issue_key: Option<String>,
    anthropic_api_key: Option<String>,
    #[serde(flatten)]
    repo: RepoParams,
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    issue_key: Option<String>,
    comments: Option<Value>,
    anthropic_api_key: Option<String>,
    #[serde(flatten)]
    repo: RepoParams,
}

#[derive(Debug, Deserialize)]
struct EpicRequest {
    summary: Option<String>,
    description: Option<String>,
    issue_key: Option<String>,
    anthropic_api_key: Option<String>,
    #[serde(flatten)]
    repo: RepoParams,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/test-agent", get(test_agent))
        .route("/api/plan", post(plan))
        .route("/api/act", post(act))
        .route("/api/feedback", post(feedback))
        .route("/api/epic", post(epic))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16, grace: Duration) -> Result<()> {
    let registry = state.runner.registry().clone();
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("drover listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let (shutdown, drain) = shutdown::drain_on_signal(registry, grace);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    // The connections are done; make sure the kill loop is too.
    drain.await.context("shutdown drain task panicked")?;
    tracing::info!("drover shut down");
    Ok(())
}

// ---------------------------------------------------------------------------
// Validation and agent helpers
// ---------------------------------------------------------------------------

/// Reject the request when a required field is missing.
fn require<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .ok_or_else(|| AppError::bad_request(format!("Missing '{field}' field in request")))
}

fn require_value<'a>(value: &'a Option<Value>, field: &str) -> Result<&'a Value, AppError> {
    value
        .as_ref()
        .ok_or_else(|| AppError::bad_request(format!("Missing '{field}' field in request")))
}

/// Build the full argument vector (repo flags, prompt last) and run the
/// agent to completion.
///
/// A key present in the request wins even when empty, matching clients
/// that send an empty string to mean "do not touch the credential file".
async fn run_agent(
    state: &AppState,
    repo: &RepoParams,
    prompt: String,
    request_key: Option<&str>,
) -> AgentOutcome {
    let mut args = repo.to_args();
    args.push(prompt);

    let api_key = match request_key {
        Some(key) => Some(key),
        None => state.fallback_api_key.as_deref(),
    };

    state.runner.run(&args, api_key).await
}

/// The generic 500 for task endpoints whose agent run failed.
fn agent_failed(outcome: AgentOutcome) -> AppError {
    warn!(exit_code = outcome.exit_code, "agent run failed");
    AppError::agent_failure("Command failed", outcome.stderr)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index() -> Json<Value> {
    Json(json!({
        "name": "drover",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "API for running AI-powered code generation and repository management tasks",
        "endpoints": [
            {
                "path": "/api/plan",
                "method": "POST",
                "description": "Generate implementation plans for user stories",
            },
            {
                "path": "/api/act",
                "method": "POST",
                "description": "Execute implementation plans and create pull requests",
            },
            {
                "path": "/api/feedback",
                "method": "POST",
                "description": "Address PR review feedback",
            },
            {
                "path": "/api/epic",
                "method": "POST",
                "description": "Break down epics into user stories",
            },
        ],
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Diagnostic probe: run the agent binary with `--help` and report the raw
/// result. Useful when wiring up a new deployment. A binary that cannot be
/// launched at all is a 500, not a failed run.
async fn test_agent(State(state): State<AppState>) -> Response {
    match state.runner.try_run(&["--help".to_string()], None).await {
        Ok(outcome) => Json(json!({
            "success": outcome.success(),
            "exit_code": outcome.exit_code,
            "stdout": outcome.stdout,
            "stderr": outcome.stderr,
        }))
        .into_response(),
        Err(error) => {
            warn!(%error, "agent probe could not launch the binary");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": error.to_string() })),
            )
                .into_response()
        }
    }
}

async fn plan(
    State(state): State<AppState>,
    Json(req): Json<PlanRequest>,
) -> Result<Json<Value>, AppError> {
    let summary = require(&req.summary, "summary")?;
    let description = req.description.as_deref().unwrap_or("");

    let prompt = prompt::plan_prompt(summary, description, req.comment.as_deref());
    let outcome = run_agent(&state, &req.repo, prompt, req.anthropic_api_key.as_deref()).await;

    if !outcome.success() {
        warn!(exit_code = outcome.exit_code, "agent run failed");
        if outcome.stderr.contains(EMPTY_REPO_MARKER) {
            return Err(AppError::agent_failure(EMPTY_REPO_MESSAGE, outcome.stderr));
        }
        return Err(AppError::agent_failure(
            format!("Command failed with code {}", outcome.exit_code),
            outcome.stderr,
        ));
    }

    Ok(Json(reconcile::reconcile(&outcome.stdout).into_body()))
}

async fn act(
    State(state): State<AppState>,
    Json(req): Json<ActRequest>,
) -> Result<Json<Value>, AppError> {
    let plan = require(&req.plan, "plan")?;
    let issue_key = require(&req.issue_key, "issue_key")?;

    let prompt = prompt::act_prompt(plan, issue_key);
    let outcome = run_agent(&state, &req.repo, prompt, req.anthropic_api_key.as_deref()).await;

    if !outcome.success() {
        return Err(agent_failed(outcome));
    }

    Ok(Json(reconcile::reconcile(&outcome.stdout).into_body()))
}

async fn feedback(
    State(state): State<AppState>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<Value>, AppError> {
    let issue_key = require(&req.issue_key, "issue_key")?;
    let comments = require_value(&req.comments, "comments")?;

    let prompt = prompt::feedback_prompt(issue_key, comments);
    let outcome = run_agent(&state, &req.repo, prompt, req.anthropic_api_key.as_deref()).await;

    if !outcome.success() {
        return Err(agent_failed(outcome));
    }

    Ok(Json(reconcile::reconcile(&outcome.stdout).into_body()))
}

async fn epic(
    State(state): State<AppState>,
    Json(req): Json<EpicRequest>,
) -> Result<Json<Value>, AppError> {
    let summary = require(&req.summary, "summary")?;
    let description = require(&req.description, "description")?;
    let issue_key = require(&req.issue_key, "issue_key")?;

    let prompt = prompt::epic_prompt(summary, description, issue_key);
    let outcome = run_agent(&state, &req.repo, prompt, req.anthropic_api_key.as_deref()).await;

    if !outcome.success() {
        return Err(agent_failed(outcome));
    }

    // A second extraction pass: epic responses must carry user_stories even
    // when the agent ignored the fenced-array instruction.
    let reconciled = reconcile::attach_user_stories(reconcile::reconcile(&outcome.stdout));
    Ok(Json(reconciled.into_body()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
