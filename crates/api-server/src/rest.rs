//! REST API handlers for page-view evaluation, rule administration and
//! operational endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use redirect_core::{
    Decision, Page, PageDirectory, PageId, PageResolver, PageStatus, RedirectError, RuleSet,
    VisitKey, VisitorIdentity,
};
use redirect_engine::{IssuedToken, RedirectEvaluator, VisitorContext, VisitorIdentityProvider};
use redirect_rules::{RuleDrafts, RuleStore};
use redirect_visits::VisitTracker;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use url::Url;

/// Maximum anonymous token length accepted at the API boundary.
const MAX_TOKEN_FIELD_LEN: usize = 256;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub evaluator: Arc<RedirectEvaluator>,
    pub rules: Arc<RuleStore>,
    pub pages: Arc<PageDirectory>,
    pub visits: Arc<dyn VisitTracker>,
    pub identity: Arc<VisitorIdentityProvider>,
    pub node_id: String,
    pub exempt_admins: bool,
    pub start_time: Instant,
}

#[derive(Debug, Deserialize)]
pub struct PageViewRequest {
    #[serde(default)]
    pub page_id: Option<PageId>,
    #[serde(default)]
    pub account_id: Option<u64>,
    #[serde(default)]
    pub anonymous_token: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageAction {
    Redirect,
    Render,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssuedTokenBody {
    pub name: String,
    pub value: String,
    pub max_age_secs: u64,
}

impl From<IssuedToken> for IssuedTokenBody {
    fn from(token: IssuedToken) -> Self {
        Self {
            name: token.name,
            value: token.value,
            max_age_secs: token.max_age_secs,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PageViewResponse {
    pub action: PageAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_page: Option<PageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_token: Option<IssuedTokenBody>,
}

impl PageViewResponse {
    fn render(issued_token: Option<IssuedToken>) -> Self {
        Self {
            action: PageAction::Render,
            target_page: None,
            location: None,
            issued_token: issued_token.map(Into::into),
        }
    }
}

/// POST /v1/page-views: decide whether a page view is redirected.
///
/// Never fails: anything short of a confirmed redirect renders the page.
pub async fn handle_page_view(
    State(state): State<AppState>,
    Json(request): Json<PageViewRequest>,
) -> Json<PageViewResponse> {
    metrics::counter!("api.page_views").increment(1);

    let Some(page) = request.page_id.filter(|p| !p.is_unset()) else {
        return Json(PageViewResponse::render(None));
    };
    if request.is_admin && state.exempt_admins {
        debug!(page = %page, "Skipping redirect for admin user");
        return Json(PageViewResponse::render(None));
    }

    let ctx = VisitorContext {
        account_id: request.account_id,
        anonymous_token: request
            .anonymous_token
            .filter(|t| t.len() <= MAX_TOKEN_FIELD_LEN),
    };
    let identity = &state.identity;
    let mut issued: Option<IssuedToken> = None;

    let decision = state
        .evaluator
        .evaluate_with(Utc::now(), page, || {
            let resolved = identity.resolve(&ctx);
            issued = resolved.issued;
            resolved.identity
        })
        .await;

    let Decision::RedirectTo(target) = decision else {
        return Json(PageViewResponse::render(issued));
    };

    match state.pages.permalink_of(target) {
        Some(location) => Json(PageViewResponse {
            action: PageAction::Redirect,
            target_page: Some(target),
            location: Some(location.to_string()),
            issued_token: issued.map(Into::into),
        }),
        None => {
            warn!(target = %target, "Redirect target has no permalink, rendering page");
            Json(PageViewResponse::render(issued))
        }
    }
}

/// GET /v1/rules
pub async fn list_rules(State(state): State<AppState>) -> Json<RuleSet> {
    Json(state.rules.snapshot().as_ref().clone())
}

/// PUT /v1/rules: validate and replace both rule lists.
pub async fn replace_rules(
    State(state): State<AppState>,
    Json(rules): Json<RuleSet>,
) -> Result<Json<RuleSet>, (StatusCode, Json<ErrorResponse>)> {
    state
        .rules
        .replace_all(rules.global, rules.user)
        .map_err(error_response)?;
    Ok(Json(state.rules.snapshot().as_ref().clone()))
}

/// POST /v1/rules/drafts: admin form submission with local start times.
pub async fn save_rule_drafts(
    State(state): State<AppState>,
    Json(drafts): Json<RuleDrafts>,
) -> Result<Json<RuleSet>, (StatusCode, Json<ErrorResponse>)> {
    let rules = drafts.into_rule_set().map_err(error_response)?;
    state
        .rules
        .replace_all(rules.global, rules.user)
        .map_err(error_response)?;
    Ok(Json(state.rules.snapshot().as_ref().clone()))
}

#[derive(Debug, Deserialize)]
pub struct UpsertPageRequest {
    #[serde(default)]
    pub title: String,
    pub permalink: Url,
    #[serde(default)]
    pub status: PageStatus,
}

/// GET /v1/pages: published pages selectable in rules.
pub async fn list_pages(State(state): State<AppState>) -> Json<Vec<Page>> {
    Json(state.pages.list_published())
}

/// PUT /v1/pages/:id
pub async fn upsert_page(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<UpsertPageRequest>,
) -> Result<Json<Page>, (StatusCode, Json<ErrorResponse>)> {
    if id == 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid_page".to_string(),
                message: "page id must be non-zero".to_string(),
            }),
        ));
    }
    let page = Page {
        id: PageId(id),
        title: request.title,
        permalink: request.permalink,
        status: request.status,
    };
    state.pages.upsert(page.clone());
    Ok(Json(page))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub removed: usize,
}

/// DELETE /v1/visits: full reset of first-visit records.
pub async fn reset_visits(
    State(state): State<AppState>,
) -> Result<Json<ResetResponse>, (StatusCode, Json<ErrorResponse>)> {
    let removed = state.visits.reset().await.map_err(error_response)?;
    Ok(Json(ResetResponse { removed }))
}

/// GET /v1/time: current server time in UTC.
pub async fn server_time() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// GET /health: Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        visit_backend: state.visits.backend().to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready: 200 only while the visit store answers.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    let probe = VisitKey::new(&VisitorIdentity::Anonymous("readiness_probe".to_string()), PageId(0));
    match tokio::time::timeout(Duration::from_secs(1), state.visits.lookup(&probe)).await {
        Ok(Ok(_)) => StatusCode::OK,
        Ok(Err(e)) => {
            warn!(error = %e, "Readiness probe failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// GET /live: Liveness probe for Kubernetes.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub visit_backend: String,
    pub uptime_secs: u64,
}

fn error_response(err: RedirectError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &err {
        RedirectError::InvalidRule { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_rule"),
        RedirectError::StorageUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %err, "Request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: err.to_string(),
        }),
    )
}
