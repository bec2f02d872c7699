use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use lifeline_client::{AutoSend, NewsReport, ReportCategory, ReportSubmitter, SosCoordinator, SosState};
use lifeline_feed::{AggregateResult, EmergencySource, FeedAggregator, SourceReport};
use lifeline_shared::config::Tunables;
use lifeline_shared::types::{PeerGroupState, RecordKind, SendOutcome, Urgency};
use lifeline_store::{Database, InboxEntry};

use crate::device::{AlertInbox, StoredAlert};
use crate::error::ServerError;

const DEFAULT_INBOX_LIMIT: u32 = 50;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: SosCoordinator,
    pub feed: Arc<FeedAggregator>,
    pub sos_board: Arc<dyn EmergencySource>,
    pub reports: Arc<ReportSubmitter>,
    pub alerts: Arc<AlertInbox>,
    pub db: Arc<Mutex<Database>>,
    /// Pending auto-send, if armed. Replacing or clearing it cancels the
    /// countdown.
    pub auto_send: Arc<Mutex<Option<AutoSend>>>,
    pub tunables: Tunables,
}

impl AppState {
    fn set_auto_send(&self, next: Option<AutoSend>) {
        *self
            .auto_send
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn auto_send_pending(&self) -> bool {
        self.auto_send
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(AutoSend::is_pending)
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/feed", get(get_feed))
        .route("/feed/refresh", post(refresh_feed))
        .route("/sos/board", get(sos_board))
        .route("/sos", post(submit_sos))
        .route("/sos/state", get(sos_state))
        .route("/sos/arm", post(arm_auto_send))
        .route("/sos/disarm", post(disarm_auto_send))
        .route("/sos/draft", put(edit_draft))
        .route("/peer/state", get(peer_state))
        .route("/peer/retry", post(retry_peer_group))
        .route("/peer/inbox", get(peer_inbox))
        .route("/reports", post(submit_report))
        .route("/alerts", get(list_alerts))
        .route("/alerts/:id", delete(acknowledge_alert))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct FeedQuery {
    kind: Option<RecordKind>,
}

#[derive(Deserialize, Default)]
struct SubmitSosRequest {
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SosStateResponse {
    state: SosState,
    draft: String,
    auto_send_pending: bool,
    last_outcome: Option<SendOutcome>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArmResponse {
    armed: bool,
    deadline_secs: u64,
}

#[derive(Deserialize)]
struct DraftRequest {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DraftResponse {
    accepted: bool,
    text: String,
    remaining_chars: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PeerStateResponse {
    state: PeerGroupState,
    retry_scheduled: bool,
}

#[derive(Deserialize)]
struct InboxQuery {
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct ReportRequest {
    content: String,
    category: String,
    #[serde(default)]
    level: Option<Urgency>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn get_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Json<AggregateResult> {
    let result = state.feed.get_aggregate().await;
    Json(match query.kind {
        Some(kind) => result.filtered(kind),
        None => result,
    })
}

async fn refresh_feed(State(state): State<AppState>) -> Json<AggregateResult> {
    Json(state.feed.refresh().await)
}

async fn sos_board(State(state): State<AppState>) -> Json<SourceReport> {
    Json(state.sos_board.fetch().await)
}

async fn submit_sos(
    State(state): State<AppState>,
    body: Option<Json<SubmitSosRequest>>,
) -> Json<SendOutcome> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    state.set_auto_send(None);

    let outcome = match request.text {
        Some(text) => state.coordinator.submit(&text).await,
        None => state.coordinator.submit_draft().await,
    };
    Json(outcome)
}

async fn sos_state(State(state): State<AppState>) -> Json<SosStateResponse> {
    Json(SosStateResponse {
        state: state.coordinator.state(),
        draft: state.coordinator.draft().text().to_string(),
        auto_send_pending: state.auto_send_pending(),
        last_outcome: state.coordinator.last_outcome(),
    })
}

async fn arm_auto_send(State(state): State<AppState>) -> Json<ArmResponse> {
    state.set_auto_send(Some(state.coordinator.arm()));
    Json(ArmResponse {
        armed: true,
        deadline_secs: state.tunables.auto_send_deadline.as_secs(),
    })
}

async fn disarm_auto_send(State(state): State<AppState>) -> Json<ArmResponse> {
    let pending = state
        .auto_send
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(auto) = pending {
        auto.disarm();
        info!("Auto-send disarmed by user");
    }
    Json(ArmResponse {
        armed: false,
        deadline_secs: state.tunables.auto_send_deadline.as_secs(),
    })
}

async fn edit_draft(
    State(state): State<AppState>,
    Json(req): Json<DraftRequest>,
) -> Json<DraftResponse> {
    let accepted = state.coordinator.edit_draft(&req.text);
    let draft = state.coordinator.draft();
    Json(DraftResponse {
        accepted,
        text: draft.text().to_string(),
        remaining_chars: draft.remaining_chars(),
    })
}

async fn peer_state(State(state): State<AppState>) -> Json<PeerStateResponse> {
    let peers = state.coordinator.peers();
    Json(PeerStateResponse {
        state: peers.state(),
        retry_scheduled: peers.retry_scheduled(),
    })
}

async fn retry_peer_group(
    State(state): State<AppState>,
) -> Result<Json<PeerStateResponse>, ServerError> {
    let peers = state.coordinator.peers();
    peers
        .recover_with_attempts(state.tunables.recovery_attempts)
        .await?;
    Ok(Json(PeerStateResponse {
        state: peers.state(),
        retry_scheduled: peers.retry_scheduled(),
    }))
}

async fn peer_inbox(
    State(state): State<AppState>,
    Query(query): Query<InboxQuery>,
) -> Result<Json<Vec<InboxEntry>>, ServerError> {
    let limit = query.limit.unwrap_or(DEFAULT_INBOX_LIMIT);
    let db = Arc::clone(&state.db);
    let entries = tokio::task::spawn_blocking(move || {
        let db = db.lock().unwrap_or_else(PoisonError::into_inner);
        db.list_inbound_sos(limit)
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))??;
    Ok(Json(entries))
}

async fn submit_report(
    State(state): State<AppState>,
    Json(req): Json<ReportRequest>,
) -> Result<(StatusCode, Json<NewsReport>), ServerError> {
    let category: ReportCategory = req.category.parse()?;
    let report = state
        .reports
        .submit(
            &req.content,
            category,
            req.level.unwrap_or(Urgency::Normal),
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn list_alerts(State(state): State<AppState>) -> Json<Vec<StoredAlert>> {
    Json(state.alerts.list())
}

async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServerError> {
    if state.alerts.acknowledge(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::AlertNotFound(id))
    }
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
