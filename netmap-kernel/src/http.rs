/**
 * API REST NETMAP - Surface de publication HTTP du kernel
 *
 * RÔLE :
 * Expose en lecture seule le snapshot courant et ses vues dérivées (marqueurs,
 * résumé, tables), plus le déclenchement manuel d'un rafraîchissement.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, état unique AppState cloné par requête
 * - Chaque handler prend l'Arc du snapshot courant une seule fois : une réponse
 *   ne mélange jamais deux snapshots
 * - POST /refresh : 202 si accepté, 409 si un cycle est en cours
 *
 * SÉCURITÉ :
 * - Routes GET publiques
 * - Si une clé API est configurée, header x-api-key exigé sur les autres méthodes
 */

use crate::config::IconConf;
use crate::health::{HealthTracker, KernelHealth};
use crate::models::{DeviceRecord, Verdict};
use crate::publish::SnapshotHandle;
use crate::scheduler::{SchedulerControl, SchedulerStatus, TriggerOutcome};
use crate::snapshot::Snapshot;
use crate::views::{self, ErrorRowView, MarkerView, Summary, TableFilter, TableRow};
use axum::extract::{Path, Query, Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub snapshots: SnapshotHandle,
    pub scheduler: SchedulerControl,
    pub health: HealthTracker,
    pub icons: IconConf,
    pub api_key: Option<String>,
}

#[derive(Serialize)]
struct LocationSummary {
    key: String,
    verdict: Verdict,
    devices: usize,
}

#[derive(Serialize)]
struct LocationView {
    key: String,
    verdict: Verdict,
    devices: Vec<DeviceRecord>,
}

#[derive(Serialize)]
struct RefreshResponse {
    outcome: TriggerOutcome,
    scheduler: SchedulerStatus,
}

async fn require_api_key(
    State(app): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if req.method() == Method::GET {
        return Ok(next.run(req).await);
    }
    let Some(expected) = app.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!("[http] rejected {} {}: missing or wrong x-api-key", req.method(), req.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/snapshot", get(get_snapshot))
        .route("/summary", get(get_summary))
        .route("/locations", get(list_locations))
        .route("/locations/{key}", get(get_location))
        .route("/markers", get(get_markers))
        .route("/table", get(get_table))
        .route("/errors", get(get_errors))
        .route("/scheduler", get(get_scheduler))
        .route("/refresh", post(refresh))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health.get_health(&app.snapshots, &app.scheduler))
}

// GET /snapshot (snapshot complet)
async fn get_snapshot(State(app): State<AppState>) -> Json<Arc<Snapshot>> {
    Json(app.snapshots.get_snapshot())
}

async fn get_summary(State(app): State<AppState>) -> Json<Summary> {
    Json(views::summary(&app.snapshots.get_snapshot()))
}

// GET /locations (codes dans l'ordre du flux)
async fn list_locations(State(app): State<AppState>) -> Json<Vec<LocationSummary>> {
    let snapshot = app.snapshots.get_snapshot();
    let list = snapshot
        .locations
        .groups()
        .map(|(key, group)| LocationSummary {
            key: key.to_string(),
            verdict: snapshot.verdict(key),
            devices: group.len(),
        })
        .collect();
    Json(list)
}

// GET /locations/{key} (détail, 404 si absent du flux)
async fn get_location(
    State(app): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LocationView>, StatusCode> {
    let snapshot = app.snapshots.get_snapshot();
    let Some(group) = snapshot.locations.get(&key) else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(LocationView {
        key: crate::index::normalize_key(&key),
        verdict: snapshot.verdict(&key),
        devices: group.to_vec(),
    }))
}

async fn get_markers(State(app): State<AppState>) -> Json<Vec<MarkerView>> {
    Json(views::markers(&app.snapshots.get_snapshot(), &app.icons))
}

// GET /table?hide_up=true
async fn get_table(State(app): State<AppState>, Query(filter): Query<TableFilter>) -> Json<Vec<TableRow>> {
    Json(views::network_table(&app.snapshots.get_snapshot(), filter))
}

async fn get_errors(State(app): State<AppState>) -> Json<Vec<ErrorRowView>> {
    Json(views::error_table(&app.snapshots.get_snapshot()))
}

async fn get_scheduler(State(app): State<AppState>) -> Json<SchedulerStatus> {
    Json(app.scheduler.status())
}

// POST /refresh (déclenchement manuel)
async fn refresh(State(app): State<AppState>) -> (StatusCode, Json<RefreshResponse>) {
    let outcome = app.scheduler.trigger();
    let code = match outcome {
        TriggerOutcome::Accepted => {
            info!("[http] manual refresh accepted");
            StatusCode::ACCEPTED
        }
        TriggerOutcome::Ignored => StatusCode::CONFLICT,
    };
    (code, Json(RefreshResponse { outcome, scheduler: app.scheduler.status() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::metadata::fixture::building_db;
    use crate::publish::SnapshotStore;
    use crate::scheduler::Scheduler;
    use crate::source::testing::StaticSource;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    const FEED: &str = "\
Code,Description,Device,Status
TIME,t,2024-03-01 10:15,up
RY,Ryder IDF,ry-1,up
RY,Ryder MDF,ry-2,down
07,Building 7,b7-1,up
,orphan,x-1,up
";

    async fn app(api_key: Option<&str>) -> (Router, Scheduler<StaticSource>) {
        let source = Arc::new(StaticSource::new(FEED, building_db(&[("Ryder", 42.3, -71.0, "RY, 7")])));
        let (mut scheduler, control) = Scheduler::new(source, SnapshotStore::new(), &KernelConfig::default());
        scheduler.run_cycle().await.unwrap();
        let state = AppState {
            snapshots: scheduler.handle(),
            scheduler: control,
            health: HealthTracker::new(),
            icons: IconConf::default(),
            api_key: api_key.map(str::to_string),
        };
        (build_router(state), scheduler)
    }

    async fn call(router: &Router, method: &str, uri: &str, key: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut req = HttpRequest::builder().method(method).uri(uri);
        if let Some(key) = key {
            req = req.header("x-api-key", key);
        }
        let resp = router.clone().oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_read_routes() {
        let (router, _scheduler) = app(None).await;

        let (status, summary) = call(&router, "GET", "/summary", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["label"], "1/2 (0)");
        assert_eq!(summary["errors"], 1);

        let (_, locations) = call(&router, "GET", "/locations", None).await;
        assert_eq!(locations[0]["key"], "RY");
        assert_eq!(locations[0]["verdict"], "unhealthy");
        assert_eq!(locations[1]["key"], "7");

        let (status, location) = call(&router, "GET", "/locations/007", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(location["verdict"], "healthy");
        let (status, _) = call(&router, "GET", "/locations/ZZ", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, markers) = call(&router, "GET", "/markers", None).await;
        assert_eq!(markers[0]["icon"], "images/x-mark.svg");

        let (_, table) = call(&router, "GET", "/table?hide_up=true", None).await;
        assert_eq!(table.as_array().unwrap().len(), 1);
        assert_eq!(table[0]["device"], "ry-2");

        let (_, errors) = call(&router, "GET", "/errors", None).await;
        assert_eq!(errors[0]["missing"][0], "Code");

        let (_, snapshot) = call(&router, "GET", "/snapshot", None).await;
        assert_eq!(snapshot["version"], 1);

        let (_, health) = call(&router, "GET", "/system/health", None).await;
        assert_eq!(health["snapshot_version"], 1);
    }

    #[tokio::test]
    async fn test_refresh_accepted_then_conflict() {
        let (router, scheduler) = app(None).await;
        let (status, body) = call(&router, "POST", "/refresh", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["outcome"], "accepted");

        // plus de boucle pour consommer le déclenchement
        drop(scheduler);
        let (status, body) = call(&router, "POST", "/refresh", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["outcome"], "ignored");
    }

    #[tokio::test]
    async fn test_api_key_guards_refresh_only() {
        let (router, _scheduler) = app(Some("s3cret")).await;
        let (status, _) = call(&router, "GET", "/summary", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&router, "POST", "/refresh", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&router, "POST", "/refresh", Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&router, "POST", "/refresh", Some("s3cret")).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }
}
