use crate::config::AppConfig;
use crate::render::{Figure, FigureBuilder};
use crate::session::{ClickedMarkerSet, SessionStore};
use crate::types::ResolvedMarker;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

const INDEX_HTML: &str = include_str!("../static/index.html");

pub struct AppState {
    pub figures: FigureBuilder,
    pub markers: Arc<Vec<ResolvedMarker>>,
    pub marker_ids: HashSet<String>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(
        figures: FigureBuilder,
        markers: Arc<Vec<ResolvedMarker>>,
        session_ttl: Duration,
    ) -> Self {
        let marker_ids = markers.iter().map(|m| m.marker_id.clone()).collect();
        Self {
            figures,
            markers,
            marker_ids,
            sessions: SessionStore::new(session_ttl),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        };
        let body = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub clicked: ClickedMarkerSet,
}

#[derive(Debug, Deserialize)]
pub struct FigureRequest {
    // The page sends null when the dropdown is cleared.
    #[serde(default)]
    selected_provinces: Option<Vec<String>>,
}

/// Plotly click payload; only the first point's `customdata` matters.
#[derive(Debug, Deserialize)]
struct ClickEvent {
    #[serde(default)]
    points: Vec<ClickPoint>,
}

#[derive(Debug, Deserialize)]
struct ClickPoint {
    customdata: Option<serde_json::Value>,
}

/// Marker id carried by a click payload, if any. Anything unparseable, or a
/// click on a province rather than a marker, yields `None`.
fn clicked_marker_id(body: &[u8]) -> Option<String> {
    let event: ClickEvent = serde_json::from_slice(body).ok()?;
    match event.points.into_iter().next()?.customdata? {
        serde_json::Value::String(id) => Some(id),
        // customdata may arrive wrapped when the trace carries several columns
        serde_json::Value::Array(mut values) if !values.is_empty() => match values.swap_remove(0) {
            serde_json::Value::String(id) => Some(id),
            _ => None,
        },
        _ => None,
    }
}

/// Optional body of `POST /api/session`: the ids a page still shows after its
/// old session expired.
#[derive(Debug, Default, Deserialize)]
struct SessionRequest {
    #[serde(default)]
    clicked: Vec<String>,
}

/// Previous clicks carried by a session request, limited to known marker ids.
/// An empty or unparseable body starts from nothing.
fn restored_clicks(body: &[u8], marker_ids: &HashSet<String>) -> ClickedMarkerSet {
    let request: SessionRequest = serde_json::from_slice(body).unwrap_or_default();
    let mut clicked = ClickedMarkerSet::new();
    for id in request.clicked.iter().filter(|id| marker_ids.contains(*id)) {
        clicked.record_click(id);
    }
    clicked
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(health_handler))
        .route("/api/provinces", get(provinces_handler))
        .route("/api/markers", get(markers_handler))
        .route("/api/session", post(create_session_handler))
        .route("/api/session/:id", get(session_handler))
        .route("/api/session/:id/click", post(click_handler))
        .route("/api/session/:id/figure", post(figure_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, state: AppState) -> Result<()> {
    let addr = config.server_address();
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Starting server on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "provinces": state.figures.provinces().len(),
        "markers": state.markers.len(),
        "sessions": state.sessions.len(),
    }))
}

async fn provinces_handler(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.figures.province_names())
}

async fn markers_handler(State(state): State<Arc<AppState>>) -> Json<Arc<Vec<ResolvedMarker>>> {
    Json(state.markers.clone())
}

async fn create_session_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Json<SessionResponse> {
    let clicked = restored_clicks(&body, &state.marker_ids);
    if !clicked.is_empty() {
        debug!(restored = clicked.len(), "reopening session with previous clicks");
    }
    let session_id = state.sessions.create_with(clicked.clone());
    Json(SessionResponse { session_id, clicked })
}

async fn session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let clicked = state.sessions.clicked(&id).ok_or(ApiError::SessionNotFound(id))?;
    Ok(Json(SessionResponse { session_id: id, clicked }))
}

async fn click_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<SessionResponse>, ApiError> {
    let clicked = match clicked_marker_id(&body) {
        Some(marker_id) if state.marker_ids.contains(&marker_id) => {
            state.sessions.record_click(&id, &marker_id)
        }
        Some(marker_id) => {
            debug!(session = %id, marker = %marker_id, "ignoring unknown marker id");
            state.sessions.clicked(&id)
        }
        None => state.sessions.clicked(&id),
    }
    .ok_or(ApiError::SessionNotFound(id))?;

    Ok(Json(SessionResponse { session_id: id, clicked }))
}

async fn figure_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<FigureRequest>,
) -> Result<Json<Figure>, ApiError> {
    let clicked = state.sessions.clicked(&id).ok_or(ApiError::SessionNotFound(id))?;
    let selected = request.selected_provinces.unwrap_or_default();
    Ok(Json(state.figures.build(&selected, &clicked)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StyleConfig;
    use crate::processing::resolve_markers;
    use crate::processing::tests::{fixture_places, fixture_points, fixture_provinces};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        let provinces = fixture_provinces();
        let markers = Arc::new(resolve_markers(&provinces, &fixture_points(), &fixture_places()));
        let figures = FigureBuilder::new(provinces, markers.clone(), StyleConfig::default());
        router(Arc::new(AppState::new(figures, markers, Duration::from_secs(60))))
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: &str,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    async fn open_session(app: &Router) -> String {
        let (status, body) = send(app, "POST", "/api/session", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["clicked"], json!([]));
        body["session_id"].as_str().unwrap().to_string()
    }

    fn click_payload(marker_id: &str) -> String {
        json!({"points": [{"lat": 43.6, "lon": -79.3, "customdata": marker_id}]}).to_string()
    }

    #[test]
    fn test_clicked_marker_id() {
        assert_eq!(
            clicked_marker_id(click_payload("Ontario_CN Tower_3").as_bytes()).as_deref(),
            Some("Ontario_CN Tower_3")
        );
        assert_eq!(
            clicked_marker_id(br#"{"points":[{"customdata":["a","b"]}]}"#).as_deref(),
            Some("a")
        );
        assert_eq!(clicked_marker_id(br#"{"points":[{"location":"Ontario"}]}"#), None);
        assert_eq!(clicked_marker_id(br#"{"points":[]}"#), None);
        assert_eq!(clicked_marker_id(b"null"), None);
        assert_eq!(clicked_marker_id(b"garbage"), None);
    }

    #[tokio::test]
    async fn test_index_page() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("Canada Provinces with Notable Places"));
    }

    #[tokio::test]
    async fn test_provinces_sorted() {
        let (status, body) = send(&app(), "GET", "/api/provinces", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["Manitoba", "Ontario", "Quebec"]));
    }

    #[tokio::test]
    async fn test_click_records_once() {
        let app = app();
        let id = open_session(&app).await;
        let uri = format!("/api/session/{}/click", id);

        let (status, body) = send(&app, "POST", &uri, &click_payload("Ontario_CN Tower_3")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["clicked"], json!(["Ontario_CN Tower_3"]));

        let (_, body) = send(&app, "POST", &uri, &click_payload("Ontario_CN Tower_3")).await;
        assert_eq!(body["clicked"], json!(["Ontario_CN Tower_3"]));
    }

    #[tokio::test]
    async fn test_click_without_marker_leaves_state() {
        let app = app();
        let id = open_session(&app).await;
        let uri = format!("/api/session/{}/click", id);
        send(&app, "POST", &uri, &click_payload("Quebec_Mont-Royal_4")).await;

        let unknown = click_payload("Ontario_Unknown_99");
        for body in [
            r#"{"points":[{"location":"Ontario"}]}"#,
            "not json at all",
            unknown.as_str(),
        ] {
            let (status, response) = send(&app, "POST", &uri, body).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(response["clicked"], json!(["Quebec_Mont-Royal_4"]));
        }
    }

    #[tokio::test]
    async fn test_session_reopens_with_known_clicks() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/session",
            r#"{"clicked": ["Ontario_CN Tower_3", "Ontario_Unknown_99", "Ontario_CN Tower_3"]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["clicked"], json!(["Ontario_CN Tower_3"]));

        let id = body["session_id"].as_str().unwrap();
        let (_, figure) = send(&app, "POST", &format!("/api/session/{}/figure", id), "{}").await;
        let ids = figure["data"][1]["customdata"].as_array().unwrap();
        let sizes = figure["data"][1]["marker"]["size"].as_array().unwrap();
        let idx = ids.iter().position(|v| v == "Ontario_CN Tower_3").unwrap();
        assert_eq!(sizes[idx], StyleConfig::default().clicked_marker_size);
    }

    #[test]
    fn test_restored_clicks_ignores_bad_bodies() {
        let ids: HashSet<String> = ["a".to_string()].into_iter().collect();
        assert!(restored_clicks(b"", &ids).is_empty());
        assert!(restored_clicks(b"garbage", &ids).is_empty());
        assert!(restored_clicks(br#"{"clicked": "a"}"#, &ids).is_empty());
        assert_eq!(
            restored_clicks(br#"{"clicked": ["b", "a"]}"#, &ids).as_slice(),
            ["a".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let app = app();
        let uri = format!("/api/session/{}/click", Uuid::new_v4());
        let (status, body) = send(&app, "POST", &uri, &click_payload("Ontario_CN Tower_3")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], 404);
    }

    #[tokio::test]
    async fn test_figure_reflects_selection_and_clicks() {
        let app = app();
        let id = open_session(&app).await;
        let click_uri = format!("/api/session/{}/click", id);
        send(&app, "POST", &click_uri, &click_payload("Ontario_CN Tower_3")).await;

        let (status, figure) = send(
            &app,
            "POST",
            &format!("/api/session/{}/figure", id),
            r#"{"selected_provinces": ["Ontario"]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(figure["data"][0]["z"], json!([1, 0, 0]));

        let style = StyleConfig::default();
        let ids = figure["data"][1]["customdata"].as_array().unwrap();
        let colors = figure["data"][1]["marker"]["color"].as_array().unwrap();
        for (id, color) in ids.iter().zip(colors) {
            let expected = if id == "Ontario_CN Tower_3" {
                &style.clicked_marker_color
            } else {
                &style.marker_color
            };
            assert_eq!(color, expected.as_str());
        }
    }

    #[tokio::test]
    async fn test_figure_with_cleared_dropdown() {
        let app = app();
        let id = open_session(&app).await;
        let (status, figure) = send(
            &app,
            "POST",
            &format!("/api/session/{}/figure", id),
            r#"{"selected_provinces": null}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(figure["data"][0]["z"], json!([0, 0, 0]));
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), "GET", "/healthz", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["provinces"], 3);
        assert_eq!(body["markers"], 5);
    }
}
