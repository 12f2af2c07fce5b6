use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    acknowledge, evaluate, health_check, metric_status, pending_statuses, record_observations,
    run_now, AppState,
};
use crate::alerts::{
    AlertsConfig, LogTransport, NotificationTransport, ObservationSnapshot, WarnMetricJob,
    WarnMetricService, WebhookTransport,
};
use crate::metrics::MetricRegistry;
use crate::storage::{FileKvStore, KvStore, MemoryKvStore};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// JSON file backing the status store; in-memory when unset
    pub data_file: Option<PathBuf>,
    pub alerts: AlertsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8065,
            data_file: None,
            alerts: AlertsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a server config from environment variables
    /// WARNWATCH_HOST=0.0.0.0
    /// WARNWATCH_PORT=8065
    /// WARNWATCH_DATA_FILE=./warnwatch.json
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("WARNWATCH_HOST").unwrap_or(defaults.host);
        let port: u16 = std::env::var("WARNWATCH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);
        let data_file = std::env::var("WARNWATCH_DATA_FILE")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Self {
            host,
            port,
            data_file,
            alerts: AlertsConfig::from_env(),
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Status
        .route("/warn_metrics/status", get(pending_statuses))
        .route("/warn_metrics/status/:id", get(metric_status))
        // Evaluation and acknowledgment
        .route("/warn_metrics/evaluate/:id", post(evaluate))
        .route("/warn_metrics/ack/:id", post(acknowledge))
        // Check cycles
        .route("/warn_metrics/observations", post(record_observations))
        .route("/warn_metrics/run", post(run_now))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Open the configured key/value store
pub fn open_store(config: &ServerConfig) -> Result<Arc<dyn KvStore>, Box<dyn std::error::Error>> {
    match &config.data_file {
        Some(path) => {
            tracing::info!("Using file store at {}", path.display());
            Ok(Arc::new(FileKvStore::open(path)?))
        }
        None => {
            tracing::info!("Using in-memory store; warn metric state is lost on restart");
            Ok(Arc::new(MemoryKvStore::new()))
        }
    }
}

/// Pick the notification transport from the configured webhooks
pub fn build_transport(config: &AlertsConfig) -> Arc<dyn NotificationTransport> {
    let notifications = &config.notifications;
    if notifications.bot_webhook_url.is_some() || notifications.email_webhook_url.is_some() {
        Arc::new(WebhookTransport::new(
            notifications.bot_webhook_url.clone(),
            notifications.email_webhook_url.clone(),
        ))
    } else {
        Arc::new(LogTransport)
    }
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let kv = open_store(&config)?;
    let registry = Arc::new(MetricRegistry::builtin());
    let transport = build_transport(&config.alerts);

    let service = Arc::new(WarnMetricService::new(
        registry,
        kv,
        transport,
        &config.alerts,
    ));
    let snapshot = Arc::new(ObservationSnapshot::new());

    // Start background job
    let job = Arc::new(WarnMetricJob::new(
        Arc::clone(&service),
        snapshot.clone(),
        &config.alerts,
    ));
    let job_handle = Arc::clone(&job).start();

    let state = Arc::new(AppState {
        service,
        snapshot,
        job: Some(Arc::clone(&job)),
    });

    // Build router
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting warnwatch server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&job)))
        .await?;

    // Wait for the job to stop
    if let Err(e) = job_handle.await {
        tracing::error!(error = %e, "Warn metric job ended abnormally");
    }

    tracing::info!("warnwatch server stopped");
    Ok(())
}

async fn shutdown_signal(job: Arc<WarnMetricJob>) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");

    tracing::info!("Shutdown signal received, stopping warn metric job...");
    job.stop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    use crate::metrics::registry::{WARN_METRIC_MFA, WARN_METRIC_NUMBER_OF_TEAMS_5};

    fn create_test_app() -> (Arc<MemoryKvStore>, Router) {
        let (kv, _, app) = create_test_app_with_snapshot();
        (kv, app)
    }

    fn create_test_app_with_snapshot() -> (Arc<MemoryKvStore>, Arc<ObservationSnapshot>, Router) {
        let kv = Arc::new(MemoryKvStore::new());
        let config = AlertsConfig::default();
        let service = Arc::new(WarnMetricService::new(
            Arc::new(MetricRegistry::builtin()),
            kv.clone(),
            Arc::new(LogTransport),
            &config,
        ));
        let snapshot = Arc::new(ObservationSnapshot::new());
        let state = Arc::new(AppState {
            service,
            snapshot: snapshot.clone(),
            job: None,
        });
        (kv, snapshot, build_router(state))
    }

    fn run_request() -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/warn_metrics/run")
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (_, app) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_evaluate_then_ack() {
        let (_, app) = create_test_app();

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/warn_metrics/evaluate/{}", WARN_METRIC_NUMBER_OF_TEAMS_5),
                serde_json::json!({ "value": 5 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["decision"], "fire");
        assert_eq!(body["dispatched"]["type"], "bot_message");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/warn_metrics/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(
            body[WARN_METRIC_NUMBER_OF_TEAMS_5]["store_status"],
            "runonce"
        );

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/warn_metrics/ack/{}", WARN_METRIC_NUMBER_OF_TEAMS_5),
                serde_json::json!({ "forceAck": false }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["acked"], true);
        assert_eq!(body["store_status"], "ack");
    }

    #[tokio::test]
    async fn test_ack_before_fire_conflicts() {
        let (_, app) = create_test_app();

        let response = app
            .oneshot(post_json(
                &format!("/warn_metrics/ack/{}", WARN_METRIC_MFA),
                serde_json::json!({ "forceAck": false }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_ack_without_body_is_normal_ack() {
        let (_, app) = create_test_app();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/warn_metrics/ack/{}", WARN_METRIC_MFA))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        app.clone()
            .oneshot(post_json(
                &format!("/warn_metrics/evaluate/{}", WARN_METRIC_MFA),
                serde_json::json!({ "value": true }),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/warn_metrics/ack/{}", WARN_METRIC_MFA))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["acked"], true);
    }

    #[tokio::test]
    async fn test_force_ack_from_body_field() {
        let (_, app) = create_test_app();

        let response = app
            .oneshot(post_json(
                &format!("/warn_metrics/ack/{}", WARN_METRIC_MFA),
                serde_json::json!({ "forceAck": true }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_metric_not_found() {
        let (_, app) = create_test_app();

        let response = app
            .clone()
            .oneshot(post_json(
                "/warn_metrics/evaluate/not_a_metric",
                serde_json::json!({ "value": 1 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(post_json(
                "/warn_metrics/ack/not_a_metric",
                serde_json::json!({ "forceAck": true }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_observation_bad_request() {
        let (_, snapshot, app) = create_test_app_with_snapshot();

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/warn_metrics/evaluate/{}", WARN_METRIC_NUMBER_OF_TEAMS_5),
                serde_json::json!({ "value": true }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(snapshot.get(WARN_METRIC_NUMBER_OF_TEAMS_5).is_none());

        let body = body_json(app.oneshot(run_request()).await.unwrap()).await;
        assert_eq!(body["checked"], 0);
    }

    #[tokio::test]
    async fn test_observations_reject_wrong_kind() {
        let (_, snapshot, app) = create_test_app_with_snapshot();

        let mut values = serde_json::Map::new();
        values.insert(WARN_METRIC_NUMBER_OF_TEAMS_5.to_string(), true.into());
        values.insert(WARN_METRIC_MFA.to_string(), true.into());

        let response = app
            .clone()
            .oneshot(post_json(
                "/warn_metrics/observations",
                serde_json::Value::Object(values),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(snapshot.get(WARN_METRIC_NUMBER_OF_TEAMS_5).is_none());
        assert!(snapshot.get(WARN_METRIC_MFA).is_none());

        let body = body_json(app.oneshot(run_request()).await.unwrap()).await;
        assert_eq!(body["checked"], 0);
        assert_eq!(body["fired"], 0);
    }

    #[tokio::test]
    async fn test_store_outage_unavailable() {
        let (kv, app) = create_test_app();
        kv.set_offline(true);

        let response = app
            .oneshot(post_json(
                &format!("/warn_metrics/evaluate/{}", WARN_METRIC_MFA),
                serde_json::json!({ "value": true }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_observations_run_cycle() {
        let (_, app) = create_test_app();

        let mut values = serde_json::Map::new();
        values.insert(WARN_METRIC_NUMBER_OF_TEAMS_5.to_string(), 7.into());
        values.insert(WARN_METRIC_MFA.to_string(), false.into());

        let response = app
            .clone()
            .oneshot(post_json(
                "/warn_metrics/observations",
                serde_json::Value::Object(values),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["checked"], 2);
        assert_eq!(body["fired"], 1);

        // Re-running the same snapshot fires nothing new
        let response = app.oneshot(run_request()).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["checked"], 2);
        assert_eq!(body["fired"], 0);
    }

    #[tokio::test]
    async fn test_observations_reject_unknown_ids() {
        let (_, app) = create_test_app();

        let response = app
            .oneshot(post_json(
                "/warn_metrics/observations",
                serde_json::json!({ "not_a_metric": 1 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_single_status_defaults_to_unset() {
        let (_, app) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/warn_metrics/status/{}", WARN_METRIC_MFA))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["acked"], false);
        assert!(body.get("store_status").is_none());
    }
}
