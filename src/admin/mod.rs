//! Local HTTP control plane: status, config edits, run/pause/stop and metrics.

pub mod handlers;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::metrics::MetricsCollector;
use crate::settings::SettingsStore;
use crate::status::{ControlCommand, RunStatus};

pub use handlers::AdminError;

#[derive(Clone)]
pub struct AdminState {
    pub status: RunStatus,
    pub settings: Arc<SettingsStore>,
    pub metrics: MetricsCollector,
    pub control: mpsc::Sender<ControlCommand>,
}

pub fn router(state: AdminState) -> Router {
    // The dashboard is served from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(handlers::get_status))
        .route(
            "/config",
            get(handlers::get_config).post(handlers::post_config),
        )
        .route("/control/{action}", post(handlers::post_control))
        .route("/metrics", get(handlers::get_metrics))
        .layer(cors)
        .with_state(state)
}

/// Serves until `shutdown` fires, then drains in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("admin HTTP listening on {addr}");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("admin server failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Config;
    use crate::status::{RunMode, RunState};
    use serde_json::Value;

    struct Fixture {
        _dir: tempfile::TempDir,
        state: AdminState,
        commands: mpsc::Receiver<ControlCommand>,
    }

    fn fixture(queue_depth: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            telegram_bot_token: "123:abc".into(),
            telegram_chat_id: 42,
            output_dir: dir.path().join("output"),
            ..Config::default()
        };
        let metrics = MetricsCollector::open(config.metrics_path()).unwrap();
        let settings = Arc::new(SettingsStore::with_config(
            dir.path().join("config.json"),
            config,
        ));
        let (control, commands) = mpsc::channel(queue_depth);
        Fixture {
            _dir: dir,
            state: AdminState {
                status: RunStatus::new(),
                settings,
                metrics,
                control,
            },
            commands,
        }
    }

    async fn spawn_server(
        state: AdminState,
    ) -> (String, CancellationToken, tokio::task::JoinHandle<Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve(listener, state, shutdown.clone()));
        (base, shutdown, handle)
    }

    #[tokio::test]
    async fn status_uses_dashboard_keys() {
        let fixture = fixture(4);
        fixture.state.status.set_mode(RunMode::Running);
        let (base, shutdown, handle) = spawn_server(fixture.state.clone()).await;

        let body: Value = reqwest::get(format!("{base}/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["Status"], "running");
        assert_eq!(body["SlidesCaptured"], 0);
        assert!(body["StartedAt"].is_string());
        assert!(body["LastSlideAt"].is_null());
        assert!(body.get("mode").is_none());

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn control_actions_are_queued() {
        let mut fixture = fixture(4);
        let (base, shutdown, handle) = spawn_server(fixture.state.clone()).await;
        let client = reqwest::Client::new();

        for action in ["pause", "start", "stop"] {
            let response = client
                .post(format!("{base}/control/{action}"))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 200);
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["ok"], true);
        }
        assert_eq!(fixture.commands.recv().await, Some(ControlCommand::Pause));
        assert_eq!(fixture.commands.recv().await, Some(ControlCommand::Run));
        assert_eq!(fixture.commands.recv().await, Some(ControlCommand::Stop));

        let unknown = client
            .post(format!("{base}/control/reboot"))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), 404);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn config_round_trips_and_rejects_invalid_edits() {
        let fixture = fixture(4);
        let (base, shutdown, handle) = spawn_server(fixture.state.clone()).await;
        let client = reqwest::Client::new();

        let mut config: Config = client
            .get(format!("{base}/config"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(config, fixture.state.settings.current());

        config.sensitivity = 0.2;
        let ok = client
            .post(format!("{base}/config"))
            .json(&config)
            .send()
            .await
            .unwrap();
        assert_eq!(ok.status(), 200);
        assert_eq!(fixture.state.settings.current().sensitivity, 0.2);
        assert!(fixture.state.settings.path().exists());

        let mut invalid = config.clone();
        invalid.sensitivity = 1.5;
        let rejected = client
            .post(format!("{base}/config"))
            .json(&invalid)
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status(), 400);
        let body: Value = rejected.json().await.unwrap();
        assert_eq!(body["ok"], false);
        assert!(body["error"].as_str().unwrap().contains("sensitivity"));
        assert_eq!(fixture.state.settings.current().sensitivity, 0.2);

        let malformed = client
            .post(format!("{base}/config"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert!(malformed.status().is_client_error());

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn full_or_closed_queue_is_unavailable() {
        let fixture = fixture(1);
        let state = fixture.state.clone();

        let axum::Json(ack) = handlers::post_control(
            axum::extract::State(state.clone()),
            axum::extract::Path("pause".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(ack, handlers::Ack { ok: true });
        let full = handlers::post_control(
            axum::extract::State(state.clone()),
            axum::extract::Path("stop".to_string()),
        )
        .await
        .unwrap_err();
        assert!(matches!(full, AdminError::QueueFull));

        drop(fixture.commands);
        let closed = handlers::post_control(
            axum::extract::State(state),
            axum::extract::Path("stop".to_string()),
        )
        .await
        .unwrap_err();
        assert!(matches!(closed, AdminError::LoopClosed));
    }

    #[tokio::test]
    async fn metrics_snapshot_is_served() {
        let fixture = fixture(4);
        let (base, shutdown, handle) = spawn_server(fixture.state.clone()).await;

        let body: Value = reqwest::get(format!("{base}/metrics"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["total_slides"], 0);
        assert!(body["recent_slides"].as_array().unwrap().is_empty());
        assert!(body.get("system").is_some());
        assert_eq!(body["ocr_accuracy"], 100.0);
        assert_eq!(body["telegram_success_rate"], 100.0);
        assert_eq!(body["processing_time"], 0.0);
        assert_eq!(body["last_hour_slides"], 0);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn status_snapshot_matches_handler() {
        let fixture = fixture(4);
        let axum::Json(snapshot) =
            handlers::get_status(axum::extract::State(fixture.state.clone())).await;
        assert_eq!(snapshot, RunState::default());
    }
}
