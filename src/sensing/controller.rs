use anyhow::{bail, Context, Result};
use log::info;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::metrics::MetricsCollector;
use crate::settings::SettingsStore;
use crate::status::{ControlCommand, RunStatus};

use super::loop_worker::{Bridges, Runner};

/// Depth of the admin-to-loop command queue.
pub const COMMAND_QUEUE_DEPTH: usize = 10;

/// Owns the capture loop task and the producer end of its command queue.
pub struct SensingController {
    handle: Option<JoinHandle<Result<()>>>,
    cancel_token: CancellationToken,
    control_tx: mpsc::Sender<ControlCommand>,
    control_rx: Option<mpsc::Receiver<ControlCommand>>,
}

impl SensingController {
    /// The loop is cancelled together with `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        let (control_tx, control_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        Self {
            handle: None,
            cancel_token: parent.child_token(),
            control_tx,
            control_rx: Some(control_rx),
        }
    }

    /// Sender for control commands; valid before and after `start`.
    pub fn control(&self) -> mpsc::Sender<ControlCommand> {
        self.control_tx.clone()
    }

    pub fn start(
        &mut self,
        settings: Arc<SettingsStore>,
        status: RunStatus,
        metrics: MetricsCollector,
        bridges: Bridges,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("capture loop already active");
        }
        let Some(commands) = self.control_rx.take() else {
            bail!("capture loop already ran; create a new controller");
        };

        let runner = Runner::new(settings, status, metrics, bridges, commands);
        self.handle = Some(tokio::spawn(runner.run(self.cancel_token.clone())));
        info!("capture loop spawned");
        Ok(())
    }

    /// Waits for the loop to finish on its own (a `Stop` command or the
    /// parent token).
    pub async fn join(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.await.context("capture loop task failed to join")?,
            None => Ok(()),
        }
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.cancel_token.cancel();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensing::loop_worker::testing::{test_config, FakeDelivery, FakeOcr, ScriptedSource};
    use crate::status::RunMode;

    fn fixtures(dir: &tempfile::TempDir) -> (Arc<SettingsStore>, MetricsCollector, Bridges) {
        let config = test_config(&dir.path().join("output"));
        let metrics = MetricsCollector::open(config.metrics_path()).unwrap();
        let settings = Arc::new(SettingsStore::with_config(
            dir.path().join("config.json"),
            config,
        ));
        let bridges = Bridges {
            source: Box::new(ScriptedSource::new(Vec::new())),
            recognizer: Arc::new(FakeOcr::returning("")),
            delivery: Arc::new(FakeDelivery::default()),
        };
        (settings, metrics, bridges)
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, metrics, bridges) = fixtures(&dir);
        let status = RunStatus::new();

        let mut controller = SensingController::new(&CancellationToken::new());
        controller
            .start(settings, status.clone(), metrics, bridges)
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert_eq!(status.mode(), RunMode::Running);

        controller.stop().await.unwrap();
        assert_eq!(status.mode(), RunMode::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_command_ends_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, metrics, bridges) = fixtures(&dir);
        let status = RunStatus::new();

        let mut controller = SensingController::new(&CancellationToken::new());
        let control = controller.control();
        controller
            .start(settings, status.clone(), metrics, bridges)
            .unwrap();

        control.send(ControlCommand::Stop).await.unwrap();
        controller.join().await.unwrap();
        assert_eq!(status.mode(), RunMode::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_token_cancels_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, metrics, bridges) = fixtures(&dir);
        let parent = CancellationToken::new();

        let mut controller = SensingController::new(&parent);
        controller
            .start(settings, RunStatus::new(), metrics, bridges)
            .unwrap();
        parent.cancel();
        controller.join().await.unwrap();
    }

    #[tokio::test]
    async fn cannot_start_twice() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, metrics, bridges) = fixtures(&dir);
        let (_, _, second) = fixtures(&dir);

        let mut controller = SensingController::new(&CancellationToken::new());
        controller
            .start(Arc::clone(&settings), RunStatus::new(), metrics.clone(), bridges)
            .unwrap();
        assert!(controller
            .start(settings, RunStatus::new(), metrics, second)
            .is_err());
        controller.stop().await.unwrap();
    }
}
