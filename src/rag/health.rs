//! Background availability probing for the RAG service

use super::client::RagClient;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Last known availability of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// No probe has completed yet
    Unknown,
    Healthy,
    Unavailable,
}

impl HealthState {
    /// State after a probe; `None` when nothing changed
    pub fn transition(self, healthy: bool) -> Option<HealthState> {
        let next = if healthy {
            HealthState::Healthy
        } else {
            HealthState::Unavailable
        };
        (next != self).then_some(next)
    }
}

/// Handle to the health probing task.
///
/// Probes once at startup and then on every interval tick. State changes
/// are logged once per transition and published on a watch channel. The
/// task stops on `shutdown()` or when the handle is dropped.
pub struct HealthMonitor {
    state: watch::Receiver<HealthState>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl HealthMonitor {
    /// Start probing at the client's configured interval
    pub fn spawn(client: RagClient) -> Self {
        let every = client.config().health_interval();
        Self::spawn_with_interval(client, every)
    }

    /// Start probing every `every`; a zero interval is raised to one millisecond
    pub fn spawn_with_interval(client: RagClient, every: Duration) -> Self {
        let every = every.max(MIN_INTERVAL);
        let (state_tx, state_rx) = watch::channel(HealthState::Unknown);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let healthy = probe(&client).await;
                        let current = *state_tx.borrow();
                        if let Some(next) = current.transition(healthy) {
                            log_transition(current, next, &client);
                            state_tx.send_replace(next);
                        }
                    }
                }
            }
            tracing::debug!("RAG health monitor stopped");
        });

        Self {
            state: state_rx,
            stop: Some(stop_tx),
            task,
        }
    }

    pub fn state(&self) -> HealthState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthState> {
        self.state.clone()
    }

    /// Stop the probing task and wait for it to finish
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(error = %e, "RAG health monitor task failed");
        }
    }
}

async fn probe(client: &RagClient) -> bool {
    match client.health().await {
        Ok(response) => response.is_healthy(),
        Err(e) => {
            tracing::debug!(kind = %e.kind(), error = %e, "RAG health probe failed");
            false
        }
    }
}

fn log_transition(from: HealthState, to: HealthState, client: &RagClient) {
    let url = client.config().base_url();
    match (from, to) {
        (HealthState::Unavailable, HealthState::Healthy) => {
            tracing::info!(%url, "RAG service recovered")
        }
        (_, HealthState::Healthy) => tracing::info!(%url, "RAG service available"),
        (_, HealthState::Unavailable) => tracing::warn!(%url, "RAG service unavailable"),
        (_, HealthState::Unknown) => {}
    }
}
