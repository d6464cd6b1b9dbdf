//! Reconciliation loop: periodically re-discovers containers and publishes a
//! fresh configuration snapshot.
//!
//! One background task per provider instance. Cycles never overlap; the timer
//! is only waited on again after the current cycle finishes. Transient cycle
//! errors are logged and the tick skipped, they never end the loop. Only
//! `stop()` (or the consumer going away) does.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::docker::{fetch_inventory, ControlApi};
use crate::error::{Error, Result};
use crate::filter::MembershipFilter;
use crate::synth::Synthesizer;
use crate::traefik::DynamicConfiguration;

/// Lifecycle of a provider. There is no way back from `Stopped`; construct a
/// new provider to restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

/// One fetch → filter → synthesize pass, shared between the loop task and
/// direct callers (tests, one-shot dumps).
pub struct Pipeline {
    api: Arc<dyn ControlApi>,
    filter: MembershipFilter,
    synthesizer: Synthesizer,
}

impl Pipeline {
    pub fn new(api: Arc<dyn ControlApi>, filter: MembershipFilter, synthesizer: Synthesizer) -> Self {
        Self {
            api,
            filter,
            synthesizer,
        }
    }

    /// Runs one discovery cycle and returns the resulting snapshot.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<DynamicConfiguration> {
        let inventory = fetch_inventory(self.api.as_ref(), cancel).await?;
        let eligible = self.filter.filter(inventory);
        debug!("{} containers eligible for routing", eligible.len());
        Ok(self.synthesizer.synthesize(&eligible))
    }
}

/// Handle owning the background reconciliation task.
///
/// Single-writer contract: `start()` succeeds exactly once, `stop()` is
/// idempotent and safe to call before `start()`.
pub struct Provider {
    pipeline: Arc<Pipeline>,
    poll_interval: Duration,
    state: Arc<Mutex<LoopState>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Provider {
    pub fn new(pipeline: Pipeline, poll_interval: Duration) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            poll_interval,
            state: Arc::new(Mutex::new(LoopState::Idle)),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Spawns the loop task. Snapshots are published on `tx`, which is
    /// unbounded so the loop never blocks on a slow consumer; each snapshot
    /// supersedes the previous one. The first tick fires one full interval
    /// after start.
    pub fn start(&self, tx: UnboundedSender<DynamicConfiguration>) -> Result<()> {
        let mut state = lock_state(&self.state);
        if *state != LoopState::Idle {
            return Err(Error::AlreadyStarted);
        }
        *state = LoopState::Running;
        drop(state);

        let pipeline = Arc::clone(&self.pipeline);
        let poll_interval = self.poll_interval;
        let cancel = self.cancel.clone();
        let loop_state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            run_loop(pipeline, poll_interval, tx, cancel).await;
            *lock_state(&loop_state) = LoopState::Stopped;
        });
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Signals cancellation and waits for the loop task to exit. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                debug!("reconciliation task join failed: {}", e);
            }
        }
        *lock_state(&self.state) = LoopState::Stopped;
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    pub fn state(&self) -> LoopState {
        *lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<LoopState>) -> std::sync::MutexGuard<'_, LoopState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

async fn run_loop(
    pipeline: Arc<Pipeline>,
    poll_interval: Duration,
    tx: UnboundedSender<DynamicConfiguration>,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("reconciliation loop started, polling every {:?}", poll_interval);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("reconciliation loop stopping");
                break;
            }
            _ = ticker.tick() => {
                match pipeline.run_cycle(&cancel).await {
                    Ok(snapshot) => {
                        if tx.send(snapshot).is_err() {
                            info!("snapshot consumer dropped, stopping loop");
                            break;
                        }
                    }
                    Err(Error::Cancelled) => break,
                    Err(e) => error!("discovery cycle failed, skipping tick: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::ContainerSummary;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct EmptyApi;

    #[async_trait]
    impl ControlApi for EmptyApi {
        async fn list_containers(
            &self,
            _cancel: &CancellationToken,
        ) -> Result<Vec<ContainerSummary>> {
            Ok(Vec::new())
        }

        async fn inspect_container(
            &self,
            _id: &str,
            _cancel: &CancellationToken,
        ) -> Result<HashMap<String, String>> {
            Ok(HashMap::new())
        }
    }

    fn provider(poll_interval: Duration) -> Provider {
        let pipeline = Pipeline::new(
            Arc::new(EmptyApi),
            MembershipFilter::new("net", "_1"),
            Synthesizer::new("net", "example.org", "websecure"),
        );
        Provider::new(pipeline, poll_interval)
    }

    #[tokio::test]
    async fn start_is_single_shot() {
        let provider = provider(Duration::from_secs(60));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        provider.start(tx.clone()).unwrap();
        assert!(matches!(provider.start(tx), Err(Error::AlreadyStarted)));
        provider.stop().await;
    }

    #[tokio::test]
    async fn stop_before_start_leaves_provider_stopped() {
        let provider = provider(Duration::from_secs(60));
        provider.stop().await;
        assert_eq!(provider.state(), LoopState::Stopped);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        assert!(matches!(provider.start(tx), Err(Error::AlreadyStarted)));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let provider = provider(Duration::from_secs(60));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        provider.start(tx).unwrap();
        provider.stop().await;
        provider.stop().await;
        assert!(!provider.is_running());
    }
}
