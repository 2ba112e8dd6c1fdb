//! Fixed-interval refresh loop.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::DiscoveryError;
use crate::refresh::Discovery;
use crate::types::TargetGroup;

const UPDATE_BUFFER: usize = 4;

/// Polls a [`Discovery`] on a fixed interval and publishes changed results.
pub struct Runner {
    discovery: Discovery,
    interval: Duration,
    updates_tx: mpsc::Sender<Vec<TargetGroup>>,
    updates_rx: Option<mpsc::Receiver<Vec<TargetGroup>>>,
}

impl Runner {
    pub fn new(discovery: Discovery, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        Self {
            discovery,
            interval,
            updates_tx: tx,
            updates_rx: Some(rx),
        }
    }

    /// Takes the update receiver. Can only be called once.
    pub fn take_updates(&mut self) -> Option<mpsc::Receiver<Vec<TargetGroup>>> {
        self.updates_rx.take()
    }

    /// Runs refresh cycles until `cancel` fires or the update receiver is
    /// dropped.
    ///
    /// The first cycle starts immediately. A cycle that outlives the interval
    /// is cancelled, which still releases its session.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<Vec<TargetGroup>> = None;

        info!(interval = ?self.interval, source = %self.discovery.source(), "discovery runner started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let groups = match self.cycle(&cancel).await {
                Ok(groups) => groups,
                Err(DiscoveryError::Cancelled) if cancel.is_cancelled() => break,
                Err(e) => {
                    warn!(error = %e, "refresh failed, keeping previous targets");
                    continue;
                }
            };

            if last.as_ref() == Some(&groups) {
                debug!("targets unchanged");
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = self.updates_tx.send(groups.clone()) => {
                    if sent.is_err() {
                        info!("update receiver dropped");
                        break;
                    }
                }
            }
            last = Some(groups);
        }

        info!("discovery runner stopped");
    }

    /// Runs one refresh under a child token that a watchdog cancels once the
    /// interval has passed.
    async fn cycle(&self, cancel: &CancellationToken) -> Result<Vec<TargetGroup>, DiscoveryError> {
        let token = cancel.child_token();
        let watchdog = tokio::spawn({
            let token = token.clone();
            let deadline = self.interval;
            async move {
                tokio::time::sleep(deadline).await;
                warn!(?deadline, "refresh exceeded interval, cancelling");
                token.cancel();
            }
        });

        let result = self.discovery.refresh(&token).await;
        watchdog.abort();
        result
    }
}
