use anyhow::{bail, Context, Result};
use log::{error, info};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::machine::MachineController;

use super::ThroughputSource;

/// Drives [`MachineController::record_tick`] on a fixed cadence.
pub struct Sampler {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(
        &mut self,
        controller: MachineController,
        source: Box<dyn ThroughputSource>,
        interval: Duration,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("sampler already active");
        }
        if interval.is_zero() {
            bail!("sample interval must be greater than zero");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sampling_loop(
            controller,
            source,
            interval,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        info!("Sampler started with a {}ms interval", interval.as_millis());
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("sampling loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

async fn sampling_loop(
    controller: MachineController,
    mut source: Box<dyn ThroughputSource>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    // First sample one full period after start, not immediately.
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = controller.record_tick(source.as_mut()).await {
                    error!("sampling tick failed: {err}");
                }
            }
            _ = cancel_token.cancelled() => {
                info!("sampling loop shutting down");
                break;
            }
        }
    }
}
