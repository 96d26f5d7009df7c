use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{sampling_loop, Sampler, SamplingStats};

/// Owns the background sampling task and its cancellation token.
pub struct SamplerController {
    handle: Option<JoinHandle<SamplingStats>>,
    cancel_token: Option<CancellationToken>,
}

impl SamplerController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start_sampling(
        &mut self,
        sampler: Sampler,
        interval: Duration,
        max_backoff: Duration,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("sampling already active");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        info!(
            "Starting sampling loop (interval {}ms, max backoff {}ms)",
            interval.as_millis(),
            max_backoff.as_millis()
        );
        let handle = tokio::spawn(sampling_loop(sampler, interval, max_backoff, token_clone));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancels the loop and waits for the in-flight cycle to finish.
    pub async fn stop_sampling(&mut self) -> Result<SamplingStats> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle.await.context("sampling loop task failed to join")
        } else {
            Ok(SamplingStats::default())
        }
    }
}

impl Default for SamplerController {
    fn default() -> Self {
        Self::new()
    }
}
