use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use archive_logging::{archive_debug, archive_error, archive_warn};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::client::RemoteApi;
use crate::{ApiError, Params};

/// Slack added to every window so timer rounding never lets a call in early.
const SLOT_MARGIN: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Call starts allowed in any one `window`, across all workers.
    pub requests_per_second: u32,
    pub window: Duration,
    /// Attempts allowed per process run, retries included.
    pub daily_limit: u64,
    /// Total attempts per call, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            requests_per_second: 3,
            window: Duration::from_secs(1),
            daily_limit: 10_000,
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Attempts made, retries included.
    pub calls: u64,
    pub retries: u64,
    pub quota_exhausted: bool,
}

#[derive(Debug, Default)]
struct GateState {
    /// Start times of recent slot reservations, ascending. May lie in the future.
    recent: VecDeque<Instant>,
    used: u64,
    exhausted: bool,
    retries: u64,
}

/// The single funnel every remote call goes through.
///
/// Holds the sliding rate window, the daily budget and the retry policy.
/// Share one instance between workers through an `Arc`.
pub struct Gateway {
    api: Arc<dyn RemoteApi>,
    settings: GatewaySettings,
    state: Mutex<GateState>,
    cancel: CancellationToken,
}

impl Gateway {
    pub fn new(api: Arc<dyn RemoteApi>, settings: GatewaySettings, cancel: CancellationToken) -> Self {
        Self {
            api,
            settings,
            state: Mutex::new(GateState::default()),
            cancel,
        }
    }

    pub async fn stats(&self) -> GatewayStats {
        let state = self.state.lock().await;
        GatewayStats {
            calls: state.used,
            retries: state.retries,
            quota_exhausted: state.exhausted,
        }
    }

    /// Calls `method`, retrying rate-limit and transient failures with
    /// exponential backoff.
    pub async fn call(&self, method: &str, params: &Params) -> Result<Value, ApiError> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.acquire_slot().await?;

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ApiError::Cancelled),
                result = self.api.call(method, params) => result,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(ApiError::QuotaExhausted) => {
                    self.latch_quota("remote reported the daily limit").await;
                    return Err(ApiError::QuotaExhausted);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    archive_warn!(
                        "{method} failed ({err}); retry {attempt}/{} in {delay:?}",
                        max_attempts - 1
                    );
                    self.state.lock().await.retries += 1;
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(ApiError::Cancelled),
                        _ = sleep(delay) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.settings
            .initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.settings.max_backoff)
    }

    async fn latch_quota(&self, why: &str) {
        let mut state = self.state.lock().await;
        if !state.exhausted {
            state.exhausted = true;
            archive_error!("Daily request quota exhausted: {why}; no further calls will be made");
        }
    }

    /// Reserves the next start slot in the rate window and waits for it.
    async fn acquire_slot(&self) -> Result<(), ApiError> {
        if self.cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        let slot = {
            let mut state = self.state.lock().await;
            if state.exhausted {
                return Err(ApiError::QuotaExhausted);
            }
            if state.used >= self.settings.daily_limit {
                state.exhausted = true;
                archive_error!(
                    "Daily request budget of {} used up; no further calls will be made",
                    self.settings.daily_limit
                );
                return Err(ApiError::QuotaExhausted);
            }

            let span = self.settings.window + SLOT_MARGIN;
            let capacity = self.settings.requests_per_second.max(1) as usize;
            let now = Instant::now();
            while state.recent.front().is_some_and(|start| *start + span <= now) {
                state.recent.pop_front();
            }
            let slot = if state.recent.len() >= capacity {
                state.recent[state.recent.len() - capacity] + span
            } else {
                now
            };
            state.recent.push_back(slot);
            state.used += 1;
            slot
        };

        if slot > Instant::now() {
            archive_debug!("Rate window full; waiting {:?}", slot - Instant::now());
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ApiError::Cancelled),
                _ = sleep_until(slot) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Never;

    #[async_trait::async_trait]
    impl RemoteApi for Never {
        async fn call(&self, _method: &str, _params: &Params) -> Result<Value, ApiError> {
            Err(ApiError::Transient("unused".into()))
        }
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let gateway = Gateway::new(
            Arc::new(Never),
            GatewaySettings {
                initial_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_millis(500),
                ..GatewaySettings::default()
            },
            CancellationToken::new(),
        );
        let delays: Vec<u128> = (1..=5).map(|n| gateway.backoff(n).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }
}
