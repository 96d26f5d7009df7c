use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    db::{ReadingStore, WindowTable},
    error::{PipelineError, PipelineResult},
};

use super::render::{render, LineSeries};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Queries the newest `window_size` readings, one bounded round trip per call.
pub struct WindowReader {
    store: Arc<dyn ReadingStore>,
    window_size: usize,
    query_timeout: Duration,
}

impl WindowReader {
    pub fn new(store: Arc<dyn ReadingStore>, window_size: usize, query_timeout: Duration) -> Self {
        Self {
            store,
            window_size,
            query_timeout,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub async fn read(&self) -> PipelineResult<WindowTable> {
        tokio::time::timeout(self.query_timeout, self.store.latest(self.window_size))
            .await
            .map_err(|_| PipelineError::Timeout {
                operation: "window query",
                timeout: self.query_timeout,
            })?
    }
}

/// What the dashboard currently shows. Replaced wholesale on a successful
/// refresh; on a failed one only the failure bookkeeping changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub series: Vec<LineSeries>,
    pub rows: usize,
    pub window_size: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl Snapshot {
    fn empty(window_size: usize) -> Self {
        Self {
            series: render(&WindowTable::default()),
            rows: 0,
            window_size,
            refreshed_at: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

/// Shared between the refresh loop (writer) and the HTTP handlers (readers).
#[derive(Clone)]
pub struct DashboardState {
    snapshot: Arc<RwLock<Snapshot>>,
}

impl DashboardState {
    pub fn new(window_size: usize) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(Snapshot::empty(window_size))),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut Snapshot)) {
        let mut guard = match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut guard);
    }
}

/// One refresh tick: query, render, publish. A failed query leaves the
/// published series untouched.
pub async fn refresh_once(reader: &WindowReader, state: &DashboardState) -> PipelineResult<usize> {
    match reader.read().await {
        Ok(window) => {
            let series = render(&window);
            let rows = window.len();
            state.update(|snapshot| {
                *snapshot = Snapshot {
                    series,
                    rows,
                    window_size: reader.window_size(),
                    refreshed_at: Some(Utc::now()),
                    consecutive_failures: 0,
                    last_error: None,
                };
            });
            Ok(rows)
        }
        Err(err) => {
            let message = err.to_string();
            state.update(|snapshot| {
                snapshot.consecutive_failures = snapshot.consecutive_failures.saturating_add(1);
                snapshot.last_error = Some(message);
            });
            Err(err)
        }
    }
}

/// Refreshes on a fixed ticker until `cancel_token` fires. Failed ticks are
/// logged and skipped.
pub async fn refresh_loop(
    reader: WindowReader,
    state: DashboardState,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let tick_start = Instant::now();
                match refresh_once(&reader, &state).await {
                    Ok(rows) => log_debug!(
                        "dashboard refreshed with {} rows in {}ms",
                        rows,
                        tick_start.elapsed().as_millis()
                    ),
                    Err(err) => log_warn!(
                        "dashboard refresh skipped [{}]: {err}; keeping previous charts",
                        err.kind()
                    ),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("refresh loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewReading;
    use crate::testing::MemoryStore;
    use chrono::TimeZone;

    fn new_reading(seconds: i64, temperature: f64) -> NewReading {
        NewReading {
            timestamp: Some(
                Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
                    + chrono::Duration::seconds(seconds),
            ),
            temperature,
            humidity: 40.0,
            pressure: 1010.0,
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
        }
    }

    fn reader(store: Arc<MemoryStore>, window_size: usize) -> WindowReader {
        WindowReader::new(store, window_size, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn initial_snapshot_has_six_empty_series() {
        let state = DashboardState::new(300);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.series.len(), 6);
        assert!(snapshot.series.iter().all(|s| s.points.is_empty()));
        assert_eq!(snapshot.refreshed_at, None);
    }

    #[tokio::test]
    async fn refresh_publishes_the_latest_window() {
        let store = Arc::new(MemoryStore::new());
        for (i, t) in [20.1, 20.4, 19.9].into_iter().enumerate() {
            store.append(&new_reading(i as i64, t)).await.unwrap();
        }
        let state = DashboardState::new(2);

        let rows = refresh_once(&reader(store, 2), &state).await.unwrap();

        assert_eq!(rows, 2);
        let snapshot = state.snapshot();
        let temps: Vec<_> = snapshot.series[0].points.iter().map(|p| p.value).collect();
        assert_eq!(temps, vec![Some(19.9), Some(20.4)]);
        assert!(snapshot.refreshed_at.is_some());
    }

    #[tokio::test]
    async fn empty_store_renders_empty_series() {
        let store = Arc::new(MemoryStore::new());
        let state = DashboardState::new(300);

        assert_eq!(refresh_once(&reader(store, 300), &state).await.unwrap(), 0);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.series.len(), 6);
        assert!(snapshot.refreshed_at.is_some());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_series() {
        let store = Arc::new(MemoryStore::new());
        store.append(&new_reading(0, 21.0)).await.unwrap();
        let state = DashboardState::new(300);
        let reader = reader(store.clone(), 300);

        refresh_once(&reader, &state).await.unwrap();
        let before = state.snapshot();

        store.set_unavailable(true);
        let err = refresh_once(&reader, &state).await.unwrap_err();
        assert!(matches!(err, PipelineError::StoreUnavailable(_)));

        let after = state.snapshot();
        assert_eq!(after.series, before.series);
        assert_eq!(after.refreshed_at, before.refreshed_at);
        assert_eq!(after.consecutive_failures, 1);
        assert!(after.last_error.unwrap().contains("connection refused"));

        store.set_unavailable(false);
        store.append(&new_reading(1, 22.0)).await.unwrap();
        refresh_once(&reader, &state).await.unwrap();
        let recovered = state.snapshot();
        assert_eq!(recovered.rows, 2);
        assert_eq!(recovered.consecutive_failures, 0);
        assert_eq!(recovered.last_error, None);
    }

    #[tokio::test]
    async fn loop_keeps_running_through_outages() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let state = DashboardState::new(300);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(refresh_loop(
            reader(store.clone(), 300),
            state.clone(),
            Duration::from_millis(10),
            cancel.clone(),
        ));

        let deadline = Instant::now() + Duration::from_secs(5);
        while state.snapshot().consecutive_failures < 2 {
            assert!(Instant::now() < deadline, "refresh loop stalled");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        store.set_unavailable(false);
        store.append(&new_reading(0, 23.5)).await.unwrap();
        while state.snapshot().rows == 0 {
            assert!(Instant::now() < deadline, "refresh loop never recovered");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("refresh loop ignored cancellation")
            .unwrap();
    }
}
