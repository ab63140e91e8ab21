// lake_exporter - Prometheus metrics exporter for wassertemperatur.org
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::client::{ClientError, LakeClient};
use crate::metrics::LakeMetrics;
use crate::parser;
use crate::record::{LakeRecord, LakeSnapshot};
use reqwest::Url;
use std::error;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, Level};

#[derive(Debug)]
pub enum RefreshError {
    Client(ClientError),
    Cancelled,
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(e) => write!(f, "{}", e),
            Self::Cancelled => write!(f, "refresh cancelled"),
        }
    }
}

impl error::Error for RefreshError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Client(e) => Some(e),
            _ => None,
        }
    }
}

/// Outcome of the most recent fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    Idle,
    Fetching,
    Published,
    /// The fetch failed and the previously published snapshot, if any, was kept.
    Preserved { error: String },
}

/// Read-only view of the latest snapshot published by a `LakeRefresher`.
#[derive(Debug, Clone)]
pub struct LakeReader {
    current: watch::Receiver<Option<Arc<LakeSnapshot>>>,
    status: watch::Receiver<CycleStatus>,
}

impl LakeReader {
    pub fn current(&self) -> Option<Arc<LakeSnapshot>> {
        self.current.borrow().clone()
    }

    pub fn status(&self) -> CycleStatus {
        self.status.borrow().clone()
    }

    /// Wait until a snapshot newer than the last one seen by this reader is published.
    ///
    /// Returns `None` if the refresher has gone away.
    pub async fn changed(&mut self) -> Option<Arc<LakeSnapshot>> {
        self.current.changed().await.ok()?;
        self.current.borrow_and_update().clone()
    }
}

#[derive(Debug)]
struct Shared {
    client: LakeClient,
    metrics: Arc<LakeMetrics>,
    source: watch::Sender<Url>,
    current: watch::Sender<Option<Arc<LakeSnapshot>>>,
    status: watch::Sender<CycleStatus>,
    /// Held while publishing so that nothing is published once `cancel` returns.
    live: Mutex<bool>,
    shutdown: Notify,
}

/// Periodically fetches a single lake page and publishes the result.
///
/// The latest snapshot is only ever replaced by a newer one. A failed fetch leaves the
/// previous snapshot in place so that readers keep seeing the last good value until the
/// next successful fetch. Cycles for a single refresher never overlap.
#[derive(Debug, Clone)]
pub struct LakeRefresher {
    shared: Arc<Shared>,
}

impl LakeRefresher {
    pub fn new(client: LakeClient, metrics: Arc<LakeMetrics>, url: Url) -> Self {
        let (source, _) = watch::channel(url);
        let (current, _) = watch::channel(None);
        let (status, _) = watch::channel(CycleStatus::Idle);

        LakeRefresher {
            shared: Arc::new(Shared {
                client,
                metrics,
                source,
                current,
                status,
                live: Mutex::new(true),
                shutdown: Notify::new(),
            }),
        }
    }

    pub fn url(&self) -> Url {
        self.shared.source.borrow().clone()
    }

    pub fn reader(&self) -> LakeReader {
        LakeReader {
            current: self.shared.current.subscribe(),
            status: self.shared.status.subscribe(),
        }
    }

    pub fn is_live(&self) -> bool {
        *self.shared.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a single fetch cycle against the current URL.
    ///
    /// On success the new snapshot is published and returned. On failure the current
    /// snapshot is left untouched and the failure is recorded in the cycle status.
    pub async fn refresh(&self) -> Result<Arc<LakeSnapshot>, RefreshError> {
        if !self.is_live() {
            return Err(RefreshError::Cancelled);
        }

        let url = self.url();
        self.shared.status.send_replace(CycleStatus::Fetching);

        match self.shared.client.lake(&url).await {
            Ok(record) => self.publish(record).ok_or(RefreshError::Cancelled),
            Err(e) => {
                if self.preserve(&url, &e) {
                    Err(RefreshError::Client(e))
                } else {
                    Err(RefreshError::Cancelled)
                }
            }
        }
    }

    /// Record a failed fetch, keeping the current snapshot. Returns `false` without
    /// recording anything if this refresher has been cancelled.
    fn preserve(&self, url: &Url, e: &ClientError) -> bool {
        let live = self.shared.live.lock().unwrap_or_else(PoisonError::into_inner);
        if !*live {
            return false;
        }

        tracing::warn!(message = "failed to fetch lake page, keeping previous value", url = %url, error = %e);
        self.shared.metrics.failure(&parser::lake_id(url));
        self.shared
            .status
            .send_replace(CycleStatus::Preserved { error: e.to_string() });
        true
    }

    /// Publish a record as the latest snapshot, replacing the previous one.
    ///
    /// Returns `None` without publishing anything if this refresher has been cancelled.
    pub fn publish(&self, record: LakeRecord) -> Option<Arc<LakeSnapshot>> {
        let live = self.shared.live.lock().unwrap_or_else(PoisonError::into_inner);
        if !*live {
            tracing::debug!(message = "discarding record for cancelled refresher", lake_id = %record.lake_id);
            return None;
        }

        let snapshot = Arc::new(LakeSnapshot::new(record));
        let previous = self.shared.current.send_replace(Some(snapshot.clone()));
        self.shared
            .metrics
            .observe(previous.as_ref().map(|p| &p.record), &snapshot);
        self.shared.status.send_replace(CycleStatus::Published);
        drop(live);

        tracing::info!(
            message = "published lake snapshot",
            lake_id = %snapshot.record.lake_id,
            temperature = ?snapshot.record.temperature_c,
        );

        Some(snapshot)
    }

    /// Use a new URL for all following fetches. A refresher running via `spawn` fetches the
    /// new URL immediately instead of waiting for the next tick.
    pub fn reconfigure(&self, url: Url) {
        tracing::info!(message = "lake URL changed", url = %url);
        self.shared.source.send_replace(url);
    }

    /// Stop the refresher. A fetch in progress is abandoned and nothing is published
    /// after this method returns, including metrics.
    pub fn cancel(&self) {
        *self.shared.live.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.shared.shutdown.notify_one();
    }

    /// Run fetch cycles every `period` in a background task, starting one period from now.
    ///
    /// The first cycle is expected to have been run by the caller via `refresh()` so that
    /// it can decide what to do if it fails.
    pub fn spawn(&self, period: Duration) -> RefreshHandle {
        // Subscribe before the task starts so that a URL change made right after this
        // method returns is still seen as a change.
        let source = self.shared.source.subscribe();
        let refresher = self.clone();
        let span = tracing::span!(Level::DEBUG, "lake_refresh", url = %self.url());
        let task = tokio::spawn(async move { refresher.run(period, source).await }.instrument(span));

        RefreshHandle {
            refresher: self.clone(),
            task,
        }
    }

    async fn run(self, period: Duration, mut source: watch::Receiver<Url>) {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(message = "lake polling started", url = %self.url(), period_secs = period.as_secs());

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                res = source.changed() => {
                    if res.is_err() {
                        break;
                    }
                    interval.reset();
                }
                _ = self.shared.shutdown.notified() => break,
            }

            if !self.is_live() {
                break;
            }

            tokio::select! {
                _ = self.refresh() => {}
                _ = self.shared.shutdown.notified() => {
                    tracing::debug!(message = "abandoned lake fetch in progress");
                    break;
                }
            }
        }

        tracing::info!(message = "lake polling stopped", url = %self.url());
    }
}

/// Handle to a refresher running in the background.
#[derive(Debug)]
pub struct RefreshHandle {
    refresher: LakeRefresher,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub fn refresher(&self) -> &LakeRefresher {
        &self.refresher
    }

    pub fn reader(&self) -> LakeReader {
        self.refresher.reader()
    }

    pub fn reconfigure(&self, url: Url) {
        self.refresher.reconfigure(url);
    }

    pub fn cancel(&self) {
        self.refresher.cancel();
    }

    /// Cancel the refresher and wait for its background task to finish.
    pub async fn shutdown(self) {
        self.refresher.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(message = "lake refresh task failed", error = %e);
        }
    }
}
