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

use crate::client::LakeClient;
use crate::metrics::LakeMetrics;
use crate::parser;
use crate::refresh::{LakeReader, LakeRefresher, RefreshHandle};
use crate::sensor::LakeSensor;
use crate::setup::{SetupError, SourceValidator};
use crate::store::{EntryStore, LakeEntry, StoreError};
use reqwest::Url;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{Instrument, Level};

#[derive(Debug)]
struct LakeInstance {
    entry: LakeEntry,
    handle: RefreshHandle,
}

/// All configured lakes, each with its own refresher running in the background.
///
/// Lakes are keyed by the ID derived from the URL they were first registered with. Changes
/// to the set of lakes are persisted to an `EntryStore` before they take effect.
#[derive(Debug)]
pub struct LakeRegistry {
    client: LakeClient,
    validator: SourceValidator,
    metrics: Arc<LakeMetrics>,
    store: EntryStore,
    period: Duration,
    instances: Mutex<BTreeMap<String, LakeInstance>>,
}

impl LakeRegistry {
    pub fn new(
        client: LakeClient,
        validator: SourceValidator,
        metrics: Arc<LakeMetrics>,
        store: EntryStore,
        period: Duration,
    ) -> Self {
        LakeRegistry {
            client,
            validator,
            metrics,
            store,
            period,
            instances: Mutex::new(BTreeMap::new()),
        }
    }

    /// Start refreshers for every lake in the store, returning the number of lakes.
    ///
    /// The first fetch for each lake is made before its refresher is started. Lakes where
    /// this fails are still started but won't have a sensor until a fetch succeeds.
    pub async fn restore(&self) -> Result<usize, StoreError> {
        let entries = self.store.load().await?;
        let mut started = Vec::with_capacity(entries.len());

        for entry in entries {
            let url = match Url::parse(&entry.lake_url) {
                Ok(u) => u,
                Err(e) => {
                    tracing::error!(message = "skipping lake with invalid URL", lake_id = %entry.lake_id, url = %entry.lake_url, error = %e);
                    continue;
                }
            };

            let refresher = LakeRefresher::new(self.client.clone(), self.metrics.clone(), url);
            match refresher
                .refresh()
                .instrument(tracing::span!(Level::DEBUG, "lake_first_refresh"))
                .await
            {
                Ok(s) => {
                    tracing::info!(message = "restored lake", lake_id = %entry.lake_id, temperature = ?s.record.temperature_c);
                }
                Err(e) => {
                    tracing::warn!(message = "failed initial fetch for lake, will retry", lake_id = %entry.lake_id, error = %e);
                }
            }

            let handle = refresher.spawn(self.period);
            started.push(LakeInstance { entry, handle });
        }

        let mut instances = self.instances.lock().await;
        for instance in started {
            if let Some(prev) = instances.insert(instance.entry.lake_id.clone(), instance) {
                prev.handle.cancel();
            }
        }

        Ok(instances.len())
    }

    /// Validate and add a new lake, starting a refresher for it.
    ///
    /// The record fetched while validating the URL is published as the first snapshot
    /// for the lake.
    pub async fn register(&self, url: &str) -> Result<LakeEntry, SetupError> {
        let record = self.validator.probe(url).await?;
        let parsed = self.validator.check_source(&record.lake_url)?;
        let mut instances = self.instances.lock().await;

        if Self::is_duplicate(&instances, &record.lake_id, None) {
            return Err(SetupError::Duplicate(record.lake_id));
        }

        let entry = LakeEntry::from(&record);
        let mut entries = Self::entries_of(&instances);
        entries.push(entry.clone());
        self.store.save(&entries).await?;

        let refresher = LakeRefresher::new(self.client.clone(), self.metrics.clone(), parsed);
        refresher.publish(record);
        let handle = refresher.spawn(self.period);
        instances.insert(entry.lake_id.clone(), LakeInstance { entry: entry.clone(), handle });

        tracing::info!(message = "registered lake", lake_id = %entry.lake_id, url = %entry.lake_url);
        Ok(entry)
    }

    /// Point an existing lake at a new URL and fetch it immediately.
    ///
    /// The lake keeps its ID. The new URL is rejected if it belongs to a different lake
    /// that is already configured.
    pub async fn reconfigure(&self, lake_id: &str, url: &str) -> Result<LakeEntry, SetupError> {
        if !self.instances.lock().await.contains_key(lake_id) {
            return Err(SetupError::UnknownLake(lake_id.to_owned()));
        }

        let record = self.validator.probe(url).await?;
        let parsed = self.validator.check_source(&record.lake_url)?;
        let mut instances = self.instances.lock().await;

        if Self::is_duplicate(&instances, &record.lake_id, Some(lake_id)) {
            return Err(SetupError::Duplicate(record.lake_id));
        }

        let mut entries = Self::entries_of(&instances);
        let updated = entries
            .iter_mut()
            .find(|e| e.lake_id == lake_id)
            .map(|e| {
                e.lake_url = record.lake_url.clone();
                e.clone()
            })
            .ok_or_else(|| SetupError::UnknownLake(lake_id.to_owned()))?;
        self.store.save(&entries).await?;

        if let Some(instance) = instances.get_mut(lake_id) {
            instance.entry = updated.clone();
            instance.handle.reconfigure(parsed);
        }

        tracing::info!(message = "reconfigured lake", lake_id = %lake_id, url = %updated.lake_url);
        Ok(updated)
    }

    /// Stop and remove a lake. A fetch for it that is in progress is abandoned.
    pub async fn remove(&self, lake_id: &str) -> Result<LakeEntry, SetupError> {
        let mut instances = self.instances.lock().await;
        if !instances.contains_key(lake_id) {
            return Err(SetupError::UnknownLake(lake_id.to_owned()));
        }

        let entries: Vec<LakeEntry> = Self::entries_of(&instances)
            .into_iter()
            .filter(|e| e.lake_id != lake_id)
            .collect();
        self.store.save(&entries).await?;

        let instance = instances
            .remove(lake_id)
            .ok_or_else(|| SetupError::UnknownLake(lake_id.to_owned()))?;
        // Nothing is published once cancel() returns, so the series stay removed.
        instance.handle.cancel();
        if let Some(snapshot) = instance.handle.reader().current() {
            self.metrics.forget(&snapshot.record);
        }
        self.metrics.forget_failures(lake_id);
        self.metrics
            .forget_failures(&parser::lake_id(&instance.handle.refresher().url()));

        tracing::info!(message = "removed lake", lake_id = %lake_id);
        Ok(instance.entry)
    }

    pub async fn entries(&self) -> Vec<LakeEntry> {
        Self::entries_of(&*self.instances.lock().await)
    }

    pub async fn reader(&self, lake_id: &str) -> Option<LakeReader> {
        self.instances.lock().await.get(lake_id).map(|i| i.handle.reader())
    }

    /// Sensors for all lakes that have data.
    pub async fn sensors(&self) -> Vec<LakeSensor> {
        self.instances
            .lock()
            .await
            .values()
            .filter_map(Self::sensor_of)
            .collect()
    }

    pub async fn sensor(&self, lake_id: &str) -> Option<LakeSensor> {
        self.instances.lock().await.get(lake_id).and_then(Self::sensor_of)
    }

    /// Stop all refreshers and wait for them to finish.
    pub async fn shutdown(&self) {
        let instances = std::mem::take(&mut *self.instances.lock().await);
        for (_, instance) in instances {
            instance.handle.shutdown().await;
        }
    }

    fn sensor_of(instance: &LakeInstance) -> Option<LakeSensor> {
        instance
            .handle
            .reader()
            .current()
            .map(|s| LakeSensor::new(&instance.entry, &s))
    }

    fn entries_of(instances: &BTreeMap<String, LakeInstance>) -> Vec<LakeEntry> {
        instances.values().map(|i| i.entry.clone()).collect()
    }

    /// True if any lake other than `except` has the ID `lake_id` or currently uses a URL
    /// that would be given that ID.
    fn is_duplicate(instances: &BTreeMap<String, LakeInstance>, lake_id: &str, except: Option<&str>) -> bool {
        instances
            .iter()
            .filter(|(key, _)| Some(key.as_str()) != except)
            .any(|(key, instance)| {
                key == lake_id
                    || Url::parse(&instance.entry.lake_url)
                        .map(|u| parser::lake_id(&u) == lake_id)
                        .unwrap_or(false)
            })
    }
}
