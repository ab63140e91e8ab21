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

use crate::record::{LakeRecord, LakeSnapshot};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct LakeLabels {
    lake_id: String,
}

impl LakeLabels {
    fn new(lake_id: &str) -> Self {
        LakeLabels {
            lake_id: lake_id.to_owned(),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct InfoLabels {
    lake_id: String,
    lake_name: String,
    lake_url: String,
}

impl From<&LakeRecord> for InfoLabels {
    fn from(record: &LakeRecord) -> Self {
        InfoLabels {
            lake_id: record.lake_id.clone(),
            lake_name: record.lake_name.clone(),
            lake_url: record.lake_url.clone(),
        }
    }
}

/// Holder for metrics that can be set from a `LakeSnapshot`.
///
/// All metrics are created and registered upon call to `LakeMetrics::new()`. Metrics
/// all share the prefix "lake_" and have a "lake_id" label set to the identifier of the
/// lake (e.g. `{lake_id="bodensee"}`).
#[derive(Debug, Default)]
pub struct LakeMetrics {
    info: Family<InfoLabels, Gauge>,
    temperature: Family<LakeLabels, Gauge<f64, AtomicU64>>,
    last_update: Family<LakeLabels, Gauge>,
    failures: Family<LakeLabels, Counter>,
}

impl LakeMetrics {
    /// Create a new `LakeMetrics` and register each metric with the provided `Registry`.
    pub fn new(reg: &mut Registry) -> Self {
        let metrics = Self::default();

        reg.register("lake_info", "Lake metadata", metrics.info.clone());
        reg.register(
            "lake_water_temperature_degrees",
            "Water temperature in celsius",
            metrics.temperature.clone(),
        );
        reg.register(
            "lake_last_update_timestamp_seconds",
            "Time of the last successful fetch, as a unix timestamp",
            metrics.last_update.clone(),
        );
        reg.register(
            "lake_refresh_failures",
            "Number of failed attempts to fetch the lake page",
            metrics.failures.clone(),
        );

        metrics
    }

    /// Set metrics from a newly published snapshot, replacing the series of the previous
    /// record if it was for a different lake or had different metadata.
    ///
    /// If the snapshot doesn't have a temperature, the temperature series is removed
    /// instead of being set to some placeholder value.
    pub fn observe(&self, previous: Option<&LakeRecord>, snapshot: &LakeSnapshot) {
        let record = &snapshot.record;
        let info = InfoLabels::from(record);

        if let Some(prev) = previous {
            if prev.lake_id != record.lake_id {
                self.forget(prev);
            } else {
                let prev_info = InfoLabels::from(prev);
                if prev_info != info {
                    self.info.remove(&prev_info);
                }
            }
        }

        let labels = LakeLabels::new(&record.lake_id);
        self.info.get_or_create(&info).set(1);
        self.last_update.get_or_create(&labels).set(snapshot.updated_at as i64);

        match record.temperature_c {
            Some(t) => {
                self.temperature.get_or_create(&labels).set(t);
            }
            None => {
                self.temperature.remove(&labels);
            }
        }
    }

    /// Count a failed fetch for the lake with the given ID.
    pub fn failure(&self, lake_id: &str) {
        self.failures.get_or_create(&LakeLabels::new(lake_id)).inc();
    }

    /// Remove all series for the lake the record is for.
    pub fn forget(&self, record: &LakeRecord) {
        let labels = LakeLabels::new(&record.lake_id);
        self.info.remove(&InfoLabels::from(record));
        self.temperature.remove(&labels);
        self.last_update.remove(&labels);
        self.failures.remove(&labels);
    }

    /// Remove the failure count for a lake that may never have had a successful fetch.
    pub fn forget_failures(&self, lake_id: &str) {
        self.failures.remove(&LakeLabels::new(lake_id));
    }
}

#[cfg(test)]
mod tests {
    use super::LakeMetrics;
    use crate::record::{LakeRecord, LakeSnapshot};
    use prometheus_client::encoding::text::encode;
    use prometheus_client::registry::Registry;

    fn record(lake_id: &str, temperature_c: Option<f64>) -> LakeRecord {
        LakeRecord {
            lake_url: format!("https://www.wassertemperatur.org/{}", lake_id),
            lake_id: lake_id.to_owned(),
            lake_name: "Bodensee".to_owned(),
            temperature_c,
        }
    }

    fn render(reg: &Registry) -> String {
        let mut buf = String::new();
        encode(&mut buf, reg).unwrap();
        buf
    }

    #[test]
    fn test_observe_sets_temperature() {
        let mut reg = Registry::default();
        let metrics = LakeMetrics::new(&mut reg);
        metrics.observe(None, &LakeSnapshot::new(record("bodensee", Some(18.5))));

        let out = render(&reg);
        assert!(out.contains("lake_water_temperature_degrees{lake_id=\"bodensee\"} 18.5"));
        assert!(out.contains("lake_info{"));
    }

    #[test]
    fn test_observe_missing_temperature_removes_series() {
        let mut reg = Registry::default();
        let metrics = LakeMetrics::new(&mut reg);
        let first = record("bodensee", Some(18.5));
        metrics.observe(None, &LakeSnapshot::new(first.clone()));
        metrics.observe(Some(&first), &LakeSnapshot::new(record("bodensee", None)));

        let out = render(&reg);
        assert!(!out.contains("lake_water_temperature_degrees{"));
        assert!(out.contains("lake_last_update_timestamp_seconds{lake_id=\"bodensee\"}"));
    }

    #[test]
    fn test_observe_new_lake_forgets_previous() {
        let mut reg = Registry::default();
        let metrics = LakeMetrics::new(&mut reg);
        let first = record("bodensee", Some(18.5));
        metrics.observe(None, &LakeSnapshot::new(first.clone()));
        metrics.failure("bodensee");
        metrics.observe(Some(&first), &LakeSnapshot::new(record("thunersee", Some(12.0))));

        let out = render(&reg);
        assert!(!out.contains("lake_id=\"bodensee\""));
        assert!(out.contains("lake_water_temperature_degrees{lake_id=\"thunersee\"} 12.0"));
    }

    #[test]
    fn test_failure_counter() {
        let mut reg = Registry::default();
        let metrics = LakeMetrics::new(&mut reg);
        metrics.failure("bodensee");
        metrics.failure("bodensee");

        let out = render(&reg);
        assert!(out.contains("lake_refresh_failures_total{lake_id=\"bodensee\"} 2"));
    }

    #[test]
    fn test_forget_failures_without_record() {
        let mut reg = Registry::default();
        let metrics = LakeMetrics::new(&mut reg);
        metrics.failure("bodensee");
        metrics.failure("thunersee");
        metrics.forget_failures("bodensee");

        let out = render(&reg);
        assert!(!out.contains("lake_id=\"bodensee\""));
        assert!(out.contains("lake_refresh_failures_total{lake_id=\"thunersee\"} 1"));
    }
}
