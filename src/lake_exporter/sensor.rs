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

use crate::record::LakeSnapshot;
use crate::store::LakeEntry;
use serde::Serialize;

pub const ATTRIBUTION: &str = "Data provided by wassertemperatur.org";
pub const UNIT: &str = "°C";
const DEFAULT_NAME: &str = "Water Temperature";
const MANUFACTURER: &str = "wassertemperatur.org";
const MODEL: &str = "Lake Water Temperature";

/// Device that a lake sensor belongs to.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LakeDevice {
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub configuration_url: String,
}

/// Water temperature sensor for a single lake, as shown to consumers.
///
/// Values come from the latest snapshot, with the persisted entry used for anything the
/// snapshot doesn't have.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LakeSensor {
    pub name: String,
    pub temperature_c: Option<f64>,
    pub unit: &'static str,
    pub lake_id: String,
    pub lake_name: String,
    pub lake_url: String,
    pub attribution: &'static str,
    pub updated_at: u64,
    pub device: LakeDevice,
}

impl LakeSensor {
    pub fn new(entry: &LakeEntry, snapshot: &LakeSnapshot) -> Self {
        let record = &snapshot.record;
        let lake_id = or_fallback(&record.lake_id, &entry.lake_id);
        let lake_name = or_fallback(&record.lake_name, &entry.lake_name);
        let lake_url = or_fallback(&record.lake_url, &entry.lake_url);

        let device = LakeDevice {
            identifier: entry.lake_id.clone(),
            name: [&lake_name, &lake_id]
                .into_iter()
                .find(|s| !s.is_empty())
                .cloned()
                .unwrap_or_else(|| MANUFACTURER.to_owned()),
            manufacturer: MANUFACTURER,
            model: MODEL,
            configuration_url: lake_url.clone(),
        };

        LakeSensor {
            name: if lake_name.is_empty() {
                DEFAULT_NAME.to_owned()
            } else {
                lake_name.clone()
            },
            temperature_c: record.temperature_c.map(round_hundredths),
            unit: UNIT,
            lake_id,
            lake_name,
            lake_url,
            attribution: ATTRIBUTION,
            updated_at: snapshot.updated_at,
            device,
        }
    }
}

fn or_fallback(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_owned()
    } else {
        value.to_owned()
    }
}

fn round_hundredths(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
