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

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Result of parsing a single lake page.
///
/// Records are never modified after they are created. Each successful fetch produces a
/// new one which replaces the previous record as a whole.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LakeRecord {
    pub lake_url: String,
    pub lake_id: String,
    pub lake_name: String,
    /// Water temperature in degrees celsius, `None` if the page doesn't currently have one.
    pub temperature_c: Option<f64>,
}

/// A `LakeRecord` along with the time it was published, in seconds since the unix epoch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LakeSnapshot {
    #[serde(flatten)]
    pub record: LakeRecord,
    pub updated_at: u64,
}

impl LakeSnapshot {
    pub fn new(record: LakeRecord) -> Self {
        let updated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        LakeSnapshot { record, updated_at }
    }
}
