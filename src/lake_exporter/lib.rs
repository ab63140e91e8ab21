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

//! Prometheus metrics exporter for lake water temperatures from wassertemperatur.org
//!
//! ## Features
//!
//! `lake_exporter` periodically fetches the page for one or more lakes from [wassertemperatur.org],
//! extracts the current water temperature and the name of the lake, and emits them as Prometheus
//! metrics and as JSON. The following metrics are emitted for each lake.
//!
//! * `lake_info{lake_id=$ID, lake_name=$NAME, lake_url=$URL}` - Lake metadata
//! * `lake_water_temperature_degrees{lake_id=$ID}` - Water temperature, in degrees celsius. Only
//!   present while the page has a current temperature (many lakes don't outside of summer).
//! * `lake_last_update_timestamp_seconds{lake_id=$ID}` - Time of the last successful fetch.
//! * `lake_refresh_failures_total{lake_id=$ID}` - Number of failed fetches.
//!
//! When a fetch fails, the last value fetched successfully continues to be reported.
//!
//! [wassertemperatur.org]: https://www.wassertemperatur.org/
//!
//! ## Usage
//!
//! ### Adding lakes
//!
//! Lakes are identified by the URL of their page, e.g. `https://www.wassertemperatur.org/bodensee`.
//! The last part of the URL is used as the ID of the lake. Lakes can be given on the command line
//! and are saved to a state file (`lakes.json` by default) so that they are still configured the
//! next time `lake_exporter` starts.
//!
//! ```text
//! ./lake_exporter --lake https://www.wassertemperatur.org/bodensee
//! ```
//!
//! Lakes can also be added, changed, and removed while `lake_exporter` is running.
//!
//! ```text
//! curl -sS -X POST -H 'Content-Type: application/json' \
//!     -d '{"lake_url": "https://www.wassertemperatur.org/thunersee"}' http://localhost:9784/lakes
//! curl -sS -X PUT -H 'Content-Type: application/json' \
//!     -d '{"lake_url": "https://www.wassertemperatur.org/brienzersee"}' http://localhost:9784/lakes/thunersee
//! curl -sS -X DELETE http://localhost:9784/lakes/thunersee
//! ```
//!
//! The current value of every lake is available at `/lakes` and for a single lake at
//! `/lakes/$ID`.
//!
//! ### Prometheus
//!
//! Prometheus metrics are exposed on port `9784` at `/metrics`. Add the host running
//! `lake_exporter` as a target under the Prometheus `scrape_configs` section.
//!
//! ```yaml
//! scrape_configs:
//! - job_name: lake_exporter
//!   static_configs:
//!   - targets: ['example:9784']
//! ```
//!

pub mod client;
pub mod http;
pub mod metrics;
pub mod parser;
pub mod record;
pub mod refresh;
pub mod registry;
pub mod sensor;
pub mod setup;
pub mod store;
