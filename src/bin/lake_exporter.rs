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

use clap::Parser;
use lake_exporter::client::LakeClient;
use lake_exporter::http::RequestContext;
use lake_exporter::metrics::LakeMetrics;
use lake_exporter::registry::LakeRegistry;
use lake_exporter::setup::{SetupError, SourceValidator, DEFAULT_SOURCE_DOMAIN};
use lake_exporter::store::EntryStore;
use prometheus_client::registry::Registry;
use reqwest::Client;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9784);
const DEFAULT_REFRESH_SECS: u64 = 1800;
const DEFAULT_TIMEOUT_MILLIS: u64 = 15000;
const DEFAULT_STATE_FILE: &str = "lakes.json";

#[derive(Debug, Parser)]
#[clap(name = "lake_exporter", version = clap::crate_version!())]
struct LakeExporterApplication {
    /// URL of a lake page to fetch water temperatures from, e.g.
    /// https://www.wassertemperatur.org/bodensee. May be given multiple times. Lakes are
    /// added to the state file if they aren't already configured.
    #[clap(long = "lake")]
    lakes: Vec<String>,

    /// File to save configured lakes to
    #[clap(long, default_value = DEFAULT_STATE_FILE)]
    state_file: PathBuf,

    /// Only accept lake URLs on this domain or its subdomains
    #[clap(long, default_value_t = DEFAULT_SOURCE_DOMAIN.into())]
    source_domain: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Fetch lake pages at this interval, in seconds.
    #[clap(long, default_value_t = DEFAULT_REFRESH_SECS)]
    refresh_secs: u64,

    /// Timeout for fetching a lake page, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Address to bind to. By default, lake_exporter will bind to public address since
    /// the purpose is to expose metrics to an external system (Prometheus or another
    /// agent for ingestion)
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = LakeExporterApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let client = LakeClient::new(http_client);
    let validator = SourceValidator::new(client.clone(), opts.source_domain.clone());
    let mut registry = Registry::default();
    let metrics = Arc::new(LakeMetrics::new(&mut registry));
    let store = EntryStore::new(opts.state_file.clone());
    let lakes = Arc::new(LakeRegistry::new(
        client,
        validator,
        metrics,
        store,
        Duration::from_secs(opts.refresh_secs),
    ));

    // Start any lakes saved from a previous run first so that lakes given on the command
    // line that are already configured are recognized as such.
    match lakes.restore().await {
        Ok(n) => tracing::info!(message = "restored lakes", path = %opts.state_file.display(), count = n),
        Err(e) => {
            tracing::error!(message = "unable to load lake state", error = %e);
            process::exit(1)
        }
    }

    for url in opts.lakes.iter() {
        match lakes.register(url).await {
            Ok(entry) => {
                tracing::info!(message = "added lake", lake_id = %entry.lake_id, lake_name = %entry.lake_name);
            }
            Err(SetupError::Duplicate(id)) => {
                tracing::debug!(message = "lake already configured", lake_id = %id);
            }
            Err(e @ SetupError::InvalidSource(_)) | Err(e @ SetupError::Store(_)) => {
                tracing::error!(message = "unable to add lake", url = %url, error = %e);
                process::exit(1)
            }
            Err(e) => {
                tracing::warn!(message = "unable to add lake, skipping", url = %url, reason = e.reason(), error = %e);
            }
        }
    }

    let context = Arc::new(RequestContext::new(registry, lakes.clone()));
    let app = lake_exporter::http::router(context);
    let server = axum::Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
        process::exit(1)
    });

    tracing::info!(message = "server started", address = %opts.bind);
    server
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    lakes.shutdown().await;
    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
