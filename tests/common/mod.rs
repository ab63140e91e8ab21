#![allow(dead_code)]

use lake_exporter::client::LakeClient;
use lake_exporter::metrics::LakeMetrics;
use lake_exporter::registry::LakeRegistry;
use lake_exporter::setup::SourceValidator;
use lake_exporter::store::EntryStore;
use prometheus_client::registry::Registry;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Long enough that only the first fetch (or an explicit reconfiguration) happens during a test.
pub const PERIOD: Duration = Duration::from_secs(3600);

/// Host of the mock server, used as the accepted source domain in tests.
pub const MOCK_DOMAIN: &str = "127.0.0.1";

pub fn lake_page(name: &str, temperature: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n  <title>{} - Wassertemperatur.org</title>\n</head>\n<body>\n  \
         <div class=\"air\">Lufttemperatur 27 °C</div>\n  \
         <div class=\"water\">Wassertemperatur: {} °C</div>\n</body>\n</html>\n",
        name, temperature
    )
}

pub fn lake_page_without_temperature(name: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n  <title>{} - Wassertemperatur.org</title>\n</head>\n<body>\n  \
         <div class=\"water\">Wassertemperatur: - °C</div>\n</body>\n</html>\n",
        name
    )
}

pub fn lake_client(timeout: Duration) -> LakeClient {
    LakeClient::new(Client::builder().timeout(timeout).build().unwrap())
}

pub fn lake_registry(domain: &str, state_file: &Path) -> (Registry, Arc<LakeRegistry>) {
    let client = lake_client(Duration::from_secs(5));
    let validator = SourceValidator::new(client.clone(), domain);
    let mut registry = Registry::default();
    let metrics = Arc::new(LakeMetrics::new(&mut registry));
    let lakes = LakeRegistry::new(client, validator, metrics, EntryStore::new(state_file), PERIOD);

    (registry, Arc::new(lakes))
}

pub async fn mount_page(server: &MockServer, page_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}
