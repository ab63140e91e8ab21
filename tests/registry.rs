mod common;

use common::{lake_client, lake_page, lake_page_without_temperature, lake_registry, mount_page, MOCK_DOMAIN};
use lake_exporter::setup::{SetupError, SourceValidator, DEFAULT_SOURCE_DOMAIN};
use lake_exporter::store::EntryStore;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_probe_unrelated_domain_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(lake_page("Bodensee", "14")))
        .expect(0)
        .mount(&server)
        .await;

    let validator = SourceValidator::new(lake_client(Duration::from_secs(5)), DEFAULT_SOURCE_DOMAIN);
    let res = validator.probe(&format!("{}/seen/bodensee", server.uri())).await;

    assert!(matches!(res, Err(SetupError::InvalidSource(_))));
}

#[tokio::test]
async fn test_probe_accepts_missing_temperature() {
    let server = MockServer::start().await;
    mount_page(&server, "/seen/bodensee", lake_page_without_temperature("Bodensee")).await;

    let validator = SourceValidator::new(lake_client(Duration::from_secs(5)), MOCK_DOMAIN);
    let record = validator.probe(&format!("{}/seen/bodensee", server.uri())).await.unwrap();

    assert_eq!("bodensee", record.lake_id);
    assert_eq!("Bodensee", record.lake_name);
    assert_eq!(None, record.temperature_c);
}

#[tokio::test]
async fn test_probe_cannot_connect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let validator = SourceValidator::new(lake_client(Duration::from_secs(5)), MOCK_DOMAIN);
    let res = validator.probe(&format!("{}/seen/bodensee", server.uri())).await;

    match res {
        Err(e @ SetupError::CannotConnect(_)) => assert_eq!("cannot_connect", e.reason()),
        other => panic!("expected cannot connect error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_register_duplicate_id_rejected() {
    let server = MockServer::start().await;
    mount_page(&server, "/seen/bodensee", lake_page("Bodensee", "14,2")).await;
    mount_page(&server, "/archiv/bodensee/", lake_page("Bodensee", "14,2")).await;

    let dir = tempfile::tempdir().unwrap();
    let (_, lakes) = lake_registry(MOCK_DOMAIN, &dir.path().join("lakes.json"));

    let entry = lakes.register(&format!("{}/seen/bodensee", server.uri())).await.unwrap();
    assert_eq!("bodensee", entry.lake_id);

    let res = lakes.register(&format!("{}/archiv/bodensee/", server.uri())).await;
    assert!(matches!(res, Err(SetupError::Duplicate(ref id)) if id == "bodensee"));
    assert_eq!(1, lakes.entries().await.len());

    lakes.shutdown().await;
}

#[tokio::test]
async fn test_register_publishes_and_persists() {
    let server = MockServer::start().await;
    mount_page(&server, "/seen/bodensee", lake_page("Bodensee", "14,2")).await;

    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("lakes.json");
    let (_, lakes) = lake_registry(MOCK_DOMAIN, &state_file);

    let entry = lakes.register(&format!("{}/seen/bodensee", server.uri())).await.unwrap();
    let sensor = lakes.sensor("bodensee").await.unwrap();
    assert_eq!(Some(14.2), sensor.temperature_c);
    assert_eq!("Bodensee", sensor.name);

    let saved = EntryStore::new(&state_file).load().await.unwrap();
    assert_eq!(vec![entry], saved);

    lakes.shutdown().await;
}

#[tokio::test]
async fn test_restore_starts_saved_lakes() {
    let server = MockServer::start().await;
    mount_page(&server, "/seen/bodensee", lake_page("Bodensee", "14,2")).await;

    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("lakes.json");

    let (_, first) = lake_registry(MOCK_DOMAIN, &state_file);
    first.register(&format!("{}/seen/bodensee", server.uri())).await.unwrap();
    first.shutdown().await;

    let (_, second) = lake_registry(MOCK_DOMAIN, &state_file);
    assert_eq!(1, second.restore().await.unwrap());

    let sensors = second.sensors().await;
    assert_eq!(1, sensors.len());
    assert_eq!("bodensee", sensors[0].lake_id);
    assert_eq!(Some(14.2), sensors[0].temperature_c);

    second.shutdown().await;
}

#[tokio::test]
async fn test_restore_keeps_lake_when_first_fetch_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("lakes.json");
    EntryStore::new(&state_file)
        .save(&[lake_exporter::store::LakeEntry {
            lake_url: format!("{}/seen/bodensee", server.uri()),
            lake_name: "Bodensee".to_owned(),
            lake_id: "bodensee".to_owned(),
        }])
        .await
        .unwrap();

    let (_, lakes) = lake_registry(MOCK_DOMAIN, &state_file);
    assert_eq!(1, lakes.restore().await.unwrap());
    assert!(lakes.sensor("bodensee").await.is_none());
    assert_eq!(1, lakes.entries().await.len());

    lakes.shutdown().await;
}

#[tokio::test]
async fn test_reconfigure_keeps_id_and_refetches() {
    let server = MockServer::start().await;
    mount_page(&server, "/seen/bodensee", lake_page("Bodensee", "14,2")).await;
    mount_page(&server, "/seen/untersee", lake_page("Untersee", "15,1")).await;

    let dir = tempfile::tempdir().unwrap();
    let (_, lakes) = lake_registry(MOCK_DOMAIN, &dir.path().join("lakes.json"));
    lakes.register(&format!("{}/seen/bodensee", server.uri())).await.unwrap();

    let mut reader = lakes.reader("bodensee").await.unwrap();
    let entry = lakes
        .reconfigure("bodensee", &format!("{}/seen/untersee", server.uri()))
        .await
        .unwrap();

    assert_eq!("bodensee", entry.lake_id);
    assert!(entry.lake_url.ends_with("/seen/untersee"));

    let snapshot = tokio::time::timeout(Duration::from_secs(5), reader.changed())
        .await
        .expect("no snapshot published after reconfiguration")
        .unwrap();
    assert_eq!("untersee", snapshot.record.lake_id);

    let sensor = lakes.sensor("bodensee").await.unwrap();
    assert_eq!(Some(15.1), sensor.temperature_c);

    lakes.shutdown().await;
}

#[tokio::test]
async fn test_reconfigure_to_other_lake_rejected() {
    let server = MockServer::start().await;
    mount_page(&server, "/seen/bodensee", lake_page("Bodensee", "14,2")).await;
    mount_page(&server, "/seen/thunersee", lake_page("Thunersee", "16")).await;

    let dir = tempfile::tempdir().unwrap();
    let (_, lakes) = lake_registry(MOCK_DOMAIN, &dir.path().join("lakes.json"));
    lakes.register(&format!("{}/seen/bodensee", server.uri())).await.unwrap();
    lakes.register(&format!("{}/seen/thunersee", server.uri())).await.unwrap();

    let res = lakes
        .reconfigure("bodensee", &format!("{}/seen/thunersee", server.uri()))
        .await;
    assert!(matches!(res, Err(SetupError::Duplicate(_))));

    let res = lakes
        .reconfigure("unknown", &format!("{}/seen/thunersee", server.uri()))
        .await;
    assert!(matches!(res, Err(SetupError::UnknownLake(_))));

    lakes.shutdown().await;
}

#[tokio::test]
async fn test_remove_lake() {
    let server = MockServer::start().await;
    mount_page(&server, "/seen/bodensee", lake_page("Bodensee", "14,2")).await;

    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("lakes.json");
    let (_, lakes) = lake_registry(MOCK_DOMAIN, &state_file);
    lakes.register(&format!("{}/seen/bodensee", server.uri())).await.unwrap();

    let removed = lakes.remove("bodensee").await.unwrap();
    assert_eq!("bodensee", removed.lake_id);
    assert!(lakes.sensors().await.is_empty());
    assert!(EntryStore::new(&state_file).load().await.unwrap().is_empty());
    assert!(matches!(lakes.remove("bodensee").await, Err(SetupError::UnknownLake(_))));
}

fn render(registry: &Registry) -> String {
    let mut out = String::new();
    encode(&mut out, registry).unwrap();
    out
}

#[tokio::test]
async fn test_remove_lake_clears_metrics() {
    let server = MockServer::start().await;
    mount_page(&server, "/seen/bodensee", lake_page("Bodensee", "14,2")).await;

    let dir = tempfile::tempdir().unwrap();
    let (registry, lakes) = lake_registry(MOCK_DOMAIN, &dir.path().join("lakes.json"));
    lakes.register(&format!("{}/seen/bodensee", server.uri())).await.unwrap();
    assert!(render(&registry).contains("lake_water_temperature_degrees{lake_id=\"bodensee\"} 14.2"));

    lakes.remove("bodensee").await.unwrap();
    assert!(!render(&registry).contains("bodensee"));
}

#[tokio::test]
async fn test_remove_lake_during_fetch_clears_metrics() {
    let server = MockServer::start().await;
    mount_page(&server, "/seen/bodensee", lake_page("Bodensee", "14,2")).await;
    Mock::given(method("GET"))
        .and(path("/seen/thunersee"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(lake_page("Thunersee", "16,0"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (registry, lakes) = lake_registry(MOCK_DOMAIN, &dir.path().join("lakes.json"));
    lakes.register(&format!("{}/seen/bodensee", server.uri())).await.unwrap();

    // Start a slow fetch in the background, then remove the lake while it is in progress.
    lakes
        .reconfigure("bodensee", &format!("{}/seen/thunersee", server.uri()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    lakes.remove("bodensee").await.unwrap();

    tokio::time::sleep(Duration::from_millis(800)).await;
    let out = render(&registry);
    assert!(!out.contains("bodensee"));
    assert!(!out.contains("thunersee"));
}
