use httpmock::prelude::*;
use regex::Regex;
use dataflux::core::download::{parallel_download, DownloadParams};
use dataflux::utils::report::find_sponge_logs;
use dataflux::{GcsClient, ListingController, ObjectStore, Storage};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn client_for(server: &MockServer) -> GcsClient {
    GcsClient::with_base_url("perf-bucket", &server.base_url()).unwrap()
}

#[tokio::test]
async fn end_to_end_listing_over_http() {
    let server = MockServer::start();
    let list_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/storage/v1/b/perf-bucket/o")
            .query_param("prefix", "data/");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(serde_json::json!({
                "items": [
                    {"name": "data/object-001", "size": "100"},
                    {"name": "data/object-002", "size": "250"},
                    {"name": "data/object-003", "size": "50"}
                ]
            }));
    });

    let store: Arc<dyn ObjectStore> = Arc::new(client_for(&server));
    let controller = ListingController::new(store, 4, "data/")
        .with_list_timeout(Duration::from_secs(5));

    let objects = controller.run().await.unwrap();

    list_mock.assert_hits(1);
    assert_eq!(objects.len(), 3);
    assert_eq!(objects[0].name, "data/object-001");
    assert_eq!(objects[2].size, 50);
    let total: u64 = objects.iter().map(|o| o.size).sum();
    assert_eq!(total, 400);
}

#[tokio::test]
async fn end_to_end_compose_download_over_http() {
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET).path("/storage/v1/b/perf-bucket/o");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(serde_json::json!({
                "items": [
                    {"name": "data/part-a", "size": "4"},
                    {"name": "data/part-b", "size": "6"}
                ]
            }));
    });

    // Staging object names carry a random UUID, so the compose, staged
    // download, and delete mocks match by pattern.
    let compose_mock = server.mock(|when, then| {
        when.method(POST).path_matches(
            Regex::new(
                r"^/storage/v1/b/perf-bucket/o/dataflux-composed-objects(/|%2F)[0-9a-f-]+/compose$",
            )
            .unwrap(),
        );
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(serde_json::json!({"name": "staged", "size": "10"}));
    });

    let staged_download_mock = server.mock(|when, then| {
        when.method(GET).path_matches(
            Regex::new(
                r"^/download/storage/v1/b/perf-bucket/o/dataflux-composed-objects(/|%2F)[0-9a-f-]+$",
            )
            .unwrap(),
        );
        then.status(200).body("aaaabbbbbb");
    });

    let delete_mock = server.mock(|when, then| {
        when.method(DELETE).path_matches(
            Regex::new(
                r"^/storage/v1/b/perf-bucket/o/dataflux-composed-objects(/|%2F)[0-9a-f-]+$",
            )
            .unwrap(),
        );
        then.status(204);
    });

    let store: Arc<dyn ObjectStore> = Arc::new(client_for(&server));
    let controller = ListingController::new(Arc::clone(&store), 2, "");
    let objects = controller.run().await.unwrap();
    assert_eq!(objects.len(), 2);

    let params = DownloadParams {
        max_compose_bytes: 1_000,
        download_timeout: Duration::from_secs(5),
    };
    let buffers = parallel_download(Arc::clone(&store), objects.clone(), params, 1)
        .await
        .unwrap();

    compose_mock.assert_hits(1);
    staged_download_mock.assert_hits(1);
    delete_mock.assert_hits(1);

    assert_eq!(buffers.len(), 2);
    assert_eq!(buffers[0], b"aaaa");
    assert_eq!(buffers[1], b"bbbbbb");

    // Persist like the download subcommand does and verify on disk.
    let temp = TempDir::new().unwrap();
    let storage = dataflux::LocalStorage::new(temp.path().to_string_lossy().into_owned());
    for (object, data) in objects.iter().zip(&buffers) {
        storage.write_file(&object.name, data).await.unwrap();
    }
    assert_eq!(
        std::fs::read(temp.path().join("data/part-a")).unwrap(),
        b"aaaa"
    );
    assert_eq!(
        std::fs::read(temp.path().join("data/part-b")).unwrap(),
        b"bbbbbb"
    );
}

#[tokio::test]
async fn oversized_objects_bypass_compose_over_http() {
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET).path("/storage/v1/b/perf-bucket/o");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(serde_json::json!({
                "items": [{"name": "huge-object", "size": "2048"}]
            }));
    });

    let direct_download_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/download/storage/v1/b/perf-bucket/o/huge-object")
            .query_param("alt", "media");
        then.status(200).body(vec![7u8; 2048]);
    });

    let store: Arc<dyn ObjectStore> = Arc::new(client_for(&server));
    let objects = ListingController::new(Arc::clone(&store), 1, "")
        .run()
        .await
        .unwrap();

    let params = DownloadParams {
        max_compose_bytes: 1_024,
        download_timeout: Duration::from_secs(5),
    };
    let buffers = parallel_download(store, objects, params, 2).await.unwrap();

    direct_download_mock.assert_hits(1);
    assert_eq!(buffers.len(), 1);
    assert_eq!(buffers[0].len(), 2048);
}

#[tokio::test]
async fn perf_artifacts_are_discoverable_after_a_run() {
    let temp = TempDir::new().unwrap();
    let results_dir = temp.path().join("results");

    let case = dataflux::utils::report::TestCase::passed(
        "list_only",
        Duration::from_millis(1234),
    );
    dataflux::utils::report::write_sponge_log(
        &results_dir.join("integration_tests"),
        "dataflux_perf",
        &[case],
    )
    .unwrap();

    let found = find_sponge_logs(temp.path());
    assert_eq!(found.len(), 1);
    assert!(found[0].ends_with("results/integration_tests/sponge_log.xml"));

    // A tree with no artifacts is a detectable condition, not an error.
    let empty = TempDir::new().unwrap();
    assert!(find_sponge_logs(empty.path()).is_empty());
}
