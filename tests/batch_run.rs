use std::collections::HashMap;
use std::path::{Path, PathBuf};

use httptest::matchers::{all_of, contains, request, url_decoded};
use httptest::responders::json_encoded;
use httptest::{Expectation, Server};
use secrecy::SecretString;
use serde_json::json;
use tempfile::tempdir;

use pos_geocoder::{
    run, AddressCache, AppConfig, AppResult, Coordinates, RunOptions, RunOutcome, Table,
    TableExtractor, TableSchema,
};

struct FixedTables(HashMap<PathBuf, Vec<Table>>);

impl TableExtractor for FixedTables {
    fn extract(&self, path: &Path) -> AppResult<Vec<Table>> {
        Ok(self.0.get(path).cloned().unwrap_or_default())
    }
}

fn cells(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn gtt_listing() -> FixedTables {
    let mut files = HashMap::new();
    files.insert(
        PathBuf::from("rivendite.pdf"),
        vec![vec![
            cells(&["VIA", "ROMA", "1", "", "10121", "TORINO", "TABACCHI", "SI"]),
            cells(&["", "", "", "", "", "", "BAR", ""]),
            cells(&[
                "CORSOCORSO",
                "FRANCIAFRANCIA",
                "1010",
                "",
                "1O14310143",
                "TORINOTORINO",
                "BARBAR",
                "NONO",
            ]),
            cells(&["VIA", "NESSUNA", "0", "", "10100", "TORINO", "EDICOLA", "SI"]),
        ]],
    );
    FixedTables(files)
}

fn expect_address(server: &Server, address: &'static str, body: serde_json::Value) {
    server.expect(
        Expectation::matching(all_of![
            request::method("GET"),
            request::path("/geocode/json"),
            request::query(url_decoded(contains(("key", "integration-key")))),
            request::query(url_decoded(contains(("address", address))))
        ])
        .respond_with(json_encoded(body)),
    );
}

fn location(lat: f64, lng: f64) -> serde_json::Value {
    json!({
        "status": "OK",
        "results": [{ "geometry": { "location": { "lat": lat, "lng": lng } } }]
    })
}

fn config_for(server: &Server, cache_file: PathBuf) -> AppConfig {
    AppConfig {
        geocode_endpoint: server.url("/geocode/json").to_string(),
        geocode_api_key: Some(SecretString::new("integration-key".into())),
        min_interval_ms: 0,
        http_timeout_secs: 5,
        cache_file,
    }
}

#[tokio::test]
async fn geocodes_listing_into_csv() {
    let server = Server::run();
    expect_address(&server, "VIA ROMA 1 , 10121, TORINO", location(45.0703, 7.6869));
    expect_address(
        &server,
        "VIA NESSUNA 0 , 10100, TORINO",
        json!({ "status": "ZERO_RESULTS", "results": [] }),
    );

    let dir = tempdir().unwrap();
    let cache_file = dir.path().join("geocode.cache");
    let mut seeded = AddressCache::load(&cache_file);
    seeded.set(
        "CORSO FRANCIA 10 , 10143, TORINO",
        Coordinates::new(45.0781, 7.6472),
    );
    seeded.flush().unwrap();

    let output = dir.path().join("rivendite.csv");
    let errors_output = dir.path().join("errors.csv");
    let options = RunOptions {
        inputs: vec![PathBuf::from("rivendite.pdf")],
        output: Some(output.clone()),
        errors_output: Some(errors_output.clone()),
        schema: TableSchema::GttAbb,
    };

    let outcome = run(&config_for(&server, cache_file.clone()), &options, &gtt_listing())
        .await
        .expect("run");

    let RunOutcome::Completed { output: written, result } = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(written, output);
    assert_eq!(result.locations.len(), 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.stats.cache_hits, 1);

    let csv = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines[0], "Indirizzo,Tipologia,Carta BIP,Lat,Lng");
    assert_eq!(
        lines[1],
        "\"VIA ROMA 1 , 10121, TORINO\",TABACCHI,CARTA BIP,45.07030,7.68690"
    );
    assert_eq!(
        lines[2],
        "\"CORSO FRANCIA 10 , 10143, TORINO\",BAR,,45.07810,7.64720"
    );
    assert_eq!(lines.len(), 3);

    let errors = std::fs::read_to_string(&errors_output).unwrap();
    assert!(errors.contains("VIA NESSUNA 0 , 10100, TORINO"));

    let cache = AddressCache::load(&cache_file);
    assert_eq!(cache.len(), 2);
    assert!(cache.contains("VIA ROMA 1 , 10121, TORINO"));
    assert!(!cache.contains("VIA NESSUNA 0 , 10100, TORINO"));
}

#[tokio::test]
async fn quota_exhaustion_saves_partial_results() {
    let server = Server::run();
    expect_address(&server, "VIA ROMA 1 , 10121, TORINO", location(45.0703, 7.6869));
    expect_address(
        &server,
        "CORSO FRANCIA 10 , 10143, TORINO",
        json!({ "status": "OVER_QUERY_LIMIT", "results": [] }),
    );

    let dir = tempdir().unwrap();
    let cache_file = dir.path().join("geocode.cache");
    let output = dir.path().join("rivendite.csv");
    let options = RunOptions {
        inputs: vec![PathBuf::from("rivendite.pdf")],
        output: Some(output.clone()),
        errors_output: None,
        schema: TableSchema::GttAbb,
    };

    let outcome = run(&config_for(&server, cache_file.clone()), &options, &gtt_listing())
        .await
        .expect("quota exhaustion is not a process failure");

    let RunOutcome::QuotaExceeded {
        partial_output,
        result,
    } = outcome
    else {
        panic!("expected the quota to halt the run");
    };
    assert!(!output.exists());
    assert_eq!(result.locations.len(), 1);
    assert!(result.errors.is_empty());

    let partial_path = partial_output.expect("partial csv");
    assert_eq!(partial_path, dir.path().join("rivendite.partial.csv"));
    let partial = std::fs::read_to_string(partial_path).unwrap();
    assert!(partial.contains("45.07030"));

    let cache = AddressCache::load(&cache_file);
    assert_eq!(cache.len(), 1);
    assert!(cache.contains("VIA ROMA 1 , 10121, TORINO"));
}
