//! Google Sheets REST contract tests against a mock server.

use patron_notify::NotifyError;
use patron_notify::auth::StaticToken;
use patron_notify::config::SheetConfig;
use patron_notify::sheet::{GoogleSheetsSource, RecordSource, ValueInputMode};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(server: &MockServer) -> GoogleSheetsSource {
    let config = SheetConfig {
        sheet_id: "1TestSheetId".to_owned(),
        api_base_url: server.uri(),
        ..SheetConfig::default()
    };
    GoogleSheetsSource::new(&config, Arc::new(StaticToken::new("test-token")))
}

#[tokio::test]
async fn fetch_reads_rows_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/1TestSheetId/values/.+$"))
        .and(query_param("majorDimension", "ROWS"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Sheet1!A1:Z1000",
            "majorDimension": "ROWS",
            "values": [
                ["Patron Name", "Amount", "Contact Number"],
                ["Asha", 500, "9998887777"],
                ["Ravi"]
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let table = source(&server).fetch_table("Sheet1!A:Z").await.unwrap();

    assert_eq!(table.len(), 3);
    assert_eq!(table.rows()[1], vec!["Asha", "500", "9998887777"]);
    assert_eq!(table.rows()[2], vec!["Ravi"]);
}

#[tokio::test]
async fn fetch_of_empty_sheet_yields_empty_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Sheet1!A1:Z1000",
            "majorDimension": "ROWS"
        })))
        .mount(&server)
        .await;

    let table = source(&server).fetch_table("Sheet1!A:Z").await.unwrap();
    assert!(table.is_empty());
}

#[tokio::test]
async fn write_puts_raw_values() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v4/spreadsheets/1TestSheetId/values/.+$"))
        .and(query_param("valueInputOption", "RAW"))
        .and(header("Authorization", "Bearer test-token"))
        .and(body_json(json!({
            "range": "Sheet1!E2",
            "majorDimension": "ROWS",
            "values": [["true"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spreadsheetId": "1TestSheetId",
            "updatedRange": "Sheet1!E2",
            "updatedCells": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    source(&server)
        .write_cells("Sheet1!E2", ValueInputMode::Raw, vec![vec!["true".to_owned()]])
        .await
        .unwrap();
}

#[tokio::test]
async fn conflict_status_maps_to_write_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(409).set_body_string("aborted"))
        .mount(&server)
        .await;

    let err = source(&server)
        .write_cells("Sheet1!E2", ValueInputMode::Raw, vec![vec!["true".to_owned()]])
        .await
        .unwrap_err();
    assert!(matches!(err, NotifyError::WriteConflict(_)));
}

#[tokio::test]
async fn server_errors_map_to_source_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend error"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let src = source(&server);
    let read = src.fetch_table("Sheet1!A:Z").await.unwrap_err();
    assert!(matches!(read, NotifyError::SourceUnavailable(ref m) if m.contains("503")));
    let write = src
        .write_cells("Sheet1!A1", ValueInputMode::Raw, vec![vec!["x".to_owned()]])
        .await
        .unwrap_err();
    assert!(matches!(write, NotifyError::SourceUnavailable(_)));
}

#[tokio::test]
async fn range_is_percent_encoded_in_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/1TestSheetId/values/%27Payments%202024%27%21A%3AZ"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": [["h"]]})))
        .expect(1)
        .mount(&server)
        .await;

    let table = source(&server)
        .fetch_table("'Payments 2024'!A:Z")
        .await
        .unwrap();
    assert_eq!(table.len(), 1);
}
