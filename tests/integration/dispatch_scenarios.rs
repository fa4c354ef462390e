//! End-to-end dispatch behaviour against the in-memory sheet.

use crate::helpers::{
    HEADER, SENT_COLUMN, ScriptedTransport, SentText, config, dispatcher, sheet_with,
};
use patron_notify::dispatch::RowOutcome;
use patron_notify::sheet::{InMemorySheet, ValueInputMode};
use patron_notify::{IterationOutcome, NotifyError};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn asha_receives_receipt_and_row_is_marked() {
    let sheet = sheet_with(vec![vec!["Asha", "500", "UPI", "9998887777", ""]]);
    let transport = ScriptedTransport::new();
    let d = dispatcher(&config(), &sheet, &transport);

    let report = d.run_iteration().await.unwrap();

    assert_eq!(report.outcome, IterationOutcome::Completed);
    assert_eq!(
        transport.sent(),
        vec![SentText {
            destination: "9998887777@c.us".to_owned(),
            text: "Dear Asha, we have received 500 via UPI.".to_owned(),
        }]
    );
    assert_eq!(sheet.cell(2, SENT_COLUMN), "true");

    let writes = sheet.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].range, "Sheet1!E2");
    assert_eq!(writes[0].mode, ValueInputMode::Raw);
    assert_eq!(writes[0].values, vec![vec!["true".to_owned()]]);
}

#[tokio::test]
async fn repeated_ticks_send_each_row_once() {
    let sheet = sheet_with(vec![
        vec!["Asha", "500", "UPI", "9998887777"],
        vec!["Ravi", "250", "Cash", "8887776666", "FALSE"],
    ]);
    let transport = ScriptedTransport::new();
    let d = dispatcher(&config(), &sheet, &transport);

    let first = d.run_iteration().await.unwrap();
    let second = d.run_iteration().await.unwrap();
    let third = d.run_iteration().await.unwrap();

    assert_eq!(first.counts.marked, 2);
    assert_eq!(second.counts.sent, 0);
    assert_eq!(second.counts.skipped_not_pending, 2);
    assert_eq!(third.counts.sent, 0);
    assert_eq!(transport.sent().len(), 2);
}

#[tokio::test]
async fn rows_marked_true_in_any_case_are_never_sent() {
    let sheet = sheet_with(vec![
        vec!["A", "1", "UPI", "111", "true"],
        vec!["B", "2", "UPI", "222", "TRUE"],
        vec!["C", "3", "UPI", "333", "True"],
        vec!["D", "4", "UPI", "444", "False"],
    ]);
    let transport = ScriptedTransport::new();
    let d = dispatcher(&config(), &sheet, &transport);

    let report = d.run_iteration().await.unwrap();

    assert_eq!(report.counts.skipped_not_pending, 3);
    let destinations: Vec<String> = transport.sent().into_iter().map(|s| s.destination).collect();
    assert_eq!(destinations, vec!["444@c.us".to_owned()]);
}

#[tokio::test]
async fn blank_contact_is_neither_sent_nor_marked() {
    let sheet = sheet_with(vec![
        vec!["Asha", "500", "UPI", "", ""],
        vec!["Ravi", "250", "Cash", "   ", "false"],
    ]);
    let transport = ScriptedTransport::new();
    let d = dispatcher(&config(), &sheet, &transport);

    for _ in 0..2 {
        let report = d.run_iteration().await.unwrap();
        assert_eq!(report.counts.skipped_missing_contact, 2);
    }

    assert_eq!(transport.attempts(), 0);
    assert!(sheet.writes().is_empty());
    assert_eq!(sheet.cell(3, SENT_COLUMN), "false");
}

#[tokio::test]
async fn blank_display_fields_use_fallback_text() {
    let sheet = sheet_with(vec![vec!["", "", "", "12345"]]);
    let transport = ScriptedTransport::new();
    let d = dispatcher(&config(), &sheet, &transport);

    d.run_iteration().await.unwrap();

    assert_eq!(
        transport.sent()[0].text,
        "Dear N/A, we have received N/A via N/A."
    );
}

#[tokio::test]
async fn missing_tracking_column_is_added_before_any_send() {
    let sheet = Arc::new(InMemorySheet::new(vec![
        HEADER[..4].to_vec(),
        vec!["Asha", "500", "UPI", "9998887777"],
    ]));
    let transport = ScriptedTransport::new();
    let d = dispatcher(&config(), &sheet, &transport);

    let first = d.run_iteration().await.unwrap();
    assert_eq!(first.outcome, IterationOutcome::SchemaMigrated);
    assert_eq!(transport.attempts(), 0);
    let writes = sheet.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].range, "Sheet1!A1");
    assert_eq!(
        writes[0].values,
        vec![HEADER.iter().map(|h| (*h).to_owned()).collect::<Vec<_>>()]
    );

    let second = d.run_iteration().await.unwrap();
    assert_eq!(second.outcome, IterationOutcome::Completed);
    assert_eq!(second.counts.marked, 1);
    assert_eq!(sheet.cell(2, SENT_COLUMN), "true");
}

/// 26-column header (`A` through `Z`) without the tracking column.
fn full_width_header() -> Vec<String> {
    let mut header: Vec<String> = HEADER[..4].iter().map(|h| (*h).to_owned()).collect();
    header.extend((4..26).map(|i| format!("Extra {i}")));
    header
}

#[tokio::test]
async fn tracking_column_beyond_read_span_is_a_config_error() {
    let header = full_width_header();
    let sheet = Arc::new(InMemorySheet::new(vec![
        header.iter().map(String::as_str).collect(),
        vec!["Asha", "500", "UPI", "9998887777"],
    ]));
    let transport = ScriptedTransport::new();
    let d = dispatcher(&config(), &sheet, &transport);

    for _ in 0..3 {
        let err = d.run_iteration().await.unwrap_err();
        assert!(matches!(err, NotifyError::Config(ref m) if m.contains("AA")));
    }
    assert!(sheet.writes().is_empty());
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn wider_read_span_migrates_then_scans_full_width_header() {
    let header = full_width_header();
    let sheet = Arc::new(InMemorySheet::new(vec![
        header.iter().map(String::as_str).collect(),
        vec!["Asha", "500", "UPI", "9998887777"],
    ]));
    let transport = ScriptedTransport::new();
    let mut config = config();
    config.sheet.read_columns = "A:AZ".to_owned();
    let d = dispatcher(&config, &sheet, &transport);

    let first = d.run_iteration().await.unwrap();
    assert_eq!(first.outcome, IterationOutcome::SchemaMigrated);
    assert_eq!(sheet.cell(1, 26), "Notification Sent");

    let second = d.run_iteration().await.unwrap();
    assert_eq!(second.outcome, IterationOutcome::Completed);
    assert_eq!(second.counts.marked, 1);
    assert_eq!(sheet.cell(2, 26), "true");
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn failed_send_leaves_row_pending_for_next_tick() {
    let sheet = sheet_with(vec![
        vec!["Asha", "500", "UPI", "9998887777"],
        vec!["Ravi", "250", "Cash", "8887776666"],
    ]);
    let transport = ScriptedTransport::new();
    transport.fail_for("9998887777@c.us");
    let d = dispatcher(&config(), &sheet, &transport);

    let first = d.run_iteration().await.unwrap();
    assert_eq!(first.counts.failed, 1);
    assert_eq!(first.counts.marked, 1);
    assert!(matches!(first.rows[0].outcome, RowOutcome::SendFailed { .. }));
    assert_eq!(sheet.cell(2, SENT_COLUMN), "");
    assert_eq!(sheet.cell(3, SENT_COLUMN), "true");

    transport.recover();
    let second = d.run_iteration().await.unwrap();
    assert_eq!(second.counts.marked, 1);
    assert_eq!(sheet.cell(2, SENT_COLUMN), "true");
    assert_eq!(transport.sent().len(), 2);
}

#[tokio::test]
async fn unmarked_send_is_repeated_next_tick() {
    let sheet = sheet_with(vec![vec!["Asha", "500", "UPI", "9998887777"]]);
    sheet.fail_writes_to_row(2);
    let transport = ScriptedTransport::new();
    let d = dispatcher(&config(), &sheet, &transport);

    let first = d.run_iteration().await.unwrap();
    assert!(matches!(first.rows[0].outcome, RowOutcome::MarkFailed { .. }));
    assert_eq!(first.counts.sent, 1);
    assert_eq!(first.counts.marked, 0);

    sheet.heal_writes();
    let second = d.run_iteration().await.unwrap();
    assert_eq!(second.counts.marked, 1);
    assert_eq!(transport.sent().len(), 2);
    assert_eq!(sheet.cell(2, SENT_COLUMN), "true");
}

#[tokio::test]
async fn concurrent_iteration_is_skipped() {
    let sheet = sheet_with(vec![vec!["Asha", "500", "UPI", "9998887777"]]);
    let transport = ScriptedTransport::new();
    transport.hold();
    let d = Arc::new(dispatcher(&config(), &sheet, &transport));

    let running = tokio::spawn({
        let d = Arc::clone(&d);
        async move { d.run_iteration().await }
    });
    transport.entered.notified().await;
    let reads_before = sheet.read_count();

    let concurrent = d.run_iteration().await.unwrap();
    assert_eq!(concurrent.outcome, IterationOutcome::Skipped);
    assert_eq!(sheet.read_count(), reads_before);

    transport.release.notify_one();
    let first = running.await.unwrap().unwrap();
    assert_eq!(first.outcome, IterationOutcome::Completed);
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn placeholder_sheet_id_is_a_config_error_without_io() {
    let sheet = sheet_with(vec![vec!["Asha", "500", "UPI", "9998887777"]]);
    let transport = ScriptedTransport::new();
    let d = dispatcher(&patron_notify::NotifyConfig::default(), &sheet, &transport);

    let result = d.run_iteration().await;

    assert!(matches!(result, Err(NotifyError::Config(_))));
    assert_eq!(sheet.read_count(), 0);
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn hanging_send_times_out_as_row_failure() {
    let sheet = sheet_with(vec![
        vec!["Asha", "500", "UPI", "9998887777"],
        vec!["Ravi", "250", "Cash", "8887776666"],
    ]);
    let transport = ScriptedTransport::new();
    transport.hang();
    let d = dispatcher(&config(), &sheet, &transport)
        .with_request_timeout(Duration::from_millis(50));

    let report = d.run_iteration().await.unwrap();

    assert_eq!(report.counts.failed, 2);
    assert_eq!(transport.attempts(), 2);
    match &report.rows[0].outcome {
        RowOutcome::SendFailed { error } => assert!(error.contains("timed out")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(sheet.writes().is_empty());
}

#[tokio::test]
async fn read_failure_aborts_iteration_and_next_tick_recovers() {
    let sheet = sheet_with(vec![vec!["Asha", "500", "UPI", "9998887777"]]);
    sheet.fail_next_reads(1);
    let transport = ScriptedTransport::new();
    let d = dispatcher(&config(), &sheet, &transport);

    let first = d.run_iteration().await;
    assert!(matches!(first, Err(NotifyError::SourceUnavailable(_))));
    assert_eq!(transport.attempts(), 0);

    let second = d.run_iteration().await.unwrap();
    assert_eq!(second.counts.marked, 1);
}

#[tokio::test]
async fn empty_sheet_finishes_without_writes() {
    let sheet = Arc::new(InMemorySheet::default());
    let transport = ScriptedTransport::new();
    let d = dispatcher(&config(), &sheet, &transport);

    let report = d.run_iteration().await.unwrap();

    assert_eq!(report.outcome, IterationOutcome::EmptyTable);
    assert!(sheet.writes().is_empty());
}

#[tokio::test]
async fn rows_added_between_ticks_are_picked_up() {
    let sheet = sheet_with(vec![vec!["Asha", "500", "UPI", "9998887777"]]);
    let transport = ScriptedTransport::new();
    let d = dispatcher(&config(), &sheet, &transport);

    d.run_iteration().await.unwrap();
    sheet.push_row(vec!["Meera", "1200", "Cheque", "7776665555"]);
    let second = d.run_iteration().await.unwrap();

    assert_eq!(second.counts.marked, 1);
    assert_eq!(transport.sent()[1].destination, "7776665555@c.us");
    assert_eq!(sheet.cell(3, SENT_COLUMN), "true");
}

#[tokio::test]
async fn custom_chat_domain_and_tab_are_used() {
    let sheet = sheet_with(vec![vec!["Asha", "500", "UPI", "9998887777"]]);
    let transport = ScriptedTransport::new();
    let mut config = config();
    config.sheet.tab_name = "Payments 2024".to_owned();
    config.transport.chat_domain = "s.whatsapp.net".to_owned();
    let d = dispatcher(&config, &sheet, &transport);

    d.run_iteration().await.unwrap();

    assert_eq!(transport.sent()[0].destination, "9998887777@s.whatsapp.net");
    assert_eq!(sheet.writes()[0].range, "'Payments 2024'!E2");
}
