//! Integration tests for chit-core
//!
//! These tests exercise the full analyze → extract → persist → chat
//! workflow through the public API.

use chit_core::{Auditor, BackendClient, Error, MockBackend, RecordStore, Session};
use tempfile::TempDir;

fn test_store() -> (TempDir, RecordStore) {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::new(dir.path().join("receipt_history")).unwrap();
    (dir, store)
}

/// Raw reply in the shape real vision models produce: prose, a fenced JSON
/// document, more prose.
const ACME_REPLY: &str = "Some reasoning ```json\n{\"extracted_data\":{\"merchant_name\":\"ACME\",\"amount\":\"12.34\"},\"validation_result\":{\"reasoning\":\"ok\",\"conclusion\":\"No\"}}\n``` more text";

// =============================================================================
// Analysis workflow
// =============================================================================

#[tokio::test]
async fn test_analysis_workflow_end_to_end() {
    let (_dir, store) = test_store();
    let mock = MockBackend::new().with_analysis_reply(ACME_REPLY);
    let auditor = Auditor::new(BackendClient::Mock(mock), store.clone());

    let record = auditor
        .run_analysis("aGVsbG8=", "audit this receipt")
        .await
        .expect("analysis failed");

    assert!(record.id.ends_with("-ACME"));
    assert_eq!(record.analysis.extracted_data.merchant_name, "ACME");
    assert_eq!(record.analysis.extracted_data.amount, "12.34");
    assert!(!record.analysis.fraud_suspected());
    assert!(record.analysis.auditor_scratchpad.contains("Some reasoning"));
    assert!(record.analysis.auditor_scratchpad.contains("more text"));
    assert!(!record.analysis.auditor_scratchpad.contains('{'));

    // The persisted copy matches what the caller got back
    let loaded = store.load(&record.id).expect("load failed");
    assert_eq!(loaded, record);

    let summaries = store.list().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].merchant, "ACME");
}

#[tokio::test]
async fn test_failed_analysis_leaves_store_empty() {
    let (_dir, store) = test_store();

    // No JSON object anywhere in the reply
    let mock = MockBackend::new().with_analysis_reply("The image was too blurry to audit.");
    let auditor = Auditor::new(BackendClient::Mock(mock), store.clone());
    let err = auditor.run_analysis("aGVsbG8=", "audit").await.unwrap_err();
    assert!(matches!(err, Error::NoJsonFound(_)));

    // A JSON candidate that does not parse
    let broken = "Verdict below {\"extracted_data\": {\"merchant_name\": } oops";
    let mock = MockBackend::new().with_analysis_reply(broken);
    let auditor = Auditor::new(BackendClient::Mock(mock), store.clone());
    match auditor.run_analysis("aGVsbG8=", "audit").await.unwrap_err() {
        Error::MalformedJson { raw, .. } => assert_eq!(raw, broken),
        other => panic!("expected MalformedJson, got {:?}", other),
    }

    // Neither attempt left a file behind
    assert_eq!(
        std::fs::read_dir(store.history_dir()).unwrap().count(),
        0
    );
}

// =============================================================================
// Chat workflow
// =============================================================================

#[tokio::test]
async fn test_chat_across_sessions() {
    let (_dir, store) = test_store();
    let analyze_mock = MockBackend::new().with_analysis_reply(ACME_REPLY);
    let auditor = Auditor::new(BackendClient::Mock(analyze_mock), store.clone());
    let record = auditor.run_analysis("aGVsbG8=", "audit").await.unwrap();
    let id = record.id.clone();

    // First session: one full turn
    let chat_mock = MockBackend::new().with_chat_deltas(&["Looks ", "fine."]);
    let mut session = Session::new(BackendClient::Mock(chat_mock), store.clone(), record);
    let reply = session.send_turn("be concise", "anything odd?").await.unwrap();
    assert_eq!(reply, "Looks fine.");
    drop(session);

    // Second session resumes from disk and keeps appending
    let chat_mock = MockBackend::new().with_chat_deltas(&["Still fine."]);
    let mut session =
        Session::resume(BackendClient::Mock(chat_mock), store.clone(), &id).unwrap();
    assert_eq!(session.record().chat_history.len(), 2);

    session.send_turn("be concise", "sure?").await.unwrap();
    let history = &session.record().chat_history;
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].content, "anything odd?");
    assert_eq!(history[1].content, "Looks fine.");
    assert_eq!(history[2].content, "sure?");
    assert_eq!(history[3].content, "Still fine.");

    // Still a single record in the history listing
    assert_eq!(store.list().unwrap().len(), 1);
}

// =============================================================================
// Listing resilience
// =============================================================================

#[tokio::test]
async fn test_listing_survives_a_corrupt_record() {
    let (_dir, store) = test_store();
    let auditor = Auditor::new(
        BackendClient::Mock(MockBackend::new().with_analysis_reply(ACME_REPLY)),
        store.clone(),
    );
    let record = auditor.run_analysis("aGVsbG8=", "audit").await.unwrap();

    // A second entry rots on disk
    let corrupt_path = store.history_dir().join("01-01-25-0900-Rotten.json");
    std::fs::write(&corrupt_path, "{\"timestamp\": ").unwrap();

    let summaries = store.list().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id, record.id);

    assert!(matches!(
        store.load("01-01-25-0900-Rotten"),
        Err(Error::RecordCorrupt { .. })
    ));
}
