//! End-to-end runs of the agent against a SQLite database on disk

use std::io::Write;
use std::path::Path;
use std::time::Duration;
use stress_alert_agent::handler::{handle_get_alerts, handle_run_event};
use stress_alert_agent::{
    Agent, AgentError, AgentState, AlertOrder, AlertReader, Datastore, ErrorKind,
    IdentityStrategy, Outcome, SqliteStore,
};

const SCENARIO: &str = "timestamp,stress_level\n\
                        2025-06-11T10:00,60\n\
                        2025-06-11T11:00,75\n\
                        bad,90\n";

fn write_batch(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

fn sqlite_store(dir: &Path) -> SqliteStore {
    SqliteStore::new(dir.join("alerts.db"), Duration::from_secs(1))
}

#[test]
fn test_scenario_persists_one_alert() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    let batch = write_batch(dir.path(), "batch.csv", SCENARIO);

    let report = Agent::new(&store).run(&batch).unwrap();

    assert_eq!(report.rows_read, 3);
    assert_eq!(report.malformed, 1);
    assert_eq!(report.outcome, Outcome::Persisted { count: 1 });
    assert_eq!(report.states.last(), Some(&AgentState::Done));

    let alerts = AlertReader::new(&store).fetch(AlertOrder::Storage).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].user_id, "user_1");
    assert_eq!(alerts[0].stress_score, 0.75);
    assert_eq!(alerts[0].timestamp, "2025-06-11T11:00:00Z");
}

#[test]
fn test_repeated_runs_append_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    let batch = write_batch(dir.path(), "batch.csv", SCENARIO);

    Agent::new(&store).run(&batch).unwrap();
    Agent::new(&store).run(&batch).unwrap();

    let alerts = AlertReader::new(&store).fetch(AlertOrder::Storage).unwrap();
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a.user_id == "user_1"));
}

#[test]
fn test_no_alerts_leaves_database_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    let batch = write_batch(
        dir.path(),
        "calm.csv",
        "timestamp,stress_level\n2025-06-11T10:00,70\n2025-06-11T11:00,12\n",
    );

    let report = Agent::new(&store).run(&batch).unwrap();

    assert_eq!(report.outcome, Outcome::NoAlerts);
    assert!(!store.path().exists());
}

#[test]
fn test_schema_failure_leaves_database_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    let batch = write_batch(
        dir.path(),
        "wrong.csv",
        "timestamp,sample_column\n2025-06-11T10:00,111\n",
    );

    let err = Agent::new(&store).run(&batch).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Schema);
    assert!(!store.path().exists());
}

#[test]
fn test_failed_transaction_commits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("alerts.db"), Duration::from_secs(1)).unwrap();

    // A trigger that rejects the third row forces a failure mid-transaction.
    let conn = rusqlite::Connection::open(store.path()).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_third BEFORE INSERT ON high_stress_users
         WHEN NEW.user_id = 'user_2'
         BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
    )
    .unwrap();
    drop(conn);

    let batch = write_batch(
        dir.path(),
        "batch.csv",
        "timestamp,stress_level\n\
         2025-06-11T10:00,80\n\
         2025-06-11T10:05,81\n\
         2025-06-11T10:10,82\n\
         2025-06-11T10:15,83\n",
    );

    let err = Agent::new(&store).run(&batch).unwrap_err();

    assert!(matches!(err, AgentError::Persistence(_)));
    let alerts = AlertReader::new(&store).fetch(AlertOrder::Storage).unwrap();
    assert!(alerts.is_empty());
}

#[test]
fn test_subject_column_identity() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    let batch = write_batch(
        dir.path(),
        "subjects.csv",
        "subject_ref,timestamp,stress_level\n\
         alice,2025-06-11T10:00,91\n\
         ,2025-06-11T11:00,88\n",
    );

    Agent::new(&store)
        .with_identity(IdentityStrategy::SubjectColumn)
        .run(&batch)
        .unwrap();

    let mut session = store.connect().unwrap();
    let ids: Vec<String> = session
        .fetch_alerts(AlertOrder::Storage)
        .unwrap()
        .into_iter()
        .map(|a| a.user_id)
        .collect();
    assert_eq!(ids, vec!["alice", "user_1"]);
}

#[test]
fn test_reader_scales_rows_written_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("alerts.db"), Duration::from_secs(1)).unwrap();
    let conn = rusqlite::Connection::open(store.path()).unwrap();
    conn.execute(
        r#"INSERT INTO high_stress_users (user_id, stress_score, "timestamp") VALUES ('test_user_1', 85, '2025-06-11T12:00:00')"#,
        [],
    )
    .unwrap();

    let alerts = AlertReader::new(&store).fetch(AlertOrder::NewestFirst).unwrap();

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].user_id, "test_user_1");
    assert_eq!(alerts[0].stress_score, 0.85);
    assert_eq!(alerts[0].timestamp, "2025-06-11T12:00:00Z");
}

#[test]
fn test_reader_appends_z_without_converting_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("alerts.db"), Duration::from_secs(1)).unwrap();
    let conn = rusqlite::Connection::open(store.path()).unwrap();
    conn.execute(
        r#"INSERT INTO high_stress_users (user_id, stress_score, "timestamp") VALUES ('test_user_1', 85, '2025-06-11T12:00:00+02:00')"#,
        [],
    )
    .unwrap();

    let alerts = AlertReader::new(&store).fetch(AlertOrder::Storage).unwrap();

    assert_eq!(alerts[0].timestamp, "2025-06-11T12:00:00Z");
}

#[test]
fn test_function_handlers_share_one_database() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    let early = write_batch(
        dir.path(),
        "early.csv",
        "timestamp,stress_level\n2025-06-11T08:00,95\n",
    );
    let late = write_batch(
        dir.path(),
        "late.csv",
        "timestamp,stress_level\n2025-06-11T18:00,77\n",
    );

    for batch in [&early, &late] {
        let event = serde_json::json!({ "filepath": batch });
        let response = handle_run_event(&event, &store, IdentityStrategy::Positional, None);
        assert_eq!(response.status_code, 200);
    }

    let response = handle_get_alerts(&store);
    assert_eq!(response.status_code, 200);
    let body = response.body_json().unwrap();
    assert_eq!(body[0]["timestamp"], "2025-06-11T18:00:00Z");
    assert_eq!(body[1]["timestamp"], "2025-06-11T08:00:00Z");
}
