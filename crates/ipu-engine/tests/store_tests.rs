use chrono::{Duration, Utc};
use ipu_engine::{
    ConfigurationSnapshot, ContextStore, ExecutionContext, ExecutionKind, ExecutionState,
    FileContextStore, Journal, PersistenceError,
};
use std::fs;

fn context(kind: ExecutionKind, age_minutes: i64) -> ExecutionContext {
    let mut ctx = ExecutionContext::new(
        kind,
        "IPUWorkflow",
        ConfigurationSnapshot::new("8.10", "9.6", "x86_64"),
    );
    ctx.created_at = Utc::now() - Duration::minutes(age_minutes);
    ctx
}

#[test]
fn most_recent_picks_newest_of_kind() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileContextStore::new(dir.path());

    let old = context(ExecutionKind::Upgrade, 60);
    let new = context(ExecutionKind::Upgrade, 1);
    let pre = context(ExecutionKind::Preupgrade, 0);
    for ctx in [&new, &old, &pre] {
        store.save(ctx).unwrap();
    }

    let found = store.most_recent(ExecutionKind::Upgrade).unwrap().unwrap();
    assert_eq!(found.id, new.id);
    let found = store.most_recent(ExecutionKind::Preupgrade).unwrap().unwrap();
    assert_eq!(found.id, pre.id);
}

#[test]
fn overwrite_replaces_previous_version() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileContextStore::new(dir.path());

    let mut ctx = context(ExecutionKind::Upgrade, 0);
    ctx.transition(ExecutionState::Running).unwrap();
    store.save(&ctx).unwrap();
    ctx.commit_phase("Facts");
    ctx.transition(ExecutionState::AwaitingReboot).unwrap();
    store.save(&ctx).unwrap();

    let loaded = store.load(&ctx.id).unwrap().unwrap();
    assert_eq!(loaded.state, ExecutionState::AwaitingReboot);
    assert_eq!(loaded.last_completed_phase.as_deref(), Some("Facts"));
}

#[test]
fn corrupt_context_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileContextStore::new(dir.path());
    let ctx = context(ExecutionKind::Upgrade, 0);
    store.save(&ctx).unwrap();

    let path = dir.path().join(ctx.id.to_string()).join("context.json");
    fs::write(&path, b"{\"id\": truncated").unwrap();

    assert!(matches!(
        store.load(&ctx.id),
        Err(PersistenceError::Corrupt { .. })
    ));
    assert!(matches!(
        store.most_recent(ExecutionKind::Upgrade),
        Err(PersistenceError::Corrupt { .. })
    ));
}

#[test]
fn journal_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileContextStore::new(dir.path());
    let ctx = context(ExecutionKind::Upgrade, 0);

    let audit = ipu_engine::AuditLog::new();
    audit.record(ctx.id, Some("Facts"), None, "phase_started", "");
    let journal = Journal {
        messages: Vec::new(),
        audit: audit.events(),
    };
    store.save_journal(&ctx.id, &journal).unwrap();

    assert_eq!(store.load_journal(&ctx.id).unwrap(), journal);
}

#[test]
fn stray_files_in_root_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("README"), b"not a context").unwrap();
    let store = FileContextStore::new(dir.path());
    assert!(store.most_recent(ExecutionKind::Upgrade).unwrap().is_none());
}
