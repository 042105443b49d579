use std::sync::Arc;

use quiz_core::model::{QuizId, SessionId};
use storage::{ActiveSessionLock, CredentialSlot, KeyValueStore, LockState, Storage};

#[test]
fn two_processes_share_the_active_session_slot() {
    let dir = tempfile::tempdir().unwrap();
    let first = Storage::json_dir(dir.path()).unwrap();
    let second = Storage::json_dir(dir.path()).unwrap();
    let quiz = QuizId::new("quiz-42");

    let lock_a = ActiveSessionLock::new(
        Arc::clone(&first.shared),
        &quiz,
        SessionId::from_raw("session-a"),
    );
    let lock_b = ActiveSessionLock::new(
        Arc::clone(&second.shared),
        &quiz,
        SessionId::from_raw("session-b"),
    );

    lock_a.claim().unwrap();
    lock_b.claim().unwrap();

    assert_eq!(
        lock_a.check().unwrap(),
        LockState::Taken(SessionId::from_raw("session-b"))
    );
    assert!(!lock_a.release().unwrap());
    assert_eq!(lock_b.check().unwrap(), LockState::Held);
}

#[test]
fn credential_written_by_one_handle_is_read_by_another() {
    let dir = tempfile::tempdir().unwrap();
    let writer = CredentialSlot::new(Storage::json_dir(dir.path()).unwrap().shared);
    let reader = Storage::json_dir(dir.path()).unwrap();

    writer.save("header.payload.sig").unwrap();
    assert_eq!(
        reader.shared.get("auth_token").unwrap().as_deref(),
        Some("header.payload.sig")
    );
}

#[test]
fn concurrent_writers_on_one_directory_never_revert_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let rounds = 300;
    let writer = |key: &'static str, prefix: &'static str| {
        let store = Storage::json_dir(dir.path()).unwrap().shared;
        move || {
            for round in 0..rounds {
                let value = format!("{prefix}{round}");
                store.set(key, &value).unwrap();
                assert_eq!(store.get(key).unwrap().as_deref(), Some(value.as_str()));
            }
        }
    };

    std::thread::scope(|scope| {
        scope.spawn(writer("auth_token", "tok"));
        scope.spawn(writer("active_quiz_session:q", "s"));
    });

    let reader = Storage::json_dir(dir.path()).unwrap().shared;
    assert_eq!(
        reader.get("auth_token").unwrap().as_deref(),
        Some("tok299")
    );
    assert_eq!(
        reader.get("active_quiz_session:q").unwrap().as_deref(),
        Some("s299")
    );
}
