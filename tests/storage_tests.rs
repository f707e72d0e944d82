// Durable state tests: session persistence and the checkout ledger, all
// under a temporary data directory.

mod common;
use common::setup_logging;

use haggle::models::UserRef;
use haggle::storage::{
    self, CheckoutLedger, FileCheckoutLedger, Session,
};
use once_cell::sync::Lazy;
use tempfile::TempDir;

// One override for the whole test binary; individual tests use distinct
// file names where they need isolation.
static DATA_DIR: Lazy<TempDir> = Lazy::new(|| {
    let dir = tempfile::tempdir().expect("tempdir");
    storage::set_data_dir_override(dir.path());
    dir
});

#[test]
fn test_session_round_trip() {
    setup_logging();
    Lazy::force(&DATA_DIR);

    let user = UserRef::new("u1").with_email("buyer@example.com");
    let session = Session::new("secret-token", user);
    storage::save_session(&session).unwrap();

    let loaded = storage::load_session().unwrap().expect("session missing");
    assert_eq!(loaded.user.id, "u1");
    assert_eq!(loaded.token(), "secret-token");

    // The token is not stored in the clear.
    let raw = std::fs::read_to_string(DATA_DIR.path().join("session.json")).unwrap();
    assert!(!raw.contains("secret-token"));

    storage::clear_session().unwrap();
    assert!(storage::load_session().unwrap().is_none());
    // Clearing twice is fine.
    storage::clear_session().unwrap();
}

#[test]
fn test_ledger_open_starts_empty_and_persists() {
    Lazy::force(&DATA_DIR);

    let path = DATA_DIR.path().join("ledger_persists.json");
    let mut ledger = FileCheckoutLedger::open_at(path.clone()).unwrap();
    assert!(!ledger.has_completed("m1"));

    ledger.mark_completed("m1").unwrap();
    // Marking again rewrites nothing and stays true.
    ledger.mark_completed("m1").unwrap();
    assert!(ledger.has_completed("m1"));

    let reloaded = FileCheckoutLedger::open_at(path).unwrap();
    assert!(reloaded.has_completed("m1"));
    assert!(!reloaded.has_completed("m2"));
}
