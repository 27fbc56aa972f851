// EnrolSift - tests/e2e_saved_configs.rs
//
// End-to-end tests for saved filter configurations on a real store file.
//
// Exercises the file backend (atomic writes, reopen), the repository's
// ownership rules and team-wide listing, and the session's live cache.

use chrono::NaiveDate;
use enrolsift::app::repository::{ConfigRepository, DeleteOutcome, StoreLayout};
use enrolsift::app::session::{load_records, FilterSession};
use enrolsift::app::store::{Backend, FileBackend, StorePath};
use enrolsift::core::date::DateRange;
use enrolsift::core::filter::{Categorical, DateField, FilterState, Presence, PresenceField};
use enrolsift::util::error::{RepositoryError, ValidationError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

// =============================================================================
// Helpers
// =============================================================================

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn open_repo(store: &Path) -> ConfigRepository {
    let backend = FileBackend::open(store).expect("store opens");
    ConfigRepository::new(Arc::new(backend), StoreLayout::default())
}

fn rich_state() -> FilterState {
    FilterState::default()
        .with_search("lee")
        .with_selection(Categorical::Course, ["MATH30-1"])
        .with_selection(Categorical::ActiveStatus, ["Active"])
        .with_presence(PresenceField::Grade, Presence::Missing)
        .with_presence(PresenceField::Com1255, Presence::Has)
        .with_date_range(
            DateField::ScheduleEndDate,
            DateRange::days(None, NaiveDate::from_ymd_opt(2025, 6, 30)),
        )
        .with_months(["9", "10"])
        .with_registration_range(DateRange::days(NaiveDate::from_ymd_opt(2024, 8, 1), None))
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn e2e_save_survives_reopen_and_loads_identically() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("data").join("store.json");

    let id = open_repo(&store).save("u1", "Awaiting COM1255", &rich_state()).unwrap();
    assert!(store.exists());

    let reopened = open_repo(&store);
    let configs = reopened.list("u1").unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].id, id);
    assert_eq!(reopened.load(&configs[0]), rich_state());
}

#[test]
fn e2e_stored_document_uses_epoch_millis_and_null() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let id = open_repo(&store).save("u1", "Dates", &rich_state()).unwrap();

    let document: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&store).unwrap()).unwrap();
    let filters = &document["staff"]["u1"]["savedFilterConfigs"]["studentSummaries"][&id]["filters"];
    assert_eq!(filters["scheduleEndDateRange"]["from"], serde_json::Value::Null);
    assert_eq!(filters["scheduleEndDateRange"]["to"], 1_751_241_600_000_i64);
    assert_eq!(filters["dateRangeStart"], 1_722_470_400_000_i64);
    assert_eq!(filters["selectedMonths"], serde_json::json!(["09", "10"]));
    assert_eq!(filters["missingGradeFilter"], true);
}

#[test]
fn e2e_empty_name_is_rejected_without_touching_the_store() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let err = open_repo(&store).save("u1", "", &rich_state()).unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::Validation(ValidationError::EmptyName)
    ));
    assert!(!store.exists(), "no write may be issued for a rejected save");
}

#[test]
fn e2e_team_sharing_and_ownership() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let repo = open_repo(&store);
    repo.register_member("userA", "Avery Lee").unwrap();
    repo.register_member("userB", "Blake Ng").unwrap();

    let mine = repo.save("userA", "Mine", &rich_state()).unwrap();

    let shared = repo.list_shared("userB").unwrap();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].name, "Mine");
    assert_eq!(shared[0].owner, "userA");
    assert_eq!(shared[0].owner_name.as_deref(), Some("Avery Lee"));
    assert!(!shared[0].is_owner);
    assert!(repo.list_shared("userA").unwrap().is_empty());

    let before = std::fs::read(&store).unwrap();
    assert_eq!(repo.delete("userB", &mine).unwrap(), DeleteOutcome::NotOwned);
    assert_eq!(
        repo.delete_saved("userB", &shared[0]).unwrap(),
        DeleteOutcome::NotOwned
    );
    assert_eq!(std::fs::read(&store).unwrap(), before, "store unchanged");

    // Anyone may load what they can see.
    assert_eq!(repo.load(&shared[0]), rich_state());

    assert_eq!(repo.delete("userA", &mine).unwrap(), DeleteOutcome::Deleted);
    assert!(repo.list("userA").unwrap().is_empty());
    assert!(repo.list_shared("userB").unwrap().is_empty());
}

#[test]
fn e2e_session_cache_follows_store() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FileBackend::open(&dir.path().join("store.json")).unwrap());
    let repo = ConfigRepository::new(backend.clone(), StoreLayout::default());

    let mut session = FilterSession::new(load_records(&fixture("records.json")).unwrap());
    session.watch_saved(&repo, "u1").unwrap();
    assert_eq!(backend.subscriber_count(), 1);

    session.update(|_| FilterState::awaiting_grade());
    let id = session.save_current(&repo, "u1", "Awaiting grade").unwrap();
    let cached = session.saved_configurations();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].id, id);

    // A change made behind the repository's back still reaches the cache.
    let path = StorePath::parse(&format!(
        "/staff/u1/savedFilterConfigs/studentSummaries/{id}"
    ))
    .unwrap();
    backend.delete(&path).unwrap();
    assert!(session.saved_configurations().is_empty());

    session.reset();
    session.load_saved(&repo, &cached[0]);
    assert_eq!(session.filtered().len(), 2);

    drop(session);
    repo.save("u1", "After", &FilterState::default()).unwrap();
    assert_eq!(backend.subscriber_count(), 0);
}
