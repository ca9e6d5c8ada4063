// Submission sequences against the public service API.
// Each case: (description, submissions as (name, score, counts JSON)).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use element_leaderboard::{
    CompletedCounts, ElementCatalog, FileStore, LeaderboardService, ServiceError, SubmitRequest,
};

fn service(dir: &tempfile::TempDir, catalog: ElementCatalog) -> LeaderboardService {
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    LeaderboardService::new(store.clone(), store, catalog)
}

fn request(body: Value) -> SubmitRequest {
    serde_json::from_value(body).unwrap()
}

fn t0() -> DateTime<Utc> {
    "2025-06-01T09:00:00Z".parse().unwrap()
}

fn ten_element_catalog() -> ElementCatalog {
    ElementCatalog::from_json_str(
        r#"{"1":"H","2":"He","3":"Li","4":"Be","5":"B","6":"C","7":"N","8":"O","9":"F","10":"Ne"}"#,
    )
    .unwrap()
}

#[test]
fn stored_state_is_high_water_of_every_sequence() {
    let cases: Vec<(&str, Vec<(&str, f64, Value)>)> = vec![
        (
            "rising scores",
            vec![("Ada", 10.0, json!({"1": 1})), ("Ada", 20.0, json!({"1": 2})), ("Ada", 30.0, json!({"1": 3}))],
        ),
        (
            "falling scores and counts",
            vec![("Ada", 30.0, json!({"1": 3})), ("Ada", 20.0, json!({"1": 2})), ("Ada", 10.0, json!({"1": 1}))],
        ),
        (
            "peak in the middle, mixed casing",
            vec![("ada", 5.0, json!({"2": 1})), ("ADA", 50.0, json!({"1": 7})), ("Ada", 25.0, json!({"1": 2, "2": 4}))],
        ),
        (
            "malformed counts never lower anything",
            vec![("Ada", 12.0, json!({"1": 6})), ("Ada", 1.0, json!({"1": "junk"})), ("Ada", 2.0, json!([1, 2]))],
        ),
    ];

    for (description, submissions) in cases {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, ElementCatalog::builtin());

        let mut expected_score = 0.0f64;
        let mut expected_counts = CompletedCounts::new();
        for (i, (name, score, counts)) in submissions.iter().enumerate() {
            service
                .submit_at(
                    request(json!({"name": name, "score": score, "completedCounts": counts})),
                    t0() + Duration::seconds(i as i64),
                )
                .unwrap();
            expected_score = expected_score.max(*score);
            if let Some(object) = counts.as_object() {
                for (key, value) in object {
                    let count = value.as_u64().unwrap_or(0);
                    let slot = expected_counts.entry(key.clone()).or_insert(0);
                    *slot = (*slot).max(count);
                }
            }
        }

        let entries = service.get_player("ada").unwrap();
        assert_eq!(entries.len(), 1, "{}", description);
        assert_eq!(entries[0].score, expected_score, "{}", description);
        assert_eq!(entries[0].completed_counts, expected_counts, "{}", description);
    }
}

#[test]
fn distinct_keys_never_share_a_record() {
    // (name, category, score, element "1" count)
    let cases: Vec<(&str, &str, f64, u64)> = vec![
        ("x/y", "overall", 900.0, 50),
        ("y", "overall/x", 1.0, 0),
        ("a.b", "overall", 2.0, 1),
        ("a_b", "overall", 3.0, 2),
        ("a#b", "overall", 4.0, 3),
        ("a%2Fb", "overall", 5.0, 4),
        ("a/b", "overall", 6.0, 5),
        ("a", "b/overall", 7.0, 6),
    ];

    let dir = tempfile::tempdir().unwrap();
    {
        let service = service(&dir, ElementCatalog::builtin());
        for (i, (name, category, score, count)) in cases.iter().enumerate() {
            service
                .submit_at(
                    request(json!({"name": name, "category": category, "score": score, "completedCounts": {"1": count}})),
                    t0() + Duration::seconds(i as i64),
                )
                .unwrap();
        }
    }

    let service = service_from_disk(&dir);
    for (name, category, score, count) in &cases {
        let entries = service.get_player(name).unwrap();
        assert_eq!(entries.len(), 1, "{} in {}", name, category);
        assert_eq!(entries[0].category, *category, "{}", name);
        assert_eq!(entries[0].score, *score, "{}", name);
        assert_eq!(entries[0].completed_counts.get("1"), Some(count), "{}", name);
        assert_eq!(service.element_counts(name, Some(*category)).unwrap().get("1"), Some(count));
    }
}

#[test]
fn lower_score_still_refreshes_timestamp_and_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir, ElementCatalog::builtin());
    service
        .submit_at(request(json!({"name": "Ada", "score": 100, "timeSeconds": 300, "deaths": 2})), t0())
        .unwrap();
    let later = t0() + Duration::hours(1);
    let outcome = service
        .submit_at(request(json!({"name": "Ada", "score": 10, "timeSeconds": 45})), later)
        .unwrap();
    assert!(!outcome.is_guest);

    let record = &service.get_player("Ada").unwrap()[0];
    assert_eq!(record.score, 100.0);
    assert_eq!(record.created_at, t0());
    assert_eq!(record.updated_at, later);
    assert_eq!(record.snapshot.time_seconds, Some(45.0));
    assert_eq!(record.snapshot.deaths, Some(2.0));
}

#[test]
fn ten_element_catalog_example() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir, ten_element_catalog());
    service
        .submit(request(json!({"name": "Ada", "score": 1, "completedCounts": {"1": 2, "2": 0}})))
        .unwrap();

    let record = &service.list_top(None, None).unwrap()[0];
    assert_eq!(record.derived.unique_elements, 1);
    assert_eq!(record.derived.pt_percent, 20);
    assert_eq!(record.derived.total_collected, 2);
    assert_eq!(record.derived.protons_gathered, 2);
}

#[test]
fn guest_never_reaches_storage() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir, ElementCatalog::builtin());

    assert!(matches!(service.sign_up("guest", "pw"), Err(ServiceError::InvalidInput(_))));
    let outcome = service.submit(request(json!({"name": "Guest", "score": 500}))).unwrap();
    assert!(outcome.is_guest);
    assert!(service.list_top(None, Some("200")).unwrap().is_empty());

    // Nothing was written for the guest
    let reopened = service_from_disk(&dir);
    assert!(reopened.get_player("guest").unwrap().is_empty());
}

#[test]
fn records_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let service = service(&dir, ElementCatalog::builtin());
        service
            .submit(request(json!({"name": "Ada", "score": 77, "category": "hard", "completedCounts": {"92": 1}})))
            .unwrap();
        service.sign_up("Ada", "uranium").unwrap();
    }
    let service = service_from_disk(&dir);
    let board = service.list_top(Some("hard"), None).unwrap();
    assert_eq!(board[0].score, 77.0);
    assert_eq!(board[0].derived.protons_gathered, 92);
    assert_eq!(service.log_in("ada", "uranium").unwrap(), "Ada");
}

fn service_from_disk(dir: &tempfile::TempDir) -> LeaderboardService {
    service(dir, ElementCatalog::builtin())
}
