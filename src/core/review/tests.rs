use crate::core::review::{
    EntityKind, ReviewResult, TentativeStatus, Transition, plan, transition,
};

#[test]
fn transition_table_matches_review_rules() {
    let table = [
        (TentativeStatus::Created, ReviewResult::Approve, Transition::Commit),
        (TentativeStatus::Created, ReviewResult::Reject, Transition::Delete),
        (TentativeStatus::Deleted, ReviewResult::Approve, Transition::Delete),
        (TentativeStatus::Deleted, ReviewResult::Reject, Transition::Commit),
    ];
    for (flag, result, expected) in table {
        assert_eq!(
            transition(Some(flag), result),
            Some(expected),
            "expected {:?} + {:?} -> {:?}",
            flag,
            result,
            expected
        );
    }
}

#[test]
fn committed_entities_are_untouched() {
    assert_eq!(transition(None, ReviewResult::Approve), None);
    assert_eq!(transition(None, ReviewResult::Reject), None);
}

#[test]
fn approve_commits_created_and_deletes_deleted() {
    let batch = [
        ("p1", Some(TentativeStatus::Created)),
        ("p2", Some(TentativeStatus::Deleted)),
    ];
    let out = plan(batch, ReviewResult::Approve);
    assert_eq!(out.commit, vec!["p1"]);
    assert_eq!(out.delete, vec!["p2"]);
}

#[test]
fn reject_deletes_created_and_restores_deleted() {
    let batch = [
        ("p1", Some(TentativeStatus::Created)),
        ("p2", Some(TentativeStatus::Deleted)),
    ];
    let out = plan(batch, ReviewResult::Reject);
    assert_eq!(out.delete, vec!["p1"]);
    assert_eq!(out.commit, vec!["p2"]);
}

#[test]
fn plan_of_committed_batch_is_empty() {
    let out = plan([("p1", None), ("p2", None)], ReviewResult::Approve);
    assert!(out.is_empty());
}

#[test]
fn status_strings_parse_back() {
    for flag in [TentativeStatus::Created, TentativeStatus::Deleted] {
        assert_eq!(TentativeStatus::from_status(flag.as_str()), Some(flag));
    }
    assert_eq!(TentativeStatus::from_status("created"), None);
    assert_eq!(
        EntityKind::from_status("data-source"),
        Some(EntityKind::DataSource)
    );
    assert_eq!(ReviewResult::from_status("rejected"), Some(ReviewResult::Reject));
    assert_eq!(ReviewResult::from_status("maybe"), None);
}
