use serde_json::json;

use crate::{
    models::{MessageRole, PlanStatus, StatusUpdate, StepStatus},
    test_support::{plan_with, step},
};

#[test]
fn test_plan_status_round_trips_through_str() {
    for status in [
        PlanStatus::PendingApproval,
        PlanStatus::InProgress,
        PlanStatus::Completed,
        PlanStatus::CompletedWithSkips,
        PlanStatus::Failed,
    ] {
        assert_eq!(status.as_str().parse::<PlanStatus>(), Ok(status));
    }
    assert!("archived".parse::<PlanStatus>().is_err());
}

#[test]
fn test_step_status_parse_is_case_insensitive() {
    assert_eq!("executing".parse::<StepStatus>(), Ok(StepStatus::Executing));
    assert_eq!("BLOCKED".parse::<StepStatus>(), Ok(StepStatus::Blocked));
    assert!("done".parse::<StepStatus>().is_err());
}

#[test]
fn test_status_serializes_verbatim() {
    assert_eq!(
        serde_json::to_value(PlanStatus::CompletedWithSkips).unwrap(),
        json!("COMPLETED_WITH_SKIPS")
    );
    assert_eq!(
        serde_json::to_value(StepStatus::Approved).unwrap(),
        json!("APPROVED")
    );
    assert_eq!(
        serde_json::to_value(MessageRole::Assistant).unwrap(),
        json!("assistant")
    );
}

#[test]
fn test_terminal_step_statuses() {
    let terminal: Vec<_> = [
        StepStatus::Pending,
        StepStatus::Approved,
        StepStatus::Rejected,
        StepStatus::Skipped,
        StepStatus::Executing,
        StepStatus::Completed,
        StepStatus::Failed,
        StepStatus::Blocked,
    ]
    .into_iter()
    .filter(StepStatus::is_terminal)
    .collect();

    assert_eq!(
        terminal,
        vec![
            StepStatus::Rejected,
            StepStatus::Skipped,
            StepStatus::Completed,
            StepStatus::Failed,
            StepStatus::Blocked,
        ]
    );
}

#[test]
fn test_step_result_text() {
    let mut s = step(1, 0, "company", &[], StepStatus::Completed);
    s.result = Some(json!("Apple Inc."));
    assert_eq!(s.result_text().as_deref(), Some("Apple Inc."));

    s.result = Some(json!({"pe": 28.1}));
    assert_eq!(s.result_text().as_deref(), Some(r#"{"pe":28.1}"#));
}

#[test]
fn test_plan_step_ids_follow_order() {
    let plan = plan_with(vec![
        step(10, 0, "company", &[], StepStatus::Pending),
        step(11, 1, "fundamentals", &[10], StepStatus::Pending),
    ]);
    assert_eq!(plan.step_ids(), vec![10, 11]);
    assert_eq!(plan.total_steps(), 2);
}

#[test]
fn test_status_update_is_tagged() {
    let update = StatusUpdate::StepCompleted {
        step_id: 3,
        order: 1,
    };
    let value = serde_json::to_value(&update).unwrap();
    assert_eq!(value["type"], "step_completed");
    assert_eq!(value["step_id"], 3);
}
