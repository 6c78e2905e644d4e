use lvlup::error::{exit_codes, Error, JsonError};

#[test]
fn exit_codes_map_correctly() {
    let user = Error::InvalidArgument("bad".to_string());
    assert_eq!(user.exit_code(), exit_codes::USER_ERROR);

    let blocked = Error::SchedulingDenied {
        task_id: 3,
        reason: "reminders are disabled".to_string(),
    };
    assert_eq!(blocked.exit_code(), exit_codes::BLOCKED);

    let op = Error::OperationFailed("boom".to_string());
    assert_eq!(op.exit_code(), exit_codes::OPERATION_FAILED);
}

#[test]
fn validation_errors_are_user_errors() {
    let errors = [
        Error::EmptyTitle,
        Error::DueDateInPast("2000-01-01T00:00:00Z".to_string()),
        Error::ParentNotFound(4),
        Error::CyclicHierarchy { task_id: 4 },
        Error::HierarchyTooDeep {
            task_id: 4,
            max_depth: 256,
        },
    ];
    for err in errors {
        assert!(err.is_validation(), "{err}");
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }
    assert!(!Error::TaskNotFound(1).is_validation());
}

#[test]
fn json_error_includes_code_and_details() {
    let err = Error::TaskNotFound(12);
    let json = JsonError::from(&err);
    assert_eq!(json.code, exit_codes::USER_ERROR);
    assert!(json.error.contains("Task not found"));
    assert_eq!(json.details, Some(serde_json::json!({ "task_id": 12 })));

    let denied = JsonError::from(&Error::SchedulingDenied {
        task_id: 5,
        reason: "off".to_string(),
    });
    assert_eq!(denied.code, exit_codes::BLOCKED);
    assert_eq!(
        denied.details,
        Some(serde_json::json!({ "task_id": 5, "reason": "off" }))
    );
}

#[test]
fn sqlite_errors_are_operation_failures() {
    let err: Error = rusqlite::Error::InvalidQuery.into();
    assert_eq!(err.exit_code(), exit_codes::OPERATION_FAILED);
}
