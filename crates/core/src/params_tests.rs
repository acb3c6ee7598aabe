// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn create_spec_round_trips() {
    let params = CreateSpecParams {
        name: "auth".to_string(),
        description: "authentication flows".to_string(),
        spec_id: None,
    };
    let json = serde_json::to_string(&params).unwrap();
    assert_eq!(json, r#"{"name":"auth","description":"authentication flows"}"#);

    let parsed: CreateSpecParams = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, params);
}

#[test]
fn unknown_fields_are_rejected() {
    let err = serde_json::from_str::<CreateSpecParams>(
        r#"{"name":"auth","description":"d","sneaky":true}"#,
    );
    assert!(err.is_err());

    let err = serde_json::from_str::<SyncStatusParams>(r#"{"anything":1}"#);
    assert!(err.is_err());
}

#[test]
fn sync_status_serializes_empty() {
    let json = serde_json::to_string(&SyncStatusParams::default()).unwrap();
    assert_eq!(json, "{}");
}

#[test]
fn heartbeat_optional_fields_default() {
    let parsed: HeartbeatParams = serde_json::from_str("{}").unwrap();
    assert_eq!(parsed, HeartbeatParams::default());

    let parsed: HeartbeatParams =
        serde_json::from_str(r#"{"server_version":"1.2.0"}"#).unwrap();
    assert_eq!(parsed.server_version.as_deref(), Some("1.2.0"));
    assert!(parsed.editor_version.is_none());
}

#[test]
fn spec_content_version_is_optional() {
    let parsed: SpecContentParams =
        serde_json::from_str(r#"{"spec_id":"s1","content":"# Title"}"#).unwrap();
    assert_eq!(parsed.version, None);

    let parsed: SpecContentParams =
        serde_json::from_str(r#"{"spec_id":"s1","content":"# Title","version":4}"#).unwrap();
    assert_eq!(parsed.version, Some(4));
}
