mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::NaiveDate;
use common::{read_json, TestApp};
use equiptrack::domain::Role;
use serde_json::{json, Value};

/// Completes a calibration of SN-100 valid until 2025-07-10 and returns the tech's token.
async fn calibrated_item(app: &TestApp) -> Result<String> {
    let (_, admin) = app.user_with_token("admin", Role::Admin).await?;
    let (_, tech) = app.user_with_token("tech", Role::User).await?;

    app.post_json(
        "/api/items",
        &json!({ "serial_number": "SN-100", "name": "Gas detector" }),
        Some(&admin),
    )
    .await?;
    let response = app
        .post_json("/api/requests/calibration", &json!({ "item_serial": "SN-100" }), Some(&tech))
        .await?;
    let request: Value = read_json(response).await?;
    let path = format!(
        "/api/requests/calibration/{}/transition",
        request["id"].as_str().unwrap_or_default()
    );

    let response = app
        .post_json(&path, &json!({ "target": "APPROVED" }), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .post_json(
            &path,
            &json!({
                "target": "COMPLETED",
                "completion": {
                    "kind": "calibration",
                    "calibration_date": "2025-01-10",
                    "valid_until": "2025-07-10"
                }
            }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(tech)
}

fn set_day(app: &TestApp, y: i32, m: u32, d: u32) {
    let at = NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|day| day.and_hms_opt(8, 0, 0))
        .expect("valid date");
    app.clock.set(at);
}

#[tokio::test]
async fn owner_is_notified_of_each_admin_transition() -> Result<()> {
    let app = TestApp::new().await?;
    let tech = calibrated_item(&app).await?;

    let response = app.get("/api/notifications", Some(&tech)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let inbox: Vec<Value> = read_json(response).await?;
    let transitions = inbox
        .iter()
        .filter(|entry| entry["source"] == "transition")
        .count();
    assert_eq!(transitions, 2);
    Ok(())
}

#[tokio::test]
async fn reminder_becomes_due_on_its_fire_date() -> Result<()> {
    let app = TestApp::new().await?;
    let tech = calibrated_item(&app).await?;

    set_day(&app, 2025, 6, 9);
    let response = app.get("/api/reminders/due", Some(&tech)).await?;
    let due: Vec<Value> = read_json(response).await?;
    assert!(due.is_empty());

    set_day(&app, 2025, 6, 10);
    for _ in 0..3 {
        let response = app.get("/api/reminders/due", Some(&tech)).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let due: Vec<Value> = read_json(response).await?;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0]["kind"], "calibration_expiry");
        assert_eq!(due[0]["due_date"], "2025-07-10");
    }

    let response = app.get("/api/notifications", Some(&tech)).await?;
    let inbox: Vec<Value> = read_json(response).await?;
    let reminders: Vec<&Value> = inbox
        .iter()
        .filter(|entry| entry["source"] == "reminder")
        .collect();
    assert_eq!(reminders.len(), 1);
    Ok(())
}

#[tokio::test]
async fn inbox_entries_can_be_read_deleted_and_reminders_dismissed() -> Result<()> {
    let app = TestApp::new().await?;
    let tech = calibrated_item(&app).await?;
    let (_, stranger) = app.user_with_token("stranger", Role::User).await?;

    set_day(&app, 2025, 6, 12);
    let response = app.get("/api/reminders/due", Some(&tech)).await?;
    let due: Vec<Value> = read_json(response).await?;
    let reminder_id = due[0]["id"].as_str().unwrap_or_default().to_string();

    let response = app.get("/api/notifications", Some(&tech)).await?;
    let inbox: Vec<Value> = read_json(response).await?;
    let entry_id = inbox[0]["id"].as_str().unwrap_or_default().to_string();

    let response = app
        .post_json(&format!("/api/notifications/{entry_id}/read"), &json!({}), Some(&stranger))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(&format!("/api/notifications/{entry_id}/read"), &json!({}), Some(&tech))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let entry: Value = read_json(response).await?;
    assert_eq!(entry["is_read"], true);

    let response = app
        .delete(&format!("/api/notifications/{entry_id}"), Some(&tech))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app
        .delete(&format!("/api/notifications/{entry_id}"), Some(&tech))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .post_json(&format!("/api/reminders/{reminder_id}/dismiss"), &json!({}), Some(&tech))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let dismissed: Value = read_json(response).await?;
    assert_eq!(dismissed["status"], "DISMISSED");

    let response = app.get("/api/reminders/due", Some(&tech)).await?;
    let due: Vec<Value> = read_json(response).await?;
    assert!(due.is_empty());
    Ok(())
}
