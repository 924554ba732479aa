mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{read_json, TestApp};
use equiptrack::domain::Role;
use serde_json::{json, Value};

async fn register_item(app: &TestApp, token: &str, serial: &str) -> Result<()> {
    let response = app
        .post_json(
            "/api/items",
            &json!({ "serial_number": serial, "name": format!("Detector {serial}") }),
            Some(token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    Ok(())
}

async fn open_request(app: &TestApp, token: &str, kind: &str, payload: Value) -> Result<Value> {
    let response = app
        .post_json(&format!("/api/requests/{kind}"), &payload, Some(token))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

async fn transition(
    app: &TestApp,
    token: &str,
    kind: &str,
    id: &str,
    payload: Value,
) -> Result<hyper::Response<axum::body::Body>> {
    app.post_json(
        &format!("/api/requests/{kind}/{id}/transition"),
        &payload,
        Some(token),
    )
    .await
}

#[tokio::test]
async fn calibration_is_approved_completed_and_certified() -> Result<()> {
    let app = TestApp::new().await?;
    let (_, admin) = app.user_with_token("admin", Role::Admin).await?;
    let (_, tech) = app.user_with_token("tech", Role::User).await?;
    register_item(&app, &admin, "SN-100").await?;

    let request = open_request(&app, &tech, "calibration", json!({ "item_serial": "SN-100" })).await?;
    assert_eq!(request["status"], "PENDING");
    let id = request["id"].as_str().unwrap_or_default().to_string();

    let response = transition(&app, &tech, "calibration", &id, json!({ "target": "APPROVED" })).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = transition(&app, &admin, "calibration", &id, json!({ "target": "APPROVED" })).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: Value = read_json(response).await?;
    assert_eq!(outcome["item_status"], "IN_CALIBRATION");

    let response = transition(
        &app,
        &admin,
        "calibration",
        &id,
        json!({
            "target": "COMPLETED",
            "completion": {
                "kind": "calibration",
                "calibration_date": "2025-01-10",
                "valid_until": "2025-07-10",
                "results": [
                    { "parameter": "CO", "reference_value": "100 ppm", "reading": "99 ppm" }
                ]
            }
        }),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: Value = read_json(response).await?;
    assert_eq!(outcome["request"]["document_number"], "1/CAL-PBI/I/2025");
    assert_eq!(outcome["item_status"], "AVAILABLE");
    assert_eq!(outcome["reminder"]["fire_date"], "2025-06-10");

    let response = app
        .get(&format!("/api/requests/calibration/{id}"), Some(&tech))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let detail: Value = read_json(response).await?;
    assert_eq!(detail["status_log"].as_array().map(Vec::len), Some(3));
    assert_eq!(detail["measurements"].as_array().map(Vec::len), Some(1));

    let response = app.get("/api/items/SN-100/history", Some(&admin)).await?;
    let history: Value = read_json(response).await?;
    assert_eq!(history.as_array().map(Vec::len), Some(1));
    assert!(!history[0]["ended_at"].is_null());
    Ok(())
}

#[tokio::test]
async fn second_rental_of_a_rented_item_conflicts() -> Result<()> {
    let app = TestApp::new().await?;
    let (_, admin) = app.user_with_token("admin", Role::Admin).await?;
    let (_, first) = app.user_with_token("first", Role::User).await?;
    let (_, second) = app.user_with_token("second", Role::User).await?;
    register_item(&app, &admin, "SN-200").await?;

    let rental = json!({
        "item_serial": "SN-200",
        "start_date": "2025-01-10",
        "due_date": "2025-02-10"
    });
    let a = open_request(&app, &first, "rental", rental.clone()).await?;
    let b = open_request(&app, &second, "rental", rental).await?;

    let a_id = a["id"].as_str().unwrap_or_default();
    let b_id = b["id"].as_str().unwrap_or_default();

    let response = transition(&app, &admin, "rental", a_id, json!({ "target": "APPROVED" })).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = transition(&app, &admin, "rental", b_id, json!({ "target": "APPROVED" })).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .get(&format!("/api/requests/rental/{b_id}"), Some(&admin))
        .await?;
    let detail: Value = read_json(response).await?;
    assert_eq!(detail["request"]["status"], "PENDING");

    let response = app.get("/api/items/SN-200", Some(&admin)).await?;
    let view: Value = read_json(response).await?;
    assert_eq!(view["item"]["status"], "RENTED");
    assert_eq!(view["holder"]["request_id"], a["id"]);
    Ok(())
}

#[tokio::test]
async fn maintenance_by_a_manager_starts_in_progress() -> Result<()> {
    let app = TestApp::new().await?;
    let (_, admin) = app.user_with_token("admin", Role::Admin).await?;
    let (_, manager) = app.user_with_token("manager", Role::Manager).await?;
    register_item(&app, &admin, "SN-300").await?;

    let request = open_request(&app, &manager, "maintenance", json!({ "item_serial": "SN-300" })).await?;
    assert_eq!(request["status"], "IN_PROGRESS");
    let id = request["id"].as_str().unwrap_or_default().to_string();

    let response = app.get("/api/items/SN-300", Some(&admin)).await?;
    let view: Value = read_json(response).await?;
    assert_eq!(view["item"]["status"], "MAINTENANCE");

    let response = transition(
        &app,
        &manager,
        "maintenance",
        &id,
        json!({
            "target": "COMPLETED",
            "completion": {
                "kind": "maintenance",
                "service_report": { "summary": "Replaced sensor", "parts": [
                    { "part_name": "CO sensor", "quantity": 1 }
                ] }
            }
        }),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: Value = read_json(response).await?;
    assert_eq!(outcome["item_status"], "AVAILABLE");
    assert_eq!(outcome["request"]["document_number"], "1/CSR-PBI/I/2025");
    Ok(())
}

#[tokio::test]
async fn unknown_kinds_and_requests_are_reported() -> Result<()> {
    let app = TestApp::new().await?;
    let (_, admin) = app.user_with_token("admin", Role::Admin).await?;

    let response = app
        .post_json("/api/requests/repair", &json!({ "item_serial": "SN-1" }), Some(&admin))
        .await?;
    assert!(response.status().is_client_error());

    let response = app
        .post_json("/api/requests/calibration", &json!({ "item_serial": "SN-missing" }), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .get(
            "/api/requests/calibration/00000000-0000-0000-0000-000000000000",
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn purge_releases_the_item() -> Result<()> {
    let app = TestApp::new().await?;
    let (_, admin) = app.user_with_token("admin", Role::Admin).await?;
    let (_, tech) = app.user_with_token("tech", Role::User).await?;
    register_item(&app, &admin, "SN-400").await?;

    let request = open_request(&app, &tech, "calibration", json!({ "item_serial": "SN-400" })).await?;
    let id = request["id"].as_str().unwrap_or_default().to_string();
    transition(&app, &admin, "calibration", &id, json!({ "target": "APPROVED" })).await?;

    let response = app
        .delete(&format!("/api/requests/calibration/{id}"), Some(&tech))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .delete(&format!("/api/requests/calibration/{id}"), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let report: Value = read_json(response).await?;
    assert_eq!(report["released_item"], true);

    let response = app.get("/api/items/SN-400", Some(&admin)).await?;
    let view: Value = read_json(response).await?;
    assert_eq!(view["item"]["status"], "AVAILABLE");
    assert!(view["holder"].is_null());
    Ok(())
}

#[tokio::test]
async fn failed_side_effects_are_listed_for_admins() -> Result<()> {
    let app = TestApp::new().await?;
    let (_, admin) = app.user_with_token("admin", Role::Admin).await?;
    let (_, tech) = app.user_with_token("tech", Role::User).await?;

    app.store.fail_on("insert_activity");
    register_item(&app, &admin, "SN-500").await?;
    app.store.clear_failures();

    let response = app.get("/api/admin/effect-failures", Some(&tech)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.get("/api/admin/effect-failures", Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let failures: Vec<Value> = read_json(response).await?;
    assert_eq!(failures.len(), 1);
    assert!(failures[0]["effect"]
        .as_str()
        .is_some_and(|effect| effect.contains("item.registered")));
    Ok(())
}
