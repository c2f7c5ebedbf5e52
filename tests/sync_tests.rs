mod support;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{DateTime, Datelike, Duration, SecondsFormat, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use support::TestApp;

fn bundle(report_id: Uuid, updated_at: &str, summary: &str) -> Value {
    json!({
        "report": {
            "id": report_id,
            "propertyAddress": "14 Pohutukawa Drive, Tauranga",
            "clientName": "Bay Property Ltd",
            "executiveSummary": summary,
            "inspectionDate": "2025-02-11",
            "inspectionType": "PRE_PURCHASE",
            "updatedAt": updated_at
        },
        "roofElements": [
            { "id": Uuid::new_v4(), "elementType": "GUTTER", "location": "Rear" }
        ],
        "defects": []
    })
}

async fn upload(app: &TestApp, user: Uuid, bundles: Vec<Value>) -> Result<Value> {
    let response = app
        .post(
            "/api/sync/upload",
            user,
            json!({ "deviceId": "ipad-7", "reports": bundles }),
        )
        .await?;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
    Ok(response.json())
}

#[tokio::test]
async fn upload_creates_then_pull_returns_bundle() -> Result<()> {
    let app = TestApp::new()?;
    let admin = app.bootstrap_admin().await?;
    let ivy = app.add_user(admin, "ivy@example.nz", "INSPECTOR").await?;
    let report_id = Uuid::new_v4();

    let body = upload(&app, ivy, vec![bundle(report_id, "2020-01-01T09:00:00Z", "Offline draft")]).await?;
    assert!(body["serverTime"].is_string());
    assert_eq!(body["results"][0]["reportId"], json!(report_id));
    assert_eq!(body["results"][0]["outcome"], "CREATED");

    let stored = app.get(&format!("/api/reports/{}", report_id), ivy).await?;
    let stored = stored.json();
    assert_eq!(stored["report"]["status"], "DRAFT");
    assert!(stored["report"]["reportNumber"].as_str().unwrap_or("").starts_with("RPT-"));
    assert_eq!(stored["roofElements"].as_array().map(Vec::len), Some(1));

    let pulled = app.get("/api/sync/pull", ivy).await?;
    assert_eq!(pulled.json()["reports"].as_array().map(Vec::len), Some(1));

    // The device's own 2020 stamp is not what pulls filter on
    let old_since = app.get("/api/sync/pull?since=2020-06-01T00:00:00Z", ivy).await?;
    assert_eq!(old_since.json()["reports"].as_array().map(Vec::len), Some(1));

    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let since = pulled.json()["serverTime"].as_str().unwrap_or_default().to_string();
    let later = app.get(&format!("/api/sync/pull?since={since}"), ivy).await?;
    assert_eq!(later.json()["reports"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[tokio::test]
async fn server_edits_win_over_stale_device_copies() -> Result<()> {
    let app = TestApp::new()?;
    let admin = app.bootstrap_admin().await?;
    let ivy = app.add_user(admin, "ivy@example.nz", "INSPECTOR").await?;
    let report_id = Uuid::new_v4();
    upload(&app, ivy, vec![bundle(report_id, "2020-01-01T09:00:00Z", "First")]).await?;

    // Edited in the browser after the device last synced
    let edit = app
        .patch(
            &format!("/api/reports/{}", report_id),
            ivy,
            json!({ "executiveSummary": "Edited on the web" }),
        )
        .await?;
    assert_eq!(edit.status, StatusCode::OK);

    let stale = upload(&app, ivy, vec![bundle(report_id, "2021-01-01T09:00:00Z", "Stale")]).await?;
    let result = &stale["results"][0];
    assert_eq!(result["outcome"], "CONFLICT");
    assert_eq!(result["server"]["report"]["executiveSummary"], "Edited on the web");

    let fresh = upload(&app, ivy, vec![bundle(report_id, "2999-01-01T00:00:00Z", "From device")]).await?;
    assert_eq!(fresh["results"][0]["outcome"], "UPDATED");

    let stored = app.get(&format!("/api/reports/{}", report_id), ivy).await?.json();
    assert_eq!(stored["report"]["executiveSummary"], "From device");
    assert_eq!(stored["report"]["status"], "IN_PROGRESS");
    // Children were replaced by the device copy
    assert_eq!(stored["roofElements"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn other_inspectors_reports_are_rejected() -> Result<()> {
    let app = TestApp::new()?;
    let admin = app.bootstrap_admin().await?;
    let ivy = app.add_user(admin, "ivy@example.nz", "INSPECTOR").await?;
    let sam = app.add_user(admin, "sam@example.nz", "INSPECTOR").await?;
    let report_id = Uuid::new_v4();
    upload(&app, ivy, vec![bundle(report_id, "2020-01-01T09:00:00Z", "Ivy's")]).await?;

    let hijack = upload(&app, sam, vec![bundle(report_id, "2999-01-01T00:00:00Z", "Sam's")]).await?;
    assert_eq!(hijack["results"][0]["outcome"], "REJECTED");
    assert!(hijack["results"][0]["message"].is_string());

    let pulled = app.get("/api/sync/pull", sam).await?;
    assert_eq!(pulled.json()["reports"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[tokio::test]
async fn malformed_uploads_fail_schema_check() -> Result<()> {
    let app = TestApp::new()?;
    let admin = app.bootstrap_admin().await?;

    let response = app
        .post(
            "/api/sync/upload",
            admin,
            json!({ "deviceId": "ipad-7", "reports": [ { "report": { "id": "not-a-uuid" } } ] }),
        )
        .await?;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["error"], "validation_failed");
    assert!(!response.json()["issues"].as_array().map_or(true, Vec::is_empty));

    let no_device = app
        .post("/api/sync/upload", admin, json!({ "reports": [] }))
        .await?;
    assert_eq!(no_device.status, StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn late_uploads_of_old_edits_reach_other_devices() -> Result<()> {
    let app = TestApp::new()?;
    let admin = app.bootstrap_admin().await?;
    let ivy = app.add_user(admin, "ivy@example.nz", "INSPECTOR").await?;
    let rex = app.add_user(admin, "rex@example.nz", "REVIEWER").await?;

    let first = app.get("/api/sync/pull", rex).await?.json();
    let server_time: DateTime<Utc> = serde_json::from_value(first["serverTime"].clone())?;

    // Edited offline ten minutes before the reviewer synced
    let report_id = Uuid::new_v4();
    let offline = (server_time - Duration::minutes(10)).to_rfc3339();
    let body = upload(&app, ivy, vec![bundle(report_id, &offline, "Offline edit")]).await?;
    assert_eq!(body["results"][0]["outcome"], "CREATED");
    assert_eq!(body["results"][0]["updatedAt"], body["serverTime"]);

    let since = server_time.to_rfc3339_opts(SecondsFormat::Micros, true);
    let pulled = app.get(&format!("/api/sync/pull?since={since}"), rex).await?.json();
    let reports = pulled["reports"].as_array().cloned().unwrap_or_default();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["report"]["id"], json!(report_id));
    assert_eq!(reports[0]["report"]["executiveSummary"], "Offline edit");
    Ok(())
}

#[tokio::test]
async fn device_report_numbers_follow_the_numbering_scheme() -> Result<()> {
    let app = TestApp::new()?;
    let admin = app.bootstrap_admin().await?;
    let ivy = app.add_user(admin, "ivy@example.nz", "INSPECTOR").await?;
    let year = Utc::now().year();

    let mut free_text = bundle(Uuid::new_v4(), "2020-01-01T09:00:00Z", "Free text number");
    free_text["report"]["reportNumber"] = json!("my \"report\"");
    let response = app
        .post(
            "/api/sync/upload",
            ivy,
            json!({ "deviceId": "ipad-7", "reports": [free_text] }),
        )
        .await?;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);

    let report_id = Uuid::new_v4();
    let mut runaway = bundle(report_id, "2020-01-01T09:00:00Z", "Runaway number");
    runaway["report"]["reportNumber"] = json!(format!("RPT-{year}-9999"));
    let body = upload(&app, ivy, vec![runaway]).await?;
    assert_eq!(body["results"][0]["outcome"], "CREATED");

    let stored = app.get(&format!("/api/reports/{report_id}"), ivy).await?.json();
    assert_eq!(stored["report"]["reportNumber"], format!("RPT-{year}-0001"));

    let next = app.create_report(ivy, "3 Kauri Lane, Whangarei").await?;
    assert_eq!(next["reportNumber"], format!("RPT-{year}-0002"));
    Ok(())
}
