use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::Engine as _;
use serde_json::{json, Value};
use tower::ServiceExt;

use sahaara_backend::config::{Config, VisionConfig};
use sahaara_backend::db::models::DonationStatus;
use sahaara_backend::db::{self, DbPool};
use sahaara_backend::extract::{
    is_quota_error, parse_receipt_text, ExtractError, ReceiptExtractor, ReceiptFields,
};
use sahaara_backend::notify::Notifier;
use sahaara_backend::verify::Decider;
use sahaara_backend::{api_router, AppState};

const ADMIN_TOKEN: &str = "integration-admin-token";
const NGO_UPI: &str = "mk10092004-1@oksbi";

/// Stands in for the vision service: the "image" bytes are the canned model
/// response itself, so each request scripts exactly what the model answers —
/// including prose-wrapped JSON and outage messages.
struct CannedExtractor;

#[async_trait]
impl ReceiptExtractor for CannedExtractor {
    async fn extract(&self, image: &[u8], _mime_type: &str) -> Result<ReceiptFields, ExtractError> {
        let text = std::str::from_utf8(image).map_err(|e| ExtractError::Service(e.to_string()))?;
        if let Some(message) = text.strip_prefix("ERROR:") {
            if is_quota_error(message) {
                return Ok(ReceiptFields::degraded());
            }
            return Err(ExtractError::Service(message.trim().to_string()));
        }
        parse_receipt_text(text)
    }
}

async fn test_app() -> (Router, DbPool, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("integration.db");
    let pool = db::init_pool(path.to_str().expect("utf-8 path"))
        .await
        .expect("init pool");
    db::ensure_schema(&pool).await.expect("schema");

    let cfg = Arc::new(Config {
        expected_upi_id: NGO_UPI.to_string(),
        high_confidence_threshold: 0.8,
        vision: VisionConfig {
            api_url: "http://localhost:0/unused".to_string(),
            api_key: None,
        },
        notify_webhook_url: None,
        admin_token: ADMIN_TOKEN.to_string(),
        database_path: path.to_string_lossy().into_owned(),
    });

    let http = reqwest::Client::new();
    let state = AppState {
        db: pool.clone(),
        decider: Decider::new(cfg.clone()),
        extractor: Arc::new(CannedExtractor),
        notifier: Notifier::new(http.clone(), None),
        http,
        cfg,
    };

    (api_router(state), pool, dir)
}

fn receipt_image(model_response: &str) -> Value {
    json!({
        "data": base64::engine::general_purpose::STANDARD.encode(model_response),
        "mime_type": "image/png",
    })
}

async fn request_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    bearer: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    request_json(app, "POST", uri, Some(body), None).await
}

#[tokio::test]
async fn end_to_end_submission_scenarios() {
    let (app, pool, _dir) = test_app().await;

    // Scenario A: receipt addressed to the NGO's UPI id auto-verifies.
    let model_a = format!(
        "Here is the extracted data:\n{{\"sender_name\":\"Asha Rao\",\"source_upi_id\":\"asha@okaxis\",\"destination_upi_id\":\"{NGO_UPI}\",\"amount\":\"₹500\",\"payment_status\":\"Completed\",\"transaction_id\":\"TXN-1\",\"confidence\":0.92}}"
    );
    let (status, body) = post(
        &app,
        "/api/donations",
        json!({
            "donor_name": "Asha Rao",
            "phone": "9876543210",
            "amount": "₹500",
            "transaction_id": "TXN-1",
            "message": "For the school program",
            "receipt_image": receipt_image(&model_a),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "scenario A: {body}");
    assert_eq!(body["status"], "verified");
    assert_eq!(body["receipt_processing_status"], "completed");

    let stored = db::find_by_transaction_id(&pool, "TXN-1")
        .await
        .expect("query")
        .expect("record exists");
    assert_eq!(stored.amount, 500.0);
    assert_eq!(stored.status, DonationStatus::Verified);
    assert!(stored.verified_at.is_some());
    assert_eq!(stored.destination_upi_id.as_deref(), Some(NGO_UPI));

    // Scenario B: same transaction id again is rejected as a duplicate and
    // leaves no second record behind.
    let (status, body) = post(
        &app,
        "/api/donations",
        json!({
            "donor_name": "Asha Rao",
            "amount": "₹500",
            "transaction_id": "TXN-1",
            "receipt_image": receipt_image(&model_a),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "scenario B: {body}");
    assert_eq!(body["error"], "duplicate_transaction");

    // Scenario C: mismatched destination UPI id goes to manual review, with
    // Indian digit grouping normalized.
    let model_c = "{\"sender_name\":\"Vikram S\",\"destination_upi_id\":\"someoneelse@upi\",\"amount\":\"₹1,50,000\",\"transaction_id\":\"TXN-2\",\"confidence\":0.85}";
    let (status, body) = post(
        &app,
        "/api/donations",
        json!({
            "donor_name": "Vikram S",
            "amount": "₹1,50,000",
            "transaction_id": "TXN-2",
            "receipt_image": receipt_image(model_c),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "scenario C: {body}");
    assert_eq!(body["status"], "pending_verification");

    let stored = db::find_by_transaction_id(&pool, "TXN-2")
        .await
        .expect("query")
        .expect("record exists");
    assert_eq!(stored.amount, 150000.0);
    assert!(stored.verified_at.is_none());

    // Aggregate stats after A-C: the duplicate never counted.
    let (status, stats) = request_json(&app, "GET", "/api/donations/stats", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["verified"], 1);
    assert_eq!(stats["pending"], 1);
    assert_eq!(stats["total_amount_verified"], 500.0);

    // Donor showcase lists only the verified donation.
    let (status, donors) = request_json(&app, "GET", "/api/donors", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let donors = donors["donors"].as_array().expect("donors array").clone();
    assert_eq!(donors.len(), 1);
    assert_eq!(donors[0]["name"], "Asha Rao");
    assert_eq!(donors[0]["amount"], 500.0);
}

#[tokio::test]
async fn manual_entry_routes_to_pending() {
    let (app, pool, _dir) = test_app().await;

    let (status, body) = post(
        &app,
        "/api/donations",
        json!({
            "donor_name": "Meera K",
            "amount": 1000,
            "transaction_id": "TXN-MANUAL",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "pending_verification");
    assert_eq!(body["receipt_processing_status"], "not_processed");

    let stored = db::find_by_transaction_id(&pool, "TXN-MANUAL")
        .await
        .expect("query")
        .expect("record exists");
    assert!(stored.verified_at.is_none());
    assert!(stored.destination_upi_id.is_none());
}

#[tokio::test]
async fn invalid_submissions_are_rejected_without_persisting() {
    let (app, pool, _dir) = test_app().await;

    // Zero amount
    let (status, body) = post(
        &app,
        "/api/donations",
        json!({"donor_name": "X", "amount": 0, "transaction_id": "TXN-ZERO"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    // Negative amount
    let (status, _) = post(
        &app,
        "/api/donations",
        json!({"donor_name": "X", "amount": -50, "transaction_id": "TXN-NEG"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unparseable amount normalizes to zero
    let (status, _) = post(
        &app,
        "/api/donations",
        json!({"donor_name": "X", "amount": "abc", "transaction_id": "TXN-ABC"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Missing transaction id
    let (status, _) = post(
        &app,
        "/api/donations",
        json!({"donor_name": "X", "amount": 100}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let stats = db::donation_stats(&pool).await.expect("stats");
    assert_eq!(stats.total, 0, "nothing may be persisted");
}

#[tokio::test]
async fn quota_outage_degrades_to_flagged_pending_record() {
    let (app, pool, _dir) = test_app().await;

    let (status, body) = post(
        &app,
        "/api/donations",
        json!({
            "donor_name": "Ravi T",
            "amount": "₹3,000",
            "transaction_id": "TXN-DEGRADED",
            "receipt_image": receipt_image("ERROR: vision API error 429: quota exceeded"),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    // Degraded extraction can never auto-verify.
    assert_eq!(body["status"], "pending_verification");
    assert_eq!(body["extraction_degraded"], true);

    let stored = db::find_by_transaction_id(&pool, "TXN-DEGRADED")
        .await
        .expect("query")
        .expect("record exists");
    assert!(stored.extraction_degraded);
    assert_eq!(stored.amount, 3000.0);
    assert_eq!(stored.confidence, Some(0.0));
    assert_eq!(stored.status, DonationStatus::PendingVerification);
}

#[tokio::test]
async fn non_quota_extraction_failure_aborts_submission() {
    let (app, pool, _dir) = test_app().await;

    let (status, body) = post(
        &app,
        "/api/donations",
        json!({
            "donor_name": "Ravi T",
            "amount": 250,
            "transaction_id": "TXN-FAIL",
            "receipt_image": receipt_image("ERROR: connection refused"),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY, "{body}");
    assert_eq!(body["error"], "extraction_failed");

    assert!(db::find_by_transaction_id(&pool, "TXN-FAIL")
        .await
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn admin_status_updates_keep_verified_at_consistent() {
    let (app, pool, _dir) = test_app().await;

    let (status, body) = post(
        &app,
        "/api/donations",
        json!({"donor_name": "Meera K", "amount": 1000, "transaction_id": "TXN-ADMIN"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().expect("id").to_string();

    // No token -> 401
    let (status, _) = request_json(
        &app,
        "PUT",
        &format!("/api/admin/donations/{id}/status"),
        Some(json!({"status": "verified"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Verify
    let (status, body) = request_json(
        &app,
        "PUT",
        &format!("/api/admin/donations/{id}/status"),
        Some(json!({"status": "verified"})),
        Some(ADMIN_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["donation"]["status"], "verified");
    assert!(!body["donation"]["verified_at"].is_null());

    // Reject clears verified_at again
    let (status, body) = request_json(
        &app,
        "PUT",
        &format!("/api/admin/donations/{id}/status"),
        Some(json!({"status": "rejected"})),
        Some(ADMIN_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["donation"]["status"], "rejected");
    assert!(body["donation"]["verified_at"].is_null());

    let stored = db::get_donation(&pool, &id)
        .await
        .expect("query")
        .expect("record exists");
    assert_eq!(stored.status, DonationStatus::Rejected);
    assert!(stored.verified_at.is_none());

    // The admin actions left an audit trail.
    let logs = db::list_audit_logs(&pool, None).await.expect("audit");
    assert!(logs.iter().any(|l| l.action == "status_change"));
}

#[tokio::test]
async fn extract_preview_labels_confidence() {
    let (app, _pool, _dir) = test_app().await;

    let confident = "{\"destination_upi_id\":\"mk10092004-1@oksbi\",\"amount\":500,\"transaction_id\":\"TXN-9\",\"confidence\":0.93}";
    let (status, body) = post(&app, "/api/receipts/extract", receipt_image(confident)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["high_confidence"], true);
    assert_eq!(body["fields"]["transaction_id"], "TXN-9");

    let shaky = "{\"destination_upi_id\":\"mk10092004-1@oksbi\",\"confidence\":0.4}";
    let (status, body) = post(&app, "/api/receipts/extract", receipt_image(shaky)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["high_confidence"], false);

    let (status, body) = post(
        &app,
        "/api/receipts/extract",
        receipt_image("ERROR: rate limit hit"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["degraded"], true);
    assert_eq!(body["high_confidence"], false);
}

#[tokio::test]
async fn admin_listing_requires_token_and_filters_by_status() {
    let (app, _pool, _dir) = test_app().await;

    let (status, _) = request_json(&app, "GET", "/api/admin/donations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    for (txn, amount) in [("TXN-L1", 100), ("TXN-L2", 200)] {
        let (status, _) = post(
            &app,
            "/api/donations",
            json!({"donor_name": "Donor", "amount": amount, "transaction_id": txn}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = request_json(
        &app,
        "GET",
        "/api/admin/donations?status=pending_verification",
        None,
        Some(ADMIN_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["donations"].as_array().expect("array").len(), 2);

    let (status, body) = request_json(
        &app,
        "GET",
        "/api/admin/donations?status=bogus",
        None,
        Some(ADMIN_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}
