use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson},
};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;

use crate::db::models::ReceiptProcessingStatus;
use crate::error::SubmitError;
use crate::normalize::{normalize_date, TimestampValue};
use crate::{db, AppState};

/// Decode a base64 receipt image, tolerating data-URL prefixes
/// ("data:image/png;base64,...") that browser clients tend to send.
pub(crate) fn decode_image_payload(data: &str) -> Result<Vec<u8>, SubmitError> {
    let encoded = match data.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| SubmitError::Validation("Receipt image is not valid base64".to_string()))
}

#[derive(Deserialize)]
pub struct ExtractRequest {
    pub data: String,
    pub mime_type: String,
}

/// Extraction preview for the submission form: runs the vision model and
/// returns the fields plus a high-confidence label so the client can decide
/// whether to auto-fill. Nothing is persisted.
pub async fn extract_preview(
    State(state): State<AppState>,
    Json(req): Json<ExtractRequest>,
) -> Result<impl IntoResponse, SubmitError> {
    let bytes = decode_image_payload(&req.data)?;
    let fields = state
        .extractor
        .extract(&bytes, &req.mime_type)
        .await
        .map_err(|e| SubmitError::Extraction(e.to_string()))?;

    let high_confidence = !fields.degraded
        && fields.confidence.unwrap_or(0.0) >= state.cfg.high_confidence_threshold;

    // The model echoes the timestamp as printed on the screenshot; hand the
    // client a comparable instant too when that text is parseable.
    let payment_time = fields.payment_time.clone().map(TimestampValue::Iso);
    let payment_time_normalized = normalize_date(payment_time.as_ref());

    Ok(AxumJson(json!({
        "fields": fields,
        "high_confidence": high_confidence,
        "degraded": fields.degraded,
        "payment_time_normalized": payment_time_normalized,
    })))
}

/// Admin re-extraction: fetch the stored receipt and run the vision model
/// again, e.g. after an outage left a record with degraded placeholder data.
/// Does not touch the verification status; that stays an explicit admin call.
pub async fn reextract_receipt(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, SubmitError> {
    let Some(donation) = db::get_donation(&state.db, &id).await? else {
        return Ok((StatusCode::NOT_FOUND, "Not found").into_response());
    };
    let Some(receipt_url) = donation.receipt_url.clone() else {
        return Err(SubmitError::Validation(
            "Donation has no stored receipt to re-process".to_string(),
        ));
    };

    let previous = donation.receipt_processing_status;
    db::set_processing_status(&state.db, &id, ReceiptProcessingStatus::Processing).await?;

    let fetched = fetch_receipt(&state, &receipt_url).await;
    let (bytes, mime_type) = match fetched {
        Ok(pair) => pair,
        Err(message) => {
            let _ = db::set_processing_status(&state.db, &id, previous).await;
            return Err(SubmitError::Extraction(message));
        }
    };

    let fields = match state.extractor.extract(&bytes, &mime_type).await {
        Ok(fields) => fields,
        Err(e) => {
            let _ = db::set_processing_status(&state.db, &id, previous).await;
            return Err(SubmitError::Extraction(e.to_string()));
        }
    };

    db::set_extraction(&state.db, &id, &fields, ReceiptProcessingStatus::Completed).await?;

    let _ = db::log_audit(
        &state.db,
        "admin",
        "reextract",
        "donations",
        Some(&id),
        Some(&format!(
            "confidence={:.2} degraded={}",
            fields.confidence.unwrap_or(0.0),
            fields.degraded
        )),
    )
    .await;

    Ok(AxumJson(json!({ "id": id, "fields": fields })).into_response())
}

async fn fetch_receipt(state: &AppState, url: &str) -> Result<(Vec<u8>, String), String> {
    let response = state
        .http
        .get(url)
        .send()
        .await
        .map_err(|e| format!("failed to fetch receipt: {e}"))?;
    if !response.status().is_success() {
        return Err(format!("failed to fetch receipt: {}", response.status()));
    }

    let mime_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| format!("failed to read receipt bytes: {e}"))?;

    Ok((bytes.to_vec(), mime_type))
}
