use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::models::{Donation, DonationStatus, ReceiptProcessingStatus};
use crate::error::SubmitError;
use crate::extract::ReceiptFields;
use crate::normalize::{normalize_amount, AmountValue};
use crate::routes::receipts::decode_image_payload;
use crate::{db, AppState};

const MAX_MESSAGE_LEN: usize = 500;

#[derive(Deserialize)]
pub struct ReceiptImage {
    pub data: String,
    pub mime_type: String,
}

#[derive(Deserialize)]
pub struct SubmitDonationRequest {
    pub donor_name: String,
    pub phone: Option<String>,
    pub amount: Option<AmountValue>,
    pub transaction_id: Option<String>,
    pub message: Option<String>,
    pub receipt_image: Option<ReceiptImage>,
    /// Opaque reference returned by the upload endpoint; stored as-is.
    pub receipt_url: Option<String>,
}

pub async fn submit_donation(
    State(state): State<AppState>,
    Json(req): Json<SubmitDonationRequest>,
) -> Result<impl IntoResponse, SubmitError> {
    let donor_name = req.donor_name.trim().to_string();
    if donor_name.is_empty() {
        return Err(SubmitError::Validation("Donor name is required".to_string()));
    }

    let amount = normalize_amount(req.amount.as_ref());
    if amount <= 0.0 {
        return Err(SubmitError::Validation(
            "A positive donation amount is required".to_string(),
        ));
    }

    let transaction_id = req
        .transaction_id
        .as_deref()
        .map(str::trim)
        .unwrap_or("")
        .to_string();
    if transaction_id.is_empty() {
        return Err(SubmitError::Validation(
            "UPI transaction id is required".to_string(),
        ));
    }

    if let Some(message) = &req.message {
        if message.chars().count() > MAX_MESSAGE_LEN {
            return Err(SubmitError::Validation(format!(
                "Message must be at most {} characters",
                MAX_MESSAGE_LEN
            )));
        }
    }

    // Run extraction before the decision: the decider needs the destination
    // UPI id the model read off the screenshot. Quota outages come back as a
    // flagged degraded result; any other extraction failure aborts the
    // submission with nothing persisted.
    let extracted: Option<ReceiptFields> = match &req.receipt_image {
        Some(image) => {
            let bytes = decode_image_payload(&image.data)?;
            let fields = state
                .extractor
                .extract(&bytes, &image.mime_type)
                .await
                .map_err(|e| SubmitError::Extraction(e.to_string()))?;
            Some(fields)
        }
        None => None,
    };

    let destination_upi_id = extracted
        .as_ref()
        .and_then(|f| f.destination_upi_id.as_deref());
    let decision = state
        .decider
        .decide(&state.db, &transaction_id, destination_upi_id)
        .await?;
    if decision.is_duplicate {
        return Err(SubmitError::DuplicateTransaction(transaction_id));
    }

    let now = Utc::now();
    let fields = extracted.as_ref();
    let donation = Donation {
        id: Uuid::new_v4().to_string(),
        donor_name,
        phone: req.phone.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from),
        amount,
        transaction_id: transaction_id.clone(),
        message: req.message.clone().filter(|m| !m.trim().is_empty()),
        receipt_url: req.receipt_url.clone(),
        sender_name: fields.and_then(|f| f.sender_name.clone()),
        sender_phone: fields.and_then(|f| f.sender_phone.clone()),
        source_account: fields.and_then(|f| f.source_account.clone()),
        source_upi_id: fields.and_then(|f| f.source_upi_id.clone()),
        recipient_name: fields.and_then(|f| f.recipient_name.clone()),
        destination_upi_id: fields.and_then(|f| f.destination_upi_id.clone()),
        payment_status: fields.and_then(|f| f.payment_status.clone()),
        payment_time: fields.and_then(|f| f.payment_time.clone()),
        payment_method: fields.and_then(|f| f.payment_method.clone()),
        confidence: fields.and_then(|f| f.confidence).map(f64::from),
        extraction_notes: fields.and_then(|f| f.notes.clone()),
        extraction_degraded: fields.map(|f| f.degraded).unwrap_or(false),
        status: decision.status,
        receipt_processing_status: if extracted.is_some() {
            ReceiptProcessingStatus::Completed
        } else {
            ReceiptProcessingStatus::NotProcessed
        },
        verified_at: decision.verified_at,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = db::insert_donation(&state.db, &donation).await {
        // Two racing submissions can both pass the duplicate pre-check; the
        // UNIQUE constraint catches the loser here.
        if db::is_unique_violation(&e) {
            return Err(SubmitError::DuplicateTransaction(transaction_id));
        }
        return Err(e.into());
    }

    let _ = db::log_audit(
        &state.db,
        "public",
        "submit",
        "donations",
        Some(&donation.id),
        Some(&format!(
            "txn={} status={}",
            donation.transaction_id,
            donation.status.as_str()
        )),
    )
    .await;

    state.notifier.donation_created(&donation);

    Ok((
        StatusCode::CREATED,
        AxumJson(json!({
            "id": donation.id,
            "status": donation.status,
            "receipt_processing_status": donation.receipt_processing_status,
            "extraction_degraded": donation.extraction_degraded,
        })),
    ))
}

#[derive(Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

pub async fn list_donations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, SubmitError> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(DonationStatus::parse(raw).ok_or_else(|| {
            SubmitError::Validation(format!("Unknown status filter: {}", raw))
        })?),
        None => None,
    };

    let donations = db::list_donations(&state.db, status).await?;
    Ok(AxumJson(json!({ "donations": donations })))
}

/// Public transparency aggregate: totals by status and the verified sum.
pub async fn donation_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, SubmitError> {
    let stats = db::donation_stats(&state.db).await?;
    Ok(AxumJson(stats))
}

/// Public donor showcase. Verified donations only; claimed-but-unreviewed
/// entries never appear here.
pub async fn list_donors(State(state): State<AppState>) -> Result<impl IntoResponse, SubmitError> {
    let donations = db::list_verified(&state.db).await?;
    let donors: Vec<_> = donations
        .into_iter()
        .map(|d| {
            json!({
                "name": d.donor_name,
                "amount": d.amount,
                "message": d.message,
                "date": d.verified_at.unwrap_or(d.created_at),
            })
        })
        .collect();
    Ok(AxumJson(json!({ "donors": donors })))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DonationStatus,
}

pub async fn update_status(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, SubmitError> {
    let verified_at = match req.status {
        DonationStatus::Verified => Some(Utc::now()),
        _ => None,
    };

    let updated = db::update_status(&state.db, &id, req.status, verified_at).await?;
    if !updated {
        return Ok((StatusCode::NOT_FOUND, "Not found").into_response());
    }

    let _ = db::log_audit(
        &state.db,
        "admin",
        "status_change",
        "donations",
        Some(&id),
        Some(&format!("status={}", req.status.as_str())),
    )
    .await;

    let donation = db::get_donation(&state.db, &id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("donation {} vanished after update", id))?;
    Ok(AxumJson(json!({ "donation": donation })).into_response())
}
