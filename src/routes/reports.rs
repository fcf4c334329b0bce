use axum::{
    extract::{Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};

use crate::error::SubmitError;
use crate::normalize::{normalize_date, TimestampValue};
use crate::{db, AppState};

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        let escaped = s.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    } else {
        s.to_string()
    }
}

fn csv_response(body: String, filename: &'static str) -> Response {
    let mut resp = Response::new(body.into());
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename={}", filename))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );
    resp
}

pub async fn export_donations_csv(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, SubmitError> {
    let donations = db::list_donations(&state.db, None).await?;

    let mut w = String::new();
    w.push_str(
        "id,created_at,donor_name,phone,amount,transaction_id,status,verified_at,destination_upi_id,confidence,extraction_degraded\n",
    );
    for d in donations {
        let verified_at = d.verified_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        let confidence = d
            .confidence
            .map(|c| format!("{:.2}", c))
            .unwrap_or_default();
        w.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{}\n",
            csv_escape(&d.id),
            csv_escape(&d.created_at.to_rfc3339()),
            csv_escape(&d.donor_name),
            csv_escape(&d.phone.unwrap_or_default()),
            format!("{:.2}", d.amount),
            csv_escape(&d.transaction_id),
            d.status.as_str(),
            csv_escape(&verified_at),
            csv_escape(&d.destination_upi_id.unwrap_or_default()),
            confidence,
            d.extraction_degraded,
        ));
    }

    Ok(csv_response(w, "donations.csv"))
}

#[derive(serde::Deserialize)]
pub struct AuditExportParams {
    pub since: Option<String>,
}

pub async fn export_audit_csv(
    State(state): State<AppState>,
    Query(params): Query<AuditExportParams>,
) -> Result<impl IntoResponse, SubmitError> {
    let since = params.since.clone().map(TimestampValue::Iso);
    let since = normalize_date(since.as_ref());

    let logs = db::list_audit_logs(&state.db, since).await?;

    let mut w = String::new();
    w.push_str("id,actor,action,table_name,record_id,details,created_at\n");
    for a in logs {
        w.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            csv_escape(&a.id),
            csv_escape(&a.actor),
            csv_escape(&a.action),
            csv_escape(&a.table_name),
            csv_escape(&a.record_id.unwrap_or_default()),
            csv_escape(&a.details.unwrap_or_default()),
            csv_escape(&a.created_at.to_rfc3339()),
        ));
    }

    Ok(csv_response(w, "audit_logs.csv"))
}
