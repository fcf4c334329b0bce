use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::VisionConfig;
use crate::normalize::AmountValue;

/// The prompt sent with every receipt image. The model must answer with a
/// single JSON object matching `ReceiptFields`.
const EXTRACTION_PROMPT: &str = r#"You are a payment receipt extraction assistant.
Given a screenshot of a completed UPI payment confirmation screen, extract structured data and return ONLY valid JSON.

The JSON must match this schema exactly:
{
  "sender_name": "string or null",
  "sender_phone": "string or null",
  "source_account": "string or null (bank/account label shown for the payer)",
  "source_upi_id": "string or null (payer UPI id, name@bank format)",
  "recipient_name": "string or null",
  "destination_upi_id": "string or null (payee UPI id, name@bank format)",
  "amount": "number or string or null (as printed, currency symbols allowed)",
  "payment_status": "string or null (e.g. Completed, Success, Failed)",
  "payment_time": "string or null (the timestamp text as printed)",
  "payment_method": "string or null (e.g. UPI, the app name)",
  "transaction_id": "string or null (UPI transaction/reference id)",
  "confidence": "number between 0 and 1 estimating your own accuracy",
  "notes": "string or null (anything ambiguous or unreadable)"
}

Notes:
- Screenshots vary across UPI apps; do your best with partial layouts.
- Use null for fields you cannot determine.
- Return ONLY the JSON object, no markdown fences, no commentary."#;

/// Structured fields extracted from a receipt screenshot. `amount` stays
/// heterogeneous (string or number) for the normalizer to coerce.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptFields {
    pub sender_name: Option<String>,
    pub sender_phone: Option<String>,
    pub source_account: Option<String>,
    pub source_upi_id: Option<String>,
    pub recipient_name: Option<String>,
    pub destination_upi_id: Option<String>,
    pub amount: Option<AmountValue>,
    pub payment_status: Option<String>,
    pub payment_time: Option<String>,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub confidence: Option<f32>,
    pub notes: Option<String>,
    /// True iff these fields came from the quota-outage placeholder rather
    /// than a genuine model extraction. Admins reviewing pending entries
    /// must be able to see this.
    #[serde(default)]
    pub degraded: bool,
}

impl ReceiptFields {
    /// Placeholder returned when the vision service is rate limited. Zero
    /// confidence, clearly flagged; routes a submission to manual review
    /// and must never lead to an auto-verified record.
    pub fn degraded() -> Self {
        ReceiptFields {
            confidence: Some(0.0),
            notes: Some(
                "Extraction service unavailable (quota); fields require manual review".to_string(),
            ),
            degraded: true,
            ..ReceiptFields::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("vision service error: {0}")]
    Service(String),

    #[error("unparseable vision response: {0}")]
    InvalidResponse(String),
}

/// Port over the external vision service so tests can substitute canned
/// responses. The real service is never called from unit tests.
#[async_trait]
pub trait ReceiptExtractor: Send + Sync {
    async fn extract(&self, image: &[u8], mime_type: &str) -> Result<ReceiptFields, ExtractError>;
}

#[derive(Debug, Serialize)]
struct VisionRequest<'a> {
    prompt: &'a str,
    #[serde(rename = "imageData")]
    image_data: String,
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct VisionResponse {
    data: String,
}

/// Calls the configured vision endpoint with the fixed extraction prompt.
pub struct HttpVisionExtractor {
    client: reqwest::Client,
    cfg: VisionConfig,
}

impl HttpVisionExtractor {
    pub fn new(client: reqwest::Client, cfg: VisionConfig) -> Self {
        HttpVisionExtractor { client, cfg }
    }

    async fn call_service(&self, image: &[u8], mime_type: &str) -> Result<String, String> {
        let request = VisionRequest {
            prompt: EXTRACTION_PROMPT,
            image_data: base64::engine::general_purpose::STANDARD.encode(image),
            mime_type,
        };

        let mut builder = self.client.post(&self.cfg.api_url).json(&request);
        if let Some(key) = &self.cfg.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("vision API error {status}: {body}"));
        }

        let parsed: VisionResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid vision API envelope: {e}"))?;
        Ok(parsed.data)
    }
}

#[async_trait]
impl ReceiptExtractor for HttpVisionExtractor {
    async fn extract(&self, image: &[u8], mime_type: &str) -> Result<ReceiptFields, ExtractError> {
        match self.call_service(image, mime_type).await {
            Ok(text) => parse_receipt_text(&text),
            Err(message) if is_quota_error(&message) => {
                warn!(error = %message, "Vision service quota exhausted, returning degraded result");
                Ok(ReceiptFields::degraded())
            }
            Err(message) => Err(ExtractError::Service(message)),
        }
    }
}

/// Quota/rate-limit failures are distinguished from other failures by
/// message pattern; everything else surfaces to the operator unchanged.
pub fn is_quota_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("429") || lower.contains("quota") || lower.contains("rate limit")
}

/// Parse the model's free-text answer into `ReceiptFields`.
///
/// Models may wrap the object in markdown fences or prose, so the first
/// `{` ... last `}` substring is tried first; the whole text is only parsed
/// as-is when no braces are present.
pub fn parse_receipt_text(raw: &str) -> Result<ReceiptFields, ExtractError> {
    let stripped = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let candidate = match (stripped.find('{'), stripped.rfind('}')) {
        (Some(start), Some(end)) if end > start => &stripped[start..=end],
        _ => stripped,
    };

    let mut fields: ReceiptFields = serde_json::from_str(candidate)
        .map_err(|e| ExtractError::InvalidResponse(format!("{e}; raw: {candidate}")))?;

    fields.confidence = fields.confidence.map(|c| c.clamp(0.0, 1.0));
    Ok(fields)
}
