use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    PendingVerification,
    Verified,
    Rejected,
}

impl DonationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DonationStatus::PendingVerification => "pending_verification",
            DonationStatus::Verified => "verified",
            DonationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_verification" => Some(DonationStatus::PendingVerification),
            "verified" => Some(DonationStatus::Verified),
            "rejected" => Some(DonationStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptProcessingStatus {
    NotProcessed,
    Processing,
    Completed,
}

impl ReceiptProcessingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReceiptProcessingStatus::NotProcessed => "not_processed",
            ReceiptProcessingStatus::Processing => "processing",
            ReceiptProcessingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_processed" => Some(ReceiptProcessingStatus::NotProcessed),
            "processing" => Some(ReceiptProcessingStatus::Processing),
            "completed" => Some(ReceiptProcessingStatus::Completed),
            _ => None,
        }
    }
}

/// A donation record: the submitter's claimed fields, whatever the vision
/// model extracted from the receipt, and the derived verification state.
/// Never physically deleted; status transitions only.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Donation {
    pub id: String,
    pub donor_name: String,
    pub phone: Option<String>,
    pub amount: f64,
    pub transaction_id: String,
    pub message: Option<String>,
    pub receipt_url: Option<String>,
    pub sender_name: Option<String>,
    pub sender_phone: Option<String>,
    pub source_account: Option<String>,
    pub source_upi_id: Option<String>,
    pub recipient_name: Option<String>,
    pub destination_upi_id: Option<String>,
    pub payment_status: Option<String>,
    pub payment_time: Option<String>,
    pub payment_method: Option<String>,
    pub confidence: Option<f64>,
    pub extraction_notes: Option<String>,
    pub extraction_degraded: bool,
    pub status: DonationStatus,
    pub receipt_processing_status: ReceiptProcessingStatus,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DonationStats {
    pub total: i64,
    pub verified: i64,
    pub pending: i64,
    pub total_amount_verified: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuditLog {
    pub id: String,
    pub actor: String,
    pub action: String,
    pub table_name: String,
    pub record_id: Option<String>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}
