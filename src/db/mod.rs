use anyhow::Context;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use uuid::Uuid;

use crate::extract::ReceiptFields;

pub mod models;

use models::{AuditLog, Donation, DonationStats, DonationStatus, ReceiptProcessingStatus};

pub type DbPool = Pool<SqliteConnectionManager>;

const SCHEMA: &str = include_str!("../../migrations/init.sql");

pub async fn init_pool(path: &str) -> anyhow::Result<DbPool> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory for {}", path))?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
    });
    let pool = Pool::builder()
        .max_size(10)
        .connection_timeout(std::time::Duration::from_secs(30))
        .build(manager)
        .map_err(|e| anyhow::anyhow!("Failed to create DB pool: {}", e))?;

    Ok(pool)
}

/// Apply the embedded schema. Idempotent; called at startup and from tests.
pub async fn ensure_schema(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;
    conn.execute_batch(SCHEMA).context("applying schema")?;
    Ok(())
}

fn donation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Donation> {
    let status: String = row.get("status")?;
    let processing: String = row.get("receipt_processing_status")?;
    Ok(Donation {
        id: row.get("id")?,
        donor_name: row.get("donor_name")?,
        phone: row.get("phone")?,
        amount: row.get("amount")?,
        transaction_id: row.get("transaction_id")?,
        message: row.get("message")?,
        receipt_url: row.get("receipt_url")?,
        sender_name: row.get("sender_name")?,
        sender_phone: row.get("sender_phone")?,
        source_account: row.get("source_account")?,
        source_upi_id: row.get("source_upi_id")?,
        recipient_name: row.get("recipient_name")?,
        destination_upi_id: row.get("destination_upi_id")?,
        payment_status: row.get("payment_status")?,
        payment_time: row.get("payment_time")?,
        payment_method: row.get("payment_method")?,
        confidence: row.get("confidence")?,
        extraction_notes: row.get("extraction_notes")?,
        extraction_degraded: row.get("extraction_degraded")?,
        status: DonationStatus::parse(&status).unwrap_or(DonationStatus::PendingVerification),
        receipt_processing_status: ReceiptProcessingStatus::parse(&processing)
            .unwrap_or(ReceiptProcessingStatus::NotProcessed),
        verified_at: row.get("verified_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub async fn insert_donation(pool: &DbPool, d: &Donation) -> anyhow::Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO donations (
            id, donor_name, phone, amount, transaction_id, message, receipt_url,
            sender_name, sender_phone, source_account, source_upi_id, recipient_name,
            destination_upi_id, payment_status, payment_time, payment_method,
            confidence, extraction_notes, extraction_degraded, status,
            receipt_processing_status, verified_at, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
        params![
            d.id,
            d.donor_name,
            d.phone,
            d.amount,
            d.transaction_id,
            d.message,
            d.receipt_url,
            d.sender_name,
            d.sender_phone,
            d.source_account,
            d.source_upi_id,
            d.recipient_name,
            d.destination_upi_id,
            d.payment_status,
            d.payment_time,
            d.payment_method,
            d.confidence,
            d.extraction_notes,
            d.extraction_degraded,
            d.status.as_str(),
            d.receipt_processing_status.as_str(),
            d.verified_at,
            d.created_at,
            d.updated_at,
        ],
    )?;
    Ok(())
}

/// True when the error is the storage-level UNIQUE constraint firing, i.e.
/// two near-simultaneous submissions with the same transaction id both
/// passed the read-then-write duplicate check.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub async fn find_by_transaction_id(
    pool: &DbPool,
    transaction_id: &str,
) -> anyhow::Result<Option<Donation>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT * FROM donations WHERE transaction_id = ?1")?;
    let mut rows = stmt.query_map(params![transaction_id], donation_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub async fn get_donation(pool: &DbPool, id: &str) -> anyhow::Result<Option<Donation>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT * FROM donations WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], donation_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub async fn list_donations(
    pool: &DbPool,
    status: Option<DonationStatus>,
) -> anyhow::Result<Vec<Donation>> {
    let conn = pool.get()?;
    let mut out = Vec::new();
    match status {
        Some(status) => {
            let mut stmt = conn
                .prepare("SELECT * FROM donations WHERE status = ?1 ORDER BY created_at DESC")?;
            let rows = stmt.query_map(params![status.as_str()], donation_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare("SELECT * FROM donations ORDER BY created_at DESC")?;
            let rows = stmt.query_map([], donation_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
    }
    Ok(out)
}

pub async fn list_verified(pool: &DbPool) -> anyhow::Result<Vec<Donation>> {
    list_donations(pool, Some(DonationStatus::Verified)).await
}

/// Admin status transition. Keeps `verified_at` consistent with the target
/// status: set on transition to verified, cleared otherwise.
pub async fn update_status(
    pool: &DbPool,
    id: &str,
    status: DonationStatus,
    verified_at: Option<DateTime<Utc>>,
) -> anyhow::Result<bool> {
    let conn = pool.get()?;
    let changed = conn.execute(
        "UPDATE donations SET status = ?1, verified_at = ?2, updated_at = ?3 WHERE id = ?4",
        params![status.as_str(), verified_at, Utc::now(), id],
    )?;
    Ok(changed > 0)
}

pub async fn set_processing_status(
    pool: &DbPool,
    id: &str,
    processing: ReceiptProcessingStatus,
) -> anyhow::Result<bool> {
    let conn = pool.get()?;
    let changed = conn.execute(
        "UPDATE donations SET receipt_processing_status = ?1, updated_at = ?2 WHERE id = ?3",
        params![processing.as_str(), Utc::now(), id],
    )?;
    Ok(changed > 0)
}

/// Persist extraction results for an existing donation (admin re-extraction).
pub async fn set_extraction(
    pool: &DbPool,
    id: &str,
    fields: &ReceiptFields,
    processing: ReceiptProcessingStatus,
) -> anyhow::Result<bool> {
    let conn = pool.get()?;
    let changed = conn.execute(
        "UPDATE donations SET
            sender_name = ?1, sender_phone = ?2, source_account = ?3, source_upi_id = ?4,
            recipient_name = ?5, destination_upi_id = ?6, payment_status = ?7,
            payment_time = ?8, payment_method = ?9, confidence = ?10,
            extraction_notes = ?11, extraction_degraded = ?12,
            receipt_processing_status = ?13, updated_at = ?14
        WHERE id = ?15",
        params![
            fields.sender_name,
            fields.sender_phone,
            fields.source_account,
            fields.source_upi_id,
            fields.recipient_name,
            fields.destination_upi_id,
            fields.payment_status,
            fields.payment_time,
            fields.payment_method,
            fields.confidence.map(|c| c as f64),
            fields.notes,
            fields.degraded,
            processing.as_str(),
            Utc::now(),
            id,
        ],
    )?;
    Ok(changed > 0)
}

pub async fn donation_stats(pool: &DbPool) -> anyhow::Result<DonationStats> {
    let conn = pool.get()?;
    let stats = conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN status = 'verified' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'pending_verification' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'verified' THEN amount ELSE 0 END), 0.0)
        FROM donations",
        [],
        |row| {
            Ok(DonationStats {
                total: row.get(0)?,
                verified: row.get(1)?,
                pending: row.get(2)?,
                total_amount_verified: row.get(3)?,
            })
        },
    )?;
    Ok(stats)
}

/// Append-only audit trail. Failures here must never fail the operation
/// being audited; callers ignore the result.
pub async fn log_audit(
    pool: &DbPool,
    actor: &str,
    action: &str,
    table_name: &str,
    record_id: Option<&str>,
    details: Option<&str>,
) -> anyhow::Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO audit_logs (id, actor, action, table_name, record_id, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            Uuid::new_v4().to_string(),
            actor,
            action,
            table_name,
            record_id,
            details,
            Utc::now(),
        ],
    )?;
    Ok(())
}

pub async fn list_audit_logs(
    pool: &DbPool,
    since: Option<DateTime<Utc>>,
) -> anyhow::Result<Vec<AuditLog>> {
    let conn = pool.get()?;
    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<AuditLog> {
        Ok(AuditLog {
            id: row.get("id")?,
            actor: row.get("actor")?,
            action: row.get("action")?,
            table_name: row.get("table_name")?,
            record_id: row.get("record_id")?,
            details: row.get("details")?,
            created_at: row.get("created_at")?,
        })
    };

    let mut out = Vec::new();
    match since {
        Some(since) => {
            let mut stmt = conn
                .prepare("SELECT * FROM audit_logs WHERE created_at >= ?1 ORDER BY created_at")?;
            let rows = stmt.query_map(params![since], map_row)?;
            for row in rows {
                out.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare("SELECT * FROM audit_logs ORDER BY created_at")?;
            let rows = stmt.query_map([], map_row)?;
            for row in rows {
                out.push(row?);
            }
        }
    }
    Ok(out)
}
