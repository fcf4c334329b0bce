use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::db::models::DonationStatus;
use crate::db::{self, DbPool};

/// Outcome of the verification decision for one submission.
#[derive(Debug, Clone)]
pub struct Decision {
    pub status: DonationStatus,
    pub is_duplicate: bool,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Decides the acceptance state of a submission: duplicate detection by
/// transaction id, then recipient-identity matching against the configured
/// UPI id. There is no automatic rejected path; `rejected` is only reachable
/// through explicit admin action after persistence.
#[derive(Clone)]
pub struct Decider {
    cfg: Arc<Config>,
}

impl Decider {
    pub fn new(cfg: Arc<Config>) -> Self {
        Decider { cfg }
    }

    /// Case-insensitive comparison against the NGO's configured UPI id.
    pub fn matches_recipient(&self, candidate: &str) -> bool {
        candidate
            .trim()
            .eq_ignore_ascii_case(self.cfg.expected_upi_id.trim())
    }

    /// Duplicate transaction ids short-circuit: the caller must reject the
    /// submission without creating a record. Otherwise an extracted
    /// destination UPI id matching the configured recipient auto-verifies;
    /// anything else (mismatch, or manual entry with no receipt at all)
    /// goes to pending manual review.
    pub async fn decide(
        &self,
        pool: &DbPool,
        transaction_id: &str,
        destination_upi_id: Option<&str>,
    ) -> anyhow::Result<Decision> {
        if db::find_by_transaction_id(pool, transaction_id)
            .await?
            .is_some()
        {
            return Ok(Decision {
                status: DonationStatus::PendingVerification,
                is_duplicate: true,
                verified_at: None,
            });
        }

        match destination_upi_id {
            Some(upi) if self.matches_recipient(upi) => Ok(Decision {
                status: DonationStatus::Verified,
                is_duplicate: false,
                verified_at: Some(Utc::now()),
            }),
            _ => Ok(Decision {
                status: DonationStatus::PendingVerification,
                is_duplicate: false,
                verified_at: None,
            }),
        }
    }
}
