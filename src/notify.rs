use serde_json::json;
use tracing::warn;

use crate::db::models::Donation;

/// Best-effort webhook dispatch for accepted donations. Failures are logged
/// and swallowed; nothing here can block or roll back a submission.
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(client: reqwest::Client, webhook_url: Option<String>) -> Self {
        Notifier {
            client,
            webhook_url,
        }
    }

    pub fn donation_created(&self, donation: &Donation) {
        let Some(url) = self.webhook_url.clone() else {
            return;
        };

        let payload = json!({
            "event": "donation_created",
            "id": donation.id,
            "donor_name": donation.donor_name,
            "amount": donation.amount,
            "transaction_id": donation.transaction_id,
            "status": donation.status,
            "created_at": donation.created_at,
        });

        let client = self.client.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => {
                    warn!(status = %resp.status(), "Donation notification rejected by webhook");
                }
                Err(e) => {
                    warn!(error = %e, "Donation notification failed");
                }
            }
        });
    }
}
