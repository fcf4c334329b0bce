use std::env;

/// Single confidence threshold for labeling an extraction "high confidence".
/// The same value gates client-side auto-fill and reporting.
pub const DEFAULT_HIGH_CONFIDENCE_THRESHOLD: f32 = 0.8;

const DEFAULT_DATABASE_PATH: &str = "data/donations.db";

/// Runtime configuration, read from the environment once at startup and
/// injected into the components that need it. Handlers never touch env vars.
#[derive(Debug, Clone)]
pub struct Config {
    /// The NGO's authoritative receiving UPI id. Extracted destination ids
    /// are compared against this (case-insensitively) to auto-verify.
    pub expected_upi_id: String,
    pub high_confidence_threshold: f32,
    pub vision: VisionConfig,
    /// Webhook that receives a summary of each accepted donation. Absent
    /// means notifications are disabled.
    pub notify_webhook_url: Option<String>,
    /// Bearer token required on /api/admin routes.
    pub admin_token: String,
    pub database_path: String,
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_url: String,
    pub api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let expected_upi_id = require("NGO_UPI_ID")?;
        let admin_token = require("ADMIN_API_TOKEN")?;
        let api_url = require("VISION_API_URL")?;

        let high_confidence_threshold = env::var("HIGH_CONFIDENCE_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(DEFAULT_HIGH_CONFIDENCE_THRESHOLD)
            .clamp(0.0, 1.0);

        Ok(Config {
            expected_upi_id,
            high_confidence_threshold,
            vision: VisionConfig {
                api_url,
                api_key: env::var("VISION_API_KEY").ok().filter(|v| !v.is_empty()),
            },
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            admin_token,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string()),
        })
    }
}

fn require(name: &str) -> anyhow::Result<String> {
    let value = env::var(name).map_err(|_| anyhow::anyhow!("{} must be set", name))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} must not be empty", name);
    }
    Ok(value)
}
