//! Breached-password lookup with k-anonymity.
//!
//! Only the first five hex characters of the SHA-1 digest leave the process;
//! the range response is matched locally.

use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::time::Duration;

const PREFIX_LEN: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordCheckRequest {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordCheckResponse {
    pub breached: bool,
    pub count: u64,
}

/// Upper-case hex SHA-1 split into (prefix, suffix).
pub fn hash_parts(password: &str) -> (String, String) {
    let digest = hex::encode_upper(Sha1::digest(password.as_bytes()));
    let (prefix, suffix) = digest.split_at(PREFIX_LEN);
    (prefix.to_string(), suffix.to_string())
}

/// Finds `suffix` in a `SUFFIX:COUNT` per line range body. Padding entries have count 0.
pub fn breach_count(range_body: &str, suffix: &str) -> u64 {
    range_body
        .lines()
        .filter_map(|line| line.trim().split_once(':'))
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(suffix))
        .and_then(|(_, count)| count.trim().parse().ok())
        .unwrap_or(0)
}

#[derive(Clone)]
pub struct PasswordChecker {
    client: reqwest::Client,
    base_url: String,
}

impl PasswordChecker {
    pub fn new(base_url: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent("consult-portal-api")
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create password client: {}", e))
            })?;
        Ok(Self { client, base_url })
    }

    async fn lookup(&self, prefix: &str) -> Result<String, AppError> {
        let url = format!("{}/range/{}", self.base_url, prefix);
        let response = self
            .client
            .get(&url)
            .header("Add-Padding", "true")
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Range request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalApiError(format!(
                "Range lookup returned {}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Failed to read range body: {}", e)))
    }

    /// Never fails: an unreachable range API reports "not breached".
    pub async fn check(&self, password: &str) -> PasswordCheckResponse {
        let (prefix, suffix) = hash_parts(password);
        match self.lookup(&prefix).await {
            Ok(body) => {
                let count = breach_count(&body, &suffix);
                if count > 0 {
                    tracing::info!("Password found in {} breaches", count);
                }
                PasswordCheckResponse {
                    breached: count > 0,
                    count,
                }
            }
            Err(e) => {
                tracing::warn!("Breached-password lookup unavailable: {}", e);
                PasswordCheckResponse {
                    breached: false,
                    count: 0,
                }
            }
        }
    }
}
