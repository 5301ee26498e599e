use crate::errors::AppError;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const HAL_JSON: &str = "application/vnd.dwolla.v1.hal+json";
const TOKEN_KEY: &str = "access_token";

/// Sandbox micro-deposit amounts; the sandbox accepts these as the "received" deposits.
pub const SANDBOX_MICRO_DEPOSITS: (&str, &str) = ("0.03", "0.09");

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// An unverified customer. Omitting `type` keeps it able to send funds;
/// `receive-only` customers cannot be a transfer source.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFundingSource<'a> {
    pub routing_number: &'a str,
    pub account_number: &'a str,
    pub bank_account_type: &'a str,
    pub name: &'a str,
}

/// Client for the ACH provider (OAuth client-credentials, HAL+JSON, ids via `Location`).
#[derive(Clone)]
pub struct DwollaClient {
    client: reqwest::Client,
    base_url: String,
    key: String,
    secret: String,
    tokens: Cache<&'static str, String>,
}

impl DwollaClient {
    pub fn new(base_url: String, key: String, secret: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create Dwolla client: {}", e))
            })?;

        // Tokens live for an hour; refresh a few minutes early.
        let tokens = Cache::builder()
            .time_to_live(Duration::from_secs(3300))
            .max_capacity(1)
            .build();

        Ok(Self {
            client,
            base_url,
            key,
            secret,
            tokens,
        })
    }

    async fn access_token(&self) -> Result<String, AppError> {
        if let Some(token) = self.tokens.get(TOKEN_KEY).await {
            return Ok(token);
        }

        let url = format!("{}/token", self.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key, Some(&self.secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Dwolla token request failed: {}", e)))?;

        let response = check_status(response, "token").await?;
        let token: TokenResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Dwolla token: {}", e))
        })?;

        tracing::debug!(
            "Obtained Dwolla access token (expires in {:?}s)",
            token.expires_in
        );
        self.tokens
            .insert(TOKEN_KEY, token.access_token.clone())
            .await;
        Ok(token.access_token)
    }

    /// POSTs a HAL+JSON body and returns the response (status already checked).
    async fn post(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        idempotency_key: Option<&str>,
        action: &str,
    ) -> Result<reqwest::Response, AppError> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("Accept", HAL_JSON)
            .header("Content-Type", HAL_JSON);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        let request = match body {
            Some(body) => request.body(body.to_string()),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            AppError::ExternalApiError(format!("Dwolla {} request failed: {}", action, e))
        })?;
        check_status(response, action).await
    }

    pub async fn create_customer(&self, customer: &NewCustomer<'_>) -> Result<String, AppError> {
        tracing::info!("Creating Dwolla customer for {}", customer.email);
        let body = serde_json::to_value(customer)
            .map_err(|e| AppError::InternalError(format!("Failed to encode customer: {}", e)))?;
        let response = self
            .post("/customers", Some(body), None, "create customer")
            .await?;
        created_id(&response)
    }

    pub async fn create_funding_source(
        &self,
        customer_id: &str,
        source: &NewFundingSource<'_>,
    ) -> Result<String, AppError> {
        tracing::info!(
            "Creating funding source '{}' for customer {}",
            source.name,
            customer_id
        );
        let body = serde_json::to_value(source).map_err(|e| {
            AppError::InternalError(format!("Failed to encode funding source: {}", e))
        })?;
        let response = self
            .post(
                &format!("/customers/{}/funding-sources", customer_id),
                Some(body),
                None,
                "create funding source",
            )
            .await?;
        created_id(&response)
    }

    pub async fn initiate_micro_deposits(&self, funding_source_id: &str) -> Result<(), AppError> {
        self.post(
            &format!("/funding-sources/{}/micro-deposits", funding_source_id),
            None,
            None,
            "initiate micro-deposits",
        )
        .await?;
        Ok(())
    }

    pub async fn verify_micro_deposits(
        &self,
        funding_source_id: &str,
        amounts: (&str, &str),
    ) -> Result<(), AppError> {
        let body = json!({
            "amount1": { "value": amounts.0, "currency": "USD" },
            "amount2": { "value": amounts.1, "currency": "USD" },
        });
        self.post(
            &format!("/funding-sources/{}/micro-deposits", funding_source_id),
            Some(body),
            None,
            "verify micro-deposits",
        )
        .await?;
        tracing::info!("Funding source {} verified", funding_source_id);
        Ok(())
    }

    pub async fn create_transfer(
        &self,
        source_funding_source_id: &str,
        destination_funding_source_id: &str,
        amount_cents: i64,
        note: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> Result<String, AppError> {
        let mut body = json!({
            "_links": {
                "source": {
                    "href": format!("{}/funding-sources/{}", self.base_url, source_funding_source_id)
                },
                "destination": {
                    "href": format!("{}/funding-sources/{}", self.base_url, destination_funding_source_id)
                }
            },
            "amount": { "currency": "USD", "value": cents_to_decimal(amount_cents) },
        });
        if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
            body["metadata"] = json!({ "note": note });
        }

        tracing::info!(
            "Initiating ACH transfer of {} cents from {}",
            amount_cents,
            source_funding_source_id
        );
        let response = self
            .post("/transfers", Some(body), idempotency_key, "create transfer")
            .await?;
        created_id(&response)
    }
}

async fn check_status(response: reqwest::Response, action: &str) -> Result<reqwest::Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(AppError::ExternalApiError(format!(
        "Dwolla {} failed {}: {}",
        action, status, error_text
    )))
}

/// The provider answers creates with `201` and the new resource URL in `Location`.
fn created_id(response: &reqwest::Response) -> Result<String, AppError> {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(id_from_location)
        .ok_or_else(|| {
            AppError::ExternalApiError("Dwolla response missing Location header".to_string())
        })
}

fn id_from_location(location: &str) -> Option<String> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// `1000` → `"10.00"`
pub fn cents_to_decimal(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_location() {
        assert_eq!(
            id_from_location("https://api-sandbox.dwolla.com/customers/abc-123").as_deref(),
            Some("abc-123")
        );
        assert_eq!(
            id_from_location("https://api-sandbox.dwolla.com/transfers/t-9/").as_deref(),
            Some("t-9")
        );
        assert_eq!(id_from_location(""), None);
    }

    #[test]
    fn test_cents_to_decimal() {
        assert_eq!(cents_to_decimal(1000), "10.00");
        assert_eq!(cents_to_decimal(5), "0.05");
        assert_eq!(cents_to_decimal(123456), "1234.56");
    }

    #[test]
    fn test_customer_is_created_unverified() {
        let customer = NewCustomer {
            first_name: "Ada",
            last_name: "Lovelace",
            email: "ada@example.com",
        };
        let value = serde_json::to_value(&customer).unwrap();
        assert!(value.get("type").is_none());
        assert_eq!(value["firstName"], "Ada");
    }
}
