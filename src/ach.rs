//! Three-step ACH flow: customer, verified funding source, transfer.
//!
//! Progress lives on the user's profile (`dwolla_customer_id`), never in the
//! client. Step 2 returns the funding-source id without persisting it; the
//! caller hands it back to step 3. No step retries on its own.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::dwolla_client::{DwollaClient, NewCustomer, NewFundingSource, SANDBOX_MICRO_DEPOSITS};
use crate::errors::AppError;
use crate::store::Store;

pub const SANDBOX_ROUTING_NUMBER: &str = "222222226";
pub const SANDBOX_ACCOUNT_NUMBER: &str = "123456789";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerResponse {
    pub dwolla_customer_id: String,
    pub already_exists: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingSourceRequest {
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub routing_number: Option<String>,
    #[serde(default)]
    pub bank_account_type: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingSourceResponse {
    pub funding_source_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub amount_cents: i64,
    #[serde(default)]
    pub source_funding_source_id: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub transfer_id: String,
}

pub struct AchService {
    store: Arc<dyn Store>,
    dwolla: DwollaClient,
    master_funding_source: String,
}

/// Logs the provider's full error and hands the caller a generic one.
fn provider_failure(step: &str, err: AppError) -> AppError {
    match err {
        AppError::ExternalApiError(detail) => {
            tracing::error!("ACH {} failed: {}", step, detail);
            AppError::ExternalApiError(format!("Failed to {}", step))
        }
        other => other,
    }
}

impl AchService {
    pub fn new(store: Arc<dyn Store>, dwolla: DwollaClient, master_funding_source: String) -> Self {
        Self {
            store,
            dwolla,
            master_funding_source,
        }
    }

    /// Step 1. Returns the stored customer id when there is one.
    pub async fn create_customer(&self, user: &AuthUser) -> Result<CreateCustomerResponse, AppError> {
        let profile = self
            .store
            .profile(user.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile for user {} not found", user.id)))?;

        if let Some(existing) = profile.dwolla_customer_id.filter(|id| !id.is_empty()) {
            tracing::info!("User {} already has ACH customer {}", user.id, existing);
            return Ok(CreateCustomerResponse {
                dwolla_customer_id: existing,
                already_exists: true,
            });
        }

        let email = if profile.email.is_empty() {
            user.email.clone().unwrap_or_default()
        } else {
            profile.email.clone()
        };
        if email.is_empty() {
            return Err(AppError::BadRequest(
                "An email address is required to create an ACH customer".to_string(),
            ));
        }

        let created = self
            .dwolla
            .create_customer(&NewCustomer {
                first_name: profile.first_name.as_deref().unwrap_or("Customer"),
                last_name: profile.last_name.as_deref().unwrap_or("Account"),
                email: &email,
            })
            .await
            .map_err(|e| provider_failure("create ACH customer", e))?;

        // A concurrent call may have linked first; the stored id wins.
        let stored = self.store.link_dwolla_customer(user.id, &created).await?;
        if stored != created {
            tracing::warn!(
                "User {} was linked to {} concurrently; discarding {}",
                user.id,
                stored,
                created
            );
        }

        tracing::info!("Created ACH customer {} for user {}", stored, user.id);
        Ok(CreateCustomerResponse {
            dwolla_customer_id: stored,
            already_exists: false,
        })
    }

    /// Step 2. Creates the funding source and completes sandbox micro-deposit verification.
    pub async fn create_funding_source(
        &self,
        user: &AuthUser,
        request: FundingSourceRequest,
    ) -> Result<FundingSourceResponse, AppError> {
        let customer_id = self
            .store
            .profile(user.id)
            .await?
            .and_then(|p| p.dwolla_customer_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::BadRequest(
                    "Create an ACH customer before adding a funding source".to_string(),
                )
            })?;

        let routing_number = non_blank(request.routing_number, SANDBOX_ROUTING_NUMBER);
        let account_number = non_blank(request.account_number, SANDBOX_ACCOUNT_NUMBER);
        let bank_account_type = non_blank(request.bank_account_type, "checking");
        let nickname = non_blank(request.nickname, "Primary Account");

        let funding_source_id = self
            .dwolla
            .create_funding_source(
                &customer_id,
                &NewFundingSource {
                    routing_number: &routing_number,
                    account_number: &account_number,
                    bank_account_type: &bank_account_type,
                    name: &nickname,
                },
            )
            .await
            .map_err(|e| provider_failure("create funding source", e))?;

        self.dwolla
            .initiate_micro_deposits(&funding_source_id)
            .await
            .map_err(|e| provider_failure("initiate micro-deposits", e))?;
        self.dwolla
            .verify_micro_deposits(&funding_source_id, SANDBOX_MICRO_DEPOSITS)
            .await
            .map_err(|e| provider_failure("verify micro-deposits", e))?;

        Ok(FundingSourceResponse { funding_source_id })
    }

    /// Step 3. Moves `amount_cents` from the caller's funding source to the platform account.
    pub async fn transfer(
        &self,
        user: &AuthUser,
        request: TransferRequest,
    ) -> Result<TransferResponse, AppError> {
        if request.amount_cents <= 0 {
            return Err(AppError::BadRequest(
                "amountCents must be a positive number of cents".to_string(),
            ));
        }
        let source = request.source_funding_source_id.trim();
        if source.is_empty() {
            return Err(AppError::BadRequest(
                "sourceFundingSourceId is required".to_string(),
            ));
        }

        let transfer_id = self
            .dwolla
            .create_transfer(
                source,
                &self.master_funding_source,
                request.amount_cents,
                request.note.as_deref(),
                request.idempotency_key.as_deref(),
            )
            .await
            .map_err(|e| provider_failure("initiate transfer", e))?;

        tracing::info!(
            "User {} started transfer {} for {} cents",
            user.id,
            transfer_id,
            request.amount_cents
        );
        Ok(TransferResponse { transfer_id })
    }
}

fn non_blank(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
