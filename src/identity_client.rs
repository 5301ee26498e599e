use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// The user behind a verified access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Client for the identity provider's user endpoint.
///
/// Access tokens are opaque to this service; the provider resolves them.
#[derive(Clone)]
pub struct IdentityClient {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl IdentityClient {
    pub fn new(base_url: String, anon_key: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create identity client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            anon_key,
        })
    }

    /// Resolves a bearer token to its user.
    ///
    /// A 401/403 from the provider means the token is invalid or expired.
    pub async fn user_for_token(&self, token: &str) -> Result<IdentityUser, AppError> {
        let url = format!("{}/auth/v1/user", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Identity request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(AppError::Unauthorized(
                "Invalid or expired access token".to_string(),
            ));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Identity provider returned {}: {}",
                status, error_text
            )));
        }

        response.json::<IdentityUser>().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse identity response: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_user_ignores_extra_fields() {
        let json = r#"{
            "id": "6f1b9a52-4d1c-4a8e-9a55-0c1f3c1e2d11",
            "email": "patient@example.com",
            "aud": "authenticated",
            "app_metadata": {"provider": "email"}
        }"#;
        let user: IdentityUser = serde_json::from_str(json).unwrap();
        assert_eq!(user.email.as_deref(), Some("patient@example.com"));
    }
}
