use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Public site origin used for checkout success/cancel redirects.
    pub site_url: String,
    /// Identity provider base URL (bearer tokens are resolved at `/auth/v1/user`).
    pub identity_url: String,
    pub identity_anon_key: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    pub dwolla_key: String,
    pub dwolla_secret: String,
    pub dwolla_base_url: String,
    /// Platform funding source every ACH transfer is sent to.
    pub dwolla_master_funding_source: String,
    pub resend_api_key: Option<String>,
    pub resend_base_url: String,
    pub email_from: String,
    pub admin_email: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub pwned_passwords_url: String,
    pub orphan_sweep_hours: i64,
    pub orphan_sweep_interval_secs: u64,
}

fn required(name: &str) -> anyhow::Result<String> {
    let value = std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    Ok(value)
}

fn required_url(name: &str) -> anyhow::Result<String> {
    let raw = required(name)?;
    let parsed = url::Url::parse(&raw)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn optional_url(name: &str, default: &str) -> anyhow::Result<String> {
    match std::env::var(name).ok().filter(|s| !s.trim().is_empty()) {
        Some(_) => required_url(name),
        None => Ok(default.to_string()),
    }
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Age in hours before an unpaid booking is swept. Must be positive.
fn parse_sweep_hours(raw: &str) -> anyhow::Result<i64> {
    let hours: i64 = raw
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("ORPHAN_SWEEP_HOURS must be a whole number"))?;
    if hours <= 0 {
        anyhow::bail!("ORPHAN_SWEEP_HOURS must be greater than 0");
    }
    Ok(hours)
}

/// Seconds between sweeps. `tokio::time::interval` panics on zero.
fn parse_sweep_interval(raw: &str) -> anyhow::Result<u64> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("ORPHAN_SWEEP_INTERVAL_SECS must be a whole number"))?;
    if secs == 0 {
        anyhow::bail!("ORPHAN_SWEEP_INTERVAL_SECS must be greater than 0");
    }
    Ok(secs)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            site_url: required_url("SITE_URL")?,
            identity_url: required_url("IDENTITY_URL")?,
            identity_anon_key: required("IDENTITY_ANON_KEY")?,
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            stripe_api_base: optional_url("STRIPE_API_BASE", "https://api.stripe.com")?,
            dwolla_key: required("DWOLLA_KEY")?,
            dwolla_secret: required("DWOLLA_SECRET")?,
            dwolla_base_url: optional_url("DWOLLA_BASE_URL", "https://api-sandbox.dwolla.com")?,
            dwolla_master_funding_source: required("DWOLLA_MASTER_FUNDING_SOURCE")?,
            resend_api_key: std::env::var("RESEND_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            resend_base_url: optional_url("RESEND_BASE_URL", "https://api.resend.com")?,
            email_from: optional("EMAIL_FROM", "Consult Portal <noreply@consultportal.com>"),
            admin_email: optional("ADMIN_EMAIL", "admin@consultportal.com"),
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_base_url: optional_url("OPENAI_BASE_URL", "https://api.openai.com/v1")?,
            openai_model: optional("OPENAI_MODEL", "gpt-4o-mini"),
            pwned_passwords_url: optional_url(
                "PWNED_PASSWORDS_URL",
                "https://api.pwnedpasswords.com",
            )?,
            orphan_sweep_hours: parse_sweep_hours(&optional("ORPHAN_SWEEP_HOURS", "24"))?,
            orphan_sweep_interval_secs: parse_sweep_interval(&optional(
                "ORPHAN_SWEEP_INTERVAL_SECS",
                "900",
            ))?,
        };

        if config.resend_api_key.is_none() {
            tracing::warn!("RESEND_API_KEY not set, notification emails will be skipped");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Site URL: {}", config.site_url);
        tracing::debug!("Stripe API base: {}", config.stripe_api_base);
        tracing::debug!("Dwolla base URL: {}", config.dwolla_base_url);
        tracing::debug!("OpenAI model: {}", config.openai_model);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Configuration pointing every provider at `base_url`, for tests and local demos.
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            database_url: "postgresql://localhost/consult_portal_test".to_string(),
            port: 0,
            site_url: "http://localhost:5173".to_string(),
            identity_url: base_url.to_string(),
            identity_anon_key: "anon-key".to_string(),
            stripe_secret_key: "sk_test_123".to_string(),
            stripe_webhook_secret: "whsec_test_secret".to_string(),
            stripe_api_base: base_url.to_string(),
            dwolla_key: "dwolla-key".to_string(),
            dwolla_secret: "dwolla-secret".to_string(),
            dwolla_base_url: base_url.to_string(),
            dwolla_master_funding_source: "master-fs-id".to_string(),
            resend_api_key: Some("re_test".to_string()),
            resend_base_url: base_url.to_string(),
            email_from: "Consult Portal <noreply@consultportal.com>".to_string(),
            admin_email: "admin@consultportal.com".to_string(),
            openai_api_key: "sk-openai-test".to_string(),
            openai_base_url: base_url.to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            pwned_passwords_url: base_url.to_string(),
            orphan_sweep_hours: 24,
            orphan_sweep_interval_secs: 900,
        }
    }
}
