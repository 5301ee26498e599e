//! Best-effort notification email.
//!
//! Sends are spawned onto the runtime and their outcome is only logged; the
//! request that triggered them has already answered. A circuit breaker keeps
//! a failing provider from tying up tasks.

use failsafe::futures::CircuitBreaker;
use tokio::task::JoinHandle;

use crate::circuit_breaker::{create_email_circuit_breaker, EmailCircuitBreaker};
use crate::email_client::{escape_html, EmailClient, OutgoingEmail};
use crate::models::ConsultationRequest;

/// What happened to one email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed,
    /// Circuit open; no request was made.
    Rejected,
    /// No provider configured.
    Skipped,
}

#[derive(Clone)]
pub struct Notifier {
    email: Option<EmailClient>,
    breaker: EmailCircuitBreaker,
    from: String,
    admin_email: String,
}

impl Notifier {
    pub fn new(email: Option<EmailClient>, from: String, admin_email: String) -> Self {
        Self {
            email,
            breaker: create_email_circuit_breaker(),
            from,
            admin_email,
        }
    }

    async fn deliver(&self, email: OutgoingEmail) -> Delivery {
        let Some(client) = &self.email else {
            tracing::debug!("Email disabled, skipping '{}'", email.subject);
            return Delivery::Skipped;
        };

        match self.breaker.call(client.send(&email)).await {
            Ok(_) => Delivery::Sent,
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("Email circuit open, dropped '{}'", email.subject);
                Delivery::Rejected
            }
            Err(failsafe::Error::Inner(e)) => {
                tracing::error!("Failed to send '{}': {}", email.subject, e);
                Delivery::Failed
            }
        }
    }

    /// Confirmation to the requester, then the admin notification.
    pub async fn consultation_received(&self, request: &ConsultationRequest) -> [Delivery; 2] {
        let confirmation = self.deliver(confirmation_email(&self.from, request)).await;
        let admin = self
            .deliver(admin_email(&self.from, &self.admin_email, request))
            .await;
        tracing::info!(
            "Consultation {} notifications: requester={:?} admin={:?}",
            request.id,
            confirmation,
            admin
        );
        [confirmation, admin]
    }

    /// Fire-and-forget variant for request handlers.
    pub fn spawn_consultation_received(&self, request: ConsultationRequest) -> JoinHandle<[Delivery; 2]> {
        let notifier = self.clone();
        tokio::spawn(async move { notifier.consultation_received(&request).await })
    }
}

fn confirmation_email(from: &str, request: &ConsultationRequest) -> OutgoingEmail {
    OutgoingEmail {
        from: from.to_string(),
        to: vec![request.email.clone()],
        subject: "We received your consultation request".to_string(),
        html: format!(
            "<h1>Thank you, {}!</h1>\
             <p>We received your request for <strong>{}</strong> and a consultant will contact you within one business day.</p>\
             <p>Reference: {}</p>",
            escape_html(&request.name),
            escape_html(&request.service_type),
            request.id
        ),
    }
}

fn admin_email(from: &str, admin: &str, request: &ConsultationRequest) -> OutgoingEmail {
    let optional = |v: &Option<String>| {
        v.as_deref()
            .map(escape_html)
            .unwrap_or_else(|| "-".to_string())
    };
    OutgoingEmail {
        from: from.to_string(),
        to: vec![admin.to_string()],
        subject: format!("New consultation request: {}", request.service_type),
        html: format!(
            "<h2>New consultation request</h2>\
             <ul>\
             <li>Name: {}</li>\
             <li>Email: {}</li>\
             <li>Phone: {}</li>\
             <li>Country: {}</li>\
             <li>Service: {}</li>\
             </ul>\
             <p>{}</p>",
            escape_html(&request.name),
            escape_html(&request.email),
            optional(&request.phone),
            optional(&request.country),
            escape_html(&request.service_type),
            optional(&request.message),
        ),
    }
}
