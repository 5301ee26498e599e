use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Payment provider event envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    pub id: String,

    /// Event type (e.g. "checkout.session.completed")
    #[serde(rename = "type")]
    pub event_type: String,

    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The session or payment intent the event is about
    pub object: Value,
}

/// How a payment-intent event points back at a local payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentLink {
    /// `metadata.session_id`
    Session(String),
    /// `metadata.payment_id` (set on intents created through checkout)
    Payment(Uuid),
    Unlinked,
}

/// The events the reconciler acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    CheckoutCompleted {
        session_id: String,
        appointment_id: Option<Uuid>,
    },
    CheckoutExpired {
        session_id: String,
    },
    IntentSucceeded(IntentLink),
    IntentFailed(IntentLink),
    Unhandled(String),
}

impl StripeEvent {
    fn object_str(&self, key: &str) -> Option<&str> {
        self.data.object.get(key).and_then(Value::as_str)
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.data
            .object
            .get("metadata")
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    fn metadata_uuid(&self, key: &str) -> Option<Uuid> {
        let raw = self.metadata_str(key)?;
        match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!("Event {} has non-UUID metadata {}='{}'", self.id, key, raw);
                None
            }
        }
    }

    fn intent_link(&self) -> IntentLink {
        if let Some(session_id) = self.metadata_str("session_id") {
            return IntentLink::Session(session_id.to_string());
        }
        match self.metadata_uuid("payment_id") {
            Some(payment_id) => IntentLink::Payment(payment_id),
            None => IntentLink::Unlinked,
        }
    }

    /// Maps the envelope to the reconciler's view. Session events without an
    /// object id are treated as unhandled.
    pub fn classify(&self) -> PaymentEvent {
        match self.event_type.as_str() {
            "checkout.session.completed" => match self.object_str("id") {
                Some(session_id) => PaymentEvent::CheckoutCompleted {
                    session_id: session_id.to_string(),
                    appointment_id: self.metadata_uuid("appointment_id"),
                },
                None => PaymentEvent::Unhandled(self.event_type.clone()),
            },
            "checkout.session.expired" => match self.object_str("id") {
                Some(session_id) => PaymentEvent::CheckoutExpired {
                    session_id: session_id.to_string(),
                },
                None => PaymentEvent::Unhandled(self.event_type.clone()),
            },
            "payment_intent.succeeded" => PaymentEvent::IntentSucceeded(self.intent_link()),
            "payment_intent.payment_failed" => PaymentEvent::IntentFailed(self.intent_link()),
            other => PaymentEvent::Unhandled(other.to_string()),
        }
    }
}

/// Response body for every processed delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}
