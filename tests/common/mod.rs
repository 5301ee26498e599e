//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use bigdecimal::BigDecimal;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use consult_portal_api::auth::AuthUser;
use consult_portal_api::booking::BookingForm;
use consult_portal_api::config::Config;
use consult_portal_api::handlers::AppState;
use consult_portal_api::memory_store::MemoryStore;
use consult_portal_api::models::{AppointmentType, Profile, Role, Service};
use consult_portal_api::store::Store;

pub fn service(name: &str, price: &str) -> Service {
    Service {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: Some(format!("{} with a senior consultant", name)),
        price: BigDecimal::from_str(price).unwrap(),
        duration: Some("60 minutes".to_string()),
        features: vec!["Video call".to_string()],
        active: true,
    }
}

pub fn customer() -> AuthUser {
    AuthUser {
        id: Uuid::new_v4(),
        email: Some("patient@example.com".to_string()),
        role: Role::Customer,
    }
}

pub fn profile_for(user: &AuthUser) -> Profile {
    Profile {
        id: user.id,
        email: user.email.clone().unwrap_or_default(),
        first_name: Some("Pat".to_string()),
        last_name: Some("Jones".to_string()),
        dwolla_customer_id: None,
        dwolla_funding_source_id: None,
    }
}

/// Tomorrow at `time`, as the booking form sends it.
pub fn form_for_tomorrow(time: &str) -> BookingForm {
    let tomorrow = (chrono::Utc::now() + chrono::Duration::days(1)).date_naive();
    BookingForm {
        date: Some(tomorrow.format("%Y-%m-%d").to_string()),
        time: Some(time.to_string()),
        appointment_type: Some(AppointmentType::Consultation),
        contact_email: Some("patient@example.com".to_string()),
        contact_phone: Some("+1 650 253 0000".to_string()),
        consultant_name: None,
        notes: Some("First visit".to_string()),
        preferred_language: Some("en".to_string()),
    }
}

/// App state over an in-memory store with every provider at `base_url`.
pub fn state(base_url: &str) -> (Arc<MemoryStore>, Arc<AppState>) {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn Store> = memory.clone();
    let state = AppState::new(Config::for_testing(base_url), store).unwrap();
    (memory, Arc::new(state))
}
