use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{Appointment, ConsultationRequest, Payment, PaymentStatus};

/// The customer dashboard's appointment lists.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentLists {
    /// Live appointments from now on, soonest first.
    pub upcoming: Vec<Appointment>,
    /// Everything else, most recent first.
    pub past: Vec<Appointment>,
}

pub fn split_appointments(appointments: Vec<Appointment>, now: DateTime<Utc>) -> AppointmentLists {
    let (mut upcoming, mut past): (Vec<_>, Vec<_>) = appointments
        .into_iter()
        .partition(|a| a.status.is_live() && a.scheduled_at >= now);

    upcoming.sort_by_key(|a| a.scheduled_at);
    past.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));
    AppointmentLists { upcoming, past }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub appointments_by_status: BTreeMap<String, u64>,
    pub payments_by_status: BTreeMap<String, u64>,
    pub consultations_by_status: BTreeMap<String, u64>,
    /// Sum of completed payments, in cents.
    pub revenue_cents: i64,
}

fn count_by<T, K: ToString>(items: &[T], key: impl Fn(&T) -> K) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for item in items {
        *counts.entry(key(item).to_string()).or_insert(0) += 1;
    }
    counts
}

pub fn analytics(
    appointments: &[Appointment],
    payments: &[Payment],
    consultations: &[ConsultationRequest],
) -> Analytics {
    Analytics {
        appointments_by_status: count_by(appointments, |a| a.status),
        payments_by_status: count_by(payments, |p| p.status),
        consultations_by_status: count_by(consultations, |c| c.status),
        revenue_cents: payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed)
            .map(|p| p.amount_cents)
            .sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, AppointmentType};
    use chrono::Duration;
    use uuid::Uuid;

    fn appointment(offset_hours: i64, status: AppointmentStatus) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            scheduled_at: now + Duration::hours(offset_hours),
            appointment_type: AppointmentType::Consultation,
            status,
            contact_email: "patient@example.com".to_string(),
            contact_phone: None,
            consultant_name: None,
            notes: None,
            preferred_language: "en".to_string(),
            service_id: None,
            payment_required: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_split_appointments() {
        let lists = split_appointments(
            vec![
                appointment(48, AppointmentStatus::Confirmed),
                appointment(24, AppointmentStatus::Scheduled),
                appointment(-24, AppointmentStatus::Completed),
                appointment(72, AppointmentStatus::Cancelled),
            ],
            Utc::now(),
        );
        assert_eq!(lists.upcoming.len(), 2);
        assert_eq!(lists.upcoming[0].status, AppointmentStatus::Scheduled);
        assert_eq!(lists.past.len(), 2);
        assert_eq!(lists.past[0].status, AppointmentStatus::Cancelled);
    }

    #[test]
    fn test_analytics_counts_statuses() {
        let stats = analytics(
            &[
                appointment(1, AppointmentStatus::Scheduled),
                appointment(2, AppointmentStatus::Scheduled),
            ],
            &[],
            &[],
        );
        assert_eq!(stats.appointments_by_status.get("scheduled"), Some(&2));
        assert_eq!(stats.revenue_cents, 0);
    }
}
